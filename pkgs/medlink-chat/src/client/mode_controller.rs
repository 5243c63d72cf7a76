//! Top-level chat controller

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::directory::{ConversationDirectory, FetchOutcome};
use super::event_handler::InboxHandler;
use super::reconciler::MessageReconciler;
use super::request_workflow::ConnectionRequestWorkflow;
use super::session_manager::ConnectionSessionManager;
use crate::api::{AssistantApi, ConversationApi, DoctorApi, MessageApi};
use crate::config::{ChatConfig, SessionScope};
use crate::error::{ChatError, Result};
use crate::events::{ChatEvent, Inbound, Notification};
use crate::models::{
    AssistantRole, AssistantTurn, ConnectionRequest, Conversation, DoctorSearchResult, Message,
    Mode, Role, RoomId, SessionKey,
};
use crate::transport::{OutboundFrame, SocketTransport};

/// Remote collaborators the controller is wired to
#[derive(Clone)]
pub struct Collaborators {
    pub conversations: Arc<dyn ConversationApi>,
    pub messages: Arc<dyn MessageApi>,
    pub doctors: Arc<dyn DoctorApi>,
    pub assistant: Arc<dyn AssistantApi>,
    pub transport: Arc<dyn SocketTransport>,
}

/// Chat subsystem entry point
///
/// Owns every component and the single view mode
/// (`Empty | PeerChat(room) | AiOverlay`). User actions are its async
/// methods; network completions and socket events are queued and applied
/// one at a time by [`ModeController::process_next`], so no entity list is
/// ever mutated from two places at once.
pub struct ModeController {
    pub(super) config: ChatConfig,
    pub(super) mode: Mode,
    /// The conversation behind `Mode::PeerChat`, kept in step with `mode`
    pub(super) open_conversation: Option<Conversation>,

    pub(super) sessions: ConnectionSessionManager,
    pub(super) reconciler: MessageReconciler,
    pub(super) directory: ConversationDirectory,
    pub(super) requests: ConnectionRequestWorkflow,

    pub(super) messages_api: Arc<dyn MessageApi>,
    pub(super) assistant_api: Arc<dyn AssistantApi>,

    pub(super) overlay: Vec<AssistantTurn>,
    /// Bumped on every overlay open/close; tags assistant replies
    pub(super) overlay_epoch: u64,

    inbox_tx: mpsc::UnboundedSender<Inbound>,
    inbox_rx: mpsc::UnboundedReceiver<Inbound>,
    pub(super) event_sender: mpsc::UnboundedSender<ChatEvent>,
}

impl ModeController {
    /// Create a controller in `Empty` mode
    #[instrument(skip_all, fields(user = %config.user_id))]
    pub fn new(
        config: ChatConfig,
        collaborators: Collaborators,
    ) -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        let controller = Self {
            sessions: ConnectionSessionManager::new(collaborators.transport, inbox_tx.clone()),
            reconciler: MessageReconciler::new(config.echo_window, config.local_id_prefix.clone()),
            directory: ConversationDirectory::new(
                collaborators.conversations,
                config.initial_tab,
                config.placeholder_conversations.clone(),
            ),
            requests: ConnectionRequestWorkflow::new(
                collaborators.doctors,
                config.local_id_prefix.clone(),
            ),
            messages_api: collaborators.messages,
            assistant_api: collaborators.assistant,
            mode: Mode::Empty,
            open_conversation: None,
            overlay: Vec::new(),
            overlay_epoch: 0,
            inbox_tx,
            inbox_rx,
            event_sender,
            config,
        };

        (controller, event_receiver)
    }

    // ----------------------------------------------------------------------
    // Mode transitions
    // ----------------------------------------------------------------------

    /// Open a conversation.
    ///
    /// Closes the previous session first, then fetches the room's history.
    /// The new session is opened once that history has been applied.
    #[instrument(skip(self, conversation), fields(room = %conversation.id))]
    pub async fn select_conversation(&mut self, conversation: &Conversation) -> Result<()> {
        if self.mode.active_room() == Some(&conversation.id) {
            debug!("Conversation {} already open", conversation.id);
            return Ok(());
        }

        let keep_user_session = self.config.session_scope == SessionScope::PerUser
            && matches!(self.mode, Mode::PeerChat(_));
        if !keep_user_session {
            self.close_session();
        }

        let room = conversation.id.clone();
        self.set_mode(Mode::PeerChat(room.clone()), Some(conversation.clone()));

        if self.directory.mark_read(&room) {
            self.send_event(ChatEvent::ConversationTouched {
                room: room.clone(),
                unread: false,
            });
        }

        info!("Fetching history for {}", room);
        let api = self.messages_api.clone();
        self.spawn_inbound(async move {
            let result = api.fetch_history(&room).await;
            Inbound::History { room, result }
        });
        Ok(())
    }

    /// Leave the open conversation and return to the empty state
    pub fn leave_conversation(&mut self) {
        if let Mode::PeerChat(_) = self.mode {
            self.close_session();
            self.set_mode(Mode::Empty, None);
        }
    }

    /// Switch to the AI overlay, tearing down any peer chat session first
    #[instrument(skip(self))]
    pub async fn open_ai_assistant(&mut self) -> Result<()> {
        if self.mode == Mode::AiOverlay {
            return Ok(());
        }

        self.close_session();

        self.overlay_epoch += 1;
        self.overlay.clear();
        if let Some(greeting) = &self.config.assistant_greeting {
            self.overlay.push(AssistantTurn {
                role: AssistantRole::Assistant,
                text: greeting.clone(),
            });
        }
        self.set_mode(Mode::AiOverlay, None);
        self.send_event(ChatEvent::AssistantUpdated {
            turns: self.overlay.len(),
        });
        Ok(())
    }

    pub async fn close_ai_assistant(&mut self) -> Result<()> {
        if self.mode != Mode::AiOverlay {
            return Ok(());
        }
        self.overlay_epoch += 1;
        self.set_mode(Mode::Empty, None);
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Messaging
    // ----------------------------------------------------------------------

    /// Send text to whatever the current mode talks to
    pub async fn send_message(&mut self, text: &str) -> Result<()> {
        let result = self.send_message_inner(text);
        self.surface("Sending message", result)
    }

    fn send_message_inner(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Validation("message is empty".to_string()));
        }

        match self.mode.clone() {
            Mode::Empty => Err(ChatError::InvalidMode(Mode::Empty.name())),
            Mode::AiOverlay => {
                self.ask_assistant(text);
                Ok(())
            }
            Mode::PeerChat(room) => {
                self.send_peer_message(&room, text);
                Ok(())
            }
        }
    }

    fn send_peer_message(&mut self, room: &RoomId, text: &str) {
        let message =
            self.reconciler
                .append_outbound(room, &self.config.user_id, text, Utc::now());
        debug!("Queued {} in {}", message.id, room);
        self.after_timeline_change(room, &message.text, message.timestamp, false);

        let frame = self
            .open_conversation
            .as_ref()
            .filter(|_| self.sessions.is_open())
            .map(|conversation| OutboundFrame {
                sender: self.config.user_id.clone(),
                receiver: conversation.counterpart_id.clone(),
                text: text.to_string(),
            });
        if let Some(frame) = frame {
            if let Err(e) = self.sessions.send(frame) {
                warn!("Socket send failed, relying on persistence call: {}", e);
            }
        }

        self.persist(room.clone(), message.id, text.to_string());
    }

    /// Re-issue the persistence call for a failed outbound entry
    pub async fn retry_message(&mut self, local_id: &str) -> Result<()> {
        let result = self.retry_inner(local_id);
        self.surface("Retrying message", result)
    }

    fn retry_inner(&mut self, local_id: &str) -> Result<()> {
        let room = self
            .mode
            .active_room()
            .cloned()
            .ok_or(ChatError::InvalidMode(self.mode.name()))?;
        let message = self.reconciler.begin_retry(&room, local_id)?;
        self.send_event(ChatEvent::TimelineUpdated {
            room: room.clone(),
            len: self.reconciler.timeline(&room).len(),
        });
        self.persist(room, message.id, message.text);
        Ok(())
    }

    fn persist(&self, room: RoomId, local_id: String, text: String) {
        let api = self.messages_api.clone();
        self.spawn_inbound(async move {
            let result = api.send_message(&room, &text).await;
            Inbound::SendAck {
                room,
                local_id,
                result,
            }
        });
    }

    fn ask_assistant(&mut self, text: &str) {
        self.overlay.push(AssistantTurn {
            role: AssistantRole::User,
            text: text.to_string(),
        });
        self.send_event(ChatEvent::AssistantUpdated {
            turns: self.overlay.len(),
        });

        let api = self.assistant_api.clone();
        let thread = self.overlay.clone();
        let epoch = self.overlay_epoch;
        self.spawn_inbound(async move {
            let result = api.reply(&thread).await;
            Inbound::AssistantReply { epoch, result }
        });
    }

    // ----------------------------------------------------------------------
    // Directory
    // ----------------------------------------------------------------------

    /// Switch the directory to `tab` and load it
    pub async fn load_conversations(&mut self, tab: Role) -> Result<Vec<Conversation>> {
        let result = self.directory.fetch(tab).await;
        let result = self.after_directory_fetch(result);
        self.surface("Loading conversations", result)
    }

    /// Reload the directory's current tab
    pub async fn refresh_conversations(&mut self) -> Result<Vec<Conversation>> {
        let result = self.directory.refresh().await;
        let result = self.after_directory_fetch(result);
        self.surface("Refreshing conversations", result)
    }

    fn after_directory_fetch(&mut self, result: Result<FetchOutcome>) -> Result<Vec<Conversation>> {
        let outcome = result?;
        let degraded = matches!(outcome, FetchOutcome::Degraded(_));
        if let FetchOutcome::Degraded(e) = outcome {
            self.send_event(ChatEvent::Notice(Notification::warning(format!(
                "Showing placeholder conversations: {}",
                e
            ))));
        }
        // the open conversation keeps its read state across refreshes
        if let Some(room) = self.mode.active_room().cloned() {
            self.directory.mark_read(&room);
        }
        self.send_event(ChatEvent::ConversationsUpdated {
            tab: self.directory.tab(),
            count: self.directory.conversations().len(),
            degraded,
        });
        Ok(self.directory.conversations().to_vec())
    }

    /// Pure, case-insensitive name filter over the current list
    pub fn filter_conversations(&self, text: &str) -> Vec<Conversation> {
        self.directory.filtered(text)
    }

    // ----------------------------------------------------------------------
    // Connection requests
    // ----------------------------------------------------------------------

    pub async fn search_doctors(&mut self, query: &str) -> Result<Vec<DoctorSearchResult>> {
        let result = self.requests.search(query).await.map(<[_]>::to_vec);
        if let Ok(results) = &result {
            self.send_event(ChatEvent::SearchResultsUpdated {
                count: results.len(),
            });
        }
        self.surface("Searching doctors", result)
    }

    pub async fn send_connection_request(&mut self, doctor_id: &str) -> Result<ConnectionRequest> {
        let result = self.requests.send(doctor_id).await;
        if result.is_ok() {
            self.send_event(ChatEvent::SearchResultsUpdated {
                count: self.requests.results().len(),
            });
            self.send_event(ChatEvent::Notice(Notification::info(
                "Connection request sent",
            )));
        }
        self.surface("Sending connection request", result)
    }

    pub async fn fetch_pending_requests(&mut self) -> Result<Vec<ConnectionRequest>> {
        let result = self.requests.fetch_pending().await;
        if let Ok(pending) = &result {
            self.send_event(ChatEvent::RequestsUpdated {
                pending: pending.len(),
            });
        }
        self.surface("Loading connection requests", result)
    }

    /// Accept a pending request and refresh the directory, which may now list a new conversation
    pub async fn accept_request(&mut self, request_id: &str) -> Result<ConnectionRequest> {
        let result = self.requests.accept(request_id).await;
        let request = self.surface("Accepting request", result)?;
        self.send_event(ChatEvent::RequestsUpdated {
            pending: self.requests.pending().len(),
        });
        // refresh failures are reported on their own; the acceptance stands
        let _ = self.refresh_conversations().await;
        Ok(request)
    }

    pub async fn reject_request(&mut self, request_id: &str) -> Result<ConnectionRequest> {
        let result = self.requests.reject(request_id).await;
        let request = self.surface("Rejecting request", result)?;
        self.send_event(ChatEvent::RequestsUpdated {
            pending: self.requests.pending().len(),
        });
        Ok(request)
    }

    // ----------------------------------------------------------------------
    // Event loop
    // ----------------------------------------------------------------------

    /// Wait for the next completion or socket event and apply it
    pub async fn process_next(&mut self) -> Result<()> {
        let inbound = self
            .inbox_rx
            .recv()
            .await
            .ok_or(ChatError::ChannelClosed)?;
        InboxHandler::new(self).handle(inbound);
        Ok(())
    }

    /// Apply everything already queued without waiting. Returns how many items were applied.
    pub fn drain_ready(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(inbound) = self.inbox_rx.try_recv() {
            InboxHandler::new(self).handle(inbound);
            applied += 1;
        }
        applied
    }

    /// Apply completions and socket events until the queue closes
    pub async fn run(&mut self) -> Result<()> {
        loop {
            self.process_next().await?;
        }
    }

    /// Close the live session; the application is going away
    pub fn shutdown(&mut self) {
        info!("Shutting down chat controller");
        self.close_session();
        self.overlay_epoch += 1;
    }

    // ----------------------------------------------------------------------
    // Accessors
    // ----------------------------------------------------------------------

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn open_conversation(&self) -> Option<&Conversation> {
        self.open_conversation.as_ref()
    }

    /// Timeline of the open room, empty outside peer chat
    pub fn timeline(&self) -> &[Message] {
        match self.mode.active_room() {
            Some(room) => self.reconciler.timeline(room),
            None => &[],
        }
    }

    pub fn timeline_for(&self, room: &str) -> &[Message] {
        self.reconciler.timeline(room)
    }

    pub fn conversations(&self) -> &[Conversation] {
        self.directory.conversations()
    }

    pub fn is_directory_degraded(&self) -> bool {
        self.directory.is_degraded()
    }

    pub fn search_results(&self) -> &[DoctorSearchResult] {
        self.requests.results()
    }

    pub fn pending_requests(&self) -> Vec<ConnectionRequest> {
        self.requests.pending()
    }

    pub fn sent_requests(&self) -> &[ConnectionRequest] {
        self.requests.sent_requests()
    }

    pub fn assistant_thread(&self) -> &[AssistantTurn] {
        &self.overlay
    }

    pub fn session(&self) -> &ConnectionSessionManager {
        &self.sessions
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    // ----------------------------------------------------------------------
    // Internals shared with the inbox handler
    // ----------------------------------------------------------------------

    pub(super) fn set_mode(&mut self, mode: Mode, conversation: Option<Conversation>) {
        if self.mode != mode {
            info!("Mode {} -> {}", self.mode.name(), mode.name());
        }
        self.mode = mode.clone();
        self.open_conversation = conversation;
        self.send_event(ChatEvent::ModeChanged { mode });
    }

    pub(super) fn session_key_for(&self, room: &RoomId) -> SessionKey {
        match self.config.session_scope {
            SessionScope::PerRoom => SessionKey::Room(room.clone()),
            SessionScope::PerUser => SessionKey::User(self.config.user_id.clone()),
        }
    }

    pub(super) fn close_session(&mut self) {
        if let Some(key) = self.sessions.close() {
            self.send_event(ChatEvent::SessionChanged {
                key,
                state: self.sessions.state(),
            });
        }
    }

    /// Preview bookkeeping after an entry lands in `room`'s timeline
    pub(super) fn after_timeline_change(
        &mut self,
        room: &RoomId,
        preview: &str,
        timestamp: chrono::DateTime<Utc>,
        mark_unread: bool,
    ) {
        self.send_event(ChatEvent::TimelineUpdated {
            room: room.clone(),
            len: self.reconciler.timeline(room).len(),
        });
        if self
            .directory
            .note_message(room, preview, timestamp, mark_unread)
        {
            self.send_event(ChatEvent::ConversationTouched {
                room: room.clone(),
                unread: mark_unread,
            });
        }
    }

    pub(super) fn send_event(&self, event: ChatEvent) {
        if self.event_sender.send(event).is_err() {
            debug!("No listener for chat events");
        }
    }

    /// Turn a boundary error into a notification (and an auth hand-off) before returning it
    pub(super) fn surface<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.report(operation, e);
        }
        result
    }

    pub(super) fn report(&self, operation: &str, error: &ChatError) {
        warn!("{} failed: {}", operation, error);
        if let ChatError::Auth { status } = error {
            self.send_event(ChatEvent::AuthRequired { status: *status });
        }
        self.send_event(ChatEvent::Notice(Notification::from_error(operation, error)));
    }

    fn spawn_inbound<F>(&self, work: F)
    where
        F: Future<Output = Inbound> + Send + 'static,
    {
        let tx = self.inbox_tx.clone();
        tokio::spawn(async move {
            let inbound = work.await;
            let _ = tx.send(inbound);
        });
    }
}
