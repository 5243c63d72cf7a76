//! In-memory collaborators for controller tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

use medlink_chat::{
    AssistantApi, AssistantTurn, ChatConfig, ChatError, ChatEvent, Collaborators, Conversation,
    ConversationApi, ConversationPayload, DoctorApi, DoctorPayload, MessageApi, MessagePayload,
    ModeController, OutboundFrame, PendingRequestPayload, RequestAck, Result, Role, SendAck,
    SessionKey, SessionSink, SocketHandle, SocketTransport,
};

/// Route controller logs to the test output; `RUST_LOG=debug` for detail
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn conversation_payload(id: &str, name: &str) -> ConversationPayload {
    ConversationPayload {
        id: id.to_string(),
        counterpart_id: Some(format!("user-{}", id)),
        name: name.to_string(),
        last_message: None,
        timestamp: None,
        unread: false,
    }
}

pub fn history_payload(id: &str, sender: &str, text: &str, secs: i64) -> MessagePayload {
    MessagePayload {
        id: id.to_string(),
        room_id: None,
        sender: sender.to_string(),
        text: text.to_string(),
        timestamp: at(secs),
    }
}

pub fn doctor(id: &str, name: &str) -> DoctorPayload {
    DoctorPayload {
        id: id.to_string(),
        full_name: name.to_string(),
        specialization: Some("Cardiology".to_string()),
    }
}

// --------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeConversationApi {
    pub lists: Mutex<HashMap<Role, Vec<ConversationPayload>>>,
    pub failure: Mutex<Option<u16>>,
    pub calls: AtomicUsize,
}

impl FakeConversationApi {
    pub fn set_list(&self, tab: Role, list: Vec<ConversationPayload>) {
        self.lists.lock().insert(tab, list);
    }

    pub fn fail_with_status(&self, status: Option<u16>) {
        *self.failure.lock() = status;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversationApi for FakeConversationApi {
    async fn list_conversations(&self, tab: Role) -> Result<Vec<ConversationPayload>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = *self.failure.lock() {
            return Err(ChatError::from_status(status, "listing failed").unwrap());
        }
        Ok(self.lists.lock().get(&tab).cloned().unwrap_or_default())
    }
}

// --------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeMessageApi {
    pub histories: Mutex<HashMap<String, Vec<MessagePayload>>>,
    pub gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    pub sends: Mutex<Vec<(String, String)>>,
    pub fail_sends: Mutex<bool>,
    pub history_calls: AtomicUsize,
}

impl FakeMessageApi {
    pub fn set_history(&self, room: &str, history: Vec<MessagePayload>) {
        self.histories.lock().insert(room.to_string(), history);
    }

    /// Hold the next history fetch for `room` until the returned sender fires
    pub fn gate(&self, room: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(room.to_string(), rx);
        tx
    }

    pub fn set_fail_sends(&self, fail: bool) {
        *self.fail_sends.lock() = fail;
    }

    pub fn sends(&self) -> Vec<(String, String)> {
        self.sends.lock().clone()
    }
}

#[async_trait]
impl MessageApi for FakeMessageApi {
    async fn fetch_history(&self, room: &str) -> Result<Vec<MessagePayload>> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let gate = { self.gates.lock().remove(room) };
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(self.histories.lock().get(room).cloned().unwrap_or_default())
    }

    async fn send_message(&self, room: &str, content: &str) -> Result<SendAck> {
        let index = {
            let mut sends = self.sends.lock();
            sends.push((room.to_string(), content.to_string()));
            sends.len()
        };
        if *self.fail_sends.lock() {
            return Err(ChatError::TransientFetch("status 502: bad gateway".to_string()));
        }
        Ok(SendAck {
            id: Some(format!("srv-{}", index)),
            timestamp: None,
        })
    }
}

// --------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeDoctorApi {
    pub doctors: Mutex<Vec<DoctorPayload>>,
    pub pending: Mutex<Vec<PendingRequestPayload>>,
    pub search_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
    pub accept_calls: AtomicUsize,
    pub reject_calls: AtomicUsize,
    /// Acknowledge requests without assigning an id
    pub anonymous_acks: Mutex<bool>,
}

impl FakeDoctorApi {
    pub fn add_pending(&self, id: &str, from: DoctorPayload) {
        self.pending.lock().push(PendingRequestPayload {
            id: id.to_string(),
            from_doctor: from,
        });
    }
}

#[async_trait]
impl DoctorApi for FakeDoctorApi {
    async fn search_doctors(&self, query: &str) -> Result<Vec<DoctorPayload>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let needle = query.to_lowercase();
        Ok(self
            .doctors
            .lock()
            .iter()
            .filter(|d| d.full_name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn send_request(&self, doctor_id: &str) -> Result<RequestAck> {
        let n = self.send_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.anonymous_acks.lock() {
            return Ok(RequestAck { id: None });
        }
        Ok(RequestAck {
            id: Some(format!("req-{}-{}", doctor_id, n)),
        })
    }

    async fn pending_requests(&self) -> Result<Vec<PendingRequestPayload>> {
        Ok(self.pending.lock().clone())
    }

    async fn accept_request(&self, _request_id: &str) -> Result<()> {
        self.accept_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reject_request(&self, _request_id: &str) -> Result<()> {
        self.reject_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// --------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeAssistant {
    pub calls: AtomicUsize,
}

#[async_trait]
impl AssistantApi for FakeAssistant {
    async fn reply(&self, thread: &[AssistantTurn]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let last = thread.last().map(|t| t.text.as_str()).unwrap_or_default();
        Ok(format!("You said: {}", last))
    }
}

// --------------------------------------------------------------------------

/// Transport that opens instantly and records everything
#[derive(Default)]
pub struct FakeTransport {
    pub live: Arc<AtomicUsize>,
    pub max_live: AtomicUsize,
    pub opened: Mutex<Vec<SessionKey>>,
    pub sinks: Mutex<Vec<SessionSink>>,
    pub frames: Arc<Mutex<Vec<OutboundFrame>>>,
}

impl FakeTransport {
    pub fn opened(&self) -> Vec<SessionKey> {
        self.opened.lock().clone()
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// Sink of the most recently opened session
    pub fn last_sink(&self) -> SessionSink {
        self.sinks.lock().last().cloned().expect("no session opened")
    }

    pub fn frames(&self) -> Vec<OutboundFrame> {
        self.frames.lock().clone()
    }
}

pub struct FakeHandle {
    live: Arc<AtomicUsize>,
    frames: Arc<Mutex<Vec<OutboundFrame>>>,
    closed: bool,
}

impl SocketHandle for FakeHandle {
    fn send(&mut self, frame: OutboundFrame) -> Result<()> {
        if self.closed {
            return Err(ChatError::Transport("closed".to_string()));
        }
        self.frames.lock().push(frame);
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl SocketTransport for FakeTransport {
    fn open(&self, key: &SessionKey, sink: SessionSink) -> Result<Box<dyn SocketHandle>> {
        let now_live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(now_live, Ordering::SeqCst);
        self.opened.lock().push(key.clone());
        sink.opened();
        self.sinks.lock().push(sink);
        Ok(Box::new(FakeHandle {
            live: self.live.clone(),
            frames: self.frames.clone(),
            closed: false,
        }))
    }
}

// --------------------------------------------------------------------------

pub struct Harness {
    pub chat: ModeController,
    pub events: tokio::sync::mpsc::UnboundedReceiver<ChatEvent>,
    pub conversations: Arc<FakeConversationApi>,
    pub messages: Arc<FakeMessageApi>,
    pub doctors: Arc<FakeDoctorApi>,
    pub assistant: Arc<FakeAssistant>,
    pub transport: Arc<FakeTransport>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ChatConfig::new("dr-me"))
    }

    pub fn with_config(config: ChatConfig) -> Self {
        init_tracing();
        let conversations = Arc::new(FakeConversationApi::default());
        let messages = Arc::new(FakeMessageApi::default());
        let doctors = Arc::new(FakeDoctorApi::default());
        let assistant = Arc::new(FakeAssistant::default());
        let transport = Arc::new(FakeTransport::default());

        let (chat, events) = ModeController::new(
            config,
            Collaborators {
                conversations: conversations.clone(),
                messages: messages.clone(),
                doctors: doctors.clone(),
                assistant: assistant.clone(),
                transport: transport.clone(),
            },
        );

        Self {
            chat,
            events,
            conversations,
            messages,
            doctors,
            assistant,
            transport,
        }
    }

    /// Seed two patient conversations and load them
    pub async fn with_rooms(mut self) -> Self {
        self.conversations.set_list(
            Role::Patient,
            vec![
                conversation_payload("room-a", "Naina"),
                conversation_payload("room-b", "Archi"),
            ],
        );
        self.chat.load_conversations(Role::Patient).await.unwrap();
        self
    }

    pub fn conversation(&self, id: &str) -> Conversation {
        self.chat
            .conversations()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .expect("conversation not loaded")
    }

    /// Select a room and let its history and session settle
    pub async fn open_room(&mut self, id: &str) {
        let conversation = self.conversation(id);
        self.chat.select_conversation(&conversation).await.unwrap();
        self.chat.process_next().await.unwrap();
        self.chat.drain_ready();
    }

    pub fn drain_events(&mut self) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
