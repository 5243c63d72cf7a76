//! Applying queued completions and socket events to controller state

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::reconciler::InboundOutcome;
use super::ModeController;
use crate::api::{keep_valid, MessagePayload, SendAck};
use crate::error::{ChatError, Result};
use crate::events::{ChatEvent, Inbound};
use crate::models::{
    AssistantRole, AssistantTurn, DeliveryState, Message, MessageOrigin, Mode, RoomId, SessionKey,
};
use crate::transport::{InboundFrame, TransportEvent};

/// Handles one inbox item against the controller
pub struct InboxHandler<'a> {
    controller: &'a mut ModeController,
}

impl<'a> InboxHandler<'a> {
    pub fn new(controller: &'a mut ModeController) -> Self {
        Self { controller }
    }

    pub(crate) fn handle(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::History { room, result } => self.handle_history(room, result),
            Inbound::SendAck {
                room,
                local_id,
                result,
            } => self.handle_send_ack(room, local_id, result),
            Inbound::AssistantReply { epoch, result } => self.handle_assistant_reply(epoch, result),
            Inbound::Session { serial, event } => self.handle_session_event(serial, event),
        }
    }

    /// History arrives tagged with the room it was requested for
    fn handle_history(&mut self, room: RoomId, result: Result<Vec<MessagePayload>>) {
        let c = &mut *self.controller;
        if c.mode.active_room() != Some(&room) {
            debug!("Discarding stale history for {}", room);
            return;
        }

        match result {
            Ok(payloads) => {
                let history = keep_valid(payloads, "history", |p| {
                    p.into_message(&room, MessageOrigin::History)
                });
                let len = c.reconciler.replace_history(&room, history);
                info!("Applied {} history entries to {}", len, room);
                c.send_event(ChatEvent::TimelineUpdated {
                    room: room.clone(),
                    len,
                });
            }
            Err(e) => c.report("Loading messages", &e),
        }

        // the session opens only after history is in place
        let key = c.session_key_for(&room);
        match c.sessions.connect(key.clone()) {
            Ok(true) => c.send_event(ChatEvent::SessionChanged {
                key,
                state: c.sessions.state(),
            }),
            Ok(false) => {}
            Err(e) => c.report("Connecting", &e),
        }
    }

    /// Acks are applied to their own room whether or not it is still open
    fn handle_send_ack(&mut self, room: RoomId, local_id: String, result: Result<SendAck>) {
        let c = &mut *self.controller;
        let changed = match result {
            Ok(ack) => c.reconciler.confirm_outbound(&room, &local_id, &ack),
            Err(e) => {
                let failed = c.reconciler.fail_outbound(&room, &local_id);
                if failed {
                    c.report("Delivering message", &e);
                }
                failed
            }
        };
        if changed {
            c.send_event(ChatEvent::TimelineUpdated {
                len: c.reconciler.timeline(&room).len(),
                room,
            });
        }
    }

    fn handle_assistant_reply(&mut self, epoch: u64, result: Result<String>) {
        let c = &mut *self.controller;
        if c.mode != Mode::AiOverlay || epoch != c.overlay_epoch {
            debug!("Discarding assistant reply from overlay epoch {}", epoch);
            return;
        }
        match result {
            Ok(text) => {
                c.overlay.push(AssistantTurn {
                    role: AssistantRole::Assistant,
                    text,
                });
                c.send_event(ChatEvent::AssistantUpdated {
                    turns: c.overlay.len(),
                });
            }
            Err(e) => c.report("Asking the assistant", &e),
        }
    }

    fn handle_session_event(&mut self, serial: u64, event: TransportEvent) {
        let c = &mut *self.controller;
        let Some(key) = c.sessions.key().cloned() else {
            debug!("Event for serial {} with no session", serial);
            return;
        };
        let Some(event) = c.sessions.handle_event(serial, event) else {
            return;
        };

        match event {
            TransportEvent::Opened => c.send_event(ChatEvent::SessionChanged {
                key,
                state: c.sessions.state(),
            }),
            TransportEvent::Frame(frame) => self.handle_frame(key, frame),
            TransportEvent::Closed => {
                info!("Session {} closed by remote", key);
                c.send_event(ChatEvent::SessionChanged {
                    key,
                    state: c.sessions.state(),
                });
            }
            TransportEvent::Error(message) => {
                c.send_event(ChatEvent::SessionChanged {
                    key,
                    state: c.sessions.state(),
                });
                c.report("Live connection", &ChatError::Transport(message));
            }
        }
    }

    fn handle_frame(&mut self, key: SessionKey, frame: InboundFrame) {
        let c = &mut *self.controller;
        let room = match (frame.room_id.clone(), &key) {
            (Some(room), _) => room,
            (None, SessionKey::Room(room)) => room.clone(),
            (None, SessionKey::User(_)) => {
                warn!("Dropping frame without room on user session");
                return;
            }
        };
        if frame.sender.trim().is_empty() {
            warn!("Dropping frame without sender in {}", room);
            return;
        }

        let timestamp = frame.timestamp.unwrap_or_else(Utc::now);
        let is_open_room = c.mode.active_room() == Some(&room);
        if !is_open_room {
            // only preview metadata is kept for rooms that are not on screen
            if c.directory.note_message(&room, &frame.text, timestamp, true) {
                c.send_event(ChatEvent::ConversationTouched { room, unread: true });
            }
            return;
        }

        let message = Message {
            id: frame
                .id
                .clone()
                .unwrap_or_else(|| format!("inbound-{}", Uuid::new_v4())),
            room_id: room.clone(),
            sender_id: frame.sender,
            text: frame.text,
            timestamp,
            origin: MessageOrigin::LiveInbound,
            delivery: DeliveryState::Confirmed,
            server_id: frame.id,
        };
        if c.reconciler.is_local_id(&message.id) {
            warn!("Inbound frame uses a local id {}, ignoring", message.id);
            return;
        }

        let preview = message.text.clone();
        match c.reconciler.apply_inbound(message) {
            InboundOutcome::Appended => c.after_timeline_change(&room, &preview, timestamp, false),
            InboundOutcome::Duplicate => debug!("Duplicate inbound message in {}", room),
            InboundOutcome::EchoOf(local_id) => {
                debug!("Inbound echo of {} in {}", local_id, room);
            }
        }
    }
}
