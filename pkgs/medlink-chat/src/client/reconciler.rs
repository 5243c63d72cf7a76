//! Per-room message timelines
//!
//! Merges three sources into one ordered timeline per room:
//!
//! - **History**: fetched on selection, replaces the timeline wholesale
//! - **Outbound**: optimistic entries with `local-*` ids, confirmed or failed later
//! - **Inbound**: live frames, deduplicated against optimistic entries
//!
//! Every timeline is kept unique by id and ordered non-decreasing by
//! timestamp. Inserts go after any entry with an equal timestamp, so receipt
//! order is preserved for ties.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::SendAck;
use crate::error::{ChatError, Result};
use crate::models::{DeliveryState, Message, MessageOrigin, RoomId, UserId};

/// Result of applying a live inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    Appended,
    /// Same id already present
    Duplicate,
    /// Echo of one of our own optimistic entries
    EchoOf(String),
}

/// Timeline owner
pub struct MessageReconciler {
    timelines: HashMap<RoomId, Vec<Message>>,
    /// Optimistic entries already matched by an echo; one echo per entry
    echoed: HashSet<String>,
    echo_window: chrono::Duration,
    local_prefix: String,
}

impl MessageReconciler {
    pub fn new(echo_window: Duration, local_prefix: impl Into<String>) -> Self {
        Self {
            timelines: HashMap::new(),
            echoed: HashSet::new(),
            echo_window: chrono::Duration::from_std(echo_window)
                .unwrap_or_else(|_| chrono::Duration::seconds(5)),
            local_prefix: local_prefix.into(),
        }
    }

    pub fn timeline(&self, room: &str) -> &[Message] {
        self.timelines.get(room).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_local_id(&self, id: &str) -> bool {
        id.starts_with(&self.local_prefix)
    }

    /// Replace a room's timeline with fetched history.
    ///
    /// Optimistic entries and live frames the history does not know about
    /// yet are carried over, so a send issued or a frame received while the
    /// fetch was in flight stays visible.
    pub fn replace_history(&mut self, room: &str, history: Vec<Message>) -> usize {
        let mut seen = HashSet::new();
        let mut timeline: Vec<Message> = Vec::with_capacity(history.len());
        for message in history {
            if message.room_id != room {
                warn!(
                    "History entry {} belongs to room {}, skipping",
                    message.id, message.room_id
                );
                continue;
            }
            if !seen.insert(message.id.clone()) {
                debug!("Duplicate history entry {} in room {}", message.id, room);
                continue;
            }
            timeline.push(message);
        }
        // stable sort keeps server order for equal timestamps
        timeline.sort_by_key(|m| m.timestamp);

        if let Some(previous) = self.timelines.remove(room) {
            for entry in previous {
                let persisted = match entry.origin {
                    MessageOrigin::History => continue,
                    MessageOrigin::LiveOutbound => entry
                        .server_id
                        .as_ref()
                        .is_some_and(|sid| seen.contains(sid)),
                    MessageOrigin::LiveInbound => match entry.server_id.as_ref() {
                        Some(sid) => seen.contains(sid),
                        // no id to go by, match on content
                        None => timeline.iter().any(|m| {
                            m.origin == MessageOrigin::History
                                && m.sender_id == entry.sender_id
                                && m.text == entry.text
                                && (m.timestamp - entry.timestamp).abs() <= self.echo_window
                        }),
                    },
                };
                if persisted {
                    self.echoed.remove(&entry.id);
                } else {
                    insert_ordered(&mut timeline, entry);
                }
            }
        }

        let len = timeline.len();
        self.timelines.insert(room.to_string(), timeline);
        len
    }

    /// Append an optimistic outbound entry and return a copy of it
    pub fn append_outbound(
        &mut self,
        room: &str,
        sender: &UserId,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Message {
        let message = Message {
            id: format!("{}{}", self.local_prefix, Uuid::new_v4()),
            room_id: room.to_string(),
            sender_id: sender.clone(),
            text: text.to_string(),
            timestamp,
            origin: MessageOrigin::LiveOutbound,
            delivery: DeliveryState::Pending,
            server_id: None,
        };
        insert_ordered(self.timelines.entry(room.to_string()).or_default(), message.clone());
        message
    }

    /// Record a successful persistence acknowledgment
    pub fn confirm_outbound(&mut self, room: &str, local_id: &str, ack: &SendAck) -> bool {
        let Some(entry) = self.find_local_mut(room, local_id) else {
            return false;
        };
        entry.delivery = DeliveryState::Confirmed;
        if entry.server_id.is_none() {
            entry.server_id = ack.id.clone();
        }
        let server_id = entry.server_id.clone();

        // an echo may have landed first under the server id
        if let (Some(server_id), Some(timeline)) = (server_id, self.timelines.get_mut(room)) {
            let before = timeline.len();
            timeline.retain(|m| m.id == local_id || m.id != server_id);
            if timeline.len() < before {
                debug!("Removed inbound copy {} of {}", server_id, local_id);
            }
        }
        true
    }

    pub fn fail_outbound(&mut self, room: &str, local_id: &str) -> bool {
        match self.find_local_mut(room, local_id) {
            Some(entry) if entry.delivery == DeliveryState::Pending => {
                entry.delivery = DeliveryState::Failed;
                true
            }
            _ => false,
        }
    }

    /// Move a failed entry back to pending so it can be re-sent
    pub fn begin_retry(&mut self, room: &str, local_id: &str) -> Result<Message> {
        let entry = self
            .find_local_mut(room, local_id)
            .ok_or_else(|| ChatError::NotFound(format!("message {}", local_id)))?;
        if entry.delivery != DeliveryState::Failed {
            return Err(ChatError::Conflict(format!(
                "message {} is not in failed state",
                local_id
            )));
        }
        entry.delivery = DeliveryState::Pending;
        Ok(entry.clone())
    }

    /// Apply a live inbound message to its room
    pub fn apply_inbound(&mut self, message: Message) -> InboundOutcome {
        let window = self.echo_window;
        let timeline = self.timelines.entry(message.room_id.clone()).or_default();

        if let Some(server_id) = message.server_id.as_deref() {
            let known = timeline
                .iter()
                .any(|m| m.id == server_id || m.server_id.as_deref() == Some(server_id));
            if known {
                return InboundOutcome::Duplicate;
            }
        } else if timeline.iter().any(|m| m.id == message.id) {
            return InboundOutcome::Duplicate;
        }

        // an acked entry only matches echoes without an id; ids were compared above
        let echo = timeline.iter_mut().find(|m| {
            m.origin == MessageOrigin::LiveOutbound
                && (m.server_id.is_none() || message.server_id.is_none())
                && !self.echoed.contains(&m.id)
                && m.sender_id == message.sender_id
                && m.text == message.text
                && (m.timestamp - message.timestamp).abs() <= window
        });
        if let Some(entry) = echo {
            if entry.server_id.is_none() {
                entry.server_id = message.server_id.clone();
            }
            self.echoed.insert(entry.id.clone());
            return InboundOutcome::EchoOf(entry.id.clone());
        }

        insert_ordered(timeline, message);
        InboundOutcome::Appended
    }

    fn find_local_mut(&mut self, room: &str, local_id: &str) -> Option<&mut Message> {
        self.timelines
            .get_mut(room)?
            .iter_mut()
            .find(|m| m.is_local() && m.id == local_id)
    }
}

fn insert_ordered(timeline: &mut Vec<Message>, message: Message) {
    let at = timeline.partition_point(|m| m.timestamp <= message.timestamp);
    timeline.insert(at, message);
}
