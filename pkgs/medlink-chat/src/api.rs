//! Request/response collaborators and their payload schemas
//!
//! The remote service owns message history, the doctor registry and the
//! relationship graph. This module defines the shapes exchanged with it and
//! the traits a concrete client implements:
//!
//! - **ConversationApi**: conversation listing per role tab
//! - **MessageApi**: history fetch and message persistence
//! - **DoctorApi**: doctor search and the connection-request endpoints
//! - **AssistantApi**: the AI assistant backend used by the overlay
//!
//! Payloads are validated one entry at a time on the way in. An entry that
//! does not satisfy its schema is dropped and logged instead of poisoning the
//! whole list.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ChatError, Result};
use crate::models::{
    AssistantTurn, Conversation, DeliveryState, DoctorSummary, Message, MessageOrigin, Role,
};

/// Conversation list entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationPayload {
    pub id: String,
    #[serde(default)]
    pub counterpart_id: Option<String>,
    pub name: String,
    #[serde(rename = "lastMessage", default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread: bool,
}

impl ConversationPayload {
    pub fn into_conversation(self, role: Role) -> Result<Conversation> {
        if self.id.trim().is_empty() {
            return Err(ChatError::MalformedPayload(
                "conversation without id".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(ChatError::MalformedPayload(format!(
                "conversation {} without name",
                self.id
            )));
        }
        let counterpart_id = self
            .counterpart_id
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.id.clone());
        Ok(Conversation {
            id: self.id,
            counterpart_id,
            name: self.name,
            role,
            last_message: self.last_message,
            last_timestamp: self.timestamp,
            unread: self.unread,
        })
    }
}

/// History entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagePayload {
    pub id: String,
    #[serde(default)]
    pub room_id: Option<String>,
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl MessagePayload {
    /// Convert into a timeline entry for `room`.
    ///
    /// Entries that name a different room are rejected.
    pub fn into_message(self, room: &str, origin: MessageOrigin) -> Result<Message> {
        if self.id.trim().is_empty() {
            return Err(ChatError::MalformedPayload("message without id".to_string()));
        }
        if self.sender.trim().is_empty() {
            return Err(ChatError::MalformedPayload(format!(
                "message {} without sender",
                self.id
            )));
        }
        if let Some(other) = self.room_id.as_deref() {
            if other != room {
                return Err(ChatError::MalformedPayload(format!(
                    "message {} belongs to room {}, not {}",
                    self.id, other, room
                )));
            }
        }
        Ok(Message {
            id: self.id.clone(),
            room_id: room.to_string(),
            sender_id: self.sender,
            text: self.text,
            timestamp: self.timestamp,
            origin,
            delivery: DeliveryState::Confirmed,
            server_id: Some(self.id),
        })
    }
}

/// Acknowledgment of a persisted message
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SendAck {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Doctor record from search and request listings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorPayload {
    pub id: String,
    pub full_name: String,
    #[serde(default)]
    pub specialization: Option<String>,
}

impl DoctorPayload {
    pub fn into_summary(self) -> Result<DoctorSummary> {
        if self.id.trim().is_empty() || self.full_name.trim().is_empty() {
            return Err(ChatError::MalformedPayload(format!(
                "doctor record '{}' is incomplete",
                self.id
            )));
        }
        Ok(DoctorSummary {
            id: self.id,
            full_name: self.full_name,
            specialization: self.specialization.filter(|s| !s.trim().is_empty()),
        })
    }
}

/// Pending request addressed to the current user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingRequestPayload {
    pub id: String,
    pub from_doctor: DoctorPayload,
}

/// Acknowledgment of a sent connection request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestAck {
    #[serde(default)]
    pub id: Option<String>,
}

#[async_trait]
pub trait ConversationApi: Send + Sync {
    /// Conversations for a role tab, in server order
    async fn list_conversations(&self, tab: Role) -> Result<Vec<ConversationPayload>>;
}

#[async_trait]
pub trait MessageApi: Send + Sync {
    /// History for a room in ascending timestamp order
    async fn fetch_history(&self, room: &str) -> Result<Vec<MessagePayload>>;

    async fn send_message(&self, room: &str, content: &str) -> Result<SendAck>;
}

#[async_trait]
pub trait DoctorApi: Send + Sync {
    async fn search_doctors(&self, query: &str) -> Result<Vec<DoctorPayload>>;

    async fn send_request(&self, doctor_id: &str) -> Result<RequestAck>;

    async fn pending_requests(&self) -> Result<Vec<PendingRequestPayload>>;

    async fn accept_request(&self, request_id: &str) -> Result<()>;

    async fn reject_request(&self, request_id: &str) -> Result<()>;
}

#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// Produce the assistant's next turn for the given thread
    async fn reply(&self, thread: &[AssistantTurn]) -> Result<String>;
}

/// Keep the entries that convert cleanly, logging the rest.
pub fn keep_valid<P, T, F>(entries: Vec<P>, what: &str, mut convert: F) -> Vec<T>
where
    F: FnMut(P) -> Result<T>,
{
    let total = entries.len();
    let kept: Vec<T> = entries
        .into_iter()
        .filter_map(|entry| match convert(entry) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Dropping {} entry: {}", what, e);
                None
            }
        })
        .collect();
    if kept.len() < total {
        warn!("Quarantined {} of {} {} entries", total - kept.len(), total, what);
    }
    kept
}

/// Decode a JSON array entry by entry, dropping entries that do not match `T`.
///
/// Fails only when the value is not an array at all.
pub fn decode_entries<T: DeserializeOwned>(value: serde_json::Value, what: &str) -> Result<Vec<T>> {
    let serde_json::Value::Array(items) = value else {
        return Err(ChatError::MalformedPayload(format!(
            "expected a list of {}",
            what
        )));
    };
    Ok(keep_valid(items, what, |item| {
        serde_json::from_value(item).map_err(ChatError::from)
    }))
}
