//! Chat events and the internal completion queue

use serde::{Deserialize, Serialize};

use crate::api::{MessagePayload, SendAck};
use crate::error::{ChatError, ErrorKind, Result};
use crate::models::{Mode, Role, RoomId, SessionKey, SessionState};
use crate::transport::TransportEvent;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// User-visible notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    /// Describe a failed boundary operation
    pub fn from_error(operation: &str, error: &ChatError) -> Self {
        let level = match error.kind() {
            ErrorKind::Validation | ErrorKind::Conflict => NoticeLevel::Warning,
            ErrorKind::Auth | ErrorKind::TransientFetch | ErrorKind::Internal => NoticeLevel::Error,
        };
        Self {
            level,
            message: format!("{} failed: {}", operation, error),
        }
    }
}

/// Events emitted towards the UI and the auth collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    ModeChanged {
        mode: Mode,
    },
    TimelineUpdated {
        room: RoomId,
        len: usize,
    },
    ConversationsUpdated {
        tab: Role,
        count: usize,
        degraded: bool,
    },
    ConversationTouched {
        room: RoomId,
        unread: bool,
    },
    SessionChanged {
        key: SessionKey,
        state: SessionState,
    },
    SearchResultsUpdated {
        count: usize,
    },
    RequestsUpdated {
        pending: usize,
    },
    AssistantUpdated {
        turns: usize,
    },
    Notice(Notification),
    /// A collaborator answered 401/403; the auth layer decides what happens next
    AuthRequired {
        status: u16,
    },
}

/// Work completed off the main control flow, applied by the controller in arrival order
#[derive(Debug)]
pub(crate) enum Inbound {
    History {
        room: RoomId,
        result: Result<Vec<MessagePayload>>,
    },
    SendAck {
        room: RoomId,
        local_id: String,
        result: Result<SendAck>,
    },
    AssistantReply {
        epoch: u64,
        result: Result<String>,
    },
    Session {
        serial: u64,
        event: TransportEvent,
    },
}
