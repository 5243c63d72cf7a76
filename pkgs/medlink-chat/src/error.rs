//! Error types for chat operations

use thiserror::Error;

/// A type alias for `Result<T, ChatError>`.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors that can occur in chat operations
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Not authorized (status {status})")]
    Auth { status: u16 },
    #[error("Fetch failed: {0}")]
    TransientFetch(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Operation not available in {0} mode")]
    InvalidMode(&'static str),
    #[error("Event channel closed")]
    ChannelClosed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification used when turning errors into notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    TransientFetch,
    Validation,
    Conflict,
    Internal,
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::Auth { .. } => ErrorKind::Auth,
            ChatError::TransientFetch(_) | ChatError::Transport(_) => ErrorKind::TransientFetch,
            ChatError::Validation(_) | ChatError::InvalidMode(_) | ChatError::NotFound(_) => {
                ErrorKind::Validation
            }
            ChatError::Conflict(_) => ErrorKind::Conflict,
            ChatError::MalformedPayload(_)
            | ChatError::ChannelClosed
            | ChatError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Whether the auth collaborator must be told about this error
    pub fn is_auth(&self) -> bool {
        matches!(self, ChatError::Auth { .. })
    }

    /// Classify an HTTP status code returned by a request collaborator.
    ///
    /// Returns `None` for success statuses.
    pub fn from_status(status: u16, body: impl Into<String>) -> Option<Self> {
        let body = body.into();
        match status {
            200..=299 => None,
            401 | 403 => Some(ChatError::Auth { status }),
            404 => Some(ChatError::NotFound(body)),
            409 => Some(ChatError::Conflict(body)),
            400 | 422 => Some(ChatError::Validation(body)),
            _ => Some(ChatError::TransientFetch(format!("status {}: {}", status, body))),
        }
    }
}
