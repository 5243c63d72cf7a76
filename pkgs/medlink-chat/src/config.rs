//! Client configuration

use std::time::Duration;

use crate::api::ConversationPayload;
use crate::models::{Role, UserId};

/// How socket sessions are keyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionScope {
    /// One session per open room, replaced on every selection
    #[default]
    PerRoom,
    /// One session for the signed-in user, carrying every room
    PerUser,
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Id of the signed-in user; sender of outbound frames
    pub user_id: UserId,

    /// Tab loaded by `refresh_conversations` before any explicit tab switch
    pub initial_tab: Role,

    /// Session keying strategy (default: per room)
    pub session_scope: SessionScope,

    /// Maximum clock distance between an optimistic entry and its echo (default: 5s)
    pub echo_window: Duration,

    /// Prefix of locally generated message ids (default: "local-")
    pub local_id_prefix: String,

    /// Shown instead of the server list when a listing fails for a non-auth reason
    pub placeholder_conversations: Vec<ConversationPayload>,

    /// First assistant turn of a freshly opened overlay
    pub assistant_greeting: Option<String>,
}

impl ChatConfig {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_session_scope(mut self, scope: SessionScope) -> Self {
        self.session_scope = scope;
        self
    }

    pub fn with_placeholders(mut self, placeholders: Vec<ConversationPayload>) -> Self {
        self.placeholder_conversations = placeholders;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            initial_tab: Role::Patient,
            session_scope: SessionScope::PerRoom,
            echo_window: Duration::from_secs(5),
            local_id_prefix: "local-".to_string(),
            placeholder_conversations: vec![ConversationPayload {
                id: "placeholder-care-team".to_string(),
                counterpart_id: None,
                name: "Care Team (offline)".to_string(),
                last_message: Some("Conversations are temporarily unavailable".to_string()),
                timestamp: None,
                unread: false,
            }],
            assistant_greeting: Some("Hi! How can I help you today?".to_string()),
        }
    }
}
