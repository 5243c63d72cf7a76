//! Conversation directory
//!
//! Holds the conversation list of the active role tab. Listing failures other
//! than auth failures put the directory into degraded mode: the configured
//! placeholder list is shown instead of an empty screen, and `is_degraded`
//! stays true until the next successful fetch.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::api::{keep_valid, ConversationApi, ConversationPayload};
use crate::error::{ChatError, Result};
use crate::models::{Conversation, Role};

/// How a fetch ended
#[derive(Debug)]
pub enum FetchOutcome {
    Fresh,
    /// Placeholder list installed because of the carried error
    Degraded(ChatError),
}

pub struct ConversationDirectory {
    api: Arc<dyn ConversationApi>,
    tab: Role,
    conversations: Vec<Conversation>,
    placeholders: Vec<ConversationPayload>,
    degraded: bool,
}

impl ConversationDirectory {
    pub fn new(
        api: Arc<dyn ConversationApi>,
        tab: Role,
        placeholders: Vec<ConversationPayload>,
    ) -> Self {
        Self {
            api,
            tab,
            conversations: Vec::new(),
            placeholders,
            degraded: false,
        }
    }

    /// Fetch the list for `tab`, preserving server order.
    ///
    /// Auth failures leave the directory untouched and are returned as-is.
    #[instrument(skip(self))]
    pub async fn fetch(&mut self, tab: Role) -> Result<FetchOutcome> {
        match self.api.list_conversations(tab).await {
            Ok(payloads) => {
                let conversations =
                    keep_valid(payloads, "conversation", |p| p.into_conversation(tab));
                info!("Loaded {} {} conversations", conversations.len(), tab);
                self.tab = tab;
                self.conversations = conversations;
                self.degraded = false;
                Ok(FetchOutcome::Fresh)
            }
            Err(e) if e.is_auth() => Err(e),
            Err(e) => {
                warn!("Conversation listing failed, showing placeholders: {}", e);
                self.tab = tab;
                self.conversations = keep_valid(
                    self.placeholders.clone(),
                    "placeholder conversation",
                    |p| p.into_conversation(tab),
                );
                self.degraded = true;
                Ok(FetchOutcome::Degraded(e))
            }
        }
    }

    /// Refetch the current tab
    pub async fn refresh(&mut self) -> Result<FetchOutcome> {
        self.fetch(self.tab).await
    }

    pub fn tab(&self) -> Role {
        self.tab
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Conversations whose name contains `query`, see [`filter`]
    pub fn filtered(&self, query: &str) -> Vec<Conversation> {
        filter(&self.conversations, query)
    }

    /// Update preview metadata after a message for `room`.
    ///
    /// Returns false when the room is not listed.
    pub fn note_message(
        &mut self,
        room: &str,
        preview: &str,
        timestamp: DateTime<Utc>,
        mark_unread: bool,
    ) -> bool {
        let Some(conversation) = self.conversations.iter_mut().find(|c| c.id == room) else {
            return false;
        };
        conversation.last_message = Some(preview.to_string());
        if conversation
            .last_timestamp
            .map_or(true, |current| current <= timestamp)
        {
            conversation.last_timestamp = Some(timestamp);
        }
        if mark_unread {
            conversation.unread = true;
        }
        true
    }

    pub fn mark_read(&mut self, room: &str) -> bool {
        match self.conversations.iter_mut().find(|c| c.id == room) {
            Some(conversation) if conversation.unread => {
                conversation.unread = false;
                true
            }
            _ => false,
        }
    }
}

/// Subsequence of `list` whose names contain `query`, ignoring case.
///
/// An empty (or blank) query matches everything. Order is preserved.
pub fn filter(list: &[Conversation], query: &str) -> Vec<Conversation> {
    let needle = query.trim().to_lowercase();
    list.iter()
        .filter(|c| needle.is_empty() || c.name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}
