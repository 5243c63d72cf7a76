//! MedLink Chat - real-time patient/doctor messaging core
//!
//! This library provides the client-side state of two-party clinical chat:
//! - Socket session lifecycle with a single live session per client
//! - Per-room timelines merging fetched history with live messages
//! - Conversation directory per role tab, with a degraded fallback
//! - Doctor-to-doctor connection requests (search, send, accept, reject)
//! - A mode controller switching between empty, peer chat and the AI overlay
//!
//! # Architecture
//!
//! - **ConnectionSessionManager**: owns the transport handle; open/close/replace
//! - **ConversationDirectory**: conversation lists and the name filter
//! - **ConnectionRequestWorkflow**: search results and one-shot request transitions
//! - **MessageReconciler**: ordered, de-duplicated timelines
//! - **ModeController**: composes the above and exposes the user-facing operations
//!
//! The remote service and the socket transport are collaborators behind the
//! traits in [`api`] and [`transport`]; `medlink-remote` provides HTTP and
//! WebSocket implementations.
//!
//! # Control flow
//!
//! User actions call into [`ModeController`]. Network completions and socket
//! events are queued and applied one at a time by
//! [`ModeController::process_next`]. Results that come back for a room the
//! user already left are discarded.
//!
//! ```rust,no_run
//! use medlink_chat::{ChatConfig, ChatEvent, Collaborators, ModeController, Role};
//!
//! # async fn example(collaborators: Collaborators) -> medlink_chat::Result<()> {
//! let (mut chat, mut events) = ModeController::new(ChatConfig::new("dr-42"), collaborators);
//!
//! let conversations = chat.load_conversations(Role::Patient).await?;
//! if let Some(first) = conversations.first() {
//!     chat.select_conversation(first).await?;
//!     chat.process_next().await?; // history lands, session opens
//!     chat.send_message("Good morning").await?;
//! }
//!
//! while let Ok(event) = events.try_recv() {
//!     if let ChatEvent::Notice(notice) = event {
//!         println!("{}", notice.message);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod transport;

pub use api::{
    AssistantApi, ConversationApi, ConversationPayload, DoctorApi, DoctorPayload, MessageApi,
    MessagePayload, PendingRequestPayload, RequestAck, SendAck,
};
pub use client::{
    filter, Collaborators, ConnectionRequestWorkflow, ConnectionSessionManager,
    ConversationDirectory, FetchOutcome, InboundOutcome, MessageReconciler, ModeController,
};
pub use config::{ChatConfig, SessionScope};
pub use error::{ChatError, ErrorKind, Result};
pub use events::{ChatEvent, NoticeLevel, Notification};
pub use models::*;
pub use transport::{
    InboundFrame, OutboundFrame, SessionSink, SocketHandle, SocketTransport, TransportEvent,
};
