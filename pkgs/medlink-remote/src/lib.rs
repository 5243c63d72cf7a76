//! MedLink Remote - network collaborators for `medlink-chat`
//!
//! - [`HttpApi`]: REST client implementing the conversation, message,
//!   doctor and assistant APIs
//! - [`WebSocketTransport`]: one WebSocket per session key
//! - [`RemoteConfig`]: endpoints and credentials, from code or `MEDLINK_*` variables
//!
//! ```rust,no_run
//! use medlink_chat::{ChatConfig, ModeController};
//! use medlink_remote::RemoteConfig;
//!
//! # fn example() -> medlink_chat::Result<()> {
//! let remote = RemoteConfig::from_env()?;
//! let (_chat, _events) = ModeController::new(
//!     ChatConfig::new("dr-42"),
//!     medlink_remote::collaborators(&remote)?,
//! );
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod http;
pub mod websocket;

use std::sync::Arc;

use medlink_chat::{Collaborators, Result};

pub use config::RemoteConfig;
pub use http::HttpApi;
pub use websocket::{WebSocketHandle, WebSocketTransport};

/// Wire every collaborator of the chat controller to the remote service
pub fn collaborators(config: &RemoteConfig) -> Result<Collaborators> {
    let api = Arc::new(HttpApi::new(config)?);
    Ok(Collaborators {
        conversations: api.clone(),
        messages: api.clone(),
        doctors: api.clone(),
        assistant: api,
        transport: Arc::new(WebSocketTransport::new(config.clone())),
    })
}
