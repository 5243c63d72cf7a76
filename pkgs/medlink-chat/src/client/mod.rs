pub mod directory;
pub mod mode_controller;
pub mod reconciler;
pub mod request_workflow;
pub mod session_manager;

// Internal modules (not part of public API)
mod event_handler;

pub use directory::{filter, ConversationDirectory, FetchOutcome};
pub use mode_controller::{Collaborators, ModeController};
pub use reconciler::{InboundOutcome, MessageReconciler};
pub use request_workflow::ConnectionRequestWorkflow;
pub use session_manager::ConnectionSessionManager;
