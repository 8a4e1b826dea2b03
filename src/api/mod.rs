//! API layer for the gateway.
//!
//! This module contains the HTTP handlers, the Claude request/response models
//! and the response body wrapper used to detect client disconnects.

pub mod auth;
pub mod claude_models;
pub mod disconnect;
pub mod handlers;
pub mod messages;

// Re-export commonly used types
pub use claude_models::{ClaudeMessagesRequest, ClaudeResponse};
pub use disconnect::DisconnectStream;
pub use handlers::{build_router, create_http_client, health, metrics_handler, AppState};
pub use messages::create_message;
