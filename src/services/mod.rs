//! Business logic services for the gateway.
//!
//! This module converts between the Claude and OpenAI wire formats, injects the
//! tool/thinking prompt and encodes parser events as Claude SSE.

pub mod claude_converter;
pub mod claude_encoder;
pub mod prompt;

// Re-export commonly used types
pub use claude_converter::{claude_to_openai_request, openai_to_claude_response};
pub use claude_encoder::ClaudeStreamEncoder;
pub use prompt::ToolifyPlan;
