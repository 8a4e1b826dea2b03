//! Claude API request and response models.
//!
//! This module defines the data structures of the Claude Messages API that the
//! gateway accepts and produces: requests, content blocks, responses and errors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Constants
// ============================================================================

/// Constants for Claude API integration.
pub mod constants {
    // Role constants
    pub const ROLE_USER: &str = "user";
    pub const ROLE_ASSISTANT: &str = "assistant";
    pub const ROLE_SYSTEM: &str = "system";

    // Content type constants
    pub const CONTENT_TEXT: &str = "text";
    pub const CONTENT_IMAGE: &str = "image";
    pub const CONTENT_TOOL_USE: &str = "tool_use";
    pub const CONTENT_TOOL_RESULT: &str = "tool_result";
    pub const CONTENT_THINKING: &str = "thinking";

    // Thinking config
    pub const THINKING_ENABLED: &str = "enabled";

    // Stop reason constants
    pub const STOP_END_TURN: &str = "end_turn";
    pub const STOP_MAX_TOKENS: &str = "max_tokens";
    pub const STOP_TOOL_USE: &str = "tool_use";

    // SSE event type constants
    pub const EVENT_MESSAGE_START: &str = "message_start";
    pub const EVENT_MESSAGE_STOP: &str = "message_stop";
    pub const EVENT_MESSAGE_DELTA: &str = "message_delta";
    pub const EVENT_CONTENT_BLOCK_START: &str = "content_block_start";
    pub const EVENT_CONTENT_BLOCK_STOP: &str = "content_block_stop";
    pub const EVENT_CONTENT_BLOCK_DELTA: &str = "content_block_delta";
    pub const EVENT_PING: &str = "ping";
    pub const EVENT_ERROR: &str = "error";

    // Delta type constants
    pub const DELTA_TEXT: &str = "text_delta";
    pub const DELTA_THINKING: &str = "thinking_delta";
    pub const DELTA_INPUT_JSON: &str = "input_json_delta";

    // Id prefixes
    pub const MESSAGE_ID_PREFIX: &str = "msg_";
    pub const TOOL_USE_ID_PREFIX: &str = "toolu_";
}

// ============================================================================
// Content Block Types
// ============================================================================

/// Text content block in Claude messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeContentBlockText {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

/// Image source for Claude image content blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

/// Image content block in Claude messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeContentBlockImage {
    #[serde(rename = "type")]
    pub content_type: String,
    pub source: ClaudeImageSource,
}

/// Tool use content block in Claude messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeContentBlockToolUse {
    #[serde(rename = "type")]
    pub content_type: String,
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Tool result content block in Claude messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeContentBlockToolResult {
    #[serde(rename = "type")]
    pub content_type: String,
    pub tool_use_id: String,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// Thinking content block in Claude messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeContentBlockThinking {
    #[serde(rename = "type")]
    pub content_type: String,
    pub thinking: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Union type for all content block types.
///
/// Blocks the gateway does not model are kept as raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaudeContentBlock {
    Text(ClaudeContentBlockText),
    Image(ClaudeContentBlockImage),
    ToolUse(ClaudeContentBlockToolUse),
    ToolResult(ClaudeContentBlockToolResult),
    Thinking(ClaudeContentBlockThinking),
    Other(serde_json::Value),
}

impl ClaudeContentBlock {
    /// Get the type of this content block.
    pub fn get_type(&self) -> &str {
        match self {
            ClaudeContentBlock::Text(b) => &b.content_type,
            ClaudeContentBlock::Image(b) => &b.content_type,
            ClaudeContentBlock::ToolUse(b) => &b.content_type,
            ClaudeContentBlock::ToolResult(b) => &b.content_type,
            ClaudeContentBlock::Thinking(b) => &b.content_type,
            ClaudeContentBlock::Other(v) => v.get("type").and_then(|t| t.as_str()).unwrap_or(""),
        }
    }

    /// Create a text content block.
    pub fn text(text: impl Into<String>) -> Self {
        ClaudeContentBlock::Text(ClaudeContentBlockText {
            content_type: constants::CONTENT_TEXT.to_string(),
            text: text.into(),
        })
    }

    /// Create a thinking content block.
    pub fn thinking(thinking: impl Into<String>) -> Self {
        ClaudeContentBlock::Thinking(ClaudeContentBlockThinking {
            content_type: constants::CONTENT_THINKING.to_string(),
            thinking: thinking.into(),
            signature: None,
        })
    }

    /// Create a tool use content block.
    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        ClaudeContentBlock::ToolUse(ClaudeContentBlockToolUse {
            content_type: constants::CONTENT_TOOL_USE.to_string(),
            id: id.into(),
            name: name.into(),
            input,
        })
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// System content block for Claude messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeSystemContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

/// Content that can be either a string or a list of content blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaudeMessageContent {
    Text(String),
    Blocks(Vec<ClaudeContentBlock>),
}

/// A message in Claude conversation format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessage {
    pub role: String,
    pub content: ClaudeMessageContent,
}

// ============================================================================
// Tool Types
// ============================================================================

/// Tool definition for Claude API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeTool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: serde_json::Value,
}

/// Configuration for Claude's extended thinking feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeThinkingConfig {
    #[serde(rename = "type")]
    pub thinking_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<i32>,
}

impl ClaudeThinkingConfig {
    pub fn is_enabled(&self) -> bool {
        self.thinking_type == constants::THINKING_ENABLED
    }
}

// ============================================================================
// Request Types
// ============================================================================

/// System prompt that can be either a string or a list of system content blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaudeSystemPrompt {
    Text(String),
    Blocks(Vec<ClaudeSystemContent>),
}

/// Request model for Claude Messages API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessagesRequest {
    /// The model to use for completion
    pub model: String,

    /// Maximum number of tokens to generate
    pub max_tokens: i32,

    /// List of messages in the conversation
    pub messages: Vec<ClaudeMessage>,

    /// System prompt or instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<ClaudeSystemPrompt>,

    /// Sequences that will stop generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,

    /// Tools the model may call through the text overlay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ClaudeTool>>,

    /// Accepted for compatibility; never forwarded upstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,

    /// Extended thinking configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ClaudeThinkingConfig>,
}

impl ClaudeMessagesRequest {
    /// Tools with a usable name.
    pub fn active_tools(&self) -> Vec<&ClaudeTool> {
        self.tools
            .iter()
            .flatten()
            .filter(|tool| !tool.name.trim().is_empty())
            .collect()
    }

    pub fn has_tools(&self) -> bool {
        !self.active_tools().is_empty()
    }

    pub fn thinking_requested(&self) -> bool {
        self.thinking.as_ref().is_some_and(|t| t.is_enabled())
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Token usage information in Claude format.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ClaudeUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
}

/// Response model of the Claude Messages API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub response_type: String,
    pub role: String,
    pub content: Vec<ClaudeContentBlock>,
    pub model: String,
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
    pub usage: ClaudeUsage,
}

impl ClaudeResponse {
    /// Create a new Claude response.
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        content: Vec<ClaudeContentBlock>,
        stop_reason: Option<String>,
        usage: ClaudeUsage,
    ) -> Self {
        Self {
            id: id.into(),
            response_type: "message".to_string(),
            role: constants::ROLE_ASSISTANT.to_string(),
            content,
            model: model.into(),
            stop_reason,
            stop_sequence: None,
            usage,
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Claude API error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

/// Claude API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeErrorResponse {
    #[serde(rename = "type")]
    pub response_type: String,
    pub error: ClaudeErrorDetail,
}

impl ClaudeErrorResponse {
    /// Create a new Claude error response.
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            response_type: "error".to_string(),
            error: ClaudeErrorDetail {
                error_type: error_type.into(),
                message: message.into(),
            },
        }
    }

    pub fn api_error(message: impl Into<String>) -> Self {
        Self::new("api_error", message)
    }
}

// ============================================================================
// Tests
// ============================================================================
