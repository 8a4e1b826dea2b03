//! Parser events to Claude streaming events.
//!
//! [`ClaudeStreamEncoder`] is a pure state machine: it renders each
//! [`ParserEvent`] into zero or more ready-to-send SSE strings and keeps track
//! of content block indices and which block is currently open.

use crate::api::claude_models::{constants, ClaudeUsage};
use crate::core::error_types::ERROR_TYPE_API;
use crate::services::claude_converter::{claude_usage, map_finish_reason};
use crate::streaming::UpstreamUsage;
use crate::toolify::ParserEvent;
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Format an SSE event string.
pub fn format_sse_event(event_type: &str, data: &Value) -> String {
    format!(
        "event: {}\ndata: {}\n\n",
        event_type,
        serde_json::to_string(data).unwrap_or_default()
    )
}

/// New Claude message id.
pub fn generate_message_id() -> String {
    format!(
        "{}{}",
        constants::MESSAGE_ID_PREFIX,
        &Uuid::new_v4().simple().to_string()[..24]
    )
}

/// New Claude tool use id.
pub fn generate_tool_use_id() -> String {
    format!(
        "{}{}",
        constants::TOOL_USE_ID_PREFIX,
        &Uuid::new_v4().simple().to_string()[..24]
    )
}

/// Claude stop reason for a finished response.
pub fn stop_reason(tool_used: bool, finish_reason: Option<&str>) -> &'static str {
    if tool_used {
        constants::STOP_TOOL_USE
    } else {
        map_finish_reason(finish_reason)
    }
}

/// Streaming encoder for one Claude message.
#[derive(Debug)]
pub struct ClaudeStreamEncoder {
    message_id: String,
    model: String,
    block_index: usize,
    text_block_open: bool,
    tool_calls: usize,
    finish_reason: Option<String>,
    usage: Option<UpstreamUsage>,
    finished: bool,
}

impl ClaudeStreamEncoder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            message_id: generate_message_id(),
            model: model.into(),
            block_index: 0,
            text_block_open: false,
            tool_calls: 0,
            finish_reason: None,
            usage: None,
            finished: false,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Number of tool_use blocks emitted so far.
    pub fn tool_calls(&self) -> usize {
        self.tool_calls
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Usage last reported by the upstream, if any.
    pub fn usage(&self) -> Option<UpstreamUsage> {
        self.usage
    }

    pub fn set_metadata(&mut self, finish_reason: Option<String>, usage: Option<UpstreamUsage>) {
        if finish_reason.is_some() {
            self.finish_reason = finish_reason;
        }
        if usage.is_some() {
            self.usage = usage;
        }
    }

    /// `message_start` followed by `ping`.
    pub fn preamble(&self) -> Vec<String> {
        vec![
            format_sse_event(
                constants::EVENT_MESSAGE_START,
                &json!({
                    "type": constants::EVENT_MESSAGE_START,
                    "message": {
                        "id": self.message_id,
                        "type": "message",
                        "role": constants::ROLE_ASSISTANT,
                        "model": self.model,
                        "content": [],
                        "stop_reason": null,
                        "stop_sequence": null,
                        "usage": {"input_tokens": 0, "output_tokens": 0}
                    }
                }),
            ),
            format_sse_event(constants::EVENT_PING, &json!({"type": constants::EVENT_PING})),
        ]
    }

    /// Render one parser event.
    pub fn encode(&mut self, event: &ParserEvent) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }

        let mut out = Vec::new();
        match event {
            ParserEvent::Text { content } => {
                if !self.text_block_open {
                    out.push(self.block_start(json!({"type": constants::CONTENT_TEXT, "text": ""})));
                    self.text_block_open = true;
                }
                out.push(self.block_delta(json!({"type": constants::DELTA_TEXT, "text": content})));
            }
            ParserEvent::Thinking { content } => {
                self.close_text_block(&mut out);
                out.push(self.block_start(
                    json!({"type": constants::CONTENT_THINKING, "thinking": ""}),
                ));
                out.push(self.block_delta(
                    json!({"type": constants::DELTA_THINKING, "thinking": content}),
                ));
                out.push(self.block_stop());
            }
            ParserEvent::ToolCall { name, arguments } => {
                self.close_text_block(&mut out);
                out.push(self.block_start(json!({
                    "type": constants::CONTENT_TOOL_USE,
                    "id": generate_tool_use_id(),
                    "name": name,
                    "input": {}
                })));
                out.push(self.block_delta(json!({
                    "type": constants::DELTA_INPUT_JSON,
                    "partial_json": serialize_arguments(arguments)
                })));
                out.push(self.block_stop());
                self.tool_calls += 1;
            }
            ParserEvent::End => {
                self.close_text_block(&mut out);
                out.extend(self.final_events());
                self.finished = true;
            }
        }
        out
    }

    /// Claude `error` event for a stream that cannot be completed.
    pub fn error_event(&mut self, message: &str) -> String {
        self.finished = true;
        format_sse_event(
            constants::EVENT_ERROR,
            &json!({
                "type": constants::EVENT_ERROR,
                "error": {"type": ERROR_TYPE_API, "message": message}
            }),
        )
    }

    fn final_events(&self) -> Vec<String> {
        let usage: ClaudeUsage = self.usage.map(claude_usage).unwrap_or_default();
        vec![
            format_sse_event(
                constants::EVENT_MESSAGE_DELTA,
                &json!({
                    "type": constants::EVENT_MESSAGE_DELTA,
                    "delta": {
                        "stop_reason": stop_reason(self.tool_calls > 0, self.finish_reason.as_deref()),
                        "stop_sequence": null
                    },
                    "usage": usage
                }),
            ),
            format_sse_event(
                constants::EVENT_MESSAGE_STOP,
                &json!({"type": constants::EVENT_MESSAGE_STOP}),
            ),
        ]
    }

    fn close_text_block(&mut self, out: &mut Vec<String>) {
        if self.text_block_open {
            out.push(self.block_stop());
            self.text_block_open = false;
        }
    }

    fn block_start(&self, content_block: Value) -> String {
        format_sse_event(
            constants::EVENT_CONTENT_BLOCK_START,
            &json!({
                "type": constants::EVENT_CONTENT_BLOCK_START,
                "index": self.block_index,
                "content_block": content_block
            }),
        )
    }

    fn block_delta(&self, delta: Value) -> String {
        format_sse_event(
            constants::EVENT_CONTENT_BLOCK_DELTA,
            &json!({
                "type": constants::EVENT_CONTENT_BLOCK_DELTA,
                "index": self.block_index,
                "delta": delta
            }),
        )
    }

    /// Stop the current block and advance the index.
    fn block_stop(&mut self) -> String {
        let event = format_sse_event(
            constants::EVENT_CONTENT_BLOCK_STOP,
            &json!({
                "type": constants::EVENT_CONTENT_BLOCK_STOP,
                "index": self.block_index
            }),
        );
        self.block_index += 1;
        event
    }
}

fn serialize_arguments(arguments: &Map<String, Value>) -> String {
    serde_json::to_string(arguments).unwrap_or_else(|_| "{}".to_string())
}
