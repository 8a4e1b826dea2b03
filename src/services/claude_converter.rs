//! Claude to OpenAI format conversion utilities.
//!
//! Requests are flattened to plain chat messages: native tools are never
//! forwarded, the tool/thinking overlay is injected into the system prompt and
//! earlier tool calls are replayed as invoke markup. Non-streaming responses are
//! run through a fresh [`ToolifyParser`] to recover tool calls from the text.

use crate::api::claude_models::{
    constants, ClaudeContentBlock, ClaudeMessage, ClaudeMessageContent, ClaudeMessagesRequest,
    ClaudeResponse, ClaudeSystemPrompt, ClaudeUsage,
};
use crate::core::config::UpstreamConfig;
use crate::core::error::AppError;
use crate::services::claude_encoder::{generate_message_id, generate_tool_use_id, stop_reason};
use crate::services::prompt::{
    build_tool_prompt, render_invoke, render_thinking, thinking_prompt, ToolifyPlan,
};
use crate::streaming::UpstreamUsage;
use crate::toolify::{ParserEvent, ToolifyParser};
use axum::http::StatusCode;
use serde_json::{json, Value};
use std::collections::HashMap;

// ============================================================================
// Request Conversion: Claude -> OpenAI
// ============================================================================

/// Convert a Claude Messages request into an OpenAI chat completions body.
///
/// # Arguments
///
/// * `claude_request` - The Claude Messages API request
/// * `upstream` - Upstream settings, used for model mapping
/// * `plan` - Trigger signal and thinking switch decided for this request
pub fn claude_to_openai_request(
    claude_request: &ClaudeMessagesRequest,
    upstream: &UpstreamConfig,
    plan: &ToolifyPlan,
) -> Value {
    let openai_model = upstream.map_model(&claude_request.model);

    let mut openai_messages: Vec<Value> = Vec::new();

    let system_text = build_system_text(claude_request, plan);
    if !system_text.is_empty() {
        openai_messages.push(json!({
            "role": constants::ROLE_SYSTEM,
            "content": system_text
        }));
    }

    // tool_use ids seen so far, so results can be labelled with the tool name
    let mut tool_names: HashMap<String, String> = HashMap::new();

    for msg in &claude_request.messages {
        let converted = if msg.role == constants::ROLE_ASSISTANT {
            convert_assistant_message(msg, plan, &mut tool_names)
        } else if msg.role == constants::ROLE_USER {
            convert_user_message(msg, &tool_names)
        } else {
            tracing::debug!(role = %msg.role, "Skipping message with unsupported role");
            None
        };
        openai_messages.extend(converted);
    }

    let mut openai_request = json!({
        "model": openai_model,
        "messages": openai_messages,
        "max_tokens": claude_request.max_tokens,
        "stream": claude_request.stream,
    });

    if let Some(temp) = claude_request.temperature {
        openai_request["temperature"] = json!(temp);
    }
    if let Some(top_p) = claude_request.top_p {
        openai_request["top_p"] = json!(top_p);
    }
    if let Some(ref stop_sequences) = claude_request.stop_sequences {
        if !stop_sequences.is_empty() {
            openai_request["stop"] = json!(stop_sequences);
        }
    }
    if claude_request.stream {
        openai_request["stream_options"] = json!({"include_usage": true});
    }

    tracing::debug!(
        model = %openai_model,
        messages_count = openai_messages.len(),
        tools = plan.trigger_signal.is_some(),
        thinking = plan.thinking_enabled,
        "Converted Claude request to OpenAI format"
    );

    openai_request
}

/// Client system prompt followed by the overlay instructions.
fn build_system_text(request: &ClaudeMessagesRequest, plan: &ToolifyPlan) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(ref system) = request.system {
        let text = extract_system_text(system);
        if !text.trim().is_empty() {
            sections.push(text.trim().to_string());
        }
    }
    if let Some(ref trigger) = plan.trigger_signal {
        sections.push(build_tool_prompt(&request.active_tools(), trigger));
    }
    if plan.thinking_enabled {
        sections.push(thinking_prompt().to_string());
    }

    sections.join("\n\n")
}

// ============================================================================
// Response Conversion: OpenAI -> Claude
// ============================================================================

/// Convert a non-streaming OpenAI response to a Claude message.
///
/// The assistant text is parsed with the same state machine as the streaming
/// path, so tool calls and thinking blocks surface as typed content blocks.
pub fn openai_to_claude_response(
    openai_response: &Value,
    original_model: &str,
    plan: &ToolifyPlan,
) -> Result<ClaudeResponse, AppError> {
    let choice = openai_response
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .ok_or_else(|| malformed_response("No choices in upstream response"))?;

    let message = choice
        .get("message")
        .ok_or_else(|| malformed_response("No message in upstream choice"))?;

    let text = match message.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let mut parser = ToolifyParser::new(plan.trigger_signal.clone(), plan.thinking_enabled);
    parser.feed_str(&text);
    parser.finish();
    let events = parser.consume_events();

    let tool_used = events
        .iter()
        .any(|e| matches!(e, ParserEvent::ToolCall { .. }));
    let finish_reason = choice.get("finish_reason").and_then(|r| r.as_str());

    let usage = openai_response
        .get("usage")
        .and_then(UpstreamUsage::from_value)
        .map(claude_usage)
        .unwrap_or_default();

    Ok(ClaudeResponse::new(
        generate_message_id(),
        original_model,
        events_to_content_blocks(events),
        Some(stop_reason(tool_used, finish_reason).to_string()),
        usage,
    ))
}

/// Assemble parser events into Claude content blocks.
///
/// Consecutive text events merge into one block; the result is never empty.
pub fn events_to_content_blocks(events: Vec<ParserEvent>) -> Vec<ClaudeContentBlock> {
    let mut blocks: Vec<ClaudeContentBlock> = Vec::new();
    let mut pending_text = String::new();

    for event in events {
        match event {
            ParserEvent::Text { content } => pending_text.push_str(&content),
            ParserEvent::Thinking { content } => {
                flush_text_block(&mut blocks, &mut pending_text);
                blocks.push(ClaudeContentBlock::thinking(content));
            }
            ParserEvent::ToolCall { name, arguments } => {
                flush_text_block(&mut blocks, &mut pending_text);
                blocks.push(ClaudeContentBlock::tool_use(
                    generate_tool_use_id(),
                    name,
                    Value::Object(arguments),
                ));
            }
            ParserEvent::End => {}
        }
    }
    flush_text_block(&mut blocks, &mut pending_text);

    if blocks.is_empty() {
        blocks.push(ClaudeContentBlock::text(""));
    }
    blocks
}

fn flush_text_block(blocks: &mut Vec<ClaudeContentBlock>, pending: &mut String) {
    if !pending.is_empty() {
        blocks.push(ClaudeContentBlock::text(std::mem::take(pending)));
    }
}

fn malformed_response(message: &str) -> AppError {
    AppError::Upstream {
        status: StatusCode::BAD_GATEWAY,
        message: message.to_string(),
    }
}

// ============================================================================
// Shared Mappings
// ============================================================================

/// Map an OpenAI finish reason to a Claude stop reason.
///
/// Tool calls never come from native upstream tool calling here, so only
/// `length` is distinguished.
pub fn map_finish_reason(finish_reason: Option<&str>) -> &'static str {
    match finish_reason {
        Some("length") => constants::STOP_MAX_TOKENS,
        _ => constants::STOP_END_TURN,
    }
}

/// Convert OpenAI token counters to Claude usage.
pub fn claude_usage(usage: UpstreamUsage) -> ClaudeUsage {
    ClaudeUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        cache_read_input_tokens: usage.cached_tokens,
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Extract system text from Claude system field.
fn extract_system_text(system: &ClaudeSystemPrompt) -> String {
    match system {
        ClaudeSystemPrompt::Text(text) => text.clone(),
        ClaudeSystemPrompt::Blocks(blocks) => blocks
            .iter()
            .filter(|b| b.content_type == constants::CONTENT_TEXT)
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

/// Flatten a user message. Images keep the multi-part form, everything else
/// becomes a single string.
fn convert_user_message(msg: &ClaudeMessage, tool_names: &HashMap<String, String>) -> Option<Value> {
    let blocks = match &msg.content {
        ClaudeMessageContent::Text(text) => {
            return Some(json!({"role": constants::ROLE_USER, "content": text}));
        }
        ClaudeMessageContent::Blocks(blocks) => blocks,
    };

    let mut parts: Vec<Value> = Vec::new();
    let mut has_image = false;

    for block in blocks {
        match block {
            ClaudeContentBlock::Text(text_block) => {
                parts.push(json!({"type": "text", "text": text_block.text}));
            }
            ClaudeContentBlock::Image(image_block) => {
                has_image = true;
                let url = format!(
                    "data:{};base64,{}",
                    image_block.source.media_type, image_block.source.data
                );
                parts.push(json!({"type": "image_url", "image_url": {"url": url}}));
            }
            ClaudeContentBlock::ToolResult(result_block) => {
                let name = tool_names
                    .get(&result_block.tool_use_id)
                    .map(String::as_str)
                    .unwrap_or("unknown");
                let label = if result_block.is_error == Some(true) {
                    "Tool error"
                } else {
                    "Tool result"
                };
                let text = format!(
                    "{} ({}):\n{}",
                    label,
                    name,
                    parse_tool_result_content(&result_block.content)
                );
                parts.push(json!({"type": "text", "text": text}));
            }
            _ => {}
        }
    }

    if parts.is_empty() {
        return None;
    }
    if has_image {
        return Some(json!({"role": constants::ROLE_USER, "content": parts}));
    }

    let text = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("\n\n");
    Some(json!({"role": constants::ROLE_USER, "content": text}))
}

/// Flatten an assistant message, replaying tool calls and reasoning as markup.
fn convert_assistant_message(
    msg: &ClaudeMessage,
    plan: &ToolifyPlan,
    tool_names: &mut HashMap<String, String>,
) -> Option<Value> {
    let blocks = match &msg.content {
        ClaudeMessageContent::Text(text) => {
            return Some(json!({"role": constants::ROLE_ASSISTANT, "content": text}));
        }
        ClaudeMessageContent::Blocks(blocks) => blocks,
    };

    let mut segments: Vec<String> = Vec::new();
    for block in blocks {
        match block {
            ClaudeContentBlock::Text(text_block) => segments.push(text_block.text.clone()),
            ClaudeContentBlock::Thinking(thinking_block) if plan.thinking_enabled => {
                segments.push(render_thinking(&thinking_block.thinking));
            }
            ClaudeContentBlock::ToolUse(tool_block) => {
                tool_names.insert(tool_block.id.clone(), tool_block.name.clone());
                segments.push(render_invoke(
                    plan.trigger_signal.as_deref(),
                    &tool_block.name,
                    &tool_block.input,
                ));
            }
            _ => {}
        }
    }

    let content = segments
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if content.is_empty() {
        return None;
    }
    Some(json!({"role": constants::ROLE_ASSISTANT, "content": content}))
}

/// Parse and normalize tool result content into a string format.
fn parse_tool_result_content(content: &Value) -> String {
    match content {
        Value::Null => "No content provided".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(arr) => {
            let parts: Vec<String> = arr
                .iter()
                .filter_map(|item| {
                    if let Some(obj) = item.as_object() {
                        if obj.get("type").and_then(|t| t.as_str()) == Some(constants::CONTENT_TEXT) {
                            return obj.get("text").and_then(|t| t.as_str()).map(|s| s.to_string());
                        }
                    }
                    if let Some(s) = item.as_str() {
                        return Some(s.to_string());
                    }
                    serde_json::to_string(item).ok()
                })
                .collect();
            parts.join("\n").trim().to_string()
        }
        Value::Object(obj) => {
            if obj.get("type").and_then(|t| t.as_str()) == Some(constants::CONTENT_TEXT) {
                return obj
                    .get("text")
                    .and_then(|t| t.as_str())
                    .unwrap_or("")
                    .to_string();
            }
            content.to_string()
        }
        _ => content.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(value: Value) -> ClaudeMessagesRequest {
        serde_json::from_value(value).unwrap()
    }

    fn upstream() -> UpstreamConfig {
        UpstreamConfig::default()
    }

    fn tool_plan() -> ToolifyPlan {
        ToolifyPlan {
            trigger_signal: Some("<<CALL>>".to_string()),
            thinking_enabled: false,
        }
    }

    #[test]
    fn test_claude_to_openai_request_basic() {
        let req = request(json!({
            "model": "claude-3-opus-20240229",
            "max_tokens": 1024,
            "temperature": 0.7,
            "messages": [{"role": "user", "content": "Hello!"}]
        }));

        let openai_request = claude_to_openai_request(&req, &upstream(), &ToolifyPlan::default());

        assert_eq!(openai_request["model"], "claude-3-opus-20240229");
        assert_eq!(openai_request["max_tokens"], 1024);
        assert_eq!(openai_request["temperature"], 0.7);
        assert_eq!(openai_request["stream"], false);
        assert!(openai_request.get("stream_options").is_none());
        assert_eq!(openai_request["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_model_mapping_and_stream_options() {
        let mut config = upstream();
        config
            .model_mapping
            .insert("claude-3-haiku".to_string(), "gpt-4o-mini".to_string());

        let req = request(json!({
            "model": "claude-3-haiku",
            "max_tokens": 10,
            "stream": true,
            "stop_sequences": ["END"],
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let openai_request = claude_to_openai_request(&req, &config, &ToolifyPlan::default());

        assert_eq!(openai_request["model"], "gpt-4o-mini");
        assert_eq!(openai_request["stream_options"]["include_usage"], true);
        assert_eq!(openai_request["stop"], json!(["END"]));
    }

    #[test]
    fn test_tools_are_injected_not_forwarded() {
        let req = request(json!({
            "model": "m",
            "max_tokens": 10,
            "system": "Be brief.",
            "tools": [{"name": "get_weather", "description": "Weather", "input_schema": {"type": "object"}}],
            "tool_choice": {"type": "auto"},
            "messages": [{"role": "user", "content": "weather?"}]
        }));
        let openai_request = claude_to_openai_request(&req, &upstream(), &tool_plan());

        assert!(openai_request.get("tools").is_none());
        assert!(openai_request.get("tool_choice").is_none());

        let system = openai_request["messages"][0]["content"].as_str().unwrap();
        assert_eq!(openai_request["messages"][0]["role"], "system");
        assert!(system.starts_with("Be brief.\n\n"));
        assert!(system.contains("<<CALL>>"));
        assert!(system.contains("get_weather"));
    }

    #[test]
    fn test_thinking_prompt_appended_when_enabled() {
        let req = request(json!({
            "model": "m",
            "max_tokens": 10,
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let plan = ToolifyPlan {
            trigger_signal: None,
            thinking_enabled: true,
        };
        let openai_request = claude_to_openai_request(&req, &upstream(), &plan);
        let system = openai_request["messages"][0]["content"].as_str().unwrap();
        assert!(system.contains("<thinking>"));
    }

    #[test]
    fn test_tool_history_is_replayed_as_markup() {
        let req = request(json!({
            "model": "m",
            "max_tokens": 10,
            "tools": [{"name": "get_weather", "input_schema": {}}],
            "messages": [
                {"role": "user", "content": "weather in Paris?"},
                {"role": "assistant", "content": [
                    {"type": "thinking", "thinking": "need the tool"},
                    {"type": "text", "text": "Checking."},
                    {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Paris"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": [{"type": "text", "text": "sunny"}]}
                ]}
            ]
        }));
        let openai_request = claude_to_openai_request(&req, &upstream(), &tool_plan());
        let messages = openai_request["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);

        let assistant = messages[2]["content"].as_str().unwrap();
        assert!(!assistant.contains("<thinking>"));
        assert!(assistant.starts_with("Checking.\n<<CALL>>\n<invoke name=\"get_weather\">"));
        assert!(assistant.contains("<parameter name=\"city\">Paris</parameter>"));

        assert_eq!(messages[3]["role"], "user");
        assert_eq!(messages[3]["content"], "Tool result (get_weather):\nsunny");
    }

    #[test]
    fn test_image_blocks_keep_parts() {
        let req = request(json!({
            "model": "m",
            "max_tokens": 10,
            "messages": [{"role": "user", "content": [
                {"type": "text", "text": "what is this"},
                {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "AAAA"}}
            ]}]
        }));
        let openai_request = claude_to_openai_request(&req, &upstream(), &ToolifyPlan::default());
        let content = openai_request["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_openai_to_claude_response_text() {
        let response = json!({
            "id": "chatcmpl-1",
            "choices": [{"message": {"role": "assistant", "content": "Hello there"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 7, "completion_tokens": 3}
        });
        let claude = openai_to_claude_response(&response, "claude-x", &ToolifyPlan::default()).unwrap();

        assert!(claude.id.starts_with("msg_"));
        assert_eq!(claude.model, "claude-x");
        assert_eq!(claude.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(claude.usage.input_tokens, 7);
        assert_eq!(claude.usage.output_tokens, 3);
        assert_eq!(claude.content.len(), 1);
        assert_eq!(claude.content[0].get_type(), "text");
    }

    #[test]
    fn test_openai_to_claude_response_tool_call() {
        let text = "Let me check.\n<<CALL>>\n<invoke name=\"get_weather\">\n<parameter name=\"city\">Paris</parameter>\n</invoke>";
        let response = json!({
            "choices": [{"message": {"content": text}, "finish_reason": "stop"}]
        });
        let claude = openai_to_claude_response(&response, "m", &tool_plan()).unwrap();

        assert_eq!(claude.stop_reason.as_deref(), Some("tool_use"));
        let types: Vec<&str> = claude.content.iter().map(|b| b.get_type()).collect();
        assert_eq!(types, vec!["text", "tool_use"]);
        match &claude.content[1] {
            ClaudeContentBlock::ToolUse(tool) => {
                assert_eq!(tool.name, "get_weather");
                assert_eq!(tool.input, json!({"city": "Paris"}));
                assert!(tool.id.starts_with("toolu_"));
            }
            other => panic!("unexpected block {:?}", other),
        }
    }

    #[test]
    fn test_openai_to_claude_response_length_and_empty() {
        let response = json!({
            "choices": [{"message": {"content": null}, "finish_reason": "length"}]
        });
        let claude = openai_to_claude_response(&response, "m", &ToolifyPlan::default()).unwrap();
        assert_eq!(claude.stop_reason.as_deref(), Some("max_tokens"));
        assert_eq!(claude.content.len(), 1);
    }

    #[test]
    fn test_openai_to_claude_response_without_choices() {
        let err = openai_to_claude_response(&json!({"choices": []}), "m", &ToolifyPlan::default())
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_events_to_content_blocks_merges_text() {
        let blocks = events_to_content_blocks(vec![
            ParserEvent::text("a"),
            ParserEvent::text("b"),
            ParserEvent::thinking("t"),
            ParserEvent::text("c"),
            ParserEvent::End,
        ]);
        let types: Vec<&str> = blocks.iter().map(|b| b.get_type()).collect();
        assert_eq!(types, vec!["text", "thinking", "text"]);
        match &blocks[0] {
            ClaudeContentBlock::Text(t) => assert_eq!(t.text, "ab"),
            other => panic!("unexpected block {:?}", other),
        }
    }

    #[test]
    fn test_map_finish_reason() {
        assert_eq!(map_finish_reason(Some("stop")), "end_turn");
        assert_eq!(map_finish_reason(Some("length")), "max_tokens");
        assert_eq!(map_finish_reason(Some("tool_calls")), "end_turn");
        assert_eq!(map_finish_reason(None), "end_turn");
    }

    #[test]
    fn test_claude_usage() {
        let usage = claude_usage(UpstreamUsage {
            prompt_tokens: 5,
            completion_tokens: 2,
            cached_tokens: Some(1),
        });
        assert_eq!(usage.input_tokens, 5);
        assert_eq!(usage.output_tokens, 2);
        assert_eq!(usage.cache_read_input_tokens, Some(1));
    }
}
