//! Prompt injection for the tool/thinking text overlay.
//!
//! The upstream never sees native tools. Instead the system prompt teaches it to
//! announce a call with a trigger signal followed by an `<invoke>` block, and
//! prior tool calls in the conversation are rendered back in the same syntax.

use crate::api::claude_models::{ClaudeMessagesRequest, ClaudeTool};
use crate::core::config::ToolifyConfig;
use crate::toolify::{THINKING_END_TAG, THINKING_START_TAG};
use serde_json::Value;
use uuid::Uuid;

const TOOL_PROMPT_TEMPLATE: &str = r#"You have access to the tools listed below. To call a tool, write the exact trigger signal on its own line, followed immediately by a single invoke block, and then stop writing:

{trigger_signal}
<invoke name="TOOL_NAME">
<parameter name="PARAMETER_NAME">VALUE</parameter>
</invoke>

Rules:
- Call at most one tool per response and write nothing after </invoke>.
- Write parameter values as plain text, or as JSON for numbers, booleans, arrays and objects.
- Only use the trigger signal when you are actually calling a tool.

Available tools:
{tools_list}"#;

const THINKING_PROMPT: &str = "Before answering, reason step by step inside <thinking></thinking> tags. \
Put only your reasoning inside the tags and write the final answer after the closing tag.";

/// Per-request decisions about the text overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolifyPlan {
    /// Present only when the request carries tools.
    pub trigger_signal: Option<String>,
    pub thinking_enabled: bool,
}

impl ToolifyPlan {
    pub fn for_request(request: &ClaudeMessagesRequest, config: &ToolifyConfig) -> Self {
        let trigger_signal = request.has_tools().then(|| {
            config
                .trigger_signal
                .clone()
                .filter(|signal| !signal.trim().is_empty())
                .unwrap_or_else(generate_trigger_signal)
        });

        Self {
            trigger_signal,
            thinking_enabled: config.enable_thinking && request.thinking_requested(),
        }
    }
}

/// Random trigger of the form `<Function_ab12_Start/>`.
pub fn generate_trigger_signal() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("<Function_{}_Start/>", &suffix[..4])
}

/// Instructions describing the trigger, the invoke syntax and every tool.
pub fn build_tool_prompt(tools: &[&ClaudeTool], trigger_signal: &str) -> String {
    let tools_list = tools
        .iter()
        .enumerate()
        .map(|(i, tool)| describe_tool(i + 1, tool))
        .collect::<Vec<_>>()
        .join("\n\n");

    TOOL_PROMPT_TEMPLATE
        .replace("{trigger_signal}", trigger_signal)
        .replace("{tools_list}", &tools_list)
}

pub fn thinking_prompt() -> &'static str {
    THINKING_PROMPT
}

fn describe_tool(position: usize, tool: &ClaudeTool) -> String {
    let mut out = format!("{}. {}", position, tool.name);
    if let Some(description) = tool.description.as_deref().filter(|d| !d.trim().is_empty()) {
        out.push_str("\n   Description: ");
        out.push_str(description.trim());
    }
    if !tool.input_schema.is_null() {
        let schema = serde_json::to_string(&tool.input_schema).unwrap_or_default();
        out.push_str("\n   Parameters (JSON schema): ");
        out.push_str(&schema);
    }
    out
}

/// Render a past tool call the way the upstream is asked to write one.
pub fn render_invoke(trigger_signal: Option<&str>, name: &str, input: &Value) -> String {
    let mut out = String::new();
    if let Some(trigger) = trigger_signal {
        out.push_str(trigger);
        out.push('\n');
    }
    out.push_str(&format!("<invoke name=\"{}\">\n", name));
    if let Some(params) = input.as_object() {
        for (key, value) in params {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push_str(&format!("<parameter name=\"{}\">{}</parameter>\n", key, rendered));
        }
    }
    out.push_str("</invoke>");
    out
}

/// Wrap reasoning in thinking tags for replay.
pub fn render_thinking(thinking: &str) -> String {
    format!("{}{}{}", THINKING_START_TAG, thinking, THINKING_END_TAG)
}
