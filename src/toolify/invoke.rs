//! Invoke block extraction.
//!
//! Turns one `<invoke name="...">...</invoke>` block emitted by the upstream
//! model into a tool name and an argument map. Parameter bodies that parse as
//! JSON keep their JSON type; anything else is passed through as the trimmed
//! string.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

/// Opening marker of an invoke block, e.g. `<invoke name="get_weather">`.
pub(crate) static INVOKE_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<invoke\b[^>]*>").expect("invoke open pattern is valid"));

/// Closing marker of an invoke block.
pub(crate) static INVOKE_CLOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</invoke\s*>").expect("invoke close pattern is valid"));

/// `name` attribute; must be preceded by whitespace so `data-name` is not taken.
static NAME_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:^|\s)name\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("name pattern is valid")
});

static PARAMETER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<parameter\b([^>]*)>(.*?)</parameter\s*>")
        .expect("parameter pattern is valid")
});

/// A single tool invocation recovered from model output.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeCall {
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// Reasons an invoke block could not be turned into a tool call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    #[error("invoke block has no opening marker")]
    MissingOpenMarker,

    #[error("invoke block has no name attribute")]
    MissingName,
}

/// Parse one invoke block (open marker through close marker).
///
/// Parameters without a `name` attribute are ignored. When a parameter name
/// repeats, the last occurrence wins.
pub fn extract_invoke(block: &str) -> Result<InvokeCall, InvokeError> {
    let open = INVOKE_OPEN_RE
        .find(block)
        .ok_or(InvokeError::MissingOpenMarker)?;

    let name = attribute_name(open.as_str())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or(InvokeError::MissingName)?
        .to_string();

    let body = &block[open.end()..];
    let mut arguments = Map::new();

    for caps in PARAMETER_RE.captures_iter(body) {
        let Some(param_name) = caps.get(1).and_then(|attrs| attribute_name(attrs.as_str())) else {
            continue;
        };
        let raw = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        arguments.insert(param_name.to_string(), coerce_parameter_value(raw));
    }

    Ok(InvokeCall { name, arguments })
}

/// Trim a parameter body and keep its JSON type when it has one.
pub fn coerce_parameter_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::String(String::new());
    }
    serde_json::from_str::<Value>(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

fn attribute_name(tag: &str) -> Option<&str> {
    let caps = NAME_ATTR_RE.captures(tag)?;
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_simple_invoke() {
        let call = extract_invoke(
            r#"<invoke name="get_weather"><parameter name="city">Paris</parameter></invoke>"#,
        )
        .unwrap();
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.arguments["city"], json!("Paris"));
    }

    #[test]
    fn test_extract_json_typed_parameters() {
        let call = extract_invoke(
            r#"<invoke name="f">
<parameter name="count">3</parameter>
<parameter name="flag">true</parameter>
<parameter name="nothing">null</parameter>
<parameter name="obj">{"a": [1, 2]}</parameter>
<parameter name="quoted">"1"</parameter>
</invoke>"#,
        )
        .unwrap();
        assert_eq!(call.arguments["count"], json!(3));
        assert_eq!(call.arguments["flag"], json!(true));
        assert_eq!(call.arguments["nothing"], Value::Null);
        assert_eq!(call.arguments["obj"], json!({"a": [1, 2]}));
        assert_eq!(call.arguments["quoted"], json!("1"));
    }

    #[test]
    fn test_extract_trims_and_keeps_plain_strings() {
        let call = extract_invoke(
            "<invoke name=\"run\"><parameter name=\"cmd\">\n  ls -la  \n</parameter></invoke>",
        )
        .unwrap();
        assert_eq!(call.arguments["cmd"], json!("ls -la"));
    }

    #[test]
    fn test_extract_empty_parameter_is_empty_string() {
        let call =
            extract_invoke(r#"<invoke name="f"><parameter name="x">   </parameter></invoke>"#)
                .unwrap();
        assert_eq!(call.arguments["x"], json!(""));
    }

    #[test]
    fn test_extract_case_insensitive_markers() {
        let call = extract_invoke(
            r#"<INVOKE NAME="Search"><Parameter Name="q">rust</Parameter></INVOKE>"#,
        )
        .unwrap();
        assert_eq!(call.name, "Search");
        assert_eq!(call.arguments["q"], json!("rust"));
    }

    #[test]
    fn test_extract_single_quoted_and_extra_attributes() {
        let call = extract_invoke(
            "<invoke id='x1' name='lookup' kind=\"fast\"><parameter name='k'>v</parameter></invoke>",
        )
        .unwrap();
        assert_eq!(call.name, "lookup");
        assert_eq!(call.arguments["k"], json!("v"));
    }

    #[test]
    fn test_extract_ignores_prefixed_name_attributes() {
        let call = extract_invoke(
            "<invoke data-name=\"wrong\" name=\"right\"><parameter x-name=\"a\" name=\"b\">1</parameter></invoke>",
        )
        .unwrap();
        assert_eq!(call.name, "right");
        assert_eq!(call.arguments.len(), 1);
        assert_eq!(call.arguments["b"], json!(1));

        let err = extract_invoke("<invoke data-name=\"only\"></invoke>").unwrap_err();
        assert_eq!(err, InvokeError::MissingName);
    }

    #[test]
    fn test_extract_duplicate_parameter_last_wins() {
        let call = extract_invoke(
            r#"<invoke name="f"><parameter name="x">1</parameter><parameter name="x">2</parameter></invoke>"#,
        )
        .unwrap();
        assert_eq!(call.arguments.len(), 1);
        assert_eq!(call.arguments["x"], json!(2));
    }

    #[test]
    fn test_extract_missing_name_fails() {
        let err = extract_invoke(r#"<invoke><parameter name="x">1</parameter></invoke>"#)
            .unwrap_err();
        assert_eq!(err, InvokeError::MissingName);

        let err = extract_invoke(r#"<invoke name=""></invoke>"#).unwrap_err();
        assert_eq!(err, InvokeError::MissingName);
    }

    #[test]
    fn test_extract_without_open_marker_fails() {
        assert_eq!(
            extract_invoke("no markup here").unwrap_err(),
            InvokeError::MissingOpenMarker
        );
    }

    #[test]
    fn test_extract_skips_unnamed_parameters() {
        let call = extract_invoke(
            r#"<invoke name="f"><parameter>1</parameter><parameter name="y">2</parameter></invoke>"#,
        )
        .unwrap();
        assert_eq!(call.arguments.len(), 1);
        assert_eq!(call.arguments["y"], json!(2));
    }
}
