//! Entry point (b): extract all tool calls from a response body, and the
//! `<think>` tag stripping that precedes it.

use regex::Regex;
use std::sync::OnceLock;

use crate::normalize::normalize;
use crate::types::ToolCall;

fn tool_call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<tool_call>(.*?)</tool_call>").expect("valid tool_call regex")
    })
}

fn think_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^\s*<think>(.*?)</think>").expect("valid think regex"))
}

/// Strip a leading `<think>...</think>` block, if present. An unterminated
/// `<think>` at the start of the text is dropped entirely, along with
/// everything after the opening tag, and a warning is logged: there is no
/// way to tell where reasoning ends and the real answer begins.
pub fn strip_think_tag(text: &str) -> String {
    if let Some(m) = think_tag_regex().find(text) {
        return text[m.end()..].trim_start().to_string();
    }
    let trimmed = text.trim_start();
    if trimmed.starts_with("<think>") {
        tracing::warn!("unterminated <think> block, dropping it and everything after");
        return String::new();
    }
    text.to_string()
}

/// Scan `text` for `<tool_call>...</tool_call>` segments and parse each into
/// a `ToolCall`. Never fails: a segment that can't be parsed becomes a
/// parse-failure sentinel instead of being dropped or raising.
pub fn parse_tool_calls(text: &str) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    for (index, captures) in tool_call_regex().captures_iter(text).enumerate() {
        let snippet = captures.get(1).map(|m| m.as_str()).unwrap_or("");
        calls.push(parse_one(snippet, index));
    }
    calls
}

/// Returns `(stripped_content, calls)`: the input text with every matched
/// `<tool_call>` region removed, alongside the parsed calls in order.
pub fn extract_and_strip(text: &str) -> (String, Vec<ToolCall>) {
    let calls = parse_tool_calls(text);
    let stripped = tool_call_regex().replace_all(text, "").trim().to_string();
    (stripped, calls)
}

fn parse_one(snippet: &str, index: usize) -> ToolCall {
    let repaired = normalize(snippet);

    let value: serde_json::Value = match serde_json::from_str(&repaired) {
        Ok(v) => v,
        Err(e) => {
            return ToolCall::parse_error("malformed_json", &e.to_string(), snippet);
        }
    };

    let obj = match value.as_object() {
        Some(obj) => obj,
        None => {
            return ToolCall::parse_error(
                "not_an_object",
                "tool call must decode to a JSON object",
                snippet,
            );
        }
    };

    let name = match obj.get("name").and_then(|n| n.as_str()) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            return ToolCall::parse_error("missing_name", "tool call has no 'name' field", snippet);
        }
    };

    let arguments = match obj.get("arguments") {
        None => serde_json::json!({}),
        Some(serde_json::Value::Object(map)) => serde_json::Value::Object(map.clone()),
        Some(serde_json::Value::String(s)) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(serde_json::Value::Object(map)) => serde_json::Value::Object(map),
            _ => {
                return ToolCall::parse_error(
                    "invalid_arguments",
                    "arguments string did not decode to a JSON object",
                    snippet,
                );
            }
        },
        Some(_) => {
            return ToolCall::parse_error(
                "invalid_arguments",
                "arguments must be an object or a JSON-encoded object string",
                snippet,
            );
        }
    };

    let arguments = crate::stringify::stringify_arguments(arguments)
        .expect("arguments resolved to an object above, so stringification cannot fail");

    ToolCall::new(format!("call_{name}_{index}"), name, arguments)
}
