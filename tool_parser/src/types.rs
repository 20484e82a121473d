//! Wire-shaped tool call types.

use serde::{Deserialize, Serialize};

/// Name used for a parse-failure sentinel `ToolCall`.
pub const PARSE_ERROR_SENTINEL: &str = "__llm_tool_parse_error__";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-serialized object, matching the wire schema.
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: String) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }

    pub fn is_parse_error_sentinel(&self) -> bool {
        self.function.name == PARSE_ERROR_SENTINEL
    }

    /// Build the sentinel emitted when a `<tool_call>` segment fails to parse.
    pub fn parse_error(error_type: &str, error_message: &str, original_snippet: &str) -> Self {
        let arguments = serde_json::json!({
            "error_type": error_type,
            "error_message": error_message,
            "original_snippet": original_snippet,
        })
        .to_string();
        Self::new(
            format!("call_{PARSE_ERROR_SENTINEL}"),
            PARSE_ERROR_SENTINEL,
            arguments,
        )
    }
}
