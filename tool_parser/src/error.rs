//! Error types for tool-call parsing and accumulation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolParseError {
    #[error("tool call arguments are not a JSON object, array, or encoded string: {0}")]
    InvalidArguments(String),

    #[error("tool call is missing a 'name' field")]
    MissingName,

    #[error("malformed JSON in tool call: {0}")]
    MalformedJson(String),
}
