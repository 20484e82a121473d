//! Entry point (c): normalize a tool call's `arguments` into the wire
//! string form ToolCall.function.arguments expects on the wire.
//!
//! Producers upstream of the wire boundary (the orchestrator building a
//! tool call by hand, a test fixture, a non-streaming LLM response) may
//! already hold arguments as a `serde_json::Value` object or as a raw JSON
//! string. This collapses either into the single string form every
//! `ToolCall` carries.

use crate::error::ToolParseError;

pub fn stringify_arguments(value: serde_json::Value) -> Result<String, ToolParseError> {
    match value {
        serde_json::Value::Object(_) => Ok(value.to_string()),
        serde_json::Value::String(s) => {
            match serde_json::from_str::<serde_json::Value>(&s) {
                Ok(serde_json::Value::Object(_)) => Ok(s),
                Ok(_) => Err(ToolParseError::InvalidArguments(
                    "arguments string decoded to a non-object JSON value".to_string(),
                )),
                Err(e) => Err(ToolParseError::MalformedJson(e.to_string())),
            }
        }
        serde_json::Value::Null => Ok("{}".to_string()),
        other => Err(ToolParseError::InvalidArguments(format!(
            "arguments must be an object or a JSON-encoded object string, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_is_serialized_directly() {
        let out = stringify_arguments(serde_json::json!({"a": 1})).unwrap();
        assert_eq!(out, "{\"a\":1}");
    }

    #[test]
    fn already_encoded_string_passes_through() {
        let out = stringify_arguments(serde_json::Value::String("{\"a\":1}".to_string())).unwrap();
        assert_eq!(out, "{\"a\":1}");
    }

    #[test]
    fn null_becomes_empty_object() {
        let out = stringify_arguments(serde_json::Value::Null).unwrap();
        assert_eq!(out, "{}");
    }

    #[test]
    fn non_object_string_is_rejected() {
        let err = stringify_arguments(serde_json::Value::String("[1,2,3]".to_string()));
        assert!(err.is_err());
    }

    #[test]
    fn array_value_is_rejected() {
        let err = stringify_arguments(serde_json::json!([1, 2, 3]));
        assert!(err.is_err());
    }
}
