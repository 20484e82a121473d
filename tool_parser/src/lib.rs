//! Tool/function call parsing, repair, and streaming accumulation for LLM
//! model output.
//!
//! - [`extract`]: pull `<tool_call>` segments out of free text and repair
//!   common malformations (C1).
//! - [`accumulator`]: merge streamed `tool_calls` deltas into complete call
//!   objects (C3).

pub mod accumulator;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod stringify;
pub mod types;

pub use accumulator::{FunctionDelta, ToolCallAccumulator, ToolCallDelta};
pub use error::ToolParseError;
pub use extract::{extract_and_strip, parse_tool_calls, strip_think_tag};
pub use normalize::normalize;
pub use stringify::stringify_arguments;
pub use types::{FunctionCall, ToolCall, PARSE_ERROR_SENTINEL};
