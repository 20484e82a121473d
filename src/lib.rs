//! MCP client runtime core: a bounded reason/act loop between an LLM
//! backend and a connected MCP tool server.
//!
//! ## Modules
//!
//! - [`error`]: the two-kind user-visible/log-only error taxonomy
//! - [`events`]: the typed, fan-out event bus (C9)
//! - [`message`]: conversation history and message construction (C6)
//! - [`sse`]: the streaming SSE line parser (C2)
//! - [`llm`]: the LLM HTTP client, non-streaming and streaming (C4)
//! - [`tools`]: tool-descriptor projection and execution (C7)
//! - [`orchestrator`]: the reason/act loop (C8)
//! - [`config`]: ambient configuration structs tying the above together

pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod message;
pub mod orchestrator;
pub mod sse;
pub mod tools;

pub use error::{CoreError, CoreResult};
pub use events::{Event, EventBus, EventType, StatusType};
pub use message::{History, Message, Role};
pub use orchestrator::Orchestrator;

pub use tool_parser::ToolCall;
