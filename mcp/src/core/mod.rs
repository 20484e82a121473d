//! Core MCP client infrastructure: a single stdio-connected server session.

pub mod config;
pub mod naming;
pub mod session;
pub mod state;

pub use config::McpSessionConfig;
pub use session::{McpSession, PromptDescriptor, ToolCallOutcome, ToolDescriptor};
pub use state::ConnectionState;
