//! MCP error types.
//!
//! Defines error variants for MCP session lifecycle, tool execution, and
//! configuration errors.

use thiserror::Error;

pub type McpResult<T> = Result<T, McpError>;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("server not connected")]
    NotConnected,

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("prompt not found: {0}")]
    PromptNotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("tool call cancelled")]
    Cancelled,

    #[error("session shutdown did not complete cleanly: {0}")]
    ShutdownIncomplete(String),

    #[error(transparent)]
    Sdk(#[from] Box<rmcp::RmcpError>),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<rmcp::RmcpError> for McpError {
    fn from(err: rmcp::RmcpError) -> Self {
        McpError::Sdk(Box::new(err))
    }
}
