//! C7: tool processor: projects MCP tool descriptors into the LLM's
//! function-calling schema, and drives individual tool-call execution.

use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use smg_mcp::{McpError, McpSession, ToolDescriptor};
use tool_parser::ToolCall;

use crate::error::{CoreError, CoreResult};

/// Project the session's tool descriptors into the `{type, function}` shape
/// the LLM's `tools` request field expects.
pub fn format_for_llm(tools: &[ToolDescriptor]) -> Vec<serde_json::Value> {
    tools
        .iter()
        .map(|tool| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description.clone().unwrap_or_default(),
                    "parameters": tool.input_schema,
                }
            })
        })
        .collect()
}

/// Outcome of executing one tool call, destined for a tool-role message.
#[derive(Debug, Clone)]
pub struct ToolExecutionOutcome {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

/// Execute a single parsed tool call against the connected MCP session.
///
/// Parse-error sentinels are rejected here rather than dispatched:
/// callers should route those through `History::add_failed_tool_gen`
/// instead of calling this. `cancellation` is forwarded to the session so
/// an in-flight call aborts rather than being waited out.
#[instrument(skip(session, call, cancellation), fields(tool = %call.function.name))]
pub async fn execute(
    session: &McpSession,
    call: &ToolCall,
    cancellation: &CancellationToken,
) -> CoreResult<ToolExecutionOutcome> {
    if call.is_parse_error_sentinel() {
        return Err(CoreError::log_only("attempted to execute a parse-error sentinel tool call"));
    }

    let arguments: serde_json::Value = serde_json::from_str(&call.function.arguments).map_err(|e| {
        CoreError::log_only(format!(
            "tool call '{}' has non-JSON arguments: {e}",
            call.function.name
        ))
    })?;

    match session.call_tool(&call.function.name, arguments, cancellation).await {
        Ok(outcome) => Ok(ToolExecutionOutcome {
            tool_call_id: call.id.clone(),
            content: outcome.text,
            is_error: outcome.is_error,
        }),
        Err(err) => {
            warn!(error = %err, tool = %call.function.name, "tool execution failed, reporting back to the model");
            Ok(ToolExecutionOutcome {
                tool_call_id: call.id.clone(),
                content: describe_mcp_error(&err),
                is_error: true,
            })
        }
    }
}

/// Render an MCP error as tool-result content the model can react to,
/// rather than propagating it as a core failure.
fn describe_mcp_error(err: &McpError) -> String {
    format!("tool execution failed: {err}")
}
