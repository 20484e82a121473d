//! `McpSession`: the single stdio-connected MCP server for a conversation.
//!
//! Unlike a multi-server gateway, the runtime only ever owns one child
//! process at a time: the session is created, connected, used for the
//! lifetime of a conversation, and torn down. There is no connection pool,
//! no per-tenant routing, and no approval policy layer here: those are the
//! concerns of whatever embeds this crate.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rmcp::model::{CallToolRequestParam, GetPromptRequestParam};
use rmcp::service::RunningService;
use rmcp::transport::TokioChildProcess;
use rmcp::{RoleClient, ServiceExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::config::McpSessionConfig;
use super::naming::{derive_server_name, is_generic};
use super::state::ConnectionState;
use crate::error::{McpError, McpResult};

type Client = RunningService<RoleClient, ()>;

/// A tool exposed by the connected server, projected into a wire-friendly shape.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// A prompt template exposed by the connected server, already expanded via
/// `prompts/get`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PromptDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub messages: Vec<serde_json::Value>,
}

/// Result of a single `call_tool`, normalized to the flat text form the
/// message processor expects.
#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    pub text: String,
    pub is_error: bool,
}

/// A connected (or connecting/closing) MCP server.
pub struct McpSession {
    config: McpSessionConfig,
    client: Option<Client>,
    state: ConnectionState,
    server_name: String,
    /// Set once `cancel()` has been issued, so a second `shutdown()` call is a no-op.
    shutdown_requested: AtomicBool,
}

impl McpSession {
    pub fn new(config: McpSessionConfig) -> Self {
        let server_name = config.server_name.clone().unwrap_or_default();
        Self {
            config,
            client: None,
            state: ConnectionState::New,
            server_name,
            shutdown_requested: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Spawn the configured command and complete the MCP `initialize` handshake.
    #[instrument(skip(self), fields(command = %self.config.command))]
    pub async fn connect(&mut self) -> McpResult<()> {
        if !self.state.can_transition_to(ConnectionState::Connecting) {
            return Err(McpError::ConnectionFailed(format!(
                "cannot connect from state {}",
                self.state
            )));
        }
        self.state = ConnectionState::Connecting;

        let command = self.config.command.clone();
        let args = self.config.args.clone();
        let envs = self.config.envs.clone();

        let transport = TokioChildProcess::new(Command::new(&command).configure(|cmd| {
            cmd.args(&args).envs(envs.iter()).stderr(Stdio::inherit());
        }))
        .map_err(|e| McpError::ConnectionFailed(format!("spawn '{command}': {e}")))?;

        let connect = ().serve(transport);
        let client = tokio::time::timeout(self.config.connect_timeout(), connect)
            .await
            .map_err(|_| {
                self.state = ConnectionState::Failed;
                McpError::ConnectionFailed(format!(
                    "initialize handshake timed out after {:?}",
                    self.config.connect_timeout()
                ))
            })?
            .map_err(|e| {
                self.state = ConnectionState::Failed;
                McpError::ConnectionFailed(format!("initialize stdio client: {e}"))
            })?;

        self.client = Some(client);
        self.server_name = self.resolve_server_name().await;
        self.state = ConnectionState::Ready;
        info!(server = %self.server_name, "mcp session ready");
        Ok(())
    }

    /// Prefer an explicit config override, then the name the server itself
    /// reported during the `initialize` handshake. Only fall back to the
    /// script-scanning heuristic when there is no override and the
    /// server-reported name is itself a generic placeholder (or the server
    /// didn't report one at all).
    async fn resolve_server_name(&self) -> String {
        if let Some(explicit) = &self.config.server_name {
            return explicit.clone();
        }

        let reported = self
            .client
            .as_ref()
            .and_then(|c| c.peer().peer_info())
            .map(|info| info.server_info.name.clone());

        match reported {
            Some(name) if !is_generic(&name) => name,
            _ => derive_server_name(&self.config.command, &self.config.args).await,
        }
    }

    fn client(&self) -> McpResult<&Client> {
        self.client.as_ref().ok_or(McpError::NotConnected)
    }

    #[instrument(skip(self))]
    pub async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
        let client = self.client()?;
        let tools = client
            .peer()
            .list_all_tools()
            .await
            .map_err(|e| McpError::Transport(format!("list_tools: {e}")))?;
        Ok(tools
            .into_iter()
            .map(|tool| ToolDescriptor {
                name: tool.name.to_string(),
                description: tool.description.as_ref().map(|d| d.to_string()),
                input_schema: serde_json::Value::Object((*tool.input_schema).clone()),
            })
            .collect())
    }

    /// Non-fatal: a server without prompt support simply yields an empty list.
    #[instrument(skip(self))]
    pub async fn list_formatted_prompts(&self) -> Vec<PromptDescriptor> {
        let client = match self.client() {
            Ok(client) => client,
            Err(_) => return Vec::new(),
        };

        let prompts = match client.peer().list_all_prompts().await {
            Ok(prompts) => prompts,
            Err(e) => {
                warn!(error = %e, "list_prompts failed, continuing without prompts");
                return Vec::new();
            }
        };

        let mut out = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            let result = client
                .peer()
                .get_prompt(GetPromptRequestParam {
                    name: prompt.name.clone(),
                    arguments: None,
                })
                .await;
            match result {
                Ok(expanded) => {
                    let messages = expanded
                        .messages
                        .into_iter()
                        .map(|m| serde_json::to_value(m).unwrap_or(serde_json::Value::Null))
                        .collect();
                    out.push(PromptDescriptor {
                        name: prompt.name,
                        description: prompt.description,
                        messages,
                    });
                }
                Err(e) => {
                    warn!(prompt = %prompt.name, error = %e, "get_prompt failed, skipping");
                }
            }
        }
        out
    }

    /// Non-fatal: resources are optional and a missing handler is not an error.
    #[instrument(skip(self))]
    pub async fn list_resources(&self) -> Vec<serde_json::Value> {
        let client = match self.client() {
            Ok(client) => client,
            Err(_) => return Vec::new(),
        };
        match client.peer().list_all_resources().await {
            Ok(resources) => resources
                .into_iter()
                .map(|r| serde_json::to_value(r).unwrap_or(serde_json::Value::Null))
                .collect(),
            Err(e) => {
                warn!(error = %e, "list_resources failed, continuing without resources");
                Vec::new()
            }
        }
    }

    /// Invoke `tools/call` and wait for its reply slot to resolve. Races
    /// the request against `cancellation`: if it fires first, the reply
    /// slot is abandoned and this returns `McpError::Cancelled` rather than
    /// waiting out the call.
    #[instrument(skip(self, arguments, cancellation))]
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        cancellation: &CancellationToken,
    ) -> McpResult<ToolCallOutcome> {
        let client = self.client()?;

        let arguments = match arguments {
            serde_json::Value::Object(map) => Some(map),
            serde_json::Value::Null => None,
            other => {
                return Err(McpError::InvalidArguments(format!(
                    "tool arguments must be a JSON object, got {other}"
                )))
            }
        };

        let request = client.peer().call_tool(CallToolRequestParam {
            name: name.to_string().into(),
            arguments,
        });

        let result = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(McpError::Cancelled),
            result = request => result.map_err(|e| McpError::ToolExecution(format!("{name}: {e}")))?,
        };

        Ok(ToolCallOutcome {
            text: join_text_content(&result.content),
            is_error: result.is_error.unwrap_or(false),
        })
    }

    /// Tear down the connection: request graceful shutdown, escalate to
    /// SIGTERM after `graceful_teardown`, and reap anything left after
    /// `force_teardown`.
    #[instrument(skip(self))]
    pub async fn shutdown(&mut self) -> McpResult<()> {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.client.is_none() {
            self.state = ConnectionState::Closed;
            return Ok(());
        }
        self.state = ConnectionState::Closing;

        let client = self.client.take().expect("checked above");
        let graceful = self.config.graceful_teardown();
        let forced = self.config.force_teardown();

        match tokio::time::timeout(graceful, client.cancel()).await {
            Ok(Ok(_)) => {
                self.state = ConnectionState::Closed;
                reap_orphans(&self.server_name).await;
                return Ok(());
            }
            Ok(Err(e)) => {
                warn!(error = %e, "graceful cancel returned an error, escalating");
            }
            Err(_) => {
                warn!(server = %self.server_name, "graceful teardown timed out, escalating to SIGTERM");
            }
        }

        // The underlying transport drops (and SIGTERMs via kill_on_drop) here;
        // give it `forced` to exit before we give up and report it.
        tokio::time::sleep(forced).await;
        reap_orphans(&self.server_name).await;
        self.state = ConnectionState::Closed;
        Ok(())
    }
}

fn join_text_content(content: &[rmcp::model::Content]) -> String {
    content
        .iter()
        .filter_map(|c| c.as_text().map(|t| t.text.clone()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Best-effort reap of stray grandchild processes left behind by a tool
/// server (common with `npx`/interpreter wrappers that fork a long-lived
/// worker). Only matches process names containing "mcp" or
/// "model-control" so we never touch unrelated processes; unix-only, a
/// no-op everywhere else.
#[cfg(target_os = "linux")]
async fn reap_orphans(server_name: &str) {
    let our_pid = std::process::id();
    let mut entries = match tokio::fs::read_dir("/proc").await {
        Ok(entries) => entries,
        Err(_) => return,
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };
        let stat_path = format!("/proc/{pid}/stat");
        let Ok(stat) = tokio::fs::read_to_string(&stat_path).await else {
            continue;
        };
        let Some(ppid) = parse_ppid(&stat) else {
            continue;
        };
        if ppid != our_pid {
            continue;
        }

        let cmdline_path = format!("/proc/{pid}/cmdline");
        let cmdline = tokio::fs::read_to_string(&cmdline_path)
            .await
            .unwrap_or_default();
        let lower = cmdline.to_ascii_lowercase();
        if !(lower.contains("mcp") || lower.contains("model-control")) {
            continue;
        }

        info!(pid, server = %server_name, "reaping orphaned mcp child process");
        let _ = tokio::process::Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .status()
            .await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        if tokio::fs::metadata(format!("/proc/{pid}")).await.is_ok() {
            let _ = tokio::process::Command::new("kill")
                .args(["-KILL", &pid.to_string()])
                .status()
                .await;
        }
    }
}

#[cfg(not(target_os = "linux"))]
async fn reap_orphans(_server_name: &str) {}

#[cfg(target_os = "linux")]
fn parse_ppid(stat: &str) -> Option<u32> {
    // Fields after the `(comm)` block are space separated; ppid is field 4
    // overall, i.e. index 1 once we skip pid/comm/state.
    let after_comm = stat.rfind(')')?;
    stat[after_comm + 1..]
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
}
