//! C8: the reason/act loop that drives one user turn.

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use smg_mcp::{McpSession, McpSessionConfig};
use tool_parser::ToolCall;

use crate::config::{LlmConfig, OrchestratorConfig};
use crate::error::{CoreError, CoreResult};
use crate::events::{Event, EventBus, StatusType};
use crate::llm::{LlmClient, ProviderKind};
use crate::message::History;
use crate::tools::{self, ToolExecutionOutcome};

/// Generates the system prompt advertising the connected session's tools.
pub fn generate_system_prompt(base: Option<&str>, tool_names: &[String]) -> String {
    let base = base.unwrap_or("You are a helpful assistant with access to tools.");
    if tool_names.is_empty() {
        return base.to_string();
    }
    format!("{base}\n\nAvailable tools: {}", tool_names.join(", "))
}

pub struct Orchestrator {
    llm: LlmClient,
    session: McpSession,
    config: OrchestratorConfig,
    bus: EventBus,
    history: History,
}

impl Orchestrator {
    pub fn new(llm: LlmClient, session: McpSession, config: OrchestratorConfig, bus: EventBus) -> Self {
        let history = History::new(config.history_capacity);
        Self {
            llm,
            session,
            config,
            bus,
            history,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Bring up the MCP session and seed the system prompt with the
    /// connected server's tool catalog. Must be called before `run_turn`.
    #[instrument(skip(self))]
    pub async fn connect(&mut self) -> CoreResult<()> {
        self.session
            .connect()
            .await
            .map_err(|e| CoreError::log_only_with_source("failed to connect MCP session", e))?;

        let tools = self
            .session
            .list_tools()
            .await
            .map_err(|e| CoreError::log_only_with_source("failed to list MCP tools", e))?;

        let tool_names: Vec<String> = tools.iter().map(|t| t.name.clone()).collect();
        let prompt = generate_system_prompt(self.config.system_prompt.as_deref(), &tool_names);
        self.history.set_system_message(prompt);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn shutdown(&mut self) -> CoreResult<()> {
        self.session
            .shutdown()
            .await
            .map_err(|e| CoreError::log_only_with_source("MCP session shutdown did not complete cleanly", e))
    }

    /// Drive one user turn to completion: append the user message, then
    /// loop bounded by `MAX_ITERATIONS` until the model returns a final
    /// text answer, a cancellation fires, or the bound is exhausted.
    #[instrument(skip(self, user_message, cancellation))]
    pub async fn run_turn(&mut self, user_message: impl Into<String>, cancellation: CancellationToken) -> CoreResult<String> {
        self.history.add(crate::message::Message::user(user_message));

        let tools = self
            .session
            .list_tools()
            .await
            .map_err(|e| CoreError::log_only_with_source("failed to list MCP tools", e))?;
        let formatted_tools = tools::format_for_llm(&tools);

        for iteration in 0..self.config.max_iterations {
            if cancellation.is_cancelled() {
                return self.handle_cancellation(None).await;
            }

            let wire_messages = self.history.format_for_wire();
            let completion = tokio::select! {
                biased;
                _ = cancellation.cancelled() => return self.handle_cancellation(None).await,
                result = self.complete(wire_messages, formatted_tools.clone(), iteration == 0) => result?,
            };

            if completion.tool_calls.is_empty() {
                self.history.add(crate::message::Message::assistant(completion.content.clone()));
                self.bus.dispatch(Event::status("turn complete", StatusType::Success));
                return Ok(completion.content);
            }

            self.history.add(crate::message::Message {
                role: crate::message::Role::Assistant,
                content: (!completion.content.is_empty()).then(|| completion.content.clone()),
                tool_calls: Some(completion.tool_calls.clone()),
                tool_call_id: None,
            });

            for call in &completion.tool_calls {
                tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => return self.handle_cancellation(Some(call)).await,
                    _ = self.dispatch_one_call(call, &cancellation) => {}
                }
            }
        }

        warn!("max tool iterations reached");
        self.bus.dispatch(Event::warning("max tool iterations reached"));
        Ok(String::new())
    }

    async fn complete(
        &self,
        messages: Vec<crate::message::Message>,
        tools: Vec<serde_json::Value>,
        prefer_streaming: bool,
    ) -> CoreResult<crate::llm::CompletionResult> {
        if prefer_streaming {
            self.llm
                .complete_streaming(messages, Some(tools), Some(&self.bus))
                .await
        } else {
            self.llm.complete(messages, Some(tools)).await
        }
    }

    async fn dispatch_one_call(&mut self, call: &ToolCall, cancellation: &CancellationToken) {
        if call.is_parse_error_sentinel() {
            self.bus.dispatch(Event::error(format!("malformed tool call: {}", call.function.arguments)));
            self.history.add_failed_tool_gen(
                call.function.arguments.clone(),
                call,
                "the previous tool call could not be parsed, please try again",
            );
            return;
        }

        self.bus.dispatch(Event::action(&call.function.name, &parsed_args(call), StatusType::InProgress));

        match tools::execute(&self.session, call, cancellation).await {
            Ok(ToolExecutionOutcome { tool_call_id, content, is_error: false }) => {
                self.bus.dispatch(Event::action(&call.function.name, &parsed_args(call), StatusType::Success));
                self.history.add_tool_result(tool_call_id, content);
            }
            Ok(ToolExecutionOutcome { tool_call_id, content, is_error: true }) => {
                self.bus.dispatch(Event::error(content.clone()));
                self.history.add_failed_tool_execute(tool_call_id, content);
            }
            Err(err) => {
                let message = err.user_message();
                self.bus.dispatch(Event::error(message.clone()));
                self.history.add_failed_tool_execute(call.id.clone(), message);
            }
        }
    }

    /// `in_flight` is the tool call that was aborted mid-execution, if any;
    /// it gets an error-marked tool result appended so the next turn's
    /// history doesn't carry a dangling assistant tool call with no reply.
    async fn handle_cancellation(&mut self, in_flight: Option<&ToolCall>) -> CoreResult<String> {
        info!("turn cancelled");
        if let Some(call) = in_flight {
            self.history.add_failed_tool_execute(call.id.clone(), "tool call cancelled".to_string());
        }
        self.bus.dispatch(Event::status("turn cancelled", StatusType::Failed));
        Ok(String::new())
    }
}

fn parsed_args(call: &ToolCall) -> serde_json::Value {
    serde_json::from_str(&call.function.arguments).unwrap_or(serde_json::Value::Null)
}

/// Build the LLM client and MCP session from config; the caller is
/// responsible for `connect()`/`shutdown()` bracketing.
pub async fn build(llm_config: LlmConfig, mcp_config: McpSessionConfig, orchestrator_config: OrchestratorConfig) -> CoreResult<Orchestrator> {
    let client_config = crate::llm::LlmClientConfig {
        backend_url: llm_config.backend_url.clone(),
        model: llm_config.model.clone(),
        provider_kind: ProviderKind::from(llm_config.provider_kind),
        api_key: llm_config.api_key.clone(),
        request_timeout: std::time::Duration::from_secs(llm_config.request_timeout_secs),
        default_stream: llm_config.stream,
        inference_configs: llm_config.inference_configs.clone().into(),
        load_model_configs: llm_config.load_model_configs(),
    };
    let llm = LlmClient::new(client_config).await?;
    let session = McpSession::new(mcp_config);
    let bus = EventBus::new();
    Ok(Orchestrator::new(llm, session, orchestrator_config, bus))
}
