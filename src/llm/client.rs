//! C4: LLM HTTP client: connection check, non-streaming and streaming
//! chat completions.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::events::{Event, EventBus, StatusType};
use crate::message::Message;
use crate::sse::{SseEvent, SseParser};

use super::payload::{
    extract_error_message, ChatCompletionRequest, ChatCompletionResponse, CompletionResult,
    InferenceConfigs, LoadModelConfigs,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Local,
    Cloud,
}

#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub backend_url: String,
    pub model: String,
    pub provider_kind: ProviderKind,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub default_stream: bool,
    pub inference_configs: InferenceConfigs,
    pub load_model_configs: Option<LoadModelConfigs>,
}

impl LlmClientConfig {
    pub fn local(backend_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            model: model.into(),
            provider_kind: ProviderKind::Local,
            api_key: None,
            request_timeout: Duration::from_secs(120),
            default_stream: true,
            inference_configs: InferenceConfigs::default(),
            load_model_configs: None,
        }
    }

    pub fn cloud(backend_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            model: model.into(),
            provider_kind: ProviderKind::Cloud,
            api_key: Some(api_key.into()),
            request_timeout: Duration::from_secs(120),
            default_stream: true,
            inference_configs: InferenceConfigs::default(),
            load_model_configs: None,
        }
    }
}

fn context_overflow_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)Requested tokens? (\d+) exceeds? context window of (\d+)")
            .expect("valid context overflow regex")
    })
}

pub struct LlmClient {
    config: LlmClientConfig,
    http: reqwest::Client,
}

impl LlmClient {
    /// Construct the client and run the synchronous connection probe.
    /// Local backends only warn on failure; cloud backends fail
    /// construction with a user-visible error, since a bad key/URL is the
    /// usual cause.
    #[instrument(skip(config), fields(provider = ?config.provider_kind))]
    pub async fn new(config: LlmClientConfig) -> CoreResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CoreError::Config(format!("failed to build HTTP client: {e}")))?;

        let client = Self { config, http };
        client.connection_check().await?;
        Ok(client)
    }

    async fn connection_check(&self) -> CoreResult<()> {
        match self.config.provider_kind {
            ProviderKind::Local => {
                let url = format!("{}/health", self.config.backend_url);
                match self.http.get(&url).send().await {
                    Ok(resp) if resp.status().is_success() => Ok(()),
                    Ok(resp) => {
                        warn!(status = %resp.status(), "local LLM backend health check failed, it may still start");
                        Ok(())
                    }
                    Err(e) => {
                        warn!(error = %e, "local LLM backend unreachable at startup, it may still start");
                        Ok(())
                    }
                }
            }
            ProviderKind::Cloud => {
                let url = format!("{}/models", self.config.backend_url);
                let key = self.config.api_key.as_deref().unwrap_or_default();
                let resp = self
                    .http
                    .get(&url)
                    .bearer_auth(key)
                    .send()
                    .await
                    .map_err(|e| CoreError::UserVisible(format!("could not reach cloud LLM backend: {e}")))?;
                if resp.status().is_success() {
                    Ok(())
                } else {
                    Err(CoreError::UserVisible(format!(
                        "cloud LLM backend rejected credentials (HTTP {})",
                        resp.status()
                    )))
                }
            }
        }
    }

    fn build_request(&self, messages: Vec<Message>, tools: Option<Vec<serde_json::Value>>, stream: bool) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            tools,
            tool_choice: None,
            stream,
            inference_configs: self.config.inference_configs.clone(),
            load_model_configs: self.config.load_model_configs.clone(),
        }
    }

    async fn handle_error_response(&self, status: reqwest::StatusCode, body: String) -> CoreError {
        let message = extract_error_message(&body);
        if self.config.provider_kind == ProviderKind::Local {
            if let Some(caps) = context_overflow_regex().captures(&message) {
                let requested = &caps[1];
                let window = &caps[2];
                return CoreError::UserVisible(format!(
                    "requested tokens {requested} exceed context window of {window}, reduce history or prompt"
                ));
            }
        }
        CoreError::log_only(format!("LLM backend returned HTTP {status}: {message}"))
    }

    /// Non-streaming chat completion.
    #[instrument(skip(self, messages, tools))]
    pub async fn complete(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<serde_json::Value>>,
    ) -> CoreResult<CompletionResult> {
        let request = self.build_request(messages, tools, false);
        let url = format!("{}/chat/completions", self.config.backend_url);
        let mut req = self.http.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| CoreError::log_only_with_source("LLM request failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(self.handle_error_response(status, body).await);
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CoreError::log_only_with_source("failed to decode LLM response", e))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::log_only("LLM response had no choices"))?;

        let mut content = tool_parser::strip_think_tag(&choice.message.content.unwrap_or_default());
        let mut tool_calls = choice.message.tool_calls.unwrap_or_default();

        if tool_calls.is_empty() && content.contains("<tool_call>") {
            let (stripped, extracted) = tool_parser::extract_and_strip(&content);
            content = stripped;
            tool_calls = extracted;
        }

        substitute_retry_message_if_only_sentinels(&mut content, &tool_calls);

        Ok(CompletionResult { content, tool_calls })
    }

    /// Streaming chat completion. `bus` is optional: a caller
    /// driving a non-interactive test may omit event publication entirely.
    #[instrument(skip(self, messages, tools, bus))]
    pub async fn complete_streaming(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<serde_json::Value>>,
        bus: Option<&EventBus>,
    ) -> CoreResult<CompletionResult> {
        let request = self.build_request(messages, tools, true);
        let url = format!("{}/chat/completions", self.config.backend_url);
        let mut req = self.http.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| CoreError::log_only_with_source("LLM streaming request failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(self.handle_error_response(status, body).await);
        }

        use futures_util::StreamExt;

        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();
        let mut accumulator = tool_parser::ToolCallAccumulator::new();

        let mut text_buf = String::new();
        let mut message_event_id = Uuid::new_v4();
        let mut in_tool_call_segment = false;
        let mut think_state = ThinkState::Buffering(String::new());

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CoreError::log_only_with_source("LLM stream transport error", e))?;
            for event in parser.feed(&chunk) {
                match event {
                    SseEvent::Data(value) => {
                        self.handle_stream_value(
                            &value,
                            bus,
                            &mut accumulator,
                            &mut text_buf,
                            &mut message_event_id,
                            &mut in_tool_call_segment,
                            &mut think_state,
                        );
                    }
                    SseEvent::Done => break 'outer,
                    SseEvent::Error(message) => {
                        warn!(%message, "SSE error event during LLM stream");
                        if let Some(bus) = bus {
                            bus.dispatch(Event::error(message));
                        }
                    }
                }
            }
        }

        if let ThinkState::Buffering(buf) = &think_state {
            if !buf.is_empty() {
                warn!("unterminated <think> block at end of stream, dropping it and everything after");
            }
        }

        if !in_tool_call_segment {
            if let Some(bus) = bus {
                bus.dispatch(
                    Event::message("assistant", text_buf.clone(), StatusType::Success).with_id(message_event_id),
                );
            }
        }

        let mut tool_calls = accumulator.finish();
        let mut content = text_buf;

        if tool_calls.is_empty() && content.contains("<tool_call>") {
            let (stripped, extracted) = tool_parser::extract_and_strip(&content);
            content = stripped;
            tool_calls = extracted;
        }

        substitute_retry_message_if_only_sentinels(&mut content, &tool_calls);

        Ok(CompletionResult { content, tool_calls })
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_stream_value(
        &self,
        value: &serde_json::Value,
        bus: Option<&EventBus>,
        accumulator: &mut tool_parser::ToolCallAccumulator,
        text_buf: &mut String,
        message_event_id: &mut Uuid,
        in_tool_call_segment: &mut bool,
        think_state: &mut ThinkState,
    ) {
        let Some(delta) = value["choices"][0].get("delta") else {
            return;
        };

        if let Some(content) = delta.get("content").and_then(|c| c.as_str()) {
            if let Some(resolved) = think_state.feed(content) {
                if !resolved.is_empty() {
                    self.process_text_delta(&resolved, bus, text_buf, message_event_id, in_tool_call_segment);
                }
            }
        }

        if let Some(deltas) = delta.get("tool_calls").and_then(|t| t.as_array()) {
            for raw_delta in deltas {
                let parsed: Result<tool_parser::ToolCallDelta, _> = serde_json::from_value(raw_delta.clone());
                match parsed {
                    Ok(delta) => {
                        if let Some(dispatched) = accumulator.add_delta(delta) {
                            if let Some(bus) = bus {
                                let args = serde_json::from_str(&dispatched.function.arguments)
                                    .unwrap_or(serde_json::Value::Null);
                                bus.dispatch(Event::action(&dispatched.function.name, &args, StatusType::InProgress));
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "malformed tool_call delta in stream"),
                }
            }
        }
    }

    /// Publish one resolved (post-`<think>`-stripping) content delta,
    /// flipping into a fresh ACTION segment the moment a `<tool_call>`
    /// marker appears.
    fn process_text_delta(
        &self,
        content: &str,
        bus: Option<&EventBus>,
        text_buf: &mut String,
        message_event_id: &mut Uuid,
        in_tool_call_segment: &mut bool,
    ) {
        if !*in_tool_call_segment && content.contains("<tool_call>") {
            if let Some(bus) = bus {
                bus.dispatch(
                    Event::message("assistant", text_buf.clone(), StatusType::Success).with_id(*message_event_id),
                );
            }
            *in_tool_call_segment = true;
            *message_event_id = Uuid::new_v4();
            if let Some(bus) = bus {
                bus.dispatch(
                    Event::action("", &serde_json::Value::Null, StatusType::InProgress).with_id(*message_event_id),
                );
            }
        }
        text_buf.push_str(content);
        if !*in_tool_call_segment {
            if let Some(bus) = bus {
                bus.dispatch(
                    Event::message("assistant", content, StatusType::InProgress).with_id(*message_event_id),
                );
            }
        }
    }
}

/// Buffers leading stream content until it's clear whether a `<think>...
/// </think>` reasoning block opens the response. Once resolved,
/// every subsequent `feed` call is a pure passthrough.
enum ThinkState {
    Buffering(String),
    Resolved,
}

impl ThinkState {
    /// Feeds one content delta through the buffer. Returns `Some(text)` with
    /// the portion ready to publish (possibly empty), or `None` while still
    /// buffering and undecided.
    fn feed(&mut self, delta: &str) -> Option<String> {
        match self {
            ThinkState::Resolved => Some(delta.to_string()),
            ThinkState::Buffering(buf) => {
                buf.push_str(delta);
                let trimmed = buf.trim_start();
                if trimmed.contains("</think>") {
                    let resolved = tool_parser::strip_think_tag(buf);
                    *self = ThinkState::Resolved;
                    Some(resolved)
                } else if !"<think>".chars().zip(trimmed.chars()).all(|(a, b)| a == b) {
                    let remainder = std::mem::take(buf);
                    *self = ThinkState::Resolved;
                    Some(remainder)
                } else {
                    None
                }
            }
        }
    }
}

/// When extraction produced at least one parse-failure sentinel and
/// zero valid calls, don't surface the malformed snippet as the visible
/// answer.
fn substitute_retry_message_if_only_sentinels(content: &mut String, tool_calls: &[tool_parser::ToolCall]) {
    if !tool_calls.is_empty() && tool_calls.iter().all(|c| c.is_parse_error_sentinel()) {
        *content = "I had trouble formatting that tool call, let me try again.".to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_overflow_message_is_recognized() {
        let caps = context_overflow_regex()
            .captures("Requested tokens 5000 exceeds context window of 4096")
            .unwrap();
        assert_eq!(&caps[1], "5000");
        assert_eq!(&caps[2], "4096");
    }

    #[test]
    fn context_overflow_regex_tolerates_singular_wording() {
        let caps = context_overflow_regex()
            .captures("Requested token 10 exceed context window of 8")
            .unwrap();
        assert_eq!(&caps[1], "10");
        assert_eq!(&caps[2], "8");
    }

    #[tokio::test]
    async fn handle_error_response_translates_overflow_for_local_backend() {
        let config = LlmClientConfig::local("http://127.0.0.1:9", "m");
        let client = LlmClient {
            http: reqwest::Client::new(),
            config,
        };
        let body = r#"{"error":{"message":"Requested tokens 5000 exceeds context window of 4096"}}"#.to_string();
        let err = client
            .handle_error_response(reqwest::StatusCode::BAD_REQUEST, body)
            .await;
        assert!(err.is_user_visible());
        assert_eq!(
            err.user_message(),
            "requested tokens 5000 exceed context window of 4096, reduce history or prompt"
        );
    }

    #[tokio::test]
    async fn handle_error_response_is_log_only_for_unrelated_errors() {
        let config = LlmClientConfig::local("http://127.0.0.1:9", "m");
        let client = LlmClient {
            http: reqwest::Client::new(),
            config,
        };
        let err = client
            .handle_error_response(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string())
            .await;
        assert!(!err.is_user_visible());
    }

    #[test]
    fn think_state_resolves_block_delivered_in_a_single_chunk() {
        let mut state = ThinkState::Buffering(String::new());
        let resolved = state.feed("<think>pondering</think>the answer").unwrap();
        assert_eq!(resolved, "the answer");
        assert!(matches!(state, ThinkState::Resolved));
    }

    #[test]
    fn think_state_resolves_block_split_across_chunks() {
        let mut state = ThinkState::Buffering(String::new());
        assert!(state.feed("<think>pond").is_none());
        assert!(state.feed("ering some more</thi").is_none());
        let resolved = state.feed("nk>the answer").unwrap();
        assert_eq!(resolved, "the answer");
    }

    #[test]
    fn think_state_passes_through_content_with_no_think_block() {
        let mut state = ThinkState::Buffering(String::new());
        let resolved = state.feed("just an answer").unwrap();
        assert_eq!(resolved, "just an answer");
        assert!(matches!(state, ThinkState::Resolved));
    }

    #[test]
    fn think_state_passes_through_remainder_once_prefix_diverges() {
        let mut state = ThinkState::Buffering(String::new());
        assert!(state.feed("<thi").is_none());
        let resolved = state.feed("nk was not it").unwrap();
        assert_eq!(resolved, "<think was not it");
    }

    #[test]
    fn think_state_once_resolved_is_a_pure_passthrough() {
        let mut state = ThinkState::Resolved;
        assert_eq!(state.feed("more text").unwrap(), "more text");
    }

    #[test]
    fn unterminated_think_block_never_resolves() {
        let mut state = ThinkState::Buffering(String::new());
        assert!(state.feed("<think>pondering forever, still going").is_none());
        assert!(matches!(state, ThinkState::Buffering(_)));
    }

    fn sentinel_call() -> tool_parser::ToolCall {
        tool_parser::ToolCall::parse_error("malformed_json", "boom", "{not json")
    }

    fn valid_call() -> tool_parser::ToolCall {
        tool_parser::ToolCall::new("call_1", "get_wifi", "{}".to_string())
    }

    #[test]
    fn retry_message_replaces_content_when_every_call_is_a_sentinel() {
        let mut content = "{not json".to_string();
        let calls = vec![sentinel_call(), sentinel_call()];
        substitute_retry_message_if_only_sentinels(&mut content, &calls);
        assert_eq!(content, "I had trouble formatting that tool call, let me try again.");
    }

    #[test]
    fn retry_message_is_untouched_when_a_valid_call_is_present() {
        let mut content = "here's my answer".to_string();
        let calls = vec![valid_call(), sentinel_call()];
        substitute_retry_message_if_only_sentinels(&mut content, &calls);
        assert_eq!(content, "here's my answer");
    }

    #[test]
    fn retry_message_is_untouched_when_there_are_no_tool_calls() {
        let mut content = "here's my answer".to_string();
        substitute_retry_message_if_only_sentinels(&mut content, &[]);
        assert_eq!(content, "here's my answer");
    }
}
