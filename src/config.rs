//! Ambient configuration structs tying the LLM client, MCP session, and
//! orchestrator together. Deserializable from YAML.

use serde::{Deserialize, Serialize};

use crate::llm::{InferenceConfigs, LoadModelConfigs, ProviderKind};
use smg_mcp::McpSessionConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    pub backend_url: String,
    pub model: String,
    #[serde(default = "default_provider_kind")]
    pub provider_kind: ConfigProviderKind,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default)]
    pub inference_configs: InferenceConfigsDto,
    #[serde(default)]
    pub n_ctx: Option<u32>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigProviderKind {
    Local,
    Cloud,
}

impl From<ConfigProviderKind> for ProviderKind {
    fn from(kind: ConfigProviderKind) -> Self {
        match kind {
            ConfigProviderKind::Local => ProviderKind::Local,
            ConfigProviderKind::Cloud => ProviderKind::Cloud,
        }
    }
}

fn default_provider_kind() -> ConfigProviderKind {
    ConfigProviderKind::Local
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_stream() -> bool {
    true
}

/// Mirrors `llm::InferenceConfigs` with `Deserialize` derived for config
/// loading; the wire type lives in `llm::payload` to keep that module
/// request/response-shape only.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InferenceConfigsDto {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub min_p: Option<f32>,
    #[serde(default)]
    pub repetition_penalty: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
}

impl From<InferenceConfigsDto> for InferenceConfigs {
    fn from(dto: InferenceConfigsDto) -> Self {
        InferenceConfigs {
            temperature: dto.temperature,
            top_p: dto.top_p,
            top_k: dto.top_k,
            min_p: dto.min_p,
            repetition_penalty: dto.repetition_penalty,
            max_tokens: dto.max_tokens,
            stop: dto.stop,
        }
    }
}

impl LlmConfig {
    pub fn load_model_configs(&self) -> Option<LoadModelConfigs> {
        self.n_ctx.map(|n_ctx| LoadModelConfigs { n_ctx: Some(n_ctx) })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_max_iterations() -> u32 {
    5
}

fn default_history_capacity() -> usize {
    100
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            history_capacity: default_history_capacity(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoreConfig {
    pub llm: LlmConfig,
    pub mcp: McpSessionConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl CoreConfig {
    pub async fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = tokio::fs::read_to_string(path).await?;
        let config: CoreConfig = serde_yaml::from_str(&raw)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orchestrator_defaults_match_the_reason_act_bound() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.history_capacity, 100);
    }

    #[test]
    fn yaml_round_trips_a_minimal_core_config() {
        let yaml = r#"
llm:
  backend_url: "http://127.0.0.1:8080"
  model: "local-model"
mcp:
  command: "python3"
  args: ["server.py"]
"#;
        let config: CoreConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.llm.backend_url, "http://127.0.0.1:8080");
        assert_eq!(config.orchestrator.max_iterations, 5);
        assert!(matches!(config.llm.provider_kind, ConfigProviderKind::Local));
    }
}
