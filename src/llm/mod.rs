//! C4: LLM HTTP client.

pub mod client;
pub mod payload;

pub use client::{LlmClient, LlmClientConfig, ProviderKind};
pub use payload::{CompletionResult, InferenceConfigs, LoadModelConfigs};
