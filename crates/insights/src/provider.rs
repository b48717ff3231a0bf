//! The completion provider seam.
//!
//! Implementations turn a rendered prompt pair into raw text. They know
//! nothing about caching, admission control or response contracts; the
//! orchestrator layers those on top.

use async_trait::async_trait;
use gamelens_core::config::ProviderConfig;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_response_tokens: u32,
    pub response_format: ResponseFormat,
}

impl CompletionRequest {
    /// A JSON-mode request using the configured sampling options.
    pub fn json(system_prompt: String, user_prompt: String, config: &ProviderConfig) -> Self {
        Self {
            system_prompt,
            user_prompt,
            temperature: config.temperature,
            max_response_tokens: config.max_response_tokens,
            response_format: ResponseFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub cached: bool,
    pub model: String,
    pub duration_ms: u64,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for metrics/logging.
    fn name(&self) -> &str;

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;
}
