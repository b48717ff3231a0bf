//! Insight orchestrator: cache, rate limiter and contract validation wrapped
//! around an optional completion provider.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gamelens_cache::{cache_key, ResponseCache};
use gamelens_core::config::ProviderConfig;
use gamelens_core::AppConfig;
use gamelens_semantic::{ClassificationRequest, ClassificationResponse};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::contract::{validate_json, InsightSet, QueryAnswer, ResponseContract};
use crate::error::ProviderError;
use crate::prompt::{self, RenderedPrompt};
use crate::provider::{CompletionProvider, CompletionRequest, TokenUsage};
use crate::rate_limit::RateLimiter;

/// A contract-validated provider result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Validated<T> {
    pub value: T,
    /// Zero on cache hits.
    pub usage: TokenUsage,
    pub cached: bool,
    pub model: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorStats {
    pub requests: u64,
    pub cache_hits: u64,
    pub provider_calls: u64,
    pub provider_errors: u64,
    pub contract_failures: u64,
    pub tokens_used: u64,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    provider_calls: AtomicU64,
    provider_errors: AtomicU64,
    contract_failures: AtomicU64,
    tokens_used: AtomicU64,
}

pub struct InsightOrchestrator {
    provider: Option<Arc<dyn CompletionProvider>>,
    cache: Arc<ResponseCache>,
    limiter: Arc<RateLimiter>,
    config: ProviderConfig,
    counters: Counters,
}

impl InsightOrchestrator {
    pub fn new(
        provider: Option<Arc<dyn CompletionProvider>>,
        cache: Arc<ResponseCache>,
        limiter: Arc<RateLimiter>,
        config: ProviderConfig,
    ) -> Self {
        Self {
            provider,
            cache,
            limiter,
            config,
            counters: Counters::default(),
        }
    }

    /// Build with a fresh cache and limiter sized from configuration.
    pub fn from_config(config: &AppConfig, provider: Option<Arc<dyn CompletionProvider>>) -> Self {
        info!(
            provider = provider.as_ref().map(|p| p.name()).unwrap_or("none"),
            cache_ttl_secs = config.cache.ttl_secs,
            requests_per_minute = config.rate_limit.requests_per_minute,
            "Insight orchestrator initialized"
        );
        Self::new(
            provider,
            Arc::new(ResponseCache::from_config(&config.cache)),
            Arc::new(RateLimiter::from_config(&config.rate_limit)),
            config.provider.clone(),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub async fn generate_insights(
        &self,
        context: &Value,
    ) -> Result<Validated<InsightSet>, ProviderError> {
        self.complete_validated(prompt::insight_prompt(context)).await
    }

    pub async fn answer_question(
        &self,
        question: &str,
        context: &Value,
    ) -> Result<Validated<QueryAnswer>, ProviderError> {
        self.complete_validated(prompt::question_prompt(question, context))
            .await
    }

    pub async fn classify_columns(
        &self,
        request: &ClassificationRequest,
    ) -> Result<Validated<ClassificationResponse>, ProviderError> {
        self.complete_validated(prompt::classification_prompt(request))
            .await
    }

    /// Serve from cache when a valid entry exists; otherwise wait for rate
    /// capacity, call the provider under a deadline, validate and cache.
    pub async fn complete_validated<T: ResponseContract>(
        &self,
        prompt: RenderedPrompt,
    ) -> Result<Validated<T>, ProviderError> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let request = CompletionRequest::json(prompt.system, prompt.user, &self.config);
        let temperature = request.temperature.to_string();
        let key = cache_key(&[
            T::NAME,
            &self.config.model,
            &temperature,
            &request.system_prompt,
            &request.user_prompt,
        ]);

        if let Some(entry) = self.cache.get(&key) {
            match validate_json::<T>(&entry.serialized_response) {
                Ok(value) => {
                    self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                    debug!(contract = T::NAME, key = %key, "Serving cached response");
                    return Ok(Validated {
                        value,
                        usage: TokenUsage::default(),
                        cached: true,
                        model: entry.model,
                        duration_ms: 0,
                    });
                }
                Err(e) => {
                    debug!(contract = T::NAME, error = %e, "Cached response failed revalidation");
                    self.cache.remove(&key);
                }
            }
        }

        let provider = self.provider.as_ref().ok_or(ProviderError::NotConfigured)?;

        let waited = self.limiter.acquire().await;
        if !waited.is_zero() {
            debug!(waited_ms = waited.as_millis() as u64, "Admitted after rate-limit wait");
        }

        self.counters.provider_calls.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("insights.provider.call").increment(1);

        let deadline = Duration::from_millis(self.config.request_timeout_ms);
        let response = match tokio::time::timeout(deadline, provider.complete(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.record_error(provider.name(), e)),
            Err(_) => {
                let e = ProviderError::Timeout(self.config.request_timeout_ms);
                return Err(self.record_error(provider.name(), e));
            }
        };

        self.counters
            .tokens_used
            .fetch_add(u64::from(response.usage.total_tokens), Ordering::Relaxed);

        let value = match validate_json::<T>(&response.content) {
            Ok(value) => value,
            Err(e) => {
                self.counters.contract_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    contract = T::NAME,
                    provider = provider.name(),
                    error = %e,
                    "Provider response violated contract"
                );
                return Err(e.into());
            }
        };

        self.cache.put(
            key,
            response.content,
            response.usage.total_tokens,
            response.model.clone(),
        );

        Ok(Validated {
            value,
            usage: response.usage,
            cached: false,
            model: response.model,
            duration_ms: response.duration_ms,
        })
    }

    fn record_error(&self, provider: &str, e: ProviderError) -> ProviderError {
        self.counters.provider_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("insights.provider.error", "kind" => e.kind()).increment(1);
        warn!(
            provider = provider,
            error = %e,
            recoverable = e.is_recoverable(),
            "Completion provider call failed"
        );
        e
    }

    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            provider_calls: self.counters.provider_calls.load(Ordering::Relaxed),
            provider_errors: self.counters.provider_errors.load(Ordering::Relaxed),
            contract_failures: self.counters.contract_failures.load(Ordering::Relaxed),
            tokens_used: self.counters.tokens_used.load(Ordering::Relaxed),
        }
    }
}
