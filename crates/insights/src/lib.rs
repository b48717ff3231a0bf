//! Provider-facing layer of the pipeline.
//!
//! Everything that talks to an external completion provider goes through
//! [`InsightOrchestrator`]: responses are cached by prompt hash, calls are
//! admitted through a sliding-window [`RateLimiter`], and raw output is
//! validated against a typed contract before anyone sees it.
//!
//! # Modules
//!
//! - [`provider`]: the `CompletionProvider` seam and its request/response types
//! - [`http`]: OpenAI-compatible chat-completions provider
//! - [`rate_limit`]: rolling-window admission control
//! - [`contract`]: JSON response contracts and validation
//! - [`prompt`]: deterministic prompt rendering
//! - [`orchestrator`]: cache + limiter + validation around a provider
//! - [`classifier`]: column classifier backed by the orchestrator

pub mod classifier;
pub mod contract;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod rate_limit;

pub use classifier::LlmColumnClassifier;
pub use contract::{
    validate_json, AggregateFunction, Aggregation, FilterOperator, GeneratedInsight,
    InsightCategory, InsightSet, QueryAnswer, QueryFilter, QueryLogic, ResponseContract,
};
pub use error::{ContractError, ProviderError};
pub use http::HttpCompletionProvider;
pub use orchestrator::{InsightOrchestrator, OrchestratorStats, Validated};
pub use provider::{
    CompletionProvider, CompletionRequest, CompletionResponse, ResponseFormat, TokenUsage,
};
pub use rate_limit::RateLimiter;
