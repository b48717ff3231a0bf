//! One analysis run over an immutable dataset: column mapping, anomaly
//! detection, cohort analysis and insight generation. Deterministic stages
//! always produce output; the provider-backed insight stage degrades to
//! insights derived from the computed results.
//!
//! # Modules
//!
//! - [`context`]: structured summary handed to the insight provider
//! - [`fallback`]: deterministic insights from anomalies and cohorts
//! - [`pipeline`]: the `AnalysisPipeline` runner and its report

pub mod context;
pub mod fallback;
pub mod pipeline;

pub use pipeline::{AnalysisPipeline, AnalysisReport, InsightOutcome, InsightSource};
