use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::time::Granularity;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `GAMELENS__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    #[serde(default)]
    pub cohort: CohortConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

// ─── Column Mapping Config ──────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct MappingConfig {
    /// Classifier results below this confidence are re-checked by the alias matcher.
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f64,
    /// Multiplier applied to a matcher result that overrides the classifier.
    #[serde(default = "default_validation_penalty")]
    pub validation_penalty: f64,
    /// Multiplier applied to every result when the classifier is unavailable.
    #[serde(default = "default_fallback_penalty")]
    pub fallback_penalty: f64,
    /// Minimum token-overlap ratio for a similarity match.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
    #[serde(default = "default_noise_keywords")]
    pub noise_keywords: Vec<String>,
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
}
fn default_low_confidence_threshold() -> f64 {
    0.8
}
fn default_validation_penalty() -> f64 {
    0.9
}
fn default_fallback_penalty() -> f64 {
    0.8
}
fn default_min_similarity() -> f64 {
    0.5
}
fn default_noise_keywords() -> Vec<String> {
    ["debug", "hash", "secret", "token", "internal", "checksum", "tmp", "temp", "trace", "test"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_sample_rows() -> usize {
    5
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: default_low_confidence_threshold(),
            validation_penalty: default_validation_penalty(),
            fallback_penalty: default_fallback_penalty(),
            min_similarity: default_min_similarity(),
            noise_keywords: default_noise_keywords(),
            sample_rows: default_sample_rows(),
        }
    }
}

// ─── Anomaly Config ─────────────────────────────────────────────────────

/// Which deviation measure drives the severity band.
///
/// `PercentChange` is the default: a larger |percent change| on the same
/// metric never gets a lower severity, which a z-score band cannot promise
/// when baselines differ in spread. `MoreExtreme` rates by whichever of the
/// two measures falls in the higher band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityBasis {
    /// Bands on |percent change| only.
    #[default]
    PercentChange,
    /// The higher of the z-score band and the percent-change band.
    MoreExtreme,
}

/// Ascending lower bounds for each severity band.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SeverityBands {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeverityConfig {
    #[serde(default)]
    pub basis: SeverityBasis,
    #[serde(default = "default_percent_bands")]
    pub percent_bands: SeverityBands,
    #[serde(default = "default_z_bands")]
    pub z_bands: SeverityBands,
}
fn default_percent_bands() -> SeverityBands {
    SeverityBands {
        low: 20.0,
        medium: 50.0,
        high: 100.0,
        critical: 200.0,
    }
}
fn default_z_bands() -> SeverityBands {
    SeverityBands {
        low: 2.5,
        medium: 3.5,
        high: 5.0,
        critical: 7.0,
    }
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            basis: SeverityBasis::default(),
            percent_bands: default_percent_bands(),
            z_bands: default_z_bands(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyConfig {
    #[serde(default)]
    pub granularity: Granularity,
    /// Buckets with fewer rows than this never enter a baseline.
    #[serde(default = "default_min_bucket_samples")]
    pub min_bucket_samples: usize,
    /// Trailing buckets used to compute a baseline.
    #[serde(default = "default_baseline_window")]
    pub baseline_window: usize,
    #[serde(default = "default_min_baseline_points")]
    pub min_baseline_points: usize,
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,
    /// Minimum |percent change| for a spike or drop.
    #[serde(default = "default_min_percent_change")]
    pub min_percent_change: f64,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Trailing buckets compared half-vs-half for trend changes.
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
    /// Relative shift between half means that counts as a trend change.
    #[serde(default = "default_trend_threshold")]
    pub trend_threshold: f64,
    /// Share of second-half buckets that must sit beyond the first-half mean.
    #[serde(default = "default_trend_sustain_ratio")]
    pub trend_sustain_ratio: f64,
    #[serde(default)]
    pub severity: SeverityConfig,
    #[serde(default = "default_max_causes")]
    pub max_causes: usize,
    /// Overrides for cause lists, keyed `"<metric>.<type>"` (e.g. `revenue.drop`).
    #[serde(default)]
    pub causes: BTreeMap<String, Vec<String>>,
    /// Timestamp stamped on detected anomalies; latest event time when unset.
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}
fn default_min_bucket_samples() -> usize {
    1
}
fn default_baseline_window() -> usize {
    14
}
fn default_min_baseline_points() -> usize {
    3
}
fn default_z_threshold() -> f64 {
    2.5
}
fn default_min_percent_change() -> f64 {
    20.0
}
fn default_epsilon() -> f64 {
    1e-9
}
fn default_trend_window() -> usize {
    14
}
fn default_trend_threshold() -> f64 {
    0.3
}
fn default_trend_sustain_ratio() -> f64 {
    0.66
}
fn default_max_causes() -> usize {
    3
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::Day,
            min_bucket_samples: default_min_bucket_samples(),
            baseline_window: default_baseline_window(),
            min_baseline_points: default_min_baseline_points(),
            z_threshold: default_z_threshold(),
            min_percent_change: default_min_percent_change(),
            epsilon: default_epsilon(),
            trend_window: default_trend_window(),
            trend_threshold: default_trend_threshold(),
            trend_sustain_ratio: default_trend_sustain_ratio(),
            severity: SeverityConfig::default(),
            max_causes: default_max_causes(),
            causes: BTreeMap::new(),
            as_of: None,
        }
    }
}

// ─── Cohort Config ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CohortConfig {
    #[serde(default = "default_cohort_granularity")]
    pub granularity: Granularity,
    /// Column whose value (at the user's first row) labels the cohort.
    #[serde(default)]
    pub dimension: Option<String>,
    #[serde(default = "default_horizons")]
    pub horizons: Vec<u32>,
    /// Horizon used to pick best and worst cohorts.
    #[serde(default = "default_compare_horizon")]
    pub compare_horizon: u32,
    #[serde(default = "default_trend_threshold_pts")]
    pub trend_threshold_pts: f64,
    #[serde(default = "default_max_insights")]
    pub max_insights: usize,
    /// Reference "now" for tenure; wall clock when unset.
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}
fn default_cohort_granularity() -> Granularity {
    Granularity::Week
}
fn default_horizons() -> Vec<u32> {
    vec![1, 3, 7, 14, 30]
}
fn default_compare_horizon() -> u32 {
    7
}
fn default_trend_threshold_pts() -> f64 {
    5.0
}
fn default_max_insights() -> usize {
    5
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            granularity: default_cohort_granularity(),
            dimension: None,
            horizons: default_horizons(),
            compare_horizon: default_compare_horizon(),
            trend_threshold_pts: default_trend_threshold_pts(),
            max_insights: default_max_insights(),
            as_of: None,
        }
    }
}

// ─── Completion Provider Config ─────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_endpoint")]
    pub endpoint: String,
    /// No provider is constructed without a key.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_provider_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}
fn default_provider_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_provider_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_response_tokens() -> u32 {
    1500
}
fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_provider_endpoint(),
            api_key: None,
            model: default_provider_model(),
            temperature: default_temperature(),
            max_response_tokens: default_max_response_tokens(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

// ─── Response Cache Config ──────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}
fn default_cache_ttl_secs() -> u64 {
    30 * 60
}
fn default_cache_max_entries() -> usize {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            max_entries: default_cache_max_entries(),
        }
    }
}

// ─── Rate Limit Config ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}
fn default_requests_per_minute() -> usize {
    20
}
fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            window_secs: default_window_secs(),
        }
    }
}

// ─── Query Config ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Rows included in the orchestrator context.
    #[serde(default = "default_query_sample_rows")]
    pub sample_rows: usize,
}
fn default_query_sample_rows() -> usize {
    5
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            sample_rows: default_query_sample_rows(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file and environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("GAMELENS")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.cache.ttl_secs, 1800);
        assert_eq!(config.rate_limit.requests_per_minute, 20);
        assert_eq!(config.cohort.horizons, vec![1, 3, 7, 14, 30]);
        assert_eq!(config.mapping.low_confidence_threshold, 0.8);
        assert!(config.provider.api_key.is_none());
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "anomaly": {"z_threshold": 3.0, "granularity": "week"},
                "cache": {"ttl_secs": 60}
            }"#,
        )
        .unwrap();
        assert_eq!(config.anomaly.z_threshold, 3.0);
        assert_eq!(config.anomaly.granularity, Granularity::Week);
        assert_eq!(config.anomaly.baseline_window, 14);
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.max_entries, 1000);
    }
}
