//! Baseline statistics and anomaly detection over time-bucketed metrics.
//!
//! # Modules
//!
//! - [`series`]: Bucket dataset rows into per-metric series
//! - [`baseline`]: Mean / population std-dev / median over a trailing window
//! - [`detector`]: Spike, drop and trend-change detection with severity bands
//! - [`causes`]: Metric-specific likely-cause heuristics

pub mod baseline;
pub mod causes;
pub mod detector;
pub mod series;

pub use baseline::BaselineStats;
pub use detector::{Anomaly, AnomalyDetector, AnomalyReport, AnomalySeverity, AnomalyType};
pub use series::{BucketPoint, MetricSeries};
