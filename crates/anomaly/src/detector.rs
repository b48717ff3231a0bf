//! Anomaly detector: flags spikes, drops and sustained trend changes in
//! bucketed game metrics against a trailing baseline.
//!
//! Spike/drop: z-score above threshold AND |percent change| above a floor.
//! Trend change: first-half vs second-half mean of the trailing trend
//! window, shifted by more than a relative threshold and held by most
//! second-half buckets.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gamelens_core::config::{AnomalyConfig, SeverityBands, SeverityBasis};
use gamelens_core::{ColumnRole, ColumnRoles, Dataset, MetricKind, TimeRange};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::baseline::{percent_change, BaselineStats};
use crate::causes::possible_causes;
use crate::series::{BucketPoint, MetricSeries};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Spike,
    Drop,
    TrendChange,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::Spike => "spike",
            AnomalyType::Drop => "drop",
            AnomalyType::TrendChange => "trend_change",
        }
    }
}

/// Ordered severity bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AnomalySeverity {
    fn from_bands(magnitude: f64, bands: &SeverityBands) -> Self {
        if magnitude >= bands.critical {
            AnomalySeverity::Critical
        } else if magnitude >= bands.high {
            AnomalySeverity::High
        } else if magnitude >= bands.medium {
            AnomalySeverity::Medium
        } else {
            AnomalySeverity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalySeverity::Low => "low",
            AnomalySeverity::Medium => "medium",
            AnomalySeverity::High => "high",
            AnomalySeverity::Critical => "critical",
        }
    }
}

/// A detected deviation in one bucket of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub id: String,
    pub metric: MetricKind,
    pub bucket_key: String,
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub severity: AnomalySeverity,
    pub observed_value: f64,
    pub expected_value: f64,
    pub percent_change: f64,
    pub z_score: f64,
    pub description: String,
    pub possible_causes: Vec<String>,
    pub detected_at: DateTime<Utc>,
}

/// Output of one detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyReport {
    /// Most severe first.
    pub anomalies: Vec<Anomaly>,
    pub metrics_analyzed: Vec<MetricKind>,
    pub time_range: Option<TimeRange>,
    /// Baseline for the latest bucket of each metric that had enough data.
    pub baselines: BTreeMap<MetricKind, BaselineStats>,
    pub skipped_rows: usize,
}

impl AnomalyReport {
    fn empty(metrics_analyzed: Vec<MetricKind>, time_range: Option<TimeRange>) -> Self {
        Self {
            anomalies: Vec::new(),
            metrics_analyzed,
            time_range,
            baselines: BTreeMap::new(),
            skipped_rows: 0,
        }
    }
}

/// Minimum buckets (per half) for a trend comparison.
const MIN_TREND_HALF: usize = 2;

pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(AnomalyConfig::default())
    }
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Run detection for every metric the mapped columns support.
    /// Pure over `dataset`: the same input and config give the same report.
    pub fn detect(&self, dataset: &Dataset, roles: &ColumnRoles) -> AnomalyReport {
        let metrics = MetricKind::available(roles);
        let time_range = roles
            .column(ColumnRole::Timestamp)
            .and_then(|col| dataset.time_range(col));

        let Some(detected_at) = self.config.as_of.or(time_range.map(|r| r.end)) else {
            debug!(metrics = metrics.len(), "No parseable timestamps, skipping anomaly detection");
            return AnomalyReport::empty(metrics, time_range);
        };

        let mut report = AnomalyReport::empty(metrics.clone(), time_range);
        for metric in metrics {
            let granularity = self.config.granularity;
            let Some(series) = MetricSeries::build(dataset, roles, metric, granularity) else {
                continue;
            };
            report.skipped_rows = report.skipped_rows.max(series.skipped_rows);
            let (anomalies, baseline) = self.detect_series(&series, detected_at);
            if let Some(baseline) = baseline {
                report.baselines.insert(metric, baseline);
            }
            report.anomalies.extend(anomalies);
        }

        sort_anomalies(&mut report.anomalies);
        debug!(
            anomalies = report.anomalies.len(),
            metrics = report.metrics_analyzed.len(),
            skipped_rows = report.skipped_rows,
            "Anomaly detection complete"
        );
        report
    }

    /// Detect anomalies in a single series. Also returns the baseline that
    /// applies to the latest bucket, when there is enough data for one.
    pub fn detect_series(
        &self,
        series: &MetricSeries,
        detected_at: DateTime<Utc>,
    ) -> (Vec<Anomaly>, Option<BaselineStats>) {
        let usable: Vec<&BucketPoint> = series
            .points
            .iter()
            .filter(|p| p.samples >= self.config.min_bucket_samples)
            .collect();
        if usable.len() < 2 {
            return (Vec::new(), None);
        }

        let mut anomalies = Vec::new();
        for (idx, point) in series.points.iter().enumerate() {
            let Some(baseline) = self.baseline_before(&series.points, idx) else {
                continue;
            };
            if let Some(anomaly) = self.check_point(series.metric, point, &baseline, detected_at) {
                anomalies.push(anomaly);
            }
        }

        if let Some(anomaly) = self.check_trend(series.metric, &usable, detected_at) {
            anomalies.push(anomaly);
        }

        let latest = self.baseline_before(&series.points, series.points.len() - 1);
        (anomalies, latest)
    }

    /// Baseline from the trailing well-sampled buckets strictly before `idx`.
    fn baseline_before(&self, points: &[BucketPoint], idx: usize) -> Option<BaselineStats> {
        let window: Vec<f64> = points[..idx]
            .iter()
            .rev()
            .filter(|p| p.samples >= self.config.min_bucket_samples)
            .take(self.config.baseline_window)
            .map(|p| p.value)
            .collect();
        if window.len() < self.config.min_baseline_points.max(1) {
            return None;
        }
        BaselineStats::from_values(&window)
    }

    fn check_point(
        &self,
        metric: MetricKind,
        point: &BucketPoint,
        baseline: &BaselineStats,
        detected_at: DateTime<Utc>,
    ) -> Option<Anomaly> {
        let cfg = &self.config;
        let z = baseline.z_score(point.value, cfg.epsilon);
        let pct = percent_change(point.value, baseline.mean, cfg.epsilon);
        if z <= cfg.z_threshold || pct.abs() <= cfg.min_percent_change {
            return None;
        }

        let kind = if point.value > baseline.mean {
            AnomalyType::Spike
        } else {
            AnomalyType::Drop
        };
        let verb = if kind == AnomalyType::Spike { "rose" } else { "fell" };
        let description = format!(
            "{} {verb} to {:.2} in {}, {:+.1}% vs expected {:.2} ({:.1} std devs)",
            metric.as_str(),
            point.value,
            point.key,
            pct,
            baseline.mean,
            z.min(999.9)
        );
        Some(self.anomaly(
            metric,
            &point.key,
            kind,
            point.value,
            baseline.mean,
            pct,
            z,
            description,
            detected_at,
        ))
    }

    fn check_trend(
        &self,
        metric: MetricKind,
        usable: &[&BucketPoint],
        detected_at: DateTime<Utc>,
    ) -> Option<Anomaly> {
        let cfg = &self.config;
        let window = &usable[usable.len().saturating_sub(cfg.trend_window)..];
        let half = window.len() / 2;
        if half < MIN_TREND_HALF {
            return None;
        }
        let first: Vec<f64> = window[..half].iter().map(|p| p.value).collect();
        let second = &window[window.len() - half..];
        let second_values: Vec<f64> = second.iter().map(|p| p.value).collect();

        let before = BaselineStats::from_values(&first)?;
        let after = BaselineStats::from_values(&second_values)?;
        if before.mean.abs() < cfg.epsilon {
            return None;
        }
        let shift = (after.mean - before.mean) / before.mean.abs();
        if shift.abs() <= cfg.trend_threshold {
            return None;
        }

        let held = second_values
            .iter()
            .filter(|v| if shift > 0.0 { **v > before.mean } else { **v < before.mean })
            .count();
        if (held as f64) / (second_values.len() as f64) < cfg.trend_sustain_ratio {
            return None;
        }

        let pct = shift * 100.0;
        let z = before.z_score(after.mean, cfg.epsilon);
        let direction = if shift > 0.0 { "upward" } else { "downward" };
        let description = format!(
            "{} shows a sustained {direction} shift from {:.2} to {:.2} ({:+.1}%) starting {}",
            metric.as_str(),
            before.mean,
            after.mean,
            pct,
            second[0].key
        );
        Some(self.anomaly(
            metric,
            &second[0].key,
            AnomalyType::TrendChange,
            after.mean,
            before.mean,
            pct,
            z,
            description,
            detected_at,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn anomaly(
        &self,
        metric: MetricKind,
        bucket_key: &str,
        kind: AnomalyType,
        observed: f64,
        expected: f64,
        pct: f64,
        z: f64,
        description: String,
        detected_at: DateTime<Utc>,
    ) -> Anomaly {
        Anomaly {
            id: format!("{}:{}:{}", metric.as_str(), bucket_key, kind.as_str()),
            metric,
            bucket_key: bucket_key.to_string(),
            anomaly_type: kind,
            severity: self.severity(pct, z),
            observed_value: round2(observed),
            expected_value: round2(expected),
            percent_change: round2(pct),
            z_score: round2(z),
            description,
            possible_causes: possible_causes(
                metric,
                kind,
                &self.config.causes,
                self.config.max_causes,
            ),
            detected_at,
        }
    }

    /// Severity band for a deviation. Monotonic in |percent change|; with
    /// the `more_extreme` basis the z-score band can only raise it.
    pub fn severity(&self, percent_change: f64, z_score: f64) -> AnomalySeverity {
        let bands = &self.config.severity;
        let by_pct = AnomalySeverity::from_bands(percent_change.abs(), &bands.percent_bands);
        match bands.basis {
            SeverityBasis::PercentChange => by_pct,
            SeverityBasis::MoreExtreme => {
                by_pct.max(AnomalySeverity::from_bands(z_score.abs(), &bands.z_bands))
            }
        }
    }
}

fn sort_anomalies(anomalies: &mut [Anomaly]) {
    anomalies.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.percent_change.abs().total_cmp(&a.percent_change.abs()))
            .then_with(|| a.metric.cmp(&b.metric))
            .then_with(|| a.bucket_key.cmp(&b.bucket_key))
            .then_with(|| a.anomaly_type.as_str().cmp(b.anomaly_type.as_str()))
    });
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use gamelens_core::Row;
    use serde_json::json;

    fn roles() -> ColumnRoles {
        ColumnRoles::default()
            .with(ColumnRole::Timestamp, "ts")
            .with(ColumnRole::UserId, "uid")
            .with(ColumnRole::Revenue, "revenue")
    }

    fn day(n: i64) -> String {
        (Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::days(n)).to_rfc3339()
    }

    /// One row per day carrying that day's revenue.
    fn daily_revenue(values: &[f64]) -> Dataset {
        let rows: Vec<Row> = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                json!({"ts": day(i as i64), "uid": "u1", "revenue": v})
                    .as_object()
                    .unwrap()
                    .clone()
            })
            .collect();
        Dataset::from_rows(rows)
    }

    fn revenue_anomalies(report: &AnomalyReport) -> Vec<&Anomaly> {
        report
            .anomalies
            .iter()
            .filter(|a| a.metric == MetricKind::Revenue)
            .collect()
    }

    #[test]
    fn test_spike_after_flat_baseline_is_critical() {
        let mut values = vec![10.0; 30];
        values.push(1000.0);
        let report = AnomalyDetector::default().detect(&daily_revenue(&values), &roles());

        let revenue = revenue_anomalies(&report);
        let spike = revenue
            .iter()
            .find(|a| a.anomaly_type == AnomalyType::Spike)
            .expect("spike");
        assert_eq!(spike.bucket_key, "2024-01-31");
        assert!((spike.percent_change - 9900.0).abs() < 0.01);
        assert_eq!(spike.severity, AnomalySeverity::Critical);
        assert_eq!(spike.expected_value, 10.0);
        assert!(spike.possible_causes.len() <= 3);
        assert_eq!(report.anomalies[0].severity, AnomalySeverity::Critical);
    }

    #[test]
    fn test_constant_series_has_no_anomalies() {
        let report = AnomalyDetector::default().detect(&daily_revenue(&[10.0; 20]), &roles());
        assert!(report.anomalies.is_empty());
        assert_eq!(report.baselines[&MetricKind::Revenue].std_dev, 0.0);
    }

    #[test]
    fn test_single_point_returns_empty_with_metrics() {
        let report = AnomalyDetector::default().detect(&daily_revenue(&[10.0]), &roles());
        assert!(report.anomalies.is_empty());
        assert!(report.metrics_analyzed.contains(&MetricKind::Revenue));
        assert!(report.metrics_analyzed.contains(&MetricKind::ActiveUsers));
        assert!(report.time_range.is_some());
        assert!(report.baselines.is_empty());
    }

    #[test]
    fn test_no_timestamps_returns_empty() {
        let row = json!({"ts": "garbage", "uid": "u1", "revenue": 1});
        let rows = vec![row.as_object().unwrap().clone()];
        let report = AnomalyDetector::default().detect(&Dataset::from_rows(rows), &roles());
        assert!(report.anomalies.is_empty());
        assert!(report.time_range.is_none());
        assert!(!report.metrics_analyzed.is_empty());
    }

    #[test]
    fn test_drop_detected() {
        let values = [100.0, 102.0, 98.0, 101.0, 99.0, 100.0, 20.0];
        let report = AnomalyDetector::default().detect(&daily_revenue(&values), &roles());
        let drop = revenue_anomalies(&report)
            .into_iter()
            .find(|a| a.anomaly_type == AnomalyType::Drop)
            .expect("drop");
        assert!(drop.percent_change < -70.0);
        assert_eq!(drop.severity, AnomalySeverity::Medium);
    }

    #[test]
    fn test_percent_floor_blocks_negligible_moves() {
        // Tight baseline makes a 3% move statistically significant.
        let values = [100.0, 100.1, 99.9, 100.0, 100.1, 99.9, 103.0];
        let report = AnomalyDetector::default().detect(&daily_revenue(&values), &roles());
        assert!(revenue_anomalies(&report)
            .iter()
            .all(|a| a.anomaly_type != AnomalyType::Spike));
    }

    #[test]
    fn test_sustained_trend_change() {
        let mut values = vec![100.0; 7];
        values.extend([150.0, 155.0, 160.0, 158.0, 162.0, 165.0, 170.0]);
        let report = AnomalyDetector::default().detect(&daily_revenue(&values), &roles());
        let trend = revenue_anomalies(&report)
            .into_iter()
            .find(|a| a.anomaly_type == AnomalyType::TrendChange)
            .expect("trend change");
        assert_eq!(trend.bucket_key, "2024-01-08");
        assert!(trend.percent_change > 30.0);
    }

    #[test]
    fn test_single_blip_is_not_a_trend() {
        let mut values = vec![10.0; 30];
        values.push(1000.0);
        let report = AnomalyDetector::default().detect(&daily_revenue(&values), &roles());
        assert!(report
            .anomalies
            .iter()
            .all(|a| a.anomaly_type != AnomalyType::TrendChange));
    }

    #[test]
    fn test_detection_is_idempotent() {
        let values = [50.0, 52.0, 48.0, 51.0, 200.0, 49.0, 50.0, 5.0, 47.0, 53.0];
        let dataset = daily_revenue(&values);
        let detector = AnomalyDetector::default();
        let first = detector.detect(&dataset, &roles());
        let second = detector.detect(&dataset, &roles());
        assert_eq!(first, second);
        assert!(!first.anomalies.is_empty());
    }

    #[test]
    fn test_severity_monotonic_in_percent_change() {
        let detector = AnomalyDetector::default();
        let mut previous = AnomalySeverity::Low;
        for pct in [21.0, 35.0, 50.0, 75.0, 100.0, 150.0, 200.0, 5000.0] {
            let severity = detector.severity(pct, 3.0);
            assert!(severity >= previous);
            previous = severity;
        }
        assert_eq!(detector.severity(-250.0, 3.0), AnomalySeverity::Critical);
        // The default basis ignores the z-score, so spread never reorders severities.
        assert_eq!(detector.config().severity.basis, SeverityBasis::PercentChange);
        assert_eq!(detector.severity(60.0, 2.6), detector.severity(60.0, 900.0));
    }

    #[test]
    fn test_more_extreme_basis_uses_z_score() {
        let mut config = AnomalyConfig::default();
        config.severity.basis = SeverityBasis::MoreExtreme;
        let detector = AnomalyDetector::new(config);
        assert_eq!(detector.severity(25.0, 8.0), AnomalySeverity::Critical);
        assert_eq!(AnomalyDetector::default().severity(25.0, 8.0), AnomalySeverity::Low);
    }

    #[test]
    fn test_undersampled_buckets_excluded_from_baseline() {
        let mut config = AnomalyConfig::default();
        config.min_bucket_samples = 2;
        let mut rows: Vec<Row> = Vec::new();
        for d in 0..6 {
            for uid in ["a", "b"] {
                let row = json!({"ts": day(d), "uid": uid, "revenue": 5.0});
                rows.push(row.as_object().unwrap().clone());
            }
        }
        // Single-row bucket with a huge value must not poison the next baseline.
        let outlier = json!({"ts": day(6), "uid": "a", "revenue": 500.0});
        rows.push(outlier.as_object().unwrap().clone());
        for uid in ["a", "b"] {
            let row = json!({"ts": day(7), "uid": uid, "revenue": 5.0});
            rows.push(row.as_object().unwrap().clone());
        }
        let report = AnomalyDetector::new(config).detect(&Dataset::from_rows(rows), &roles());
        let baseline = report.baselines[&MetricKind::Revenue];
        assert_eq!(baseline.mean, 10.0);
        assert_eq!(baseline.std_dev, 0.0);
    }
}
