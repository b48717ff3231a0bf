//! Run summary handed to the insight provider as prompt context.

use gamelens_anomaly::AnomalyReport;
use gamelens_cohort::CohortReport;
use gamelens_core::Dataset;
use gamelens_semantic::MappingResult;
use serde_json::{json, Value};

/// Anomalies beyond this many are summarized by count only.
const MAX_CONTEXT_ANOMALIES: usize = 10;

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Summary of a run for the insight provider. Contains no run ids or wall
/// clock values, so the same data renders the same prompt.
pub fn insight_context(
    dataset: &Dataset,
    mapping: &MappingResult,
    anomalies: &AnomalyReport,
    cohorts: &CohortReport,
) -> Value {
    let roles: serde_json::Map<String, Value> = mapping
        .roles()
        .iter()
        .map(|(role, column)| (role.as_str().to_string(), Value::String(column.to_string())))
        .collect();

    let top: Vec<Value> = anomalies
        .anomalies
        .iter()
        .take(MAX_CONTEXT_ANOMALIES)
        .map(|a| {
            json!({
                "metric": a.metric.as_str(),
                "bucket": a.bucket_key,
                "type": a.anomaly_type.as_str(),
                "severity": a.severity.as_str(),
                "observed": round1(a.observed_value),
                "expected": round1(a.expected_value),
                "percentChange": round1(a.percent_change),
                "possibleCauses": a.possible_causes,
            })
        })
        .collect();

    let baselines: serde_json::Map<String, Value> = anomalies
        .baselines
        .iter()
        .map(|(metric, stats)| {
            (
                metric.as_str().to_string(),
                json!({
                    "mean": round1(stats.mean),
                    "stdDev": round1(stats.std_dev),
                    "median": round1(stats.median),
                }),
            )
        })
        .collect();

    let cohort_sizes: Vec<Value> = cohorts
        .cohorts
        .iter()
        .map(|c| {
            json!({
                "label": c.label,
                "size": c.size(),
                "retention": c.retention,
                "conversionRate": c.conversion_rate,
            })
        })
        .collect();

    json!({
        "rowCount": dataset.len(),
        "gameType": mapping.game_type,
        "columnRoles": roles,
        "mappingQuality": mapping.quality_score,
        "timeRange": anomalies.time_range.map(|r| json!({
            "start": r.start.to_rfc3339(),
            "end": r.end.to_rfc3339(),
        })),
        "metricsAnalyzed": anomalies.metrics_analyzed,
        "baselines": baselines,
        "anomalyCount": anomalies.anomalies.len(),
        "anomalies": top,
        "cohorts": cohort_sizes,
        "cohortComparison": cohorts.comparison,
        "cohortNote": cohorts.insufficient_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gamelens_anomaly::AnomalyDetector;
    use gamelens_cohort::CohortEngine;
    use gamelens_core::config::{AnomalyConfig, CohortConfig, MappingConfig};
    use gamelens_semantic::SemanticColumnMapper;

    fn dataset() -> Dataset {
        let rows: Vec<Value> = (1..=12)
            .map(|day| {
                json!({
                    "user_id": format!("u{}", day % 4),
                    "timestamp": format!("2024-01-{day:02}T08:00:00Z"),
                    "revenue": if day == 12 { 400.0 } else { 4.0 },
                })
            })
            .collect();
        Dataset::from_rows(rows.into_iter().filter_map(|v| v.as_object().cloned()).collect())
    }

    async fn render(data: &Dataset) -> Value {
        let as_of = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).single();
        let mapping = SemanticColumnMapper::new(MappingConfig::default()).map_dataset(data).await;
        let roles = mapping.roles();
        let anomalies = AnomalyDetector::new(AnomalyConfig {
            as_of,
            ..AnomalyConfig::default()
        })
        .detect(data, &roles);
        let cohorts = CohortEngine::new(CohortConfig {
            as_of,
            ..CohortConfig::default()
        })
        .analyze(data, &roles);
        insight_context(data, &mapping, &anomalies, &cohorts)
    }

    #[tokio::test]
    async fn test_context_is_stable_across_runs() {
        let data = dataset();
        let first = render(&data).await;
        let second = render(&data).await;
        assert_eq!(first, second);
        assert_eq!(first["rowCount"], 12);
        assert_eq!(first["columnRoles"]["user_id"], "user_id");
        assert!(first.get("runId").is_none());
        assert!(first["anomalies"][0].get("detectedAt").is_none());
    }
}
