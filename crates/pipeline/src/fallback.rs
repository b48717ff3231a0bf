//! Insights derived directly from computed results, used whenever the
//! provider-backed pass is unavailable or fails.

use gamelens_anomaly::{Anomaly, AnomalyReport, AnomalySeverity, AnomalyType};
use gamelens_cohort::CohortReport;
use gamelens_insights::{GeneratedInsight, InsightCategory, InsightSet};

const MAX_ANOMALY_INSIGHTS: usize = 3;

fn priority(severity: AnomalySeverity) -> u8 {
    match severity {
        AnomalySeverity::Critical => 9,
        AnomalySeverity::High => 7,
        AnomalySeverity::Medium => 5,
        AnomalySeverity::Low => 3,
    }
}

fn anomaly_insight(anomaly: &Anomaly) -> GeneratedInsight {
    let kind = match anomaly.anomaly_type {
        AnomalyType::Spike => "spike",
        AnomalyType::Drop => "drop",
        AnomalyType::TrendChange => "trend change",
    };
    GeneratedInsight {
        title: format!(
            "{} {} in {} ({})",
            anomaly.severity.as_str(),
            kind,
            anomaly.metric.as_str().replace('_', " "),
            anomaly.bucket_key
        ),
        description: anomaly.description.clone(),
        category: InsightCategory::Anomaly,
        priority: priority(anomaly.severity),
        confidence: 0.8,
        recommendations: anomaly
            .possible_causes
            .iter()
            .map(|cause| format!("Check whether this was caused by: {cause}"))
            .collect(),
    }
}

pub fn fallback_insights(anomalies: &AnomalyReport, cohorts: &CohortReport) -> InsightSet {
    let mut insights: Vec<GeneratedInsight> = anomalies
        .anomalies
        .iter()
        .take(MAX_ANOMALY_INSIGHTS)
        .map(anomaly_insight)
        .collect();

    let comparison = &cohorts.comparison;
    if let (Some(best), Some(worst)) = (&comparison.best_cohort, &comparison.worst_cohort) {
        if best != worst {
            insights.push(GeneratedInsight {
                title: format!("Retention varies between cohorts {best} and {worst}"),
                description: comparison
                    .insights
                    .first()
                    .cloned()
                    .unwrap_or_else(|| {
                        format!("Cohort {best} retains best at D{}", comparison.horizon)
                    }),
                category: InsightCategory::Retention,
                priority: 6,
                confidence: 0.7,
                recommendations: vec![format!(
                    "Compare onboarding and acquisition sources of cohort {best} \
                     with cohort {worst}"
                )],
            });
        }
    }

    if !cohorts.cohorts.is_empty() {
        insights.push(GeneratedInsight {
            title: "Paying user conversion".to_string(),
            description: format!(
                "On average {:.1}% of each cohort made a purchase",
                comparison.average_conversion * 100.0
            ),
            category: InsightCategory::Monetization,
            priority: 5,
            confidence: 0.7,
            recommendations: Vec::new(),
        });
    }

    if insights.is_empty() {
        insights.push(GeneratedInsight {
            title: "Not enough data for insights".to_string(),
            description: cohorts
                .insufficient_data
                .clone()
                .unwrap_or_else(|| {
                    "No anomalies or cohorts could be computed from this dataset".to_string()
                }),
            category: InsightCategory::General,
            priority: 2,
            confidence: 1.0,
            recommendations: vec![
                "Make sure the dataset has user id, timestamp and revenue columns".to_string(),
            ],
        });
    }

    let summary = format!(
        "{} anomal{} across {} metric(s); {} cohort(s) analyzed.",
        anomalies.anomalies.len(),
        if anomalies.anomalies.len() == 1 { "y" } else { "ies" },
        anomalies.metrics_analyzed.len(),
        cohorts.cohorts.len()
    );

    InsightSet { insights, summary }
}
