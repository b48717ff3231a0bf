//! Cross-cohort comparison and the label x horizon retention matrix.

use std::collections::BTreeMap;

use gamelens_core::config::CohortConfig;
use serde::{Deserialize, Serialize};

use crate::engine::{round2, Cohort};

/// Narrative strings are never more than this many.
pub const MAX_INSIGHTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortComparison {
    /// Horizon used to rank cohorts (D7 by default).
    pub horizon: u32,
    pub best_cohort: Option<String>,
    pub worst_cohort: Option<String>,
    /// Mean retention per horizon over cohorts with a non-zero value.
    pub average_retention: BTreeMap<u32, f64>,
    /// Mean conversion rate over all cohorts, in [0, 1].
    pub average_conversion: f64,
    pub insights: Vec<String>,
}

impl CohortComparison {
    pub fn compare(cohorts: &[Cohort], config: &CohortConfig) -> Self {
        let horizon = config.compare_horizon;

        let average_retention = config
            .horizons
            .iter()
            .map(|&h| {
                let values: Vec<f64> = cohorts
                    .iter()
                    .map(|c| c.retention_at(h))
                    .filter(|v| *v > 0.0)
                    .collect();
                let avg = if values.is_empty() {
                    0.0
                } else {
                    round2(values.iter().sum::<f64>() / values.len() as f64)
                };
                (h, avg)
            })
            .collect();

        let average_conversion = if cohorts.is_empty() {
            0.0
        } else {
            round2(cohorts.iter().map(|c| c.conversion_rate).sum::<f64>() / cohorts.len() as f64)
        };

        // Ranking walks cohorts in first-seen order; strict comparisons keep
        // the earliest cohort on ties.
        let mut ranked: Vec<&Cohort> = cohorts
            .iter()
            .filter(|c| c.retention_at(horizon) > 0.0)
            .collect();
        ranked.sort_by_key(|c| c.first_seen);
        let mut best: Option<&Cohort> = None;
        let mut worst: Option<&Cohort> = None;
        for cohort in &ranked {
            let value = cohort.retention_at(horizon);
            if best.map_or(true, |b| value > b.retention_at(horizon)) {
                best = Some(cohort);
            }
            if worst.map_or(true, |w| value < w.retention_at(horizon)) {
                worst = Some(cohort);
            }
        }

        let insights = narrate(cohorts, best, worst, horizon, average_conversion, config);

        Self {
            horizon,
            best_cohort: best.map(|c| c.label.clone()),
            worst_cohort: worst.map(|c| c.label.clone()),
            average_retention,
            average_conversion,
            insights,
        }
    }
}

fn narrate(
    cohorts: &[Cohort],
    best: Option<&Cohort>,
    worst: Option<&Cohort>,
    horizon: u32,
    average_conversion: f64,
    config: &CohortConfig,
) -> Vec<String> {
    let mut insights = Vec::new();
    if cohorts.is_empty() {
        return insights;
    }

    if let (Some(best), Some(worst)) = (best, worst) {
        if best.label != worst.label {
            let (b, w) = (best.retention_at(horizon), worst.retention_at(horizon));
            insights.push(format!(
                "Cohort {} has the best D{horizon} retention at {b:.2}%, \
                 {:.2} pts above cohort {} ({w:.2}%)",
                best.label,
                b - w,
                worst.label
            ));
        }
    }

    // Cohorts too young for the horizon have no measurable retention yet.
    let measurable: Vec<&Cohort> = cohorts
        .iter()
        .filter(|c| c.eligible.get(&horizon).copied().unwrap_or(0) > 0)
        .collect();
    if let (Some(first), Some(last)) = (measurable.first(), measurable.last()) {
        if measurable.len() > 1 {
            let delta = last.retention_at(horizon) - first.retention_at(horizon);
            if delta.abs() > config.trend_threshold_pts {
                let direction = if delta > 0.0 { "improved" } else { "declined" };
                insights.push(format!(
                    "D{horizon} retention {direction} by {:.2} pts from cohort {} to cohort {}",
                    delta.abs(),
                    first.label,
                    last.label
                ));
            }
        }
    }

    insights.push(format!(
        "Average conversion rate across {} cohort(s) is {:.1}%",
        cohorts.len(),
        average_conversion * 100.0
    ));

    let largest = cohorts
        .iter()
        .max_by(|a, b| a.size().cmp(&b.size()).then(b.first_seen.cmp(&a.first_seen)));
    if let Some(largest) = largest {
        if cohorts.len() > 1 {
            insights.push(format!(
                "Largest cohort is {} with {} users",
                largest.label,
                largest.size()
            ));
        }
    }

    let nonzero = |h: u32| -> Vec<f64> {
        cohorts
            .iter()
            .map(|c| c.retention_at(h))
            .filter(|v| *v > 0.0)
            .collect()
    };
    let d1 = nonzero(1);
    let dn = nonzero(horizon);
    if !d1.is_empty() && !dn.is_empty() && horizon > 1 {
        let d1_avg = d1.iter().sum::<f64>() / d1.len() as f64;
        let dn_avg = dn.iter().sum::<f64>() / dn.len() as f64;
        insights.push(format!(
            "Retention falls from {d1_avg:.1}% on D1 to {dn_avg:.1}% on D{horizon}"
        ));
    }

    insights.truncate(config.max_insights.min(MAX_INSIGHTS));
    insights
}

/// Retention values laid out as rows (cohort labels) by columns (horizons).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionMatrix {
    pub labels: Vec<String>,
    pub horizons: Vec<u32>,
    pub values: Vec<Vec<f64>>,
}

impl RetentionMatrix {
    pub fn from_cohorts(cohorts: &[Cohort], horizons: &[u32]) -> Self {
        Self {
            labels: cohorts.iter().map(|c| c.label.clone()).collect(),
            horizons: horizons.to_vec(),
            values: cohorts
                .iter()
                .map(|c| horizons.iter().map(|h| c.retention_at(*h)).collect())
                .collect(),
        }
    }

    pub fn get(&self, label: &str, horizon: u32) -> Option<f64> {
        let row = self.labels.iter().position(|l| l == label)?;
        let col = self.horizons.iter().position(|h| *h == horizon)?;
        self.values.get(row)?.get(col).copied()
    }
}
