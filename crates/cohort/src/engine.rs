//! Cohort engine: assigns users to cohorts and computes retention,
//! revenue and conversion per cohort.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use gamelens_core::config::CohortConfig;
use gamelens_core::types::{parse_timestamp, value_as_f64, value_as_key};
use gamelens_core::{ColumnRole, ColumnRoles, Dataset};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::comparison::{CohortComparison, RetentionMatrix};

/// Group of users sharing a first-activity bucket or dimension value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cohort {
    pub id: String,
    /// What the label describes, e.g. `first_week` or a column name.
    pub dimension: String,
    pub label: String,
    pub members: BTreeSet<String>,
    /// Horizon (days) -> retention % in [0, 100]; 0 when nobody is eligible.
    pub retention: BTreeMap<u32, f64>,
    pub eligible: BTreeMap<u32, usize>,
    pub retained: BTreeMap<u32, usize>,
    /// Sum of positive revenue from members.
    pub total_revenue: f64,
    pub paying_users: usize,
    /// payingUsers / size, in [0, 1].
    pub conversion_rate: f64,
    /// Row index of the cohort's earliest first-activity row; orders ties.
    pub first_seen: usize,
}

impl Cohort {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn retention_at(&self, horizon: u32) -> f64 {
        self.retention.get(&horizon).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortReport {
    /// Sorted by label.
    pub cohorts: Vec<Cohort>,
    pub comparison: CohortComparison,
    pub matrix: RetentionMatrix,
    pub as_of: DateTime<Utc>,
    /// Set when required columns are missing or no row was usable.
    pub insufficient_data: Option<String>,
    pub skipped_rows: usize,
}

struct UserActivity {
    first_ts: DateTime<Utc>,
    first_row: usize,
    active_days: BTreeSet<NaiveDate>,
    revenue: f64,
}

pub struct CohortEngine {
    config: CohortConfig,
}

impl Default for CohortEngine {
    fn default() -> Self {
        Self::new(CohortConfig::default())
    }
}

impl CohortEngine {
    pub fn new(config: CohortConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CohortConfig {
        &self.config
    }

    pub fn analyze(&self, dataset: &Dataset, roles: &ColumnRoles) -> CohortReport {
        let as_of = self.config.as_of.unwrap_or_else(Utc::now);

        let (Some(user_col), Some(ts_col)) = (
            roles.column(ColumnRole::UserId),
            roles.column(ColumnRole::Timestamp),
        ) else {
            let missing: Vec<String> = roles
                .missing(&[ColumnRole::UserId, ColumnRole::Timestamp])
                .iter()
                .map(|r| r.to_string())
                .collect();
            let reason = format!("missing required columns: {}", missing.join(", "));
            return self.empty(as_of, reason, 0);
        };
        let revenue_col = roles.column(ColumnRole::Revenue);

        let mut users: HashMap<String, UserActivity> = HashMap::new();
        let mut skipped_rows = 0;

        for (idx, row) in dataset.rows.iter().enumerate() {
            let user = row.get(user_col).and_then(value_as_key);
            let ts = row.get(ts_col).and_then(parse_timestamp);
            let (Some(user), Some(ts)) = (user, ts) else {
                skipped_rows += 1;
                continue;
            };
            let revenue = revenue_col
                .and_then(|c| row.get(c))
                .and_then(value_as_f64)
                .filter(|v| *v > 0.0)
                .unwrap_or(0.0);

            let activity = users.entry(user).or_insert_with(|| UserActivity {
                first_ts: ts,
                first_row: idx,
                active_days: BTreeSet::new(),
                revenue: 0.0,
            });
            // Strictly earlier only: equal timestamps keep the first row.
            if ts < activity.first_ts {
                activity.first_ts = ts;
                activity.first_row = idx;
            }
            activity.active_days.insert(ts.date_naive());
            activity.revenue += revenue;
        }

        if users.is_empty() {
            let reason = "no rows with a valid user id and timestamp".to_string();
            return self.empty(as_of, reason, skipped_rows);
        }

        let dimension = match &self.config.dimension {
            Some(column) => column.clone(),
            None => format!("first_{}", self.config.granularity.as_str()),
        };

        let mut groups: BTreeMap<String, Vec<(&String, &UserActivity)>> = BTreeMap::new();
        for (user, activity) in &users {
            groups.entry(self.label_for(dataset, activity)).or_default().push((user, activity));
        }

        let today = as_of.date_naive();
        let cohorts: Vec<Cohort> = groups
            .into_iter()
            .map(|(label, members)| self.build_cohort(&dimension, label, &members, today))
            .collect();

        let comparison = CohortComparison::compare(&cohorts, &self.config);
        let matrix = RetentionMatrix::from_cohorts(&cohorts, &self.config.horizons);

        debug!(
            cohorts = cohorts.len(),
            users = users.len(),
            skipped_rows,
            "Cohort analysis complete"
        );

        CohortReport {
            cohorts,
            comparison,
            matrix,
            as_of,
            insufficient_data: None,
            skipped_rows,
        }
    }

    fn label_for(&self, dataset: &Dataset, activity: &UserActivity) -> String {
        match &self.config.dimension {
            Some(column) => dataset
                .rows
                .get(activity.first_row)
                .and_then(|row| row.get(column))
                .and_then(value_as_key)
                .unwrap_or_else(|| "unknown".to_string()),
            None => self.config.granularity.bucket_key(activity.first_ts),
        }
    }

    fn build_cohort(
        &self,
        dimension: &str,
        label: String,
        members: &[(&String, &UserActivity)],
        today: NaiveDate,
    ) -> Cohort {
        let mut eligible = BTreeMap::new();
        let mut retained = BTreeMap::new();
        let mut retention = BTreeMap::new();

        for &horizon in &self.config.horizons {
            let mut eligible_count = 0usize;
            let mut retained_count = 0usize;
            for (_, activity) in members {
                let first_day = activity.first_ts.date_naive();
                if (today - first_day).num_days() < i64::from(horizon) {
                    continue;
                }
                eligible_count += 1;
                if activity
                    .active_days
                    .contains(&(first_day + Duration::days(i64::from(horizon))))
                {
                    retained_count += 1;
                }
            }
            let pct = if eligible_count == 0 {
                0.0
            } else {
                round2(retained_count as f64 / eligible_count as f64 * 100.0)
            };
            eligible.insert(horizon, eligible_count);
            retained.insert(horizon, retained_count);
            retention.insert(horizon, pct.clamp(0.0, 100.0));
        }

        let total_revenue = members.iter().map(|(_, a)| a.revenue).sum::<f64>();
        let paying_users = members.iter().filter(|(_, a)| a.revenue > 0.0).count();
        let conversion_rate = round2(paying_users as f64 / members.len() as f64);

        Cohort {
            id: format!("cohort:{label}"),
            dimension: dimension.to_string(),
            members: members.iter().map(|(user, _)| (*user).clone()).collect(),
            retention,
            eligible,
            retained,
            total_revenue: round2(total_revenue),
            paying_users,
            conversion_rate,
            first_seen: members.iter().map(|(_, a)| a.first_row).min().unwrap_or(0),
            label,
        }
    }

    fn empty(&self, as_of: DateTime<Utc>, reason: String, skipped_rows: usize) -> CohortReport {
        debug!(reason = %reason, "Cohort analysis skipped");
        CohortReport {
            cohorts: Vec::new(),
            comparison: CohortComparison::compare(&[], &self.config),
            matrix: RetentionMatrix::from_cohorts(&[], &self.config.horizons),
            as_of,
            insufficient_data: Some(reason),
            skipped_rows,
        }
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
