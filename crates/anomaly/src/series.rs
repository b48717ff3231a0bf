//! Metric series: per-bucket aggregates of dataset rows.

use std::collections::{BTreeMap, HashSet};

use gamelens_core::types::{parse_timestamp, value_as_f64, value_as_key};
use gamelens_core::{ColumnRole, ColumnRoles, Dataset, Granularity, MetricKind, Row};
use serde::{Deserialize, Serialize};

/// One bucket of a metric series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketPoint {
    pub key: String,
    pub value: f64,
    /// Rows that fell into this bucket.
    pub samples: usize,
}

/// Ordered (bucketKey, value) pairs for one metric at one granularity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSeries {
    pub metric: MetricKind,
    pub granularity: Granularity,
    pub points: Vec<BucketPoint>,
    /// Rows dropped for an unparseable timestamp.
    pub skipped_rows: usize,
}

#[derive(Default)]
struct BucketAcc {
    rows: usize,
    revenue: f64,
    users: HashSet<String>,
    sessions: HashSet<String>,
    payers: HashSet<String>,
}

impl MetricSeries {
    /// Bucket `dataset` for `metric`. Returns `None` when a required
    /// role has no column.
    pub fn build(
        dataset: &Dataset,
        roles: &ColumnRoles,
        metric: MetricKind,
        granularity: Granularity,
    ) -> Option<Self> {
        if !roles.missing(metric.required_roles()).is_empty() {
            return None;
        }
        let ts_col = roles.column(ColumnRole::Timestamp)?;
        let user_col = roles.column(ColumnRole::UserId);
        let session_col = roles.column(ColumnRole::SessionId);
        let revenue_col = roles.column(ColumnRole::Revenue);

        let mut buckets: BTreeMap<String, BucketAcc> = BTreeMap::new();
        let mut skipped_rows = 0;

        for row in &dataset.rows {
            let Some(ts) = row.get(ts_col).and_then(parse_timestamp) else {
                skipped_rows += 1;
                continue;
            };
            let acc = buckets.entry(granularity.bucket_key(ts)).or_default();
            acc.rows += 1;

            let user = user_col.and_then(|c| key_of(row, c));
            let revenue = revenue_col
                .and_then(|c| row.get(c))
                .and_then(value_as_f64)
                .unwrap_or(0.0);
            acc.revenue += revenue;
            if let Some(user) = user {
                if revenue > 0.0 {
                    acc.payers.insert(user.clone());
                }
                acc.users.insert(user);
            }
            if let Some(session) = session_col.and_then(|c| key_of(row, c)) {
                acc.sessions.insert(session);
            }
        }

        let points = buckets
            .into_iter()
            .map(|(key, acc)| {
                let value = match metric {
                    MetricKind::Revenue => acc.revenue,
                    MetricKind::ActiveUsers => acc.users.len() as f64,
                    MetricKind::Events => acc.rows as f64,
                    MetricKind::Sessions => acc.sessions.len() as f64,
                    MetricKind::PayingUsers => acc.payers.len() as f64,
                };
                BucketPoint {
                    key,
                    value,
                    samples: acc.rows,
                }
            })
            .collect();

        Some(Self {
            metric,
            granularity,
            points,
            skipped_rows,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn key_of(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(value_as_key)
}
