//! Catalog of time-bucketed game metrics.

use serde::{Deserialize, Serialize};

use crate::schema::{ColumnRole, ColumnRoles};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Sum of revenue in the bucket.
    Revenue,
    /// Distinct users active in the bucket.
    ActiveUsers,
    /// Number of event rows in the bucket.
    Events,
    /// Distinct sessions in the bucket.
    Sessions,
    /// Distinct users with positive revenue in the bucket.
    PayingUsers,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Revenue,
        MetricKind::ActiveUsers,
        MetricKind::Events,
        MetricKind::Sessions,
        MetricKind::PayingUsers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Revenue => "revenue",
            MetricKind::ActiveUsers => "active_users",
            MetricKind::Events => "events",
            MetricKind::Sessions => "sessions",
            MetricKind::PayingUsers => "paying_users",
        }
    }

    pub fn required_roles(&self) -> &'static [ColumnRole] {
        match self {
            MetricKind::Revenue => &[ColumnRole::Timestamp, ColumnRole::Revenue],
            MetricKind::ActiveUsers => &[ColumnRole::Timestamp, ColumnRole::UserId],
            MetricKind::Events => &[ColumnRole::Timestamp],
            MetricKind::Sessions => &[ColumnRole::Timestamp, ColumnRole::SessionId],
            MetricKind::PayingUsers => &[
                ColumnRole::Timestamp,
                ColumnRole::UserId,
                ColumnRole::Revenue,
            ],
        }
    }

    /// Metrics computable from the columns present in `roles`.
    pub fn available(roles: &ColumnRoles) -> Vec<MetricKind> {
        MetricKind::ALL
            .into_iter()
            .filter(|m| roles.missing(m.required_roles()).is_empty())
            .collect()
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_metrics_follow_roles() {
        let roles = ColumnRoles::default()
            .with(ColumnRole::Timestamp, "ts")
            .with(ColumnRole::UserId, "uid");
        assert_eq!(
            MetricKind::available(&roles),
            vec![MetricKind::ActiveUsers, MetricKind::Events]
        );
        assert!(MetricKind::available(&ColumnRoles::default()).is_empty());
    }
}
