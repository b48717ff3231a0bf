//! Time bucketing shared by the anomaly and cohort engines.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Width of a time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    Day,
    Week,
    Month,
}

impl Granularity {
    /// Sortable bucket label: `2024-03-05`, `2024-W10`, `2024-03`.
    /// Lexicographic order of labels matches chronological order.
    pub fn bucket_key(&self, ts: DateTime<Utc>) -> String {
        let date = ts.date_naive();
        match self {
            Granularity::Day => date.format("%Y-%m-%d").to_string(),
            Granularity::Week => {
                let iso = date.iso_week();
                format!("{}-W{:02}", iso.year(), iso.week())
            }
            Granularity::Month => date.format("%Y-%m").to_string(),
        }
    }

    /// First calendar day of the bucket containing `ts`.
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> NaiveDate {
        let date = ts.date_naive();
        match self {
            Granularity::Day => date,
            Granularity::Week => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Granularity::Month => date.with_day(1).unwrap_or(date),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bucket_keys() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 6, 15, 0, 0).unwrap();
        assert_eq!(Granularity::Day.bucket_key(ts), "2024-03-06");
        assert_eq!(Granularity::Week.bucket_key(ts), "2024-W10");
        assert_eq!(Granularity::Month.bucket_key(ts), "2024-03");
    }

    #[test]
    fn test_bucket_start() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 6, 15, 0, 0).unwrap();
        assert_eq!(
            Granularity::Week.bucket_start(ts),
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
        );
        assert_eq!(
            Granularity::Month.bucket_start(ts),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
    }

    #[test]
    fn test_week_keys_sort_chronologically() {
        let a = Granularity::Week.bucket_key(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap());
        let b = Granularity::Week.bucket_key(Utc.with_ymd_and_hms(2024, 2, 20, 0, 0, 0).unwrap());
        assert!(a < b);
    }
}
