//! Dataset model: loosely-typed event rows plus value coercion helpers.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::{GameLensError, GameLensResult};

/// One event record: column name -> raw JSON value.
pub type Row = serde_json::Map<String, Value>;

/// Ingestion metadata supplied alongside the rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMetadata {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub row_count: usize,
}

/// An immutable snapshot of tabular game-analytics events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub metadata: DatasetMetadata,
}

impl Dataset {
    /// Build a dataset from rows, deriving the column list from first appearance.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        let row_count = rows.len();
        Self {
            columns,
            rows,
            metadata: DatasetMetadata {
                source: "inline".to_string(),
                fetched_at: None,
                row_count,
            },
        }
    }

    /// Load a dataset from a JSON file in `{columns, rows, metadata}` form.
    pub fn load_json(path: impl AsRef<Path>) -> GameLensResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut dataset: Dataset = serde_json::from_str(&raw)?;
        if dataset.columns.is_empty() && !dataset.rows.is_empty() {
            dataset = Dataset::from_rows(dataset.rows);
        }
        if dataset.columns.is_empty() {
            return Err(GameLensError::Dataset(format!(
                "{} contains no columns",
                path.as_ref().display()
            )));
        }
        dataset.metadata.row_count = dataset.rows.len();
        tracing::debug!(
            path = %path.as_ref().display(),
            rows = dataset.rows.len(),
            columns = dataset.columns.len(),
            "Dataset loaded"
        );
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First `n` rows, used as a sample for classifiers and prompts.
    pub fn sample(&self, n: usize) -> Vec<Row> {
        self.rows.iter().take(n).cloned().collect()
    }

    /// Earliest and latest parseable timestamp in `column`.
    pub fn time_range(&self, column: &str) -> Option<TimeRange> {
        let mut range: Option<TimeRange> = None;
        for ts in self.rows.iter().filter_map(|r| r.get(column).and_then(parse_timestamp)) {
            range = Some(match range {
                None => TimeRange { start: ts, end: ts },
                Some(r) => TimeRange {
                    start: r.start.min(ts),
                    end: r.end.max(ts),
                },
            });
        }
        range
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Coerce a value to f64: numbers, numeric strings and booleans.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Coerce a value to a non-empty identifier string.
pub fn value_as_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse a timestamp from RFC 3339, common SQL-ish layouts, a bare date,
/// or unix seconds / milliseconds. Anything else is `None`.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    const LAYOUTS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S",
    ];
    for layout in LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, layout) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for layout in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, layout) {
            return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
        }
    }
    s.parse::<f64>().ok().and_then(from_epoch)
}

// Values above 1e11 are treated as milliseconds.
fn from_epoch(raw: f64) -> Option<DateTime<Utc>> {
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    let millis = if raw > 1e11 { raw } else { raw * 1000.0 };
    DateTime::from_timestamp_millis(millis as i64)
}
