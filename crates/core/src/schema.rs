//! Semantic column schema: canonical roles and role lookups.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::types::{parse_timestamp, Row};

/// Canonical meaning of a raw dataset column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    UserId,
    SessionId,
    EventName,
    Timestamp,
    Revenue,
    Currency,
    Level,
    Score,
    Country,
    Platform,
    Device,
    AppVersion,
    SessionDuration,
    ItemId,
    Quantity,
    Unknown,
    Noise,
}

impl ColumnRole {
    /// Every semantic role, excluding the `Unknown`/`Noise` markers.
    pub const SEMANTIC: [ColumnRole; 15] = [
        ColumnRole::UserId,
        ColumnRole::SessionId,
        ColumnRole::EventName,
        ColumnRole::Timestamp,
        ColumnRole::Revenue,
        ColumnRole::Currency,
        ColumnRole::Level,
        ColumnRole::Score,
        ColumnRole::Country,
        ColumnRole::Platform,
        ColumnRole::Device,
        ColumnRole::AppVersion,
        ColumnRole::SessionDuration,
        ColumnRole::ItemId,
        ColumnRole::Quantity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnRole::UserId => "user_id",
            ColumnRole::SessionId => "session_id",
            ColumnRole::EventName => "event_name",
            ColumnRole::Timestamp => "timestamp",
            ColumnRole::Revenue => "revenue",
            ColumnRole::Currency => "currency",
            ColumnRole::Level => "level",
            ColumnRole::Score => "score",
            ColumnRole::Country => "country",
            ColumnRole::Platform => "platform",
            ColumnRole::Device => "device",
            ColumnRole::AppVersion => "app_version",
            ColumnRole::SessionDuration => "session_duration",
            ColumnRole::ItemId => "item_id",
            ColumnRole::Quantity => "quantity",
            ColumnRole::Unknown => "unknown",
            ColumnRole::Noise => "noise",
        }
    }

    /// Lenient parse used when reading classifier output.
    pub fn parse(raw: &str) -> Option<ColumnRole> {
        let normalized = raw.trim().to_lowercase().replace(['-', ' '], "_");
        ColumnRole::SEMANTIC
            .iter()
            .chain([ColumnRole::Unknown, ColumnRole::Noise].iter())
            .find(|role| role.as_str() == normalized)
            .copied()
    }

    pub fn is_semantic(&self) -> bool {
        !matches!(self, ColumnRole::Unknown | ColumnRole::Noise)
    }

    /// Human-readable label for explanations.
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl std::fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage type inferred from sample values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferredType {
    Integer,
    Float,
    Boolean,
    Timestamp,
    String,
    #[default]
    Unknown,
}

impl InferredType {
    pub fn parse(raw: &str) -> InferredType {
        match raw.trim().to_lowercase().as_str() {
            "integer" | "int" => InferredType::Integer,
            "float" | "number" | "numeric" | "decimal" => InferredType::Float,
            "boolean" | "bool" => InferredType::Boolean,
            "timestamp" | "date" | "datetime" => InferredType::Timestamp,
            "string" | "text" | "categorical" => InferredType::String,
            _ => InferredType::Unknown,
        }
    }
}

/// Semantic interpretation of one raw column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub original_name: String,
    pub canonical_role: ColumnRole,
    pub inferred_type: InferredType,
    /// Always within [0, 1].
    pub confidence: f64,
    pub rationale: String,
}

/// Infer the column type from the non-null sample values of `column`.
pub fn infer_type(column: &str, sample: &[Row]) -> InferredType {
    let values: Vec<&Value> = sample
        .iter()
        .filter_map(|row| row.get(column))
        .filter(|v| !v.is_null())
        .collect();
    if values.is_empty() {
        return InferredType::Unknown;
    }
    if values.iter().all(|v| v.is_boolean()) {
        return InferredType::Boolean;
    }
    if values.iter().all(|v| v.as_i64().is_some() || v.as_u64().is_some()) {
        return InferredType::Integer;
    }
    if values.iter().all(|v| v.is_number()) {
        return InferredType::Float;
    }
    let strings: Vec<&str> = values.iter().filter_map(|v| v.as_str()).collect();
    if strings.len() == values.len() {
        if strings.iter().all(|s| s.trim().parse::<i64>().is_ok()) {
            return InferredType::Integer;
        }
        if strings.iter().all(|s| s.trim().parse::<f64>().is_ok()) {
            return InferredType::Float;
        }
        if values.iter().all(|v| parse_timestamp(v).is_some()) {
            return InferredType::Timestamp;
        }
        return InferredType::String;
    }
    InferredType::Unknown
}

/// Role -> column lookup derived from a mapping. The first column
/// mapped to a role wins; `Unknown` and `Noise` are never indexed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnRoles {
    by_role: BTreeMap<ColumnRole, String>,
}

impl ColumnRoles {
    pub fn from_mappings(mappings: &[ColumnMapping]) -> Self {
        let mut by_role = BTreeMap::new();
        for mapping in mappings.iter().filter(|m| m.canonical_role.is_semantic()) {
            by_role
                .entry(mapping.canonical_role)
                .or_insert_with(|| mapping.original_name.clone());
        }
        Self { by_role }
    }

    pub fn with(mut self, role: ColumnRole, column: impl Into<String>) -> Self {
        self.by_role.insert(role, column.into());
        self
    }

    pub fn column(&self, role: ColumnRole) -> Option<&str> {
        self.by_role.get(&role).map(String::as_str)
    }

    pub fn has(&self, role: ColumnRole) -> bool {
        self.by_role.contains_key(&role)
    }

    /// Roles from `required` that have no column.
    pub fn missing(&self, required: &[ColumnRole]) -> Vec<ColumnRole> {
        required.iter().filter(|r| !self.has(**r)).copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ColumnRole, &str)> {
        self.by_role.iter().map(|(role, col)| (*role, col.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping(name: &str, role: ColumnRole) -> ColumnMapping {
        ColumnMapping {
            original_name: name.to_string(),
            canonical_role: role,
            inferred_type: InferredType::String,
            confidence: 1.0,
            rationale: String::new(),
        }
    }

    #[test]
    fn test_role_parse_roundtrip() {
        for role in ColumnRole::SEMANTIC {
            assert_eq!(ColumnRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(ColumnRole::parse("User-Id"), Some(ColumnRole::UserId));
        assert_eq!(ColumnRole::parse("player_mood"), None);
    }

    #[test]
    fn test_roles_first_mapping_wins() {
        let roles = ColumnRoles::from_mappings(&[
            mapping("uid", ColumnRole::UserId),
            mapping("player", ColumnRole::UserId),
            mapping("debug_hash", ColumnRole::Noise),
        ]);
        assert_eq!(roles.column(ColumnRole::UserId), Some("uid"));
        assert!(!roles.has(ColumnRole::Noise));
        assert_eq!(
            roles.missing(&[ColumnRole::UserId, ColumnRole::Timestamp]),
            vec![ColumnRole::Timestamp]
        );
    }

    #[test]
    fn test_infer_type() {
        let sample: Vec<Row> = vec![
            json!({"n": 1, "f": 1.5, "s": "abc", "t": "2024-01-01T00:00:00Z", "b": true})
                .as_object()
                .unwrap()
                .clone(),
            json!({"n": 2, "f": 2, "s": "def", "t": "2024-01-02T00:00:00Z", "b": false})
                .as_object()
                .unwrap()
                .clone(),
        ];
        assert_eq!(infer_type("n", &sample), InferredType::Integer);
        assert_eq!(infer_type("f", &sample), InferredType::Float);
        assert_eq!(infer_type("s", &sample), InferredType::String);
        assert_eq!(infer_type("t", &sample), InferredType::Timestamp);
        assert_eq!(infer_type("b", &sample), InferredType::Boolean);
        assert_eq!(infer_type("missing", &sample), InferredType::Unknown);
    }
}
