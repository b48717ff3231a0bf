//! Response contracts.
//!
//! Provider output is untrusted text. Each contract turns it into a typed
//! value or a [`ContractError`]: required fields must be present with the
//! right JSON type, enum fields are clamped to known members, and numeric
//! fields are clamped to their valid ranges.

use gamelens_core::{ColumnMapping, ColumnRole, InferredType};
use gamelens_semantic::ClassificationResponse;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ContractError;

pub trait ResponseContract: Sized {
    /// Distinguishes contracts in cache keys and logs.
    const NAME: &'static str;

    fn validate(value: Value) -> Result<Self, ContractError>;
}

/// Parse raw provider text as JSON and validate it against `T`.
pub fn validate_json<T: ResponseContract>(raw: &str) -> Result<T, ContractError> {
    let value: Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| ContractError::InvalidJson(e.to_string()))?;
    T::validate(value)
}

/// Providers sometimes wrap JSON in a markdown fence.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// ─── Field helpers ──────────────────────────────────────────────────────

fn as_object(value: Value, field: &str) -> Result<Map<String, Value>, ContractError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ContractError::WrongType {
            field: field.to_string(),
            expected: "an object",
        }),
    }
}

fn required_str(obj: &Map<String, Value>, field: &str) -> Result<String, ContractError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(ContractError::MissingField(field.to_string())),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ContractError::WrongType {
            field: field.to_string(),
            expected: "a string",
        }),
    }
}

fn optional_str(obj: &Map<String, Value>, field: &str) -> Option<String> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
}

fn required_array(obj: &Map<String, Value>, field: &str) -> Result<Vec<Value>, ContractError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(ContractError::MissingField(field.to_string())),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(ContractError::WrongType {
            field: field.to_string(),
            expected: "an array",
        }),
    }
}

/// Numeric field clamped into `[min, max]`; absent or non-numeric gives `default`.
fn clamped_number(obj: &Map<String, Value>, field: &str, min: f64, max: f64, default: f64) -> f64 {
    let raw = match obj.get(field) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(v) if v.is_finite() => v.clamp(min, max),
        _ => default,
    }
}

fn string_list(obj: &Map<String, Value>, field: &str) -> Vec<String> {
    obj.get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ─── Insight Contract ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    Retention,
    Monetization,
    Engagement,
    Progression,
    Anomaly,
    General,
}

impl InsightCategory {
    /// Unknown categories clamp to `General`.
    pub fn parse(raw: &str) -> InsightCategory {
        match raw.trim().to_lowercase().as_str() {
            "retention" | "churn" => InsightCategory::Retention,
            "monetization" | "revenue" => InsightCategory::Monetization,
            "engagement" => InsightCategory::Engagement,
            "progression" => InsightCategory::Progression,
            "anomaly" | "anomalies" => InsightCategory::Anomaly,
            _ => InsightCategory::General,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedInsight {
    pub title: String,
    pub description: String,
    pub category: InsightCategory,
    /// 1 (lowest) to 10 (highest).
    pub priority: u8,
    pub confidence: f64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightSet {
    pub insights: Vec<GeneratedInsight>,
    pub summary: String,
}

impl ResponseContract for InsightSet {
    const NAME: &'static str = "insight_set";

    fn validate(value: Value) -> Result<Self, ContractError> {
        let root = as_object(value, "$")?;
        let summary = required_str(&root, "summary")?;
        let insights = required_array(&root, "insights")?
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                let obj = as_object(item, &format!("insights[{i}]"))?;
                Ok(GeneratedInsight {
                    title: required_str(&obj, "title")?,
                    description: required_str(&obj, "description")?,
                    category: optional_str(&obj, "category")
                        .map(|c| InsightCategory::parse(&c))
                        .unwrap_or(InsightCategory::General),
                    priority: clamped_number(&obj, "priority", 1.0, 10.0, 5.0).round() as u8,
                    confidence: clamped_number(&obj, "confidence", 0.0, 1.0, 0.5),
                    recommendations: string_list(&obj, "recommendations"),
                })
            })
            .collect::<Result<Vec<_>, ContractError>>()?;
        Ok(Self { insights, summary })
    }
}

// ─── Q&A Contract ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
}

impl FilterOperator {
    pub fn parse(raw: &str) -> Option<FilterOperator> {
        match raw.trim().to_lowercase().as_str() {
            "eq" | "=" | "==" | "equals" => Some(FilterOperator::Eq),
            "neq" | "ne" | "!=" | "<>" | "not_equals" => Some(FilterOperator::Neq),
            "gt" | ">" => Some(FilterOperator::Gt),
            "lt" | "<" => Some(FilterOperator::Lt),
            "gte" | ">=" => Some(FilterOperator::Gte),
            "lte" | "<=" => Some(FilterOperator::Lte),
            "contains" | "like" => Some(FilterOperator::Contains),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Sum,
    Avg,
    Count,
    Max,
    Min,
}

impl AggregateFunction {
    pub fn parse(raw: &str) -> Option<AggregateFunction> {
        match raw.trim().to_lowercase().as_str() {
            "sum" | "total" => Some(AggregateFunction::Sum),
            "avg" | "average" | "mean" => Some(AggregateFunction::Avg),
            "count" => Some(AggregateFunction::Count),
            "max" | "maximum" => Some(AggregateFunction::Max),
            "min" | "minimum" => Some(AggregateFunction::Min),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Count => "count",
            AggregateFunction::Max => "max",
            AggregateFunction::Min => "min",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub column: String,
    pub operator: FilterOperator,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub function: AggregateFunction,
    /// `count` may omit the column.
    pub column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLogic {
    pub filters: Vec<QueryFilter>,
    pub aggregations: Vec<Aggregation>,
    pub group_by: Option<String>,
}

impl QueryLogic {
    fn validate(value: Value) -> Result<Self, ContractError> {
        let obj = as_object(value, "queryLogic")?;
        let filters = obj
            .get("filters")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(parse_filter).collect::<Result<Vec<_>, _>>())
            .transpose()?
            .unwrap_or_default();
        let aggregations = obj
            .get("aggregations")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(parse_aggregation).collect::<Result<Vec<_>, _>>())
            .transpose()?
            .unwrap_or_default();
        Ok(Self {
            filters,
            aggregations,
            group_by: optional_str(&obj, "groupBy"),
        })
    }
}

fn parse_filter(value: &Value) -> Result<QueryFilter, ContractError> {
    let obj = as_object(value.clone(), "queryLogic.filters[]")?;
    let operator = required_str(&obj, "operator")?;
    Ok(QueryFilter {
        column: required_str(&obj, "column")?,
        operator: FilterOperator::parse(&operator).ok_or_else(|| ContractError::WrongType {
            field: "queryLogic.filters[].operator".to_string(),
            expected: "one of eq, neq, gt, lt, gte, lte, contains",
        })?,
        value: obj.get("value").cloned().unwrap_or(Value::Null),
    })
}

fn parse_aggregation(value: &Value) -> Result<Aggregation, ContractError> {
    let obj = as_object(value.clone(), "queryLogic.aggregations[]")?;
    let function = required_str(&obj, "function")?;
    let function = AggregateFunction::parse(&function).ok_or_else(|| ContractError::WrongType {
        field: "queryLogic.aggregations[].function".to_string(),
        expected: "one of sum, avg, count, max, min",
    })?;
    let column = optional_str(&obj, "column");
    if column.is_none() && function != AggregateFunction::Count {
        return Err(ContractError::MissingField("queryLogic.aggregations[].column".into()));
    }
    Ok(Aggregation { function, column })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnswer {
    pub answer: String,
    pub confidence: f64,
    pub query_logic: Option<QueryLogic>,
    pub follow_up_questions: Vec<String>,
}

impl ResponseContract for QueryAnswer {
    const NAME: &'static str = "query_answer";

    fn validate(value: Value) -> Result<Self, ContractError> {
        let root = as_object(value, "$")?;
        // Unusable query logic is dropped rather than executed partially.
        let query_logic = match root.get("queryLogic") {
            None | Some(Value::Null) => None,
            Some(raw) => match QueryLogic::validate(raw.clone()) {
                Ok(logic) => Some(logic),
                Err(e) => {
                    debug!(error = %e, "Discarding invalid query logic");
                    None
                }
            },
        };
        Ok(Self {
            answer: required_str(&root, "answer")?,
            confidence: clamped_number(&root, "confidence", 0.0, 1.0, 0.5),
            query_logic,
            follow_up_questions: string_list(&root, "followUpQuestions"),
        })
    }
}

// ─── Column Classification Contract ─────────────────────────────────────

impl ResponseContract for ClassificationResponse {
    const NAME: &'static str = "column_classification";

    fn validate(value: Value) -> Result<Self, ContractError> {
        let root = as_object(value, "$")?;
        let columns = required_array(&root, "columns")?
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                let obj = as_object(item, &format!("columns[{i}]"))?;
                let role = required_str(&obj, "canonicalRole")?;
                Ok(ColumnMapping {
                    original_name: required_str(&obj, "originalName")?,
                    canonical_role: ColumnRole::parse(&role).unwrap_or(ColumnRole::Unknown),
                    inferred_type: optional_str(&obj, "inferredType")
                        .map(|t| InferredType::parse(&t))
                        .unwrap_or_default(),
                    confidence: clamped_number(&obj, "confidence", 0.0, 1.0, 0.0),
                    rationale: optional_str(&obj, "rationale").unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, ContractError>>()?;

        Ok(ClassificationResponse {
            columns,
            game_type: optional_str(&root, "gameType"),
            suggested_charts: string_list(&root, "suggestedCharts"),
            warnings: string_list(&root, "warnings"),
            data_quality: clamped_number(&root, "dataQuality", 0.0, 1.0, 0.0),
        })
    }
}
