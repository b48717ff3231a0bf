//! Deterministic execution of provider-suggested query logic.
//!
//! Filters are ANDed. Only the first aggregation is executed; any further
//! aggregations are counted in the evidence but not computed.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use gamelens_core::types::{value_as_f64, value_as_key};
use gamelens_core::{ColumnRole, ColumnRoles, Dataset, Row};
use gamelens_insights::{AggregateFunction, FilterOperator, QueryFilter, QueryLogic};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const NO_GROUP: &str = "(none)";

/// Computed corroboration for an orchestrated answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryEvidence {
    pub logic: QueryLogic,
    /// e.g. `sum(revenue)`; `None` when no aggregation was requested.
    pub aggregation: Option<String>,
    pub value: Option<f64>,
    /// Per-group values when the logic has a group-by.
    pub groups: BTreeMap<String, f64>,
    pub rows_matched: usize,
    pub ignored_aggregations: usize,
    /// Columns that matched neither a raw column nor a mapped role.
    pub unresolved_columns: Vec<String>,
}

pub fn execute(logic: &QueryLogic, dataset: &Dataset, roles: &ColumnRoles) -> QueryEvidence {
    let mut unresolved = Vec::new();
    let mut resolve = |name: &str| -> Option<String> {
        let column = resolve_column(name, dataset, roles);
        if column.is_none() && !unresolved.iter().any(|u| u == name) {
            unresolved.push(name.to_string());
        }
        column
    };

    let filters: Vec<(Option<String>, &QueryFilter)> = logic
        .filters
        .iter()
        .map(|f| (resolve(&f.column), f))
        .collect();
    let aggregation = logic.aggregations.first();
    let agg_column = aggregation.and_then(|a| a.column.as_deref()).and_then(&mut resolve);
    let group_column = logic.group_by.as_deref().and_then(&mut resolve);

    let matched: Vec<&Row> = dataset
        .rows
        .iter()
        .filter(|row| {
            filters.iter().all(|(column, filter)| {
                let actual = column
                    .as_deref()
                    .and_then(|c| row.get(c))
                    .unwrap_or(&Value::Null);
                compare_values(actual, filter.operator, &filter.value)
            })
        })
        .collect();

    let mut value = None;
    let mut groups = BTreeMap::new();
    let mut label = None;

    if let Some(aggregation) = aggregation {
        let column_ok = agg_column.is_some() || aggregation.column.is_none();
        if column_ok {
            value = aggregate(aggregation.function, agg_column.as_deref(), matched.iter().copied());
            if logic.group_by.is_some() {
                let mut buckets: BTreeMap<String, Vec<&Row>> = BTreeMap::new();
                for &row in &matched {
                    let key = group_column
                        .as_deref()
                        .and_then(|c| row.get(c))
                        .and_then(value_as_key)
                        .unwrap_or_else(|| NO_GROUP.to_string());
                    buckets.entry(key).or_default().push(row);
                }
                for (key, rows) in buckets {
                    let value =
                        aggregate(aggregation.function, agg_column.as_deref(), rows.into_iter());
                    if let Some(v) = value {
                        groups.insert(key, v);
                    }
                }
            }
        }
        label = Some(format!(
            "{}({})",
            aggregation.function.as_str(),
            aggregation.column.as_deref().unwrap_or("*")
        ));
    }

    QueryEvidence {
        logic: logic.clone(),
        aggregation: label,
        value,
        groups,
        rows_matched: matched.len(),
        ignored_aggregations: logic.aggregations.len().saturating_sub(1),
        unresolved_columns: unresolved,
    }
}

/// A raw column name, a canonical role name, or a case-insensitive column match.
pub fn resolve_column(name: &str, dataset: &Dataset, roles: &ColumnRoles) -> Option<String> {
    if dataset.columns.iter().any(|c| c == name) {
        return Some(name.to_string());
    }
    if let Some(column) = ColumnRole::parse(name).and_then(|role| roles.column(role)) {
        return Some(column.to_string());
    }
    dataset
        .columns
        .iter()
        .find(|c| c.eq_ignore_ascii_case(name.trim()))
        .cloned()
}

fn aggregate<'a>(
    function: AggregateFunction,
    column: Option<&str>,
    rows: impl Iterator<Item = &'a Row>,
) -> Option<f64> {
    let Some(column) = column else {
        // Only `count` is allowed without a column.
        return (function == AggregateFunction::Count).then(|| rows.count() as f64);
    };
    if function == AggregateFunction::Count {
        return Some(
            rows.filter(|r| r.get(column).is_some_and(|v| !v.is_null()))
                .count() as f64,
        );
    }
    let values: Vec<f64> = rows
        .filter_map(|r| r.get(column).and_then(value_as_f64))
        .collect();
    if values.is_empty() {
        return match function {
            AggregateFunction::Sum => Some(0.0),
            _ => None,
        };
    }
    let result = match function {
        AggregateFunction::Sum => values.iter().sum(),
        AggregateFunction::Avg => values.iter().sum::<f64>() / values.len() as f64,
        AggregateFunction::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregateFunction::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        AggregateFunction::Count => values.len() as f64,
    };
    Some(result)
}

/// Loose comparison: numeric when both sides coerce to numbers,
/// case-insensitive text otherwise.
pub fn compare_values(actual: &Value, operator: FilterOperator, expected: &Value) -> bool {
    if actual.is_null() {
        return operator == FilterOperator::Neq && !expected.is_null();
    }
    match operator {
        FilterOperator::Eq => loosely_equal(actual, expected),
        FilterOperator::Neq => !loosely_equal(actual, expected),
        FilterOperator::Gt => numeric_cmp(actual, expected) == Some(Ordering::Greater),
        FilterOperator::Gte => {
            matches!(numeric_cmp(actual, expected), Some(Ordering::Greater | Ordering::Equal))
        }
        FilterOperator::Lt => numeric_cmp(actual, expected) == Some(Ordering::Less),
        FilterOperator::Lte => {
            matches!(numeric_cmp(actual, expected), Some(Ordering::Less | Ordering::Equal))
        }
        FilterOperator::Contains => value_as_key(actual)
            .zip(value_as_key(expected))
            .is_some_and(|(a, e)| a.to_lowercase().contains(&e.to_lowercase())),
    }
}

fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    if let Some(ordering) = numeric_cmp(actual, expected) {
        return ordering == Ordering::Equal;
    }
    match (value_as_key(actual), value_as_key(expected)) {
        (Some(a), Some(e)) => a.eq_ignore_ascii_case(&e),
        _ => actual == expected,
    }
}

fn numeric_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    let a_num = value_as_f64(a)?;
    let b_num = value_as_f64(b)?;
    a_num.partial_cmp(&b_num)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamelens_insights::Aggregation;
    use serde_json::json;

    fn dataset() -> Dataset {
        let rows = vec![
            json!({"player": "a", "country": "DE", "amount": 10.0, "platform": "ios"}),
            json!({"player": "b", "country": "DE", "amount": "5", "platform": "android"}),
            json!({"player": "c", "country": "FR", "amount": 7.5, "platform": "ios"}),
            json!({"player": "d", "country": "de", "amount": null, "platform": "ios"}),
        ];
        Dataset::from_rows(
            rows.into_iter()
                .filter_map(|v| v.as_object().cloned())
                .collect(),
        )
    }

    fn roles() -> ColumnRoles {
        ColumnRoles::default()
            .with(ColumnRole::UserId, "player")
            .with(ColumnRole::Revenue, "amount")
            .with(ColumnRole::Country, "country")
    }

    fn logic(
        filters: Vec<QueryFilter>,
        aggregations: Vec<Aggregation>,
        group_by: Option<&str>,
    ) -> QueryLogic {
        QueryLogic {
            filters,
            aggregations,
            group_by: group_by.map(str::to_string),
        }
    }

    fn filter(column: &str, operator: FilterOperator, value: Value) -> QueryFilter {
        QueryFilter {
            column: column.into(),
            operator,
            value,
        }
    }

    fn agg(function: AggregateFunction, column: Option<&str>) -> Aggregation {
        Aggregation {
            function,
            column: column.map(str::to_string),
        }
    }

    #[test]
    fn test_sum_with_role_named_columns() {
        let evidence = execute(
            &logic(
                vec![filter("country", FilterOperator::Eq, json!("DE"))],
                vec![agg(AggregateFunction::Sum, Some("revenue"))],
                None,
            ),
            &dataset(),
            &roles(),
        );
        // "de" matches case-insensitively; its null amount contributes nothing.
        assert_eq!(evidence.rows_matched, 3);
        assert_eq!(evidence.value, Some(15.0));
        assert_eq!(evidence.aggregation.as_deref(), Some("sum(revenue)"));
        assert!(evidence.unresolved_columns.is_empty());
    }

    #[test]
    fn test_only_first_aggregation_runs() {
        let evidence = execute(
            &logic(
                Vec::new(),
                vec![
                    agg(AggregateFunction::Max, Some("amount")),
                    agg(AggregateFunction::Min, Some("amount")),
                    agg(AggregateFunction::Count, None),
                ],
                None,
            ),
            &dataset(),
            &roles(),
        );
        assert_eq!(evidence.value, Some(10.0));
        assert_eq!(evidence.ignored_aggregations, 2);
    }

    #[test]
    fn test_group_by() {
        let evidence = execute(
            &logic(
                vec![filter("amount", FilterOperator::Gt, json!(0))],
                vec![agg(AggregateFunction::Avg, Some("amount"))],
                Some("platform"),
            ),
            &dataset(),
            &roles(),
        );
        assert_eq!(evidence.rows_matched, 3);
        assert_eq!(evidence.groups["ios"], 8.75);
        assert_eq!(evidence.groups["android"], 5.0);
    }

    #[test]
    fn test_count_without_column() {
        let evidence = execute(
            &logic(
                vec![filter("platform", FilterOperator::Neq, json!("ios"))],
                vec![agg(AggregateFunction::Count, None)],
                None,
            ),
            &dataset(),
            &roles(),
        );
        assert_eq!(evidence.value, Some(1.0));
        assert_eq!(evidence.aggregation.as_deref(), Some("count(*)"));
    }

    #[test]
    fn test_unresolved_column_reported() {
        let evidence = execute(
            &logic(
                Vec::new(),
                vec![agg(AggregateFunction::Sum, Some("gems"))],
                None,
            ),
            &dataset(),
            &roles(),
        );
        assert_eq!(evidence.value, None);
        assert_eq!(evidence.unresolved_columns, vec!["gems".to_string()]);
    }

    #[test]
    fn test_compare_values() {
        assert!(compare_values(&json!("5"), FilterOperator::Eq, &json!(5)));
        assert!(compare_values(&json!(10), FilterOperator::Gte, &json!("10")));
        assert!(!compare_values(&json!("abc"), FilterOperator::Gt, &json!(1)));
        assert!(compare_values(&json!("Germany"), FilterOperator::Contains, &json!("germ")));
        assert!(!compare_values(&Value::Null, FilterOperator::Eq, &json!("x")));
        assert!(compare_values(&Value::Null, FilterOperator::Neq, &json!("x")));
    }
}
