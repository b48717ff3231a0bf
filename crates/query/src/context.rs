use gamelens_core::{ColumnRole, ColumnRoles, Dataset, MetricKind};
use serde_json::{json, Value};

/// Context handed to the orchestrator for open questions: column roles, a
/// small sample, row count, date range and the computable metrics.
pub fn build_context(dataset: &Dataset, roles: &ColumnRoles, sample_rows: usize) -> Value {
    let mapped: Vec<(ColumnRole, &str)> = roles.iter().collect();
    let columns: Vec<Value> = dataset
        .columns
        .iter()
        .map(|name| {
            let role = mapped
                .iter()
                .find(|(_, column)| *column == name.as_str())
                .map(|(role, _)| role.as_str())
                .unwrap_or(ColumnRole::Unknown.as_str());
            json!({ "name": name, "role": role })
        })
        .collect();

    let date_range = roles
        .column(ColumnRole::Timestamp)
        .and_then(|c| dataset.time_range(c))
        .map(|r| json!({ "start": r.start.to_rfc3339(), "end": r.end.to_rfc3339() }))
        .unwrap_or(Value::Null);

    let metrics: Vec<&str> = MetricKind::available(roles)
        .iter()
        .map(MetricKind::as_str)
        .collect();

    json!({
        "columns": columns,
        "rowCount": dataset.len(),
        "sampleRows": dataset.sample(sample_rows),
        "dateRange": date_range,
        "availableMetrics": metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_shape() {
        let rows = vec![
            json!({"uid": "a", "ts": "2024-01-01", "note": "x"}),
            json!({"uid": "b", "ts": "2024-01-03", "note": "y"}),
        ];
        let dataset =
            Dataset::from_rows(rows.into_iter().filter_map(|v| v.as_object().cloned()).collect());
        let roles = ColumnRoles::default()
            .with(ColumnRole::UserId, "uid")
            .with(ColumnRole::Timestamp, "ts");

        let context = build_context(&dataset, &roles, 1);
        assert_eq!(context["rowCount"], 2);
        assert_eq!(context["sampleRows"].as_array().map(Vec::len), Some(1));
        // Columns follow first appearance, which is key order within a row.
        assert_eq!(context["columns"][0]["name"], "note");
        assert_eq!(context["columns"][0]["role"], "unknown");
        assert_eq!(context["columns"][2]["role"], "user_id");
        assert!(context["dateRange"]["start"].as_str().unwrap().starts_with("2024-01-01"));
        assert_eq!(context["availableMetrics"], json!(["active_users", "events"]));
    }
}
