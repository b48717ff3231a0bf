//! Ordered question patterns answered exactly from the rows.

use std::collections::BTreeSet;

use gamelens_core::types::{value_as_f64, value_as_key};
use gamelens_core::{ColumnRole, ColumnRoles, Dataset};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Trailing filler accepted after any fast question.
const FILLER: &str = r"(?: (?:are there|do we have|did we have|in total|in the dataset|in the data|overall|total|so far))?";

type Compute = fn(&Dataset, &ColumnRoles) -> Option<FastAnswer>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FastAnswer {
    pub answer: String,
    pub value: Option<f64>,
}

pub struct FastPattern {
    pub id: &'static str,
    regex: Regex,
    compute: Compute,
}

impl FastPattern {
    pub fn matches(&self, normalized: &str) -> bool {
        self.regex.is_match(normalized)
    }

    pub fn compute(&self, dataset: &Dataset, roles: &ColumnRoles) -> Option<FastAnswer> {
        (self.compute)(dataset, roles)
    }
}

// More specific questions come first: "paying users" before "users".
const PATTERNS: &[(&str, &str, Compute)] = &[
    (
        "paying_users",
        r"^(?:how many|number of|count of)(?: unique| distinct)? (?:paying|paid|converted) (?:users|players|customers)",
        paying_users,
    ),
    (
        "user_count",
        r"^(?:how many|number of|count of|total)(?: unique| distinct| total)? (?:users|players)",
        user_count,
    ),
    (
        "event_count",
        r"^(?:how many|number of|count of|total)(?: total)? (?:events|rows|records)",
        event_count,
    ),
    (
        "session_count",
        r"^(?:how many|number of|count of|total)(?: unique| distinct| total)? sessions",
        session_count,
    ),
    (
        "total_revenue",
        r"^(?:(?:what is|what's|whats) )?(?:the )?(?:total|overall|sum of)(?: the)? (?:revenue|sales|income)|^how much (?:revenue|money)(?: did we| have we)? (?:make|made|earn|earned|generate|generated)",
        total_revenue,
    ),
    (
        "arpu",
        r"^(?:(?:what is|what's|whats) )?(?:the )?(?:arpu|average revenue per (?:user|player))",
        arpu,
    ),
    (
        "conversion_rate",
        r"^(?:(?:what is|what's|whats) )?(?:the )?(?:conversion rate|payer rate|paying user rate|percentage of paying (?:users|players))",
        conversion_rate,
    ),
    (
        "avg_session_duration",
        r"^(?:(?:what is|what's|whats) )?(?:the )?(?:average|avg|mean) session (?:duration|length|time)",
        avg_session_duration,
    ),
    (
        "max_level",
        r"^(?:(?:what is|what's|whats) )?(?:the )?(?:max|maximum|highest|top) level(?: reached)?",
        max_level,
    ),
    (
        "date_range",
        r"^(?:(?:what is|what's|whats) )?(?:the )?(?:date range|time range|time period|period covered)|^when does the data (?:start|begin)(?: and end)?",
        date_range,
    ),
];

/// Compile the ordered pattern list. Every pattern is anchored at both
/// ends so partial matches never short-circuit richer questions.
pub fn default_patterns() -> Vec<FastPattern> {
    PATTERNS
        .iter()
        .filter_map(|(id, source, compute)| {
            let anchored = format!("(?:{source}){FILLER}$");
            match Regex::new(&anchored) {
                Ok(regex) => Some(FastPattern {
                    id: *id,
                    regex,
                    compute: *compute,
                }),
                Err(e) => {
                    warn!(pattern = *id, error = %e, "Skipping invalid fast pattern");
                    None
                }
            }
        })
        .collect()
}

/// Lowercase, collapse whitespace and drop trailing punctuation.
pub fn normalize(question: &str) -> String {
    let collapsed = question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(|c: char| c == '?' || c == '.' || c == '!' || c.is_whitespace())
        .to_string()
}

fn distinct(dataset: &Dataset, column: &str) -> BTreeSet<String> {
    dataset
        .rows
        .iter()
        .filter_map(|r| r.get(column).and_then(value_as_key))
        .collect()
}

fn numeric(dataset: &Dataset, column: &str) -> Vec<f64> {
    dataset
        .rows
        .iter()
        .filter_map(|r| r.get(column).and_then(value_as_f64))
        .collect()
}

fn paying(dataset: &Dataset, user_col: &str, revenue_col: &str) -> BTreeSet<String> {
    dataset
        .rows
        .iter()
        .filter(|r| r.get(revenue_col).and_then(value_as_f64).is_some_and(|v| v > 0.0))
        .filter_map(|r| r.get(user_col).and_then(value_as_key))
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn user_count(dataset: &Dataset, roles: &ColumnRoles) -> Option<FastAnswer> {
    let column = roles.column(ColumnRole::UserId)?;
    let count = distinct(dataset, column).len();
    Some(FastAnswer {
        answer: format!("There are {count} unique users in the dataset."),
        value: Some(count as f64),
    })
}

fn paying_users(dataset: &Dataset, roles: &ColumnRoles) -> Option<FastAnswer> {
    let user_col = roles.column(ColumnRole::UserId)?;
    let revenue_col = roles.column(ColumnRole::Revenue)?;
    let count = paying(dataset, user_col, revenue_col).len();
    Some(FastAnswer {
        answer: format!("{count} users made at least one purchase."),
        value: Some(count as f64),
    })
}

fn event_count(dataset: &Dataset, _roles: &ColumnRoles) -> Option<FastAnswer> {
    let count = dataset.len();
    Some(FastAnswer {
        answer: format!("The dataset contains {count} events."),
        value: Some(count as f64),
    })
}

fn session_count(dataset: &Dataset, roles: &ColumnRoles) -> Option<FastAnswer> {
    let column = roles.column(ColumnRole::SessionId)?;
    let count = distinct(dataset, column).len();
    Some(FastAnswer {
        answer: format!("There are {count} unique sessions in the dataset."),
        value: Some(count as f64),
    })
}

fn total_revenue(dataset: &Dataset, roles: &ColumnRoles) -> Option<FastAnswer> {
    let column = roles.column(ColumnRole::Revenue)?;
    let total = round2(numeric(dataset, column).iter().sum());
    Some(FastAnswer {
        answer: format!("Total revenue is {total:.2}."),
        value: Some(total),
    })
}

fn arpu(dataset: &Dataset, roles: &ColumnRoles) -> Option<FastAnswer> {
    let users = distinct(dataset, roles.column(ColumnRole::UserId)?).len();
    if users == 0 {
        return None;
    }
    let total: f64 = numeric(dataset, roles.column(ColumnRole::Revenue)?).iter().sum();
    let value = round2(total / users as f64);
    Some(FastAnswer {
        answer: format!("Average revenue per user is {value:.2} across {users} users."),
        value: Some(value),
    })
}

fn conversion_rate(dataset: &Dataset, roles: &ColumnRoles) -> Option<FastAnswer> {
    let user_col = roles.column(ColumnRole::UserId)?;
    let revenue_col = roles.column(ColumnRole::Revenue)?;
    let users = distinct(dataset, user_col).len();
    if users == 0 {
        return None;
    }
    let payers = paying(dataset, user_col, revenue_col).len();
    let rate = round2(payers as f64 / users as f64 * 100.0);
    Some(FastAnswer {
        answer: format!("{rate:.2}% of users converted to paying ({payers} of {users})."),
        value: Some(rate),
    })
}

fn avg_session_duration(dataset: &Dataset, roles: &ColumnRoles) -> Option<FastAnswer> {
    let values = numeric(dataset, roles.column(ColumnRole::SessionDuration)?);
    if values.is_empty() {
        return None;
    }
    let avg = round2(values.iter().sum::<f64>() / values.len() as f64);
    Some(FastAnswer {
        answer: format!("Average session duration is {avg:.2}."),
        value: Some(avg),
    })
}

fn max_level(dataset: &Dataset, roles: &ColumnRoles) -> Option<FastAnswer> {
    let max = numeric(dataset, roles.column(ColumnRole::Level)?)
        .into_iter()
        .reduce(f64::max)?;
    Some(FastAnswer {
        answer: format!("The highest level reached is {max}."),
        value: Some(max),
    })
}

fn date_range(dataset: &Dataset, roles: &ColumnRoles) -> Option<FastAnswer> {
    let range = dataset.time_range(roles.column(ColumnRole::Timestamp)?)?;
    let days = (range.end - range.start).num_days() + 1;
    Some(FastAnswer {
        answer: format!(
            "The data covers {} to {} ({days} days).",
            range.start.format("%Y-%m-%d"),
            range.end.format("%Y-%m-%d")
        ),
        value: Some(days as f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset() -> Dataset {
        let rows = vec![
            json!({
                "uid": "a", "ts": "2024-01-01T10:00:00Z",
                "rev": 0, "sid": "s1", "lvl": 3, "dur": 100,
            }),
            json!({
                "uid": "a", "ts": "2024-01-02T10:00:00Z",
                "rev": 5.0, "sid": "s2", "lvl": 5, "dur": 200,
            }),
            json!({
                "uid": "b", "ts": "2024-01-05T10:00:00Z",
                "rev": 0, "sid": "s3", "lvl": 2, "dur": 300,
            }),
        ];
        Dataset::from_rows(rows.into_iter().filter_map(|v| v.as_object().cloned()).collect())
    }

    fn roles() -> ColumnRoles {
        ColumnRoles::default()
            .with(ColumnRole::UserId, "uid")
            .with(ColumnRole::Timestamp, "ts")
            .with(ColumnRole::Revenue, "rev")
            .with(ColumnRole::SessionId, "sid")
            .with(ColumnRole::Level, "lvl")
            .with(ColumnRole::SessionDuration, "dur")
    }

    fn answer(question: &str) -> Option<(&'static str, FastAnswer)> {
        let normalized = normalize(question);
        default_patterns()
            .into_iter()
            .filter(|p| p.matches(&normalized))
            .find_map(|p| p.compute(&dataset(), &roles()).map(|a| (p.id, a)))
    }

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(default_patterns().len(), PATTERNS.len());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  How   many Users?? "), "how many users");
    }

    #[test]
    fn test_user_and_paying_counts() {
        let (id, a) = answer("How many users?").unwrap();
        assert_eq!(id, "user_count");
        assert_eq!(a.value, Some(2.0));
        let (id, a) = answer("How many paying users are there?").unwrap();
        assert_eq!(id, "paying_users");
        assert_eq!(a.value, Some(1.0));
    }

    #[test]
    fn test_revenue_questions() {
        assert_eq!(answer("What is the total revenue?").unwrap().1.value, Some(5.0));
        assert_eq!(answer("ARPU").unwrap().1.value, Some(2.5));
        assert_eq!(answer("What's the conversion rate?").unwrap().1.value, Some(50.0));
    }

    #[test]
    fn test_other_patterns() {
        assert_eq!(answer("How many events?").unwrap().1.value, Some(3.0));
        assert_eq!(answer("number of sessions").unwrap().1.value, Some(3.0));
        assert_eq!(answer("average session duration").unwrap().1.value, Some(200.0));
        assert_eq!(answer("What is the highest level reached?").unwrap().1.value, Some(5.0));
        assert_eq!(answer("What is the date range?").unwrap().1.value, Some(5.0));
    }

    #[test]
    fn test_open_questions_do_not_match() {
        assert!(answer("Why is retention dropping in week 3?").is_none());
        assert!(answer("How many users churned after the update?").is_none());
        assert!(answer("What is the total revenue by country?").is_none());
    }
}
