//! Coarse question categories and the data each one depends on.

use gamelens_core::{ColumnRole, ColumnRoles, Dataset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCategory {
    Retention,
    Monetization,
    Engagement,
    Progression,
    Users,
    Events,
    General,
}

// Checked in order; the first category with a matching keyword wins.
const KEYWORDS: &[(QuestionCategory, &[&str])] = &[
    (
        QuestionCategory::Retention,
        &["retention", "retain", "churn", "come back", "return", "cohort", "d1", "d7", "d30"],
    ),
    (
        QuestionCategory::Monetization,
        &[
            "revenue",
            "spend",
            "spent",
            "purchase",
            "money",
            "arpu",
            "arppu",
            "paying",
            "payer",
            "conversion",
            "monetiz",
            "iap",
            "sales",
        ],
    ),
    (
        QuestionCategory::Progression,
        &["level", "progress", "stage", "complete", "stuck", "difficulty"],
    ),
    (
        QuestionCategory::Engagement,
        &["session", "engage", "playtime", "play time", "duration", "active", "dau", "mau"],
    ),
    (QuestionCategory::Events, &["event", "action"]),
    (QuestionCategory::Users, &["user", "player", "audience"]),
];

impl QuestionCategory {
    pub fn detect(question: &str) -> QuestionCategory {
        let lowered = question.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lowered.contains(w)))
            .map(|(category, _)| *category)
            .unwrap_or(QuestionCategory::General)
    }

    pub fn required_roles(&self) -> &'static [ColumnRole] {
        match self {
            QuestionCategory::Retention => &[ColumnRole::UserId, ColumnRole::Timestamp],
            QuestionCategory::Monetization => &[ColumnRole::UserId, ColumnRole::Revenue],
            QuestionCategory::Engagement => &[ColumnRole::UserId, ColumnRole::SessionId],
            QuestionCategory::Progression => &[ColumnRole::UserId, ColumnRole::Level],
            QuestionCategory::Users => &[ColumnRole::UserId],
            QuestionCategory::Events => &[ColumnRole::EventName],
            QuestionCategory::General => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionCategory::Retention => "retention",
            QuestionCategory::Monetization => "monetization",
            QuestionCategory::Engagement => "engagement",
            QuestionCategory::Progression => "progression",
            QuestionCategory::Users => "users",
            QuestionCategory::Events => "events",
            QuestionCategory::General => "general",
        }
    }

    /// Deterministic answer used when no generated answer is available.
    pub fn missing_data_explanation(&self, dataset: &Dataset, roles: &ColumnRoles) -> String {
        let missing = roles.missing(self.required_roles());
        if !missing.is_empty() {
            let labels: Vec<String> = missing.iter().map(|r| r.label()).collect();
            return format!(
                "This {} question needs data the dataset does not have: \
                 no column was identified as {}. Add or map such a column and ask again.",
                self.as_str(),
                labels.join(" or ")
            );
        }
        let mapped: Vec<String> = roles
            .iter()
            .map(|(role, column)| format!("{column} ({role})"))
            .collect();
        format!(
            "This {} question could not be answered automatically. \
             The dataset has {} rows with mapped columns: {}. \
             Try a direct question such as \"How many users?\" or \"What is the total revenue?\".",
            self.as_str(),
            dataset.len(),
            if mapped.is_empty() { "none".to_string() } else { mapped.join(", ") }
        )
    }
}

impl std::fmt::Display for QuestionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        assert_eq!(
            QuestionCategory::detect("Why is retention dropping in week 3?"),
            QuestionCategory::Retention
        );
        assert_eq!(
            QuestionCategory::detect("Which country spends the most?"),
            QuestionCategory::Monetization
        );
        assert_eq!(
            QuestionCategory::detect("Where do players get stuck on level 12?"),
            QuestionCategory::Progression
        );
        assert_eq!(
            QuestionCategory::detect("How long are sessions?"),
            QuestionCategory::Engagement
        );
        assert_eq!(QuestionCategory::detect("Tell me something"), QuestionCategory::General);
    }

    #[test]
    fn test_missing_data_names_roles() {
        let roles = ColumnRoles::default().with(ColumnRole::UserId, "uid");
        let text =
            QuestionCategory::Retention.missing_data_explanation(&Dataset::default(), &roles);
        assert!(text.contains("no column was identified as"));
        assert!(text.contains(&ColumnRole::Timestamp.label()));
        assert!(!text.contains(&ColumnRole::UserId.label()));
    }

    #[test]
    fn test_explanation_when_roles_present() {
        let roles = ColumnRoles::default().with(ColumnRole::UserId, "uid");
        let text = QuestionCategory::Users.missing_data_explanation(&Dataset::default(), &roles);
        assert!(text.contains("uid (user_id)"));
        assert!(text.contains("0 rows"));
    }
}
