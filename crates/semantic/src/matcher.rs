//! Deterministic alias matcher used to validate and replace classifier output.
//!
//! An exact alias hit scores 1.0. Otherwise the header is tokenized
//! (snake, kebab and camel case) and compared with every alias by
//! token-overlap ratio (shared tokens / distinct tokens across both).

use gamelens_core::ColumnRole;
use serde::{Deserialize, Serialize};

/// Result of matching one header against the alias table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasMatch {
    pub role: ColumnRole,
    pub confidence: f64,
    pub matched_alias: String,
    pub exact: bool,
}

pub struct AliasMatcher {
    aliases: Vec<(ColumnRole, Vec<String>)>,
    min_similarity: f64,
}

impl Default for AliasMatcher {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl AliasMatcher {
    pub fn new(min_similarity: f64) -> Self {
        Self {
            aliases: Self::default_aliases(),
            min_similarity,
        }
    }

    /// Add aliases for a role; they are matched after the built-in ones.
    pub fn with_aliases(mut self, role: ColumnRole, aliases: &[&str]) -> Self {
        let normalized: Vec<String> = aliases.iter().map(|a| tokenize(a).join("_")).collect();
        match self.aliases.iter_mut().find(|(r, _)| *r == role) {
            Some((_, existing)) => existing.extend(normalized),
            None => self.aliases.push((role, normalized)),
        }
        self
    }

    /// Match a raw header. `None` when nothing reaches the similarity floor.
    pub fn match_header(&self, header: &str) -> Option<AliasMatch> {
        let tokens = tokenize(header);
        if tokens.is_empty() {
            return None;
        }
        let normalized = tokens.join("_");
        let compact = tokens.concat();

        for (role, aliases) in &self.aliases {
            if let Some(alias) = aliases
                .iter()
                .find(|a| **a == normalized || a.replace('_', "") == compact)
            {
                return Some(AliasMatch {
                    role: *role,
                    confidence: 1.0,
                    matched_alias: alias.clone(),
                    exact: true,
                });
            }
        }

        let head = tokens.last().map(String::as_str).unwrap_or_default();
        let mut best: Option<(AliasMatch, bool)> = None;
        for (role, aliases) in &self.aliases {
            for alias in aliases {
                let alias_tokens: Vec<&str> = alias.split('_').collect();
                let score = overlap_ratio(&tokens, &alias_tokens);
                if score < self.min_similarity || score <= 0.0 {
                    continue;
                }
                let covers_head = alias_tokens.contains(&head);
                let better = match &best {
                    None => true,
                    Some((current, current_head)) => {
                        score > current.confidence
                            || (score == current.confidence && covers_head && !current_head)
                    }
                };
                if better {
                    best = Some((
                        AliasMatch {
                            role: *role,
                            confidence: score,
                            matched_alias: alias.clone(),
                            exact: false,
                        },
                        covers_head,
                    ));
                }
            }
        }
        best.map(|(m, _)| m)
    }

    fn default_aliases() -> Vec<(ColumnRole, Vec<String>)> {
        let table: [(ColumnRole, &[&str]); 15] = [
            (
                ColumnRole::UserId,
                &[
                    "user_id",
                    "uid",
                    "player_id",
                    "player",
                    "user",
                    "account_id",
                    "customer_id",
                    "member_id",
                    "gamer_id",
                ],
            ),
            (ColumnRole::SessionId, &["session_id", "sid", "session", "session_key"]),
            (
                ColumnRole::EventName,
                &["event_name", "event", "event_type", "action", "event_action"],
            ),
            (
                ColumnRole::Timestamp,
                &[
                    "timestamp",
                    "ts",
                    "time",
                    "datetime",
                    "date",
                    "event_time",
                    "event_date",
                    "created_at",
                    "event_timestamp",
                    "occurred_at",
                    "time_stamp",
                ],
            ),
            (
                ColumnRole::Revenue,
                &[
                    "revenue",
                    "amount",
                    "price",
                    "purchase_amount",
                    "iap_revenue",
                    "ad_revenue",
                    "spend",
                    "revenue_usd",
                    "gross",
                    "payment",
                    "purchase_value",
                ],
            ),
            (ColumnRole::Currency, &["currency", "currency_code", "iso_currency"]),
            (ColumnRole::Level, &["level", "player_level", "lvl", "stage", "world_level"]),
            (ColumnRole::Score, &["score", "points", "high_score", "xp"]),
            (ColumnRole::Country, &["country", "country_code", "geo", "region", "nation"]),
            (ColumnRole::Platform, &["platform", "os", "store", "operating_system"]),
            (ColumnRole::Device, &["device", "device_model", "device_type", "hardware"]),
            (
                ColumnRole::AppVersion,
                &["app_version", "version", "build", "client_version", "build_number"],
            ),
            (
                ColumnRole::SessionDuration,
                &[
                    "session_duration",
                    "duration",
                    "session_length",
                    "playtime",
                    "play_time",
                    "time_played",
                ],
            ),
            (ColumnRole::ItemId, &["item_id", "item", "sku", "product_id", "product", "offer_id"]),
            (ColumnRole::Quantity, &["quantity", "qty", "units", "item_count"]),
        ];
        table
            .iter()
            .map(|(role, aliases)| (*role, aliases.iter().map(|a| a.to_string()).collect()))
            .collect()
    }
}

/// Split a header into lowercase tokens on separators and camel-case humps.
pub fn tokenize(header: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in header.chars() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn overlap_ratio(header: &[String], alias: &[&str]) -> f64 {
    let shared = alias.iter().filter(|a| header.iter().any(|h| h == *a)).count();
    let mut union: Vec<&str> = header.iter().map(String::as_str).collect();
    for a in alias {
        if !union.contains(a) {
            union.push(a);
        }
    }
    if union.is_empty() {
        return 0.0;
    }
    shared as f64 / union.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("userId"), vec!["user", "id"]);
        assert_eq!(tokenize("Event-Name"), vec!["event", "name"]);
        assert_eq!(tokenize("  session__ID "), vec!["session", "id"]);
        assert!(tokenize("__").is_empty());
    }

    #[test]
    fn test_exact_alias_scores_one() {
        let matcher = AliasMatcher::default();
        let m = matcher.match_header("uid").unwrap();
        assert_eq!(m.role, ColumnRole::UserId);
        assert_eq!(m.confidence, 1.0);
        assert!(m.exact);

        let m = matcher.match_header("PlayerId").unwrap();
        assert_eq!(m.role, ColumnRole::UserId);
        assert_eq!(m.confidence, 1.0);
    }

    #[test]
    fn test_similarity_match_uses_overlap_ratio() {
        let matcher = AliasMatcher::default();
        let m = matcher.match_header("player_level_reached").unwrap();
        assert_eq!(m.role, ColumnRole::Level);
        assert!(!m.exact);
        assert!((m.confidence - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_tie_prefers_head_token() {
        let matcher = AliasMatcher::default();
        let m = matcher.match_header("user_country").unwrap();
        assert_eq!(m.role, ColumnRole::Country);
        assert_eq!(m.confidence, 0.5);
    }

    #[test]
    fn test_no_match_below_floor() {
        let matcher = AliasMatcher::default();
        assert!(matcher.match_header("favourite_colour").is_none());
    }

    #[test]
    fn test_custom_aliases() {
        let matcher = AliasMatcher::default().with_aliases(ColumnRole::Revenue, &["gem_spend"]);
        let m = matcher.match_header("gemSpend").unwrap();
        assert_eq!(m.role, ColumnRole::Revenue);
        assert!(m.exact);
    }
}
