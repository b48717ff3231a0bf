//! Likely causes per metric and anomaly type, most likely first.

use std::collections::BTreeMap;

use gamelens_core::MetricKind;

use crate::detector::AnomalyType;

/// Hard cap on the causes attached to one anomaly.
pub const MAX_CAUSES: usize = 3;

/// Causes for `metric`/`kind`, preferring an override keyed
/// `"<metric>.<type>"`, capped at `limit` (never more than [`MAX_CAUSES`]).
pub fn possible_causes(
    metric: MetricKind,
    kind: AnomalyType,
    overrides: &BTreeMap<String, Vec<String>>,
    limit: usize,
) -> Vec<String> {
    let limit = limit.min(MAX_CAUSES);
    let key = format!("{}.{}", metric.as_str(), kind.as_str());
    if let Some(custom) = overrides.get(&key) {
        return custom.iter().take(limit).cloned().collect();
    }
    default_causes(metric, kind)
        .iter()
        .take(limit)
        .map(|c| c.to_string())
        .collect()
}

fn default_causes(metric: MetricKind, kind: AnomalyType) -> &'static [&'static str] {
    use AnomalyType::*;
    use MetricKind::*;
    match (metric, kind) {
        (Revenue, Spike) => &[
            "Limited-time offer or sale went live",
            "Whale purchase or bulk transaction",
            "New IAP bundle or price change",
        ],
        (Revenue, Drop) => &[
            "Payment or store outage",
            "Offer expired or price increase",
            "Tracking or SDK integration failure",
        ],
        (Revenue, TrendChange) => &[
            "Shift in monetization design or economy balance",
            "Change in paying-player mix",
            "Seasonal spending pattern",
        ],
        (ActiveUsers, Spike) => &[
            "Marketing campaign or featuring",
            "Content update or live event",
            "Viral or social referral surge",
        ],
        (ActiveUsers, Drop) => &[
            "Server outage or login failures",
            "Crash-inducing release",
            "End of campaign or event",
        ],
        (ActiveUsers, TrendChange) => &[
            "Change in acquisition volume",
            "Retention shift after a content update",
            "Seasonality",
        ],
        (Events, Spike) => &[
            "New event instrumentation or duplicate logging",
            "Live event driving engagement",
            "Bot or automated traffic",
        ],
        (Events, Drop) => &[
            "Analytics pipeline or SDK outage",
            "Event removed or renamed in a release",
            "Drop in active players",
        ],
        (Events, TrendChange) => &[
            "Instrumentation change",
            "Engagement shift after an update",
            "Change in player base size",
        ],
        (Sessions, Spike) => &[
            "Live event or daily reward change",
            "Push notification campaign",
            "Session tracking change",
        ],
        (Sessions, Drop) => &[
            "Connectivity or server issues",
            "Session length or energy system change",
            "Crash on launch",
        ],
        (Sessions, TrendChange) => &[
            "Habit shift after a feature change",
            "Change in notification cadence",
            "Seasonality",
        ],
        (PayingUsers, Spike) => &[
            "Discounted starter pack or first-purchase offer",
            "Sale event",
            "New payment method",
        ],
        (PayingUsers, Drop) => &[
            "Payment provider failure",
            "Offer fatigue or removed promotion",
            "Store policy or pricing change",
        ],
        (PayingUsers, TrendChange) => &[
            "Conversion funnel change",
            "Pricing strategy shift",
            "Change in audience quality",
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_capped() {
        let causes = possible_causes(MetricKind::Revenue, AnomalyType::Drop, &BTreeMap::new(), 10);
        assert_eq!(causes.len(), 3);
        assert_eq!(causes[0], "Payment or store outage");

        let causes = possible_causes(MetricKind::Revenue, AnomalyType::Drop, &BTreeMap::new(), 1);
        assert_eq!(causes.len(), 1);
    }

    #[test]
    fn test_override() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "events.spike".to_string(),
            vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()],
        );
        let causes = possible_causes(MetricKind::Events, AnomalyType::Spike, &overrides, 3);
        assert_eq!(causes, vec!["a", "b", "c"]);
    }
}
