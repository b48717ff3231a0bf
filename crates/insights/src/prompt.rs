//! Prompt rendering. Output depends only on the inputs, so identical
//! contexts always produce identical cache keys.

use gamelens_semantic::ClassificationRequest;
use serde_json::Value;

const INSIGHT_SYSTEM_PROMPT: &str = "You are a senior game analytics expert. \
You receive a JSON summary of a game's telemetry: dataset shape, metric baselines, \
detected anomalies and cohort retention. Produce actionable insights grounded only in \
the numbers provided. Respond with a single JSON object of the form \
{\"insights\": [{\"title\": string, \"description\": string, \
\"category\": \"retention\"|\"monetization\"|\"engagement\"|\"progression\"|\"anomaly\"|\"general\", \
\"priority\": integer 1-10, \"confidence\": number 0-1, \"recommendations\": [string]}], \
\"summary\": string}. Do not include any text outside the JSON object.";

const QUESTION_SYSTEM_PROMPT: &str = "You are a game analytics assistant answering questions \
about a dataset you can only see through the JSON context provided. When the answer can be \
computed from rows, describe the computation in queryLogic using the exact column names given. \
Respond with a single JSON object of the form {\"answer\": string, \"confidence\": number 0-1, \
\"queryLogic\": {\"filters\": [{\"column\": string, \"operator\": \"eq\"|\"neq\"|\"gt\"|\"lt\"|\"gte\"|\"lte\"|\"contains\", \
\"value\": any}], \"aggregations\": [{\"function\": \"sum\"|\"avg\"|\"count\"|\"max\"|\"min\", \
\"column\": string}], \"groupBy\": string|null} or null, \"followUpQuestions\": [string]}.";

const CLASSIFICATION_SYSTEM_PROMPT: &str = "You classify the columns of a game analytics table. \
For every header return its canonical role, one of: user_id, session_id, event_name, timestamp, \
revenue, currency, level, score, country, platform, device, app_version, session_duration, \
item_id, quantity, unknown, noise. Respond with a single JSON object of the form \
{\"columns\": [{\"originalName\": string, \"canonicalRole\": string, \"inferredType\": \
\"integer\"|\"float\"|\"boolean\"|\"timestamp\"|\"string\", \"confidence\": number 0-1, \
\"rationale\": string}], \"gameType\": string|null, \"suggestedCharts\": [string], \
\"warnings\": [string], \"dataQuality\": number 0-1}.";

/// System and user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

fn render_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn insight_prompt(context: &Value) -> RenderedPrompt {
    RenderedPrompt {
        system: INSIGHT_SYSTEM_PROMPT.to_string(),
        user: format!(
            "Analyze this game analytics context and report the most important findings.\n\n{}",
            render_json(context)
        ),
    }
}

pub fn question_prompt(question: &str, context: &Value) -> RenderedPrompt {
    RenderedPrompt {
        system: QUESTION_SYSTEM_PROMPT.to_string(),
        user: format!(
            "Question: {}\n\nDataset context:\n{}",
            question.trim(),
            render_json(context)
        ),
    }
}

pub fn classification_prompt(request: &ClassificationRequest) -> RenderedPrompt {
    let headers = request.headers.join(", ");
    let sample = serde_json::to_value(&request.sample_rows).unwrap_or(Value::Null);
    let mut user = format!("Headers: {headers}\n\nSample rows:\n{}", render_json(&sample));
    if let Some(hint) = &request.config.game_type_hint {
        user.push_str(&format!("\n\nThe game is believed to be a {hint} game."));
    }
    RenderedPrompt {
        system: CLASSIFICATION_SYSTEM_PROMPT.to_string(),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rendering_is_deterministic() {
        let a = json!({"rowCount": 10, "metrics": ["revenue"], "anomalies": []});
        let b = json!({"anomalies": [], "metrics": ["revenue"], "rowCount": 10});
        assert_eq!(insight_prompt(&a), insight_prompt(&b));
    }

    #[test]
    fn test_question_is_trimmed_into_prompt() {
        let prompt = question_prompt("  How many whales?  ", &json!({}));
        assert!(prompt.user.starts_with("Question: How many whales?\n"));
        assert!(prompt.system.contains("queryLogic"));
    }

    #[test]
    fn test_classification_prompt_lists_headers() {
        let request = ClassificationRequest {
            headers: vec!["uid".into(), "amt".into()],
            sample_rows: Vec::new(),
            config: Default::default(),
        };
        let prompt = classification_prompt(&request);
        assert!(prompt.user.contains("Headers: uid, amt"));
        assert!(!prompt.user.contains("believed"));
    }
}
