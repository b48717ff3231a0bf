use std::sync::Arc;

use gamelens_core::config::QueryConfig;
use gamelens_core::{ColumnRole, ColumnRoles, Dataset};
use gamelens_insights::{InsightOrchestrator, ProviderError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::category::QuestionCategory;
use crate::context::build_context;
use crate::executor::{execute, QueryEvidence};
use crate::fast_path::{default_patterns, normalize, FastPattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// Computed directly by a fast pattern.
    FastPath,
    /// Generated by the orchestrator.
    Orchestrator,
    /// Deterministic explanation after the orchestrator was unavailable.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub question: String,
    pub answer: String,
    pub source: AnswerSource,
    pub category: QuestionCategory,
    /// Exact value for fast-path answers or corroborating executed logic.
    pub value: Option<f64>,
    pub confidence: f64,
    pub pattern: Option<String>,
    pub evidence: Option<QueryEvidence>,
    pub follow_up_questions: Vec<String>,
    pub missing_roles: Vec<ColumnRole>,
    pub cached: bool,
    pub error: Option<String>,
}

pub struct QueryEngine {
    patterns: Vec<FastPattern>,
    orchestrator: Option<Arc<InsightOrchestrator>>,
    config: QueryConfig,
}

impl QueryEngine {
    pub fn new(config: QueryConfig) -> Self {
        Self {
            patterns: default_patterns(),
            orchestrator: None,
            config,
        }
    }

    pub fn with_orchestrator(mut self, orchestrator: Arc<InsightOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    /// First matching pattern with a non-null answer wins.
    pub fn try_fast_path(
        &self,
        question: &str,
        dataset: &Dataset,
        roles: &ColumnRoles,
    ) -> Option<QueryResponse> {
        let normalized = normalize(question);
        let (pattern, answer) = self
            .patterns
            .iter()
            .filter(|p| p.matches(&normalized))
            .find_map(|p| p.compute(dataset, roles).map(|a| (p.id, a)))?;

        metrics::counter!("query.fast_path.hit").increment(1);
        debug!(pattern = pattern, "Answered from fast path");
        Some(QueryResponse {
            question: question.to_string(),
            answer: answer.answer,
            source: AnswerSource::FastPath,
            category: QuestionCategory::detect(question),
            value: answer.value,
            confidence: 1.0,
            pattern: Some(pattern.to_string()),
            evidence: None,
            follow_up_questions: Vec::new(),
            missing_roles: Vec::new(),
            cached: false,
            error: None,
        })
    }

    /// Answer a question. Never fails: orchestrator errors degrade to a
    /// deterministic explanation.
    pub async fn ask(
        &self,
        question: &str,
        dataset: &Dataset,
        roles: &ColumnRoles,
    ) -> QueryResponse {
        if let Some(response) = self.try_fast_path(question, dataset, roles) {
            return response;
        }

        let category = QuestionCategory::detect(question);
        let Some(orchestrator) = &self.orchestrator else {
            return self.fallback(question, category, dataset, roles, ProviderError::NotConfigured);
        };

        metrics::counter!("query.orchestrator.fallback").increment(1);
        info!(category = %category, "Routing question to orchestrator");
        let context = build_context(dataset, roles, self.config.sample_rows);

        match orchestrator.answer_question(question, &context).await {
            Ok(validated) => {
                let answer = validated.value;
                let evidence = answer
                    .query_logic
                    .as_ref()
                    .map(|logic| execute(logic, dataset, roles));
                QueryResponse {
                    question: question.to_string(),
                    answer: answer.answer,
                    source: AnswerSource::Orchestrator,
                    category,
                    value: evidence.as_ref().and_then(|e| e.value),
                    confidence: answer.confidence,
                    pattern: None,
                    evidence,
                    follow_up_questions: answer.follow_up_questions,
                    missing_roles: roles.missing(category.required_roles()),
                    cached: validated.cached,
                    error: None,
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    category = %category,
                    "Orchestrator failed, explaining from roles"
                );
                self.fallback(question, category, dataset, roles, e)
            }
        }
    }

    fn fallback(
        &self,
        question: &str,
        category: QuestionCategory,
        dataset: &Dataset,
        roles: &ColumnRoles,
        error: ProviderError,
    ) -> QueryResponse {
        QueryResponse {
            question: question.to_string(),
            answer: category.missing_data_explanation(dataset, roles),
            source: AnswerSource::Fallback,
            category,
            value: None,
            confidence: 0.0,
            pattern: None,
            evidence: None,
            follow_up_questions: Vec::new(),
            missing_roles: roles.missing(category.required_roles()),
            cached: false,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gamelens_core::AppConfig;
    use gamelens_insights::{CompletionProvider, CompletionRequest, CompletionResponse, TokenUsage};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        content: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CompletionResponse {
                content: self.content.to_string(),
                usage: TokenUsage::default(),
                cached: false,
                model: "counting".into(),
                duration_ms: 1,
            })
        }
    }

    fn dataset() -> Dataset {
        let rows = vec![
            json!({"uid": "a", "ts": "2024-01-01", "country": "DE", "rev": 3}),
            json!({"uid": "b", "ts": "2024-01-02", "country": "FR", "rev": 0}),
            json!({"uid": "c", "ts": "2024-01-03", "country": "DE", "rev": 2}),
        ];
        Dataset::from_rows(rows.into_iter().filter_map(|v| v.as_object().cloned()).collect())
    }

    fn roles() -> ColumnRoles {
        ColumnRoles::default()
            .with(ColumnRole::UserId, "uid")
            .with(ColumnRole::Timestamp, "ts")
            .with(ColumnRole::Country, "country")
            .with(ColumnRole::Revenue, "rev")
    }

    fn engine(content: &'static str) -> (QueryEngine, Arc<CountingProvider>) {
        let provider = Arc::new(CountingProvider {
            content,
            calls: AtomicUsize::new(0),
        });
        let orchestrator = InsightOrchestrator::from_config(
            &AppConfig::default(),
            Some(provider.clone() as Arc<dyn CompletionProvider>),
        );
        let engine =
            QueryEngine::new(QueryConfig::default()).with_orchestrator(Arc::new(orchestrator));
        (engine, provider)
    }

    #[tokio::test]
    async fn test_fast_path_skips_orchestrator() {
        let (engine, provider) = engine(r#"{"answer": "unused"}"#);
        let response = engine.ask("How many users?", &dataset(), &roles()).await;
        assert_eq!(response.source, AnswerSource::FastPath);
        assert_eq!(response.value, Some(3.0));
        assert_eq!(response.pattern.as_deref(), Some("user_count"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_open_question_uses_orchestrator_and_executes_logic() {
        let (engine, provider) = engine(
            r#"{"answer": "German players spent the most", "confidence": 0.7,
                "queryLogic": {"filters": [{"column": "country", "operator": "eq", "value": "DE"}],
                               "aggregations": [{"function": "sum", "column": "revenue"}]},
                "followUpQuestions": ["How about France?"]}"#,
        );
        let response = engine
            .ask("Which country generates the most revenue?", &dataset(), &roles())
            .await;
        assert_eq!(response.source, AnswerSource::Orchestrator);
        assert_eq!(response.category, QuestionCategory::Monetization);
        assert_eq!(response.value, Some(5.0));
        let evidence = response.evidence.unwrap();
        assert_eq!(evidence.rows_matched, 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_orchestrator_failure_explains_missing_data() {
        let (engine, _provider) = engine("definitely not json");
        let response = engine
            .ask("Which level do players quit on?", &dataset(), &roles())
            .await;
        assert_eq!(response.source, AnswerSource::Fallback);
        assert_eq!(response.category, QuestionCategory::Progression);
        assert_eq!(response.missing_roles, vec![ColumnRole::Level]);
        assert!(response.answer.contains("level"));
        assert!(response.error.unwrap().contains("contract"));
    }

    #[tokio::test]
    async fn test_no_orchestrator_never_fails() {
        let engine = QueryEngine::new(QueryConfig::default());
        let response = engine
            .ask("Why is retention dropping in week 3?", &dataset(), &roles())
            .await;
        assert_eq!(response.source, AnswerSource::Fallback);
        assert_eq!(response.category, QuestionCategory::Retention);
        assert!(response.missing_roles.is_empty());
        assert!(response.answer.contains("3 rows"));
    }

    #[tokio::test]
    async fn test_fast_pattern_without_roles_falls_through() {
        let engine = QueryEngine::new(QueryConfig::default());
        let response = engine
            .ask("How many sessions?", &dataset(), &roles())
            .await;
        assert_eq!(response.source, AnswerSource::Fallback);
        assert_eq!(response.missing_roles, vec![ColumnRole::SessionId]);
    }
}
