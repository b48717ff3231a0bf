use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use gamelens_anomaly::{AnomalyDetector, AnomalyReport};
use gamelens_cohort::{CohortEngine, CohortReport};
use gamelens_core::{AppConfig, Dataset};
use gamelens_insights::{
    CompletionProvider, InsightOrchestrator, InsightSet, LlmColumnClassifier, OrchestratorStats,
    TokenUsage,
};
use gamelens_query::{QueryEngine, QueryResponse};
use gamelens_semantic::{MappingResult, SemanticColumnMapper};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::insight_context;
use crate::fallback::fallback_insights;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSource {
    Generated,
    Cached,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightOutcome {
    pub source: InsightSource,
    pub set: InsightSet,
    pub usage: TokenUsage,
    /// Why the generated pass was not used.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub row_count: usize,
    pub mapping: MappingResult,
    pub anomalies: AnomalyReport,
    pub cohorts: CohortReport,
    pub insights: InsightOutcome,
    pub orchestrator: OrchestratorStats,
}

pub struct AnalysisPipeline {
    mapper: SemanticColumnMapper,
    detector: AnomalyDetector,
    cohorts: CohortEngine,
    orchestrator: Arc<InsightOrchestrator>,
    query: QueryEngine,
}

impl AnalysisPipeline {
    /// Wire every stage from configuration. Without a provider the column
    /// classifier is skipped and insights come from the fallback.
    pub fn from_config(config: &AppConfig, provider: Option<Arc<dyn CompletionProvider>>) -> Self {
        let orchestrator = Arc::new(InsightOrchestrator::from_config(config, provider));
        Self::with_orchestrator(config, orchestrator)
    }

    pub fn with_orchestrator(config: &AppConfig, orchestrator: Arc<InsightOrchestrator>) -> Self {
        let mut mapper = SemanticColumnMapper::new(config.mapping.clone());
        if orchestrator.is_configured() {
            let classifier = LlmColumnClassifier::new(orchestrator.clone());
            mapper = mapper.with_classifier(Arc::new(classifier));
        }
        Self {
            mapper,
            detector: AnomalyDetector::new(config.anomaly.clone()),
            cohorts: CohortEngine::new(config.cohort.clone()),
            query: QueryEngine::new(config.query.clone()).with_orchestrator(orchestrator.clone()),
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &Arc<InsightOrchestrator> {
        &self.orchestrator
    }

    pub async fn map(&self, dataset: &Dataset) -> MappingResult {
        self.mapper.map_dataset(dataset).await
    }

    /// Full run. Mapping, anomaly and cohort output is always present; a
    /// failed insight pass only swaps in fallback insights.
    pub async fn run(&self, dataset: &Dataset) -> AnalysisReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(
            run_id = %run_id,
            rows = dataset.len(),
            columns = dataset.columns.len(),
            "Analysis run started"
        );

        let mapping = self.map(dataset).await;
        let roles = mapping.roles();
        let anomalies = self.detector.detect(dataset, &roles);
        let cohorts = self.cohorts.analyze(dataset, &roles);

        let context = insight_context(dataset, &mapping, &anomalies, &cohorts);
        let insights = match self.orchestrator.generate_insights(&context).await {
            Ok(validated) => InsightOutcome {
                source: if validated.cached {
                    InsightSource::Cached
                } else {
                    InsightSource::Generated
                },
                set: validated.value,
                usage: validated.usage,
                error: None,
            },
            Err(e) => {
                warn!(
                    run_id = %run_id,
                    error = %e,
                    recoverable = e.is_recoverable(),
                    "Insight generation failed, using fallback insights"
                );
                InsightOutcome {
                    source: InsightSource::Fallback,
                    set: fallback_insights(&anomalies, &cohorts),
                    usage: TokenUsage::default(),
                    error: Some(e.to_string()),
                }
            }
        };

        let duration_ms = clock.elapsed().as_millis() as u64;
        info!(
            run_id = %run_id,
            duration_ms = duration_ms,
            anomalies = anomalies.anomalies.len(),
            cohorts = cohorts.cohorts.len(),
            insight_source = ?insights.source,
            "Analysis run complete"
        );

        AnalysisReport {
            run_id,
            started_at,
            duration_ms,
            row_count: dataset.len(),
            mapping,
            anomalies,
            cohorts,
            insights,
            orchestrator: self.orchestrator.stats(),
        }
    }

    /// Answer a question against an already mapped dataset.
    pub async fn ask(
        &self,
        dataset: &Dataset,
        mapping: &MappingResult,
        question: &str,
    ) -> QueryResponse {
        self.query.ask(question, dataset, &mapping.roles()).await
    }
}
