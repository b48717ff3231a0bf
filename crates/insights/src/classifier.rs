use std::sync::Arc;

use async_trait::async_trait;
use gamelens_semantic::{
    ClassificationRequest, ClassificationResponse, ClassifierError, ColumnClassifier,
};

use crate::error::ProviderError;
use crate::orchestrator::InsightOrchestrator;

/// Column classifier that asks the completion provider, through the
/// orchestrator's cache and rate limiter.
pub struct LlmColumnClassifier {
    orchestrator: Arc<InsightOrchestrator>,
}

impl LlmColumnClassifier {
    pub fn new(orchestrator: Arc<InsightOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl ColumnClassifier for LlmColumnClassifier {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationResponse, ClassifierError> {
        match self.orchestrator.classify_columns(request).await {
            Ok(validated) => Ok(validated.value),
            Err(ProviderError::NotConfigured) => Err(ClassifierError::Unavailable(
                ProviderError::NotConfigured.to_string(),
            )),
            Err(e) => Err(ClassifierError::Failed(e.to_string())),
        }
    }
}
