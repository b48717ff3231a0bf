//! Seam for the external column classifier.

use async_trait::async_trait;
use gamelens_core::{ColumnMapping, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    #[error("classifier failed: {0}")]
    Failed(String),
}

/// Free-form hints forwarded to the classifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierConfig {
    #[serde(default)]
    pub game_type_hint: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRequest {
    pub headers: Vec<String>,
    pub sample_rows: Vec<Row>,
    #[serde(default)]
    pub config: ClassifierConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResponse {
    pub columns: Vec<ColumnMapping>,
    #[serde(default)]
    pub game_type: Option<String>,
    #[serde(default)]
    pub suggested_charts: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub data_quality: f64,
}

/// Anything that can propose a role for each header.
#[async_trait]
pub trait ColumnClassifier: Send + Sync {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationResponse, ClassifierError>;
}
