//! Semantic column mapper: classifier first, alias matcher as validator
//! and as complete fallback. Mapping never fails: every header comes back
//! with a role and a confidence in [0, 1].

use std::sync::Arc;

use gamelens_core::config::MappingConfig;
use gamelens_core::schema::infer_type;
use gamelens_core::{ColumnMapping, ColumnRole, ColumnRoles, Dataset, InferredType, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classifier::{ClassificationRequest, ClassifierConfig, ColumnClassifier};
use crate::matcher::{tokenize, AliasMatcher};

/// Which path produced the final mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    /// Every column came from the classifier unchanged.
    Classifier,
    /// Classifier output with matcher overrides or gaps filled.
    Hybrid,
    /// Classifier absent or failed; alias matcher only.
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingResult {
    pub mappings: Vec<ColumnMapping>,
    pub warnings: Vec<String>,
    /// Overall mapping quality in [0, 1].
    pub quality_score: f64,
    pub source: MappingSource,
    pub game_type: Option<String>,
    pub suggested_charts: Vec<String>,
    /// Data quality as reported by the classifier, when it answered.
    pub classifier_quality: Option<f64>,
}

impl MappingResult {
    pub fn roles(&self) -> ColumnRoles {
        ColumnRoles::from_mappings(&self.mappings)
    }
}

const CORE_ROLES: [ColumnRole; 3] = [
    ColumnRole::UserId,
    ColumnRole::Timestamp,
    ColumnRole::EventName,
];

pub struct SemanticColumnMapper {
    config: MappingConfig,
    matcher: AliasMatcher,
    classifier: Option<Arc<dyn ColumnClassifier>>,
}

impl SemanticColumnMapper {
    pub fn new(config: MappingConfig) -> Self {
        Self {
            matcher: AliasMatcher::new(config.min_similarity),
            config,
            classifier: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ColumnClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_matcher(mut self, matcher: AliasMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub async fn map_dataset(&self, dataset: &Dataset) -> MappingResult {
        let sample = dataset.sample(self.config.sample_rows);
        self.map_columns(&dataset.columns, &sample, ClassifierConfig::default())
            .await
    }

    /// Map every header, preferring the classifier and degrading to the
    /// alias matcher on any classifier failure.
    pub async fn map_columns(
        &self,
        headers: &[String],
        sample: &[Row],
        classifier_config: ClassifierConfig,
    ) -> MappingResult {
        let Some(classifier) = &self.classifier else {
            debug!(columns = headers.len(), "No classifier configured, using alias matcher");
            return self.fallback_mapping(headers, sample);
        };

        let request = ClassificationRequest {
            headers: headers.to_vec(),
            sample_rows: sample.to_vec(),
            config: classifier_config,
        };

        let response = match classifier.classify(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Column classifier failed, using alias matcher");
                let mut result = self.fallback_mapping(headers, sample);
                let reason =
                    format!("Classifier unavailable ({e}); columns mapped by alias matcher");
                result.warnings.insert(0, reason);
                return result;
            }
        };

        let mut mappings = Vec::with_capacity(headers.len());
        let mut warnings = response.warnings.clone();
        let mut altered = false;

        for header in headers {
            let proposed = response
                .columns
                .iter()
                .find(|c| c.original_name == *header)
                .or_else(|| {
                    response
                        .columns
                        .iter()
                        .find(|c| c.original_name.eq_ignore_ascii_case(header))
                });

            match proposed {
                Some(proposed) => {
                    let (mapping, overridden) = self.validate(header, proposed, sample);
                    altered |= overridden;
                    mappings.push(mapping);
                }
                None => {
                    altered = true;
                    warnings.push(format!("Classifier returned no mapping for '{header}'"));
                    mappings.push(self.fallback_one(header, sample));
                }
            }
        }

        let source = if altered {
            MappingSource::Hybrid
        } else {
            MappingSource::Classifier
        };
        let classifier_quality = Some(clamp_unit(response.data_quality));
        self.finish(
            mappings,
            warnings,
            source,
            response.game_type,
            response.suggested_charts,
            classifier_quality,
        )
    }

    /// Matcher-only mapping; each result carries the fallback penalty.
    pub fn fallback_mapping(&self, headers: &[String], sample: &[Row]) -> MappingResult {
        let mappings = headers.iter().map(|h| self.fallback_one(h, sample)).collect();
        self.finish(mappings, Vec::new(), MappingSource::Fallback, None, Vec::new(), None)
    }

    /// Re-check a low-confidence classifier proposal against the matcher.
    /// The matcher only wins when its penalized confidence is strictly higher.
    fn validate(
        &self,
        header: &str,
        proposed: &ColumnMapping,
        sample: &[Row],
    ) -> (ColumnMapping, bool) {
        let confidence = clamp_unit(proposed.confidence);
        let inferred_type = if proposed.inferred_type == InferredType::Unknown {
            infer_type(header, sample)
        } else {
            proposed.inferred_type
        };
        let mut mapping = ColumnMapping {
            original_name: header.to_string(),
            canonical_role: proposed.canonical_role,
            inferred_type,
            confidence,
            rationale: proposed.rationale.clone(),
        };

        if confidence >= self.config.low_confidence_threshold {
            return (mapping, false);
        }

        if let Some(m) = self.matcher.match_header(header) {
            let penalized = clamp_unit(m.confidence * self.config.validation_penalty);
            if penalized > confidence {
                debug!(
                    column = header,
                    classifier_role = %proposed.canonical_role,
                    matcher_role = %m.role,
                    confidence = penalized,
                    "Alias matcher overrides low-confidence classification"
                );
                mapping.canonical_role = m.role;
                mapping.confidence = penalized;
                mapping.rationale = format!(
                    "Alias '{}' overrides classifier ({} at {:.2})",
                    m.matched_alias, proposed.canonical_role, confidence
                );
                return (mapping, true);
            }
        }
        (mapping, false)
    }

    fn fallback_one(&self, header: &str, sample: &[Row]) -> ColumnMapping {
        let inferred_type = infer_type(header, sample);
        let penalty = self.config.fallback_penalty;
        if let Some(m) = self.matcher.match_header(header) {
            let kind = if m.exact { "Exact alias" } else { "Token overlap with alias" };
            return ColumnMapping {
                original_name: header.to_string(),
                canonical_role: m.role,
                inferred_type,
                confidence: clamp_unit(m.confidence * penalty),
                rationale: format!("{kind} '{}' (fallback matcher)", m.matched_alias),
            };
        }

        if let Some(keyword) = self.noise_keyword(header) {
            return ColumnMapping {
                original_name: header.to_string(),
                canonical_role: ColumnRole::Noise,
                inferred_type,
                confidence: clamp_unit(0.5 * penalty),
                rationale: format!("Header contains '{keyword}'; likely not analytic data"),
            };
        }

        ColumnMapping {
            original_name: header.to_string(),
            canonical_role: ColumnRole::Unknown,
            inferred_type,
            confidence: 0.0,
            rationale: "No alias or keyword match".to_string(),
        }
    }

    fn noise_keyword(&self, header: &str) -> Option<&str> {
        let lowered = header.to_lowercase();
        let tokens = tokenize(header);
        self.config
            .noise_keywords
            .iter()
            .find(|k| {
                tokens.iter().any(|t| t == *k) || (k.len() > 4 && lowered.contains(k.as_str()))
            })
            .map(String::as_str)
    }

    fn finish(
        &self,
        mappings: Vec<ColumnMapping>,
        mut warnings: Vec<String>,
        source: MappingSource,
        game_type: Option<String>,
        suggested_charts: Vec<String>,
        classifier_quality: Option<f64>,
    ) -> MappingResult {
        let roles = ColumnRoles::from_mappings(&mappings);

        for role in [ColumnRole::UserId, ColumnRole::Timestamp] {
            if !roles.has(role) {
                warnings.push(format!(
                    "No column identified as {role}; dependent analyses will be skipped"
                ));
            }
        }

        for role in ColumnRole::SEMANTIC {
            let columns: Vec<&str> = mappings
                .iter()
                .filter(|m| m.canonical_role == role)
                .map(|m| m.original_name.as_str())
                .collect();
            if columns.len() > 1 {
                warnings.push(format!(
                    "Columns {} all mapped to {role}; using '{}'",
                    columns.join(", "),
                    columns[0]
                ));
            }
        }

        let weak: Vec<&str> = mappings
            .iter()
            .filter(|m| m.canonical_role.is_semantic() && m.confidence < 0.5)
            .map(|m| m.original_name.as_str())
            .collect();
        if !weak.is_empty() {
            warnings.push(format!("Low-confidence mappings: {}", weak.join(", ")));
        }

        let quality_score = quality_score(&mappings, &roles);
        debug!(
            columns = mappings.len(),
            quality = quality_score,
            ?source,
            "Column mapping complete"
        );

        MappingResult {
            mappings,
            warnings,
            quality_score,
            source,
            game_type,
            suggested_charts,
            classifier_quality,
        }
    }
}

/// 70% mean confidence, 30% coverage of the core roles.
fn quality_score(mappings: &[ColumnMapping], roles: &ColumnRoles) -> f64 {
    if mappings.is_empty() {
        return 0.0;
    }
    let mean = mappings.iter().map(|m| m.confidence).sum::<f64>() / mappings.len() as f64;
    let covered = CORE_ROLES.iter().filter(|r| roles.has(**r)).count();
    let coverage = covered as f64 / CORE_ROLES.len() as f64;
    let score = 0.7 * mean + 0.3 * coverage;
    (clamp_unit(score) * 100.0).round() / 100.0
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassificationResponse, ClassifierError};
    use async_trait::async_trait;
    use serde_json::json;

    struct FailingClassifier;

    #[async_trait]
    impl ColumnClassifier for FailingClassifier {
        async fn classify(
            &self,
            _: &ClassificationRequest,
        ) -> Result<ClassificationResponse, ClassifierError> {
            Err(ClassifierError::Unavailable("offline".into()))
        }
    }

    struct CannedClassifier(Vec<ColumnMapping>);

    #[async_trait]
    impl ColumnClassifier for CannedClassifier {
        async fn classify(
            &self,
            _: &ClassificationRequest,
        ) -> Result<ClassificationResponse, ClassifierError> {
            Ok(ClassificationResponse {
                columns: self.0.clone(),
                game_type: Some("puzzle".into()),
                suggested_charts: vec!["retention_curve".into()],
                warnings: vec![],
                data_quality: 0.9,
            })
        }
    }

    fn proposed(name: &str, role: ColumnRole, confidence: f64) -> ColumnMapping {
        ColumnMapping {
            original_name: name.to_string(),
            canonical_role: role,
            inferred_type: InferredType::Unknown,
            confidence,
            rationale: "classifier".into(),
        }
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> Vec<Row> {
        let row = json!({
            "uid": "u1",
            "event_time": "2024-01-01T00:00:00Z",
            "debug_hash": "abc",
            "mood": "ok",
        });
        vec![row.as_object().unwrap().clone()]
    }

    #[tokio::test]
    async fn test_classifier_failure_falls_back_for_every_header() {
        let mapper = SemanticColumnMapper::new(MappingConfig::default())
            .with_classifier(Arc::new(FailingClassifier));
        let cols = headers(&["uid", "event_time", "debug_hash", "mood"]);
        let result = mapper.map_columns(&cols, &sample(), ClassifierConfig::default()).await;

        assert_eq!(result.source, MappingSource::Fallback);
        assert_eq!(result.mappings.len(), 4);
        assert!(result.mappings.iter().all(|m| (0.0..=1.0).contains(&m.confidence)));
        assert!(result.warnings[0].contains("Classifier unavailable"));

        let uid = &result.mappings[0];
        assert_eq!(uid.canonical_role, ColumnRole::UserId);
        assert!((uid.confidence - 0.8).abs() < 1e-9);
        assert_eq!(result.mappings[1].inferred_type, InferredType::Timestamp);
        assert_eq!(result.mappings[2].canonical_role, ColumnRole::Noise);
        assert_eq!(result.mappings[3].canonical_role, ColumnRole::Unknown);
    }

    #[tokio::test]
    async fn test_low_confidence_classification_overridden() {
        let mapper = SemanticColumnMapper::new(MappingConfig::default()).with_classifier(Arc::new(
            CannedClassifier(vec![proposed("uid", ColumnRole::Score, 0.3)]),
        ));
        let result = mapper
            .map_columns(&headers(&["uid"]), &sample(), ClassifierConfig::default())
            .await;

        let uid = &result.mappings[0];
        assert_eq!(uid.canonical_role, ColumnRole::UserId);
        assert!((uid.confidence - 0.9).abs() < 1e-9);
        assert_eq!(result.source, MappingSource::Hybrid);
    }

    #[tokio::test]
    async fn test_matcher_must_beat_classifier_strictly() {
        // similarity 0.5 * 0.9 = 0.45 does not beat 0.7
        let mapper = SemanticColumnMapper::new(MappingConfig::default()).with_classifier(Arc::new(
            CannedClassifier(vec![proposed("user_country", ColumnRole::Platform, 0.7)]),
        ));
        let result = mapper
            .map_columns(&headers(&["user_country"]), &[], ClassifierConfig::default())
            .await;
        assert_eq!(result.mappings[0].canonical_role, ColumnRole::Platform);
        assert_eq!(result.mappings[0].confidence, 0.7);
        assert_eq!(result.source, MappingSource::Classifier);
    }

    #[tokio::test]
    async fn test_confident_classification_kept_and_gaps_filled() {
        let mapper = SemanticColumnMapper::new(MappingConfig::default()).with_classifier(Arc::new(
            CannedClassifier(vec![proposed("uid", ColumnRole::UserId, 1.7)]),
        ));
        let result = mapper
            .map_columns(&headers(&["uid", "event_time"]), &sample(), ClassifierConfig::default())
            .await;

        assert_eq!(result.mappings[0].confidence, 1.0);
        assert_eq!(result.mappings[1].canonical_role, ColumnRole::Timestamp);
        assert_eq!(result.source, MappingSource::Hybrid);
        assert_eq!(result.game_type.as_deref(), Some("puzzle"));
        assert!(result.warnings.iter().any(|w| w.contains("event_time")));
    }

    #[test]
    fn test_fallback_quality_and_warnings() {
        let mapper = SemanticColumnMapper::new(MappingConfig::default());
        let result = mapper.fallback_mapping(&headers(&["mood", "user_id", "player"]), &[]);
        assert!(result.warnings.iter().any(|w| w.contains("timestamp")));
        assert!(result.warnings.iter().any(|w| w.contains("user_id, player")));
        assert!((0.0..=1.0).contains(&result.quality_score));
        assert_eq!(result.roles().column(ColumnRole::UserId), Some("user_id"));
    }

    #[tokio::test]
    async fn test_no_classifier_uses_fallback() {
        let mapper = SemanticColumnMapper::new(MappingConfig::default());
        let result = mapper
            .map_columns(&headers(&["ts"]), &[], ClassifierConfig::default())
            .await;
        assert_eq!(result.source, MappingSource::Fallback);
        assert_eq!(result.mappings[0].canonical_role, ColumnRole::Timestamp);
    }
}
