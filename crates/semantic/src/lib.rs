//! Semantic column mapping: infers canonical roles for raw dataset
//! headers.
//!
//! # Modules
//!
//! - [`classifier`]: External classifier seam and its request/response shapes
//! - [`matcher`]: Deterministic alias and token-overlap matcher
//! - [`mapper`]: Classifier-first mapping with validation and full fallback

pub mod classifier;
pub mod mapper;
pub mod matcher;

pub use classifier::{
    ClassificationRequest, ClassificationResponse, ClassifierError, ColumnClassifier,
};
pub use mapper::{MappingResult, MappingSource, SemanticColumnMapper};
pub use matcher::{AliasMatch, AliasMatcher};
