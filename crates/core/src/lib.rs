//! Shared model for the gamelens analytics pipeline: datasets, semantic
//! column roles, metric catalog, time bucketing and configuration.

pub mod config;
pub mod error;
pub mod metric;
pub mod schema;
pub mod time;
pub mod types;

pub use config::AppConfig;
pub use error::{GameLensError, GameLensResult};
pub use metric::MetricKind;
pub use schema::{ColumnMapping, ColumnRole, ColumnRoles, InferredType};
pub use time::Granularity;
pub use types::{Dataset, Row, TimeRange};
