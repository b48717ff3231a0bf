//! Cohort analysis: first-activity or dimension cohorts, exact-day
//! retention curves, revenue and conversion, and cross-cohort comparison.

pub mod comparison;
pub mod engine;

pub use comparison::{CohortComparison, RetentionMatrix};
pub use engine::{Cohort, CohortEngine, CohortReport};
