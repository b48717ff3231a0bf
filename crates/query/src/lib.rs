//! Question answering over a mapped dataset.
//!
//! Questions are first matched against an ordered list of fast patterns
//! that compute exact answers straight from the rows. Anything else is
//! delegated to the insight orchestrator; structured query logic in its
//! answer is executed here so numbers stay verifiable. When the
//! orchestrator fails, a deterministic explanation of the missing data is
//! returned instead.

pub mod category;
pub mod context;
pub mod engine;
pub mod executor;
pub mod fast_path;

pub use category::QuestionCategory;
pub use engine::{AnswerSource, QueryEngine, QueryResponse};
pub use executor::{execute, QueryEvidence};
pub use fast_path::{FastAnswer, FastPattern};
