#![warn(clippy::unwrap_used)]

pub mod key;
pub mod local;

pub use key::cache_key;
pub use local::{CacheEntry, ResponseCache};
