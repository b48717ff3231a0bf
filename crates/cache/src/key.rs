//! Stable content hashing for rendered prompts.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest over every part, length-prefixed so that
/// `("ab", "c")` and `("a", "bc")` never collide.
pub fn cache_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}
