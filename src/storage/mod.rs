//! Storage seams consumed by the cohort core
//!
//! The core persists through a plain key/value abstraction and an
//! injectable encryption provider; it never assumes a database or
//! multi-key transactions. Hosts bring their own durable backends, the
//! in-memory implementations here back tests and local runs.

pub mod encryption;
pub mod memory;

use crate::error::Result;
use async_trait::async_trait;

pub use encryption::{EncryptionProvider, PlaintextCipher};
pub use memory::MemoryStore;

/// Key/value storage backend trait
///
/// Single-key operations only; callers must tolerate the absence of
/// cross-key atomicity.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the bytes stored at `key`, if any
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` at `key`, replacing any previous value
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Remove `key`; removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Key naming scheme for core-owned records
pub mod keys {
    /// Per-user engine state (visits + assignments), ciphertext
    pub fn user_state(user_id: &str) -> String {
        format!("cohorts/state/{user_id}")
    }

    /// Per-user sharing preferences, ciphertext
    pub fn preferences(user_id: &str) -> String {
        format!("cohorts/prefs/{user_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_naming() {
        assert_eq!(keys::user_state("u-1"), "cohorts/state/u-1");
        assert_eq!(keys::preferences("u-1"), "cohorts/prefs/u-1");
        assert_ne!(keys::user_state("u-1"), keys::preferences("u-1"));
    }
}
