//! Persistence port for session, lockout and attempt records
//!
//! The manager only ever talks to a [`KeyValueStore`]. Values are JSON text,
//! and `Ok(None)` is the "not present" result, distinct from any stored value.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use thiserror::Error;

/// Key holding the serialized [`crate::SessionRecord`]
pub const SESSION_KEY: &str = "chapterdesk.session";
/// Key holding the failed-attempt counter
pub const ATTEMPTS_KEY: &str = "chapterdesk.login_attempts";
/// Key holding the serialized [`crate::LockoutRecord`]
pub const LOCKOUT_KEY: &str = "chapterdesk.lockout";

/// Persistence errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Corrupt store: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Key-value persistence port (browser local storage or any durable store)
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `Ok(None)` if the key is absent
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a value; removing an absent key succeeds
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}
