//! Error types for admin authentication

use thiserror::Error;

use crate::store::StoreError;

/// Result type alias for authentication operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Authentication error types
///
/// Every variant is meant to be rendered directly by the caller, so none of
/// them carry source chains.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Incorrect password ({attempts_remaining} attempts remaining)")]
    InvalidCredential { attempts_remaining: u32 },

    #[error("Too many failed attempts, locked out for {remaining_minutes} more minutes")]
    LockedOut { remaining_minutes: i64 },

    #[error("No active session - please log in")]
    NoActiveSession,

    #[error("Login state cannot be persisted: {0}")]
    StorageUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Credential error: {0}")]
    Credential(String),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::StorageUnavailable(e.to_string())
    }
}
