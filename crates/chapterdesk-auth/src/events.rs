//! Change notifications for the UI layer
//!
//! The manager publishes discrete [`AuthEvent`]s on a broadcast channel and
//! keeps the observable fields in an [`AuthSnapshot`] on a watch channel.

use chrono::{DateTime, Utc};

use crate::records::{LockoutInfo, UserDescriptor};

/// Event emitted on every session or lockout transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Credential accepted, a new session started
    LoggedIn {
        user: UserDescriptor,
        remember_me: bool,
    },
    /// Credential rejected below the lockout threshold
    LoginFailed { attempts_remaining: u32 },
    /// Threshold reached, lockout window opened
    LockedOut {
        end_time: DateTime<Utc>,
        attempts: u32,
    },
    /// Lockout window ended, attempt counter reset
    LockoutCleared,
    /// Session removed on request
    LoggedOut,
    /// Session clock restarted
    SessionExtended,
    /// Remaining session time fell below the warning period
    SessionWarning { remaining_minutes: i64 },
    /// Session timed out and was removed; the UI should return to login
    SessionExpired,
    /// The store could not be read or written
    StorageUnavailable { reason: String },
}

/// Observable fields refreshed on each operation and tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub session_warning: bool,
    pub session_time_remaining_minutes: Option<i64>,
    pub lockout: Option<LockoutInfo>,
    /// False once a store operation failed, until one succeeds again
    pub storage_available: bool,
}

impl Default for AuthSnapshot {
    fn default() -> Self {
        Self {
            session_warning: false,
            session_time_remaining_minutes: None,
            lockout: None,
            storage_available: true,
        }
    }
}
