//! Persisted records and the views handed to callers

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity, role and permission set assigned on successful login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDescriptor {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl UserDescriptor {
    pub fn new<I, P>(id: impl Into<String>, role: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            id: id.into(),
            role: role.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    /// The site administrator with full chapter management rights
    pub fn admin() -> Self {
        Self::new("admin", "admin", ["read", "write", "delete", "manage_chapters"])
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Persisted session
///
/// `start_time` is the creation or last renewal time; validity is derived from
/// it and the configured timeout only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub user: UserDescriptor,
    pub start_time: DateTime<Utc>,
    /// Stored for the UI; does not change the timeout
    #[serde(default)]
    pub remember_me: bool,
}

/// Persisted lockout window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockoutRecord {
    pub end_time: DateTime<Utc>,
    /// Consecutive failures that triggered the lockout
    pub attempts: u32,
}

/// Current session as seen by the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub start_time: DateTime<Utc>,
    pub remaining_minutes: i64,
    pub is_expiring_soon: bool,
    pub user: UserDescriptor,
    pub remember_me: bool,
}

impl SessionInfo {
    /// Remaining time as H:MM
    pub fn remaining_formatted(&self) -> String {
        let mins = self.remaining_minutes.max(0);
        format!("{}:{:02}", mins / 60, mins % 60)
    }
}

/// Active lockout as seen by the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockoutInfo {
    pub is_locked_out: bool,
    pub remaining_minutes: i64,
    pub end_time: DateTime<Utc>,
    pub attempts: u32,
}

impl LockoutInfo {
    /// Message shown on the login form while locked out
    pub fn describe(&self) -> String {
        let unit = if self.remaining_minutes == 1 {
            "minute"
        } else {
            "minutes"
        };
        format!(
            "Too many failed attempts. Try again in {} {}.",
            self.remaining_minutes, unit
        )
    }
}
