//! Session timeout arithmetic
//!
//! A session is valid while `now - start_time < timeout`. There is no idle
//! tracking: only `extend_session` moves `start_time`.

use chrono::{DateTime, Duration, Utc};

use crate::lockout::ceil_minutes;

/// Session timeout configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Absolute session lifetime from start (or last renewal)
    pub timeout: Duration,
    /// Warning period before timeout (for UI notifications)
    pub warning: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::minutes(120),
            warning: Duration::minutes(10),
        }
    }
}

impl SessionPolicy {
    pub fn new(timeout: Duration, warning: Duration) -> Self {
        Self { timeout, warning }
    }

    /// Check if a session started at `start` is still valid
    pub fn is_valid(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - start < self.timeout
    }

    /// Time until expiry, zero once expired
    pub fn remaining(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        let remaining = self.timeout - (now - start);
        if remaining < Duration::zero() {
            Duration::zero()
        } else {
            remaining
        }
    }

    /// Remaining whole minutes, rounded up
    pub fn remaining_minutes(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        ceil_minutes(self.remaining(start, now))
    }

    /// Check if we're within the warning period
    pub fn should_warn(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.is_valid(start, now) && self.remaining(start, now) < self.warning
    }
}
