//! Lockout policy for repeated failed logins
//!
//! A fixed number of consecutive failures opens a lockout window of fixed
//! length. Attempts made while the window is open are rejected without being
//! counted.

use chrono::{DateTime, Duration, Utc};

/// Lockout thresholds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failures that open a lockout window
    pub max_attempts: u32,
    /// Length of the lockout window
    pub lockout: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout: Duration::minutes(15),
        }
    }
}

impl LockoutPolicy {
    pub fn new(max_attempts: u32, lockout: Duration) -> Self {
        Self {
            max_attempts,
            lockout,
        }
    }

    /// Check if the given failure count opens a lockout
    pub fn should_lock(&self, failed_attempts: u32) -> bool {
        failed_attempts >= self.max_attempts
    }

    /// Attempts left before the lockout opens
    pub fn attempts_remaining(&self, failed_attempts: u32) -> u32 {
        self.max_attempts.saturating_sub(failed_attempts)
    }

    /// End of a lockout window opened at `now`
    pub fn lockout_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.lockout
    }

    /// Whole minutes left in the window, rounded up; zero or negative once it ended
    pub fn remaining_minutes(&self, end_time: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        ceil_minutes(end_time - now)
    }
}

/// Round a duration up to whole minutes
pub(crate) fn ceil_minutes(d: Duration) -> i64 {
    // num_minutes truncates towards zero, which already rounds negatives up
    let minutes = d.num_minutes();
    if d > Duration::minutes(minutes) {
        minutes + 1
    } else {
        minutes
    }
}
