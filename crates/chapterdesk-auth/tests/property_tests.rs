//! Property-based tests for the session and lockout manager
//!
//! These tests verify invariants that should hold for any threshold and any
//! point in time.

use std::sync::{Arc, OnceLock};

use chrono::Duration;
use chapterdesk_auth::{
    hash_password, AuthConfig, AuthError, Clock, HashParams, ManualClock, MemoryStore,
    SessionManager,
};
use proptest::prelude::*;

const PASSWORD: &str = "maths-dpp";

fn password_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| {
        let params = HashParams {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        };
        hash_password(PASSWORD, &params).unwrap()
    })
}

fn manager(config: AuthConfig, clock: &ManualClock) -> SessionManager {
    SessionManager::new(config, Arc::new(MemoryStore::new()), Arc::new(clock.clone())).unwrap()
}

fn config_with(max_attempts: u32, lockout_minutes: u32, timeout_minutes: u32) -> AuthConfig {
    let mut config = AuthConfig::with_password_hash(password_hash());
    config.max_login_attempts = max_attempts;
    config.lockout_minutes = lockout_minutes;
    config.session_timeout_minutes = timeout_minutes;
    config.session_warning_minutes = 0;
    config
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Fewer than max failures never lock and always report max - N remaining
    #[test]
    fn prop_attempt_accumulation(max in 1u32..10, failures in 0u32..10) {
        prop_assume!(failures < max);
        let clock = ManualClock::default();
        let manager = manager(config_with(max, 15, 120), &clock);

        for n in 1..=failures {
            let err = manager.login("wrong", false).unwrap_err();
            prop_assert_eq!(err, AuthError::InvalidCredential { attempts_remaining: max - n });
        }
        prop_assert!(manager.lockout_info().is_none());
        prop_assert_eq!(manager.failed_attempts(), failures);
    }

    /// The max-th failure locks, and nothing gets in until the window ends
    #[test]
    fn prop_lockout_holds_until_end(
        max in 1u32..8,
        lockout_minutes in 1u32..60,
        elapsed_secs in 0i64..3600,
    ) {
        let clock = ManualClock::default();
        let manager = manager(config_with(max, lockout_minutes, 120), &clock);

        for _ in 0..max {
            let _ = manager.login("wrong", false);
        }
        let end = clock.now() + Duration::minutes(i64::from(lockout_minutes));
        prop_assert_eq!(manager.lockout_info().map(|l| l.end_time), Some(end));

        clock.advance(Duration::seconds(elapsed_secs));
        let result = manager.login(PASSWORD, false);
        if clock.now() < end {
            let locked = matches!(result, Err(AuthError::LockedOut { .. }));
            prop_assert!(locked);
            prop_assert_eq!(manager.failed_attempts(), max);
        } else {
            prop_assert!(result.is_ok());
            prop_assert!(manager.lockout_info().is_none());
            prop_assert_eq!(manager.failed_attempts(), 0);
        }
    }

    /// Validity flips exactly at start + timeout
    #[test]
    fn prop_session_boundary(timeout in 1u32..600, offset_secs in -3600i64..3600) {
        let clock = ManualClock::default();
        let manager = manager(config_with(5, 15, timeout), &clock);
        manager.login(PASSWORD, false).unwrap();

        let boundary = Duration::minutes(i64::from(timeout));
        let elapsed = boundary + Duration::seconds(offset_secs);
        prop_assume!(elapsed >= Duration::zero());

        clock.advance(elapsed);
        prop_assert_eq!(manager.is_session_valid(), elapsed < boundary);
    }

    /// Extending at any point restarts the full timeout from that point
    #[test]
    fn prop_extend_resets_clock(timeout in 2u32..600, at_fraction in 0.0f64..1.0) {
        let clock = ManualClock::default();
        let manager = manager(config_with(5, 15, timeout), &clock);
        manager.login(PASSWORD, false).unwrap();

        let timeout_secs = i64::from(timeout) * 60;
        let extend_at = (timeout_secs as f64 * at_fraction) as i64;
        clock.advance(Duration::seconds(extend_at));
        manager.extend_session().unwrap();

        clock.advance(Duration::seconds(timeout_secs - 1));
        prop_assert!(manager.is_session_valid());
        clock.advance(Duration::seconds(1));
        prop_assert!(!manager.is_session_valid());
    }
}
