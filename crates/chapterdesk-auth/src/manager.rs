//! Session and lockout manager
//!
//! Owns every transition of the admin session, the failed-attempt counter and
//! the lockout window. State lives in the injected [`KeyValueStore`] and is
//! re-read on every call, so changes made through another handle on the same
//! store (another tab or process) are honored. Time comes from the injected
//! [`Clock`].
//!
//! Store failures never escape as panics: unreadable state is treated as
//! absent, and the snapshot's `storage_available` flag goes false so the UI
//! can warn that login state will not persist.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::credential;
use crate::error::{AuthError, Result};
use crate::events::{AuthEvent, AuthSnapshot};
use crate::lockout::LockoutPolicy;
use crate::records::{LockoutInfo, LockoutRecord, SessionInfo, SessionRecord, UserDescriptor};
use crate::session::SessionPolicy;
use crate::store::{KeyValueStore, StoreError, ATTEMPTS_KEY, LOCKOUT_KEY, SESSION_KEY};

/// Event channel capacity
const EVENT_CAPACITY: usize = 16;

/// Outcome of a periodic session check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCheck {
    /// No session is stored
    NoSession,
    /// Session still valid
    Active { remaining_minutes: i64, warning: bool },
    /// Session timed out and has been removed
    Expired,
}

/// Admin session and login lockout manager
pub struct SessionManager {
    config: AuthConfig,
    session_policy: SessionPolicy,
    lockout_policy: LockoutPolicy,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    event_tx: broadcast::Sender<AuthEvent>,
    snapshot_tx: watch::Sender<AuthSnapshot>,
}

impl SessionManager {
    /// Create a manager; the configuration is validated first
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (snapshot_tx, _) = watch::channel(AuthSnapshot::default());

        Ok(Self {
            session_policy: config.session_policy(),
            lockout_policy: config.lockout_policy(),
            config,
            store,
            clock,
            event_tx,
            snapshot_tx,
        })
    }

    /// Create a manager on the wall clock
    pub fn with_system_clock(config: AuthConfig, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        Self::new(config, store, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Subscribe to session and lockout transitions
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.event_tx.subscribe()
    }

    /// Watch the observable fields
    pub fn watch(&self) -> watch::Receiver<AuthSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Current observable fields
    pub fn snapshot(&self) -> AuthSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Log in with the admin credential
    ///
    /// While a lockout is active every attempt is rejected with
    /// [`AuthError::LockedOut`] and is not counted, whatever the credential.
    pub fn login(&self, credential: &str, remember_me: bool) -> Result<UserDescriptor> {
        let now = self.clock.now();

        if let Some(lockout) = self.lockout_info_at(now) {
            debug!("Login rejected during lockout");
            return Err(AuthError::LockedOut {
                remaining_minutes: lockout.remaining_minutes,
            });
        }

        if !credential::verify_password(credential, &self.config.password_hash)? {
            return Err(self.record_failure(now));
        }

        let record = SessionRecord {
            user: self.config.admin.clone(),
            start_time: now,
            remember_me,
        };
        self.write_record(SESSION_KEY, &record)?;
        self.remove_soft(ATTEMPTS_KEY);
        self.remove_soft(LOCKOUT_KEY);

        let remaining = self.session_policy.remaining_minutes(now, now);
        self.snapshot_tx.send_modify(|s| {
            s.session_warning = false;
            s.session_time_remaining_minutes = Some(remaining);
            s.lockout = None;
        });

        info!("Admin '{}' logged in (remember_me={})", record.user.id, remember_me);
        self.emit(AuthEvent::LoggedIn {
            user: record.user.clone(),
            remember_me,
        });

        Ok(record.user)
    }

    /// End the session; logging out without a session is a no-op
    pub fn logout(&self) {
        let had_session = self.read_record::<SessionRecord>(SESSION_KEY).is_some();
        self.remove_soft(SESSION_KEY);
        self.clear_session_snapshot();

        if had_session {
            info!("Admin logged out");
            self.emit(AuthEvent::LoggedOut);
        }
    }

    /// Restart the session clock
    pub fn extend_session(&self) -> Result<()> {
        let now = self.clock.now();

        let mut record = self
            .read_record::<SessionRecord>(SESSION_KEY)
            .ok_or(AuthError::NoActiveSession)?;

        if !self.session_policy.is_valid(record.start_time, now) {
            self.expire_session();
            return Err(AuthError::NoActiveSession);
        }

        record.start_time = now;
        self.write_record(SESSION_KEY, &record)?;

        let remaining = self.session_policy.remaining_minutes(now, now);
        self.snapshot_tx.send_modify(|s| {
            s.session_warning = false;
            s.session_time_remaining_minutes = Some(remaining);
        });

        debug!("Session extended, {} minutes remaining", remaining);
        self.emit(AuthEvent::SessionExtended);
        Ok(())
    }

    /// Check if a non-expired session exists
    pub fn is_session_valid(&self) -> bool {
        self.active_session(self.clock.now()).is_some()
    }

    /// Check the session user's permissions; false without a valid session
    pub fn has_permission(&self, permission: &str) -> bool {
        self.active_session(self.clock.now())
            .map(|s| s.user.has_permission(permission))
            .unwrap_or(false)
    }

    /// Current session, `None` if absent or expired
    pub fn session_info(&self) -> Option<SessionInfo> {
        let now = self.clock.now();
        let record = self.active_session(now)?;

        Some(SessionInfo {
            remaining_minutes: self.session_policy.remaining_minutes(record.start_time, now),
            is_expiring_soon: self.session_policy.should_warn(record.start_time, now),
            start_time: record.start_time,
            user: record.user,
            remember_me: record.remember_me,
        })
    }

    /// Current lockout, `None` if not locked out
    ///
    /// An elapsed lockout is cleared here, together with the attempt counter.
    pub fn lockout_info(&self) -> Option<LockoutInfo> {
        self.lockout_info_at(self.clock.now())
    }

    /// Consecutive failed attempts since the last success or lockout expiry
    pub fn failed_attempts(&self) -> u32 {
        self.read_record::<u32>(ATTEMPTS_KEY).unwrap_or(0)
    }

    /// Periodic session re-validation
    ///
    /// Refreshes the observable fields, raises the warning once, and removes
    /// a timed-out session. A session that vanished from the store since the
    /// last check is reported as [`AuthEvent::LoggedOut`].
    pub fn check_session(&self) -> SessionCheck {
        let now = self.clock.now();

        let record = match self.read_record::<SessionRecord>(SESSION_KEY) {
            Some(record) => record,
            None => {
                let had_session = self
                    .snapshot_tx
                    .borrow()
                    .session_time_remaining_minutes
                    .is_some();
                self.clear_session_snapshot();
                // Removed through another handle on the store
                if had_session && self.snapshot_tx.borrow().storage_available {
                    info!("Admin session ended elsewhere");
                    self.emit(AuthEvent::LoggedOut);
                }
                return SessionCheck::NoSession;
            }
        };

        if !self.session_policy.is_valid(record.start_time, now) {
            self.expire_session();
            return SessionCheck::Expired;
        }

        let remaining = self.session_policy.remaining_minutes(record.start_time, now);
        let warning = self.session_policy.should_warn(record.start_time, now);
        let was_warning = self.snapshot_tx.borrow().session_warning;

        self.snapshot_tx.send_if_modified(|s| {
            let changed =
                s.session_warning != warning || s.session_time_remaining_minutes != Some(remaining);
            s.session_warning = warning;
            s.session_time_remaining_minutes = Some(remaining);
            changed
        });

        if warning && !was_warning {
            warn!("Admin session expires in {} minutes", remaining);
            self.emit(AuthEvent::SessionWarning {
                remaining_minutes: remaining,
            });
        }

        debug!("Session check: {} minutes remaining", remaining);
        SessionCheck::Active {
            remaining_minutes: remaining,
            warning,
        }
    }

    /// Periodic lockout re-validation
    pub fn check_lockout(&self) -> Option<LockoutInfo> {
        self.lockout_info()
    }

    fn active_session(&self, now: DateTime<Utc>) -> Option<SessionRecord> {
        self.read_record::<SessionRecord>(SESSION_KEY)
            .filter(|s| self.session_policy.is_valid(s.start_time, now))
    }

    fn lockout_info_at(&self, now: DateTime<Utc>) -> Option<LockoutInfo> {
        let record = match self.read_record::<LockoutRecord>(LOCKOUT_KEY) {
            Some(record) => record,
            None => {
                self.set_lockout_snapshot(None);
                return None;
            }
        };

        if now >= record.end_time {
            self.remove_soft(LOCKOUT_KEY);
            self.remove_soft(ATTEMPTS_KEY);
            self.set_lockout_snapshot(None);

            info!("Login lockout ended after {} failed attempts", record.attempts);
            self.emit(AuthEvent::LockoutCleared);
            return None;
        }

        let info = LockoutInfo {
            is_locked_out: true,
            remaining_minutes: self.lockout_policy.remaining_minutes(record.end_time, now),
            end_time: record.end_time,
            attempts: record.attempts,
        };
        self.set_lockout_snapshot(Some(info.clone()));
        Some(info)
    }

    /// Count a rejected credential and open the lockout at the threshold
    fn record_failure(&self, now: DateTime<Utc>) -> AuthError {
        let attempts = self.failed_attempts().saturating_add(1);
        // Write failures are already surfaced through the snapshot
        let _ = self.write_record(ATTEMPTS_KEY, &attempts);

        if !self.lockout_policy.should_lock(attempts) {
            let attempts_remaining = self.lockout_policy.attempts_remaining(attempts);
            info!("Admin login failed ({} attempts remaining)", attempts_remaining);
            self.emit(AuthEvent::LoginFailed { attempts_remaining });
            return AuthError::InvalidCredential { attempts_remaining };
        }

        let record = LockoutRecord {
            end_time: self.lockout_policy.lockout_end(now),
            attempts,
        };
        let _ = self.write_record(LOCKOUT_KEY, &record);

        // A lockout and a live session never coexist
        if self.read_record::<SessionRecord>(SESSION_KEY).is_some() {
            self.remove_soft(SESSION_KEY);
            self.clear_session_snapshot();
            self.emit(AuthEvent::LoggedOut);
        }

        let remaining_minutes = self.lockout_policy.remaining_minutes(record.end_time, now);
        warn!(
            "Admin login locked out for {} minutes after {} failed attempts",
            remaining_minutes, attempts
        );
        self.set_lockout_snapshot(Some(LockoutInfo {
            is_locked_out: true,
            remaining_minutes,
            end_time: record.end_time,
            attempts,
        }));
        self.emit(AuthEvent::LockedOut {
            end_time: record.end_time,
            attempts,
        });

        AuthError::LockedOut { remaining_minutes }
    }

    fn expire_session(&self) {
        self.remove_soft(SESSION_KEY);
        self.clear_session_snapshot();

        info!("Admin session expired");
        self.emit(AuthEvent::SessionExpired);
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn clear_session_snapshot(&self) {
        self.snapshot_tx.send_if_modified(|s| {
            let changed = s.session_warning || s.session_time_remaining_minutes.is_some();
            s.session_warning = false;
            s.session_time_remaining_minutes = None;
            changed
        });
    }

    fn set_lockout_snapshot(&self, lockout: Option<LockoutInfo>) {
        self.snapshot_tx.send_if_modified(|s| {
            if s.lockout == lockout {
                return false;
            }
            s.lockout = lockout;
            true
        });
    }

    fn storage_ok(&self) {
        self.snapshot_tx.send_if_modified(|s| {
            let changed = !s.storage_available;
            s.storage_available = true;
            changed
        });
    }

    fn storage_failed(&self, error: &StoreError) {
        let newly_failed = self.snapshot_tx.send_if_modified(|s| {
            let changed = s.storage_available;
            s.storage_available = false;
            changed
        });

        warn!("Auth store unavailable: {}", error);
        if newly_failed {
            self.emit(AuthEvent::StorageUnavailable {
                reason: error.to_string(),
            });
        }
    }

    /// Read a record; missing, unreadable and unavailable all read as `None`
    fn read_record<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key) {
            Ok(None) => {
                self.storage_ok();
                None
            }
            Ok(Some(raw)) => {
                self.storage_ok();
                match serde_json::from_str(&raw) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!("Discarding unreadable {} record: {}", key, e);
                        self.remove_soft(key);
                        None
                    }
                }
            }
            Err(e) => {
                self.storage_failed(&e);
                None
            }
        }
    }

    fn write_record<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| AuthError::StorageUnavailable(format!("Failed to serialize {}: {}", key, e)))?;

        match self.store.set(key, &raw) {
            Ok(()) => {
                self.storage_ok();
                Ok(())
            }
            Err(e) => {
                self.storage_failed(&e);
                Err(e.into())
            }
        }
    }

    fn remove_soft(&self, key: &str) {
        match self.store.remove(key) {
            Ok(()) => self.storage_ok(),
            Err(e) => self.storage_failed(&e),
        }
    }
}
