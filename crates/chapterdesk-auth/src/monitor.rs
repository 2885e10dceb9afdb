//! Periodic session and lockout re-validation
//!
//! [`SessionMonitor`] owns two cancellable tickers: a coarse one driving
//! [`SessionManager::check_session`] and a fine one driving
//! [`SessionManager::check_lockout`] so countdowns update live. A supervisor
//! task follows the manager's events and starts each ticker when its state
//! appears. Tickers stop on their own once their state is gone; `stop()` or
//! dropping the monitor aborts everything.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::events::AuthEvent;
use crate::manager::{SessionCheck, SessionManager};

#[derive(Default)]
struct Tickers {
    session: Option<JoinHandle<()>>,
    lockout: Option<JoinHandle<()>>,
}

impl Tickers {
    /// Replace the session ticker; an old one may still be winding down
    fn restart_session(&mut self, manager: &Arc<SessionManager>) {
        self.stop_session();
        self.session = Some(spawn_session_ticker(Arc::clone(manager)));
    }

    fn restart_lockout(&mut self, manager: &Arc<SessionManager>) {
        self.stop_lockout();
        self.lockout = Some(spawn_lockout_ticker(Arc::clone(manager)));
    }

    fn stop_session(&mut self) {
        if let Some(handle) = self.session.take() {
            handle.abort();
        }
    }

    fn stop_lockout(&mut self) {
        if let Some(handle) = self.lockout.take() {
            handle.abort();
        }
    }
}

fn is_running(handle: &Option<JoinHandle<()>>) -> bool {
    handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
}

/// Cancellable session/lockout ticking task
pub struct SessionMonitor {
    supervisor: Option<JoinHandle<()>>,
    tickers: Arc<Mutex<Tickers>>,
}

impl SessionMonitor {
    /// Start monitoring; must be called from within a tokio runtime
    ///
    /// Both tickers run once immediately, so a session or lockout already
    /// present in the store is picked up.
    pub fn start(manager: Arc<SessionManager>) -> Self {
        let events = manager.subscribe();
        let tickers = Arc::new(Mutex::new(Tickers::default()));

        {
            let mut guard = lock(&tickers);
            guard.restart_session(&manager);
            guard.restart_lockout(&manager);
        }

        let supervisor = tokio::spawn(supervise(manager, events, Arc::clone(&tickers)));

        Self {
            supervisor: Some(supervisor),
            tickers,
        }
    }

    /// Abort the supervisor and both tickers
    pub fn stop(&mut self) {
        if let Some(handle) = self.supervisor.take() {
            handle.abort();
        }
        let mut tickers = lock(&self.tickers);
        tickers.stop_session();
        tickers.stop_lockout();
        debug!("Session monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        is_running(&self.supervisor)
    }

    pub fn session_ticker_running(&self) -> bool {
        is_running(&lock(&self.tickers).session)
    }

    pub fn lockout_ticker_running(&self) -> bool {
        is_running(&lock(&self.tickers).lockout)
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(tickers: &Mutex<Tickers>) -> std::sync::MutexGuard<'_, Tickers> {
    tickers.lock().unwrap_or_else(|e| e.into_inner())
}

async fn supervise(
    manager: Arc<SessionManager>,
    mut events: broadcast::Receiver<AuthEvent>,
    tickers: Arc<Mutex<Tickers>>,
) {
    loop {
        match events.recv().await {
            Ok(AuthEvent::LoggedIn { .. }) | Ok(AuthEvent::SessionExtended) => {
                lock(&tickers).restart_session(&manager);
            }
            Ok(AuthEvent::LoggedOut) | Ok(AuthEvent::SessionExpired) => {
                lock(&tickers).stop_session();
            }
            Ok(AuthEvent::LockedOut { .. }) => {
                lock(&tickers).restart_lockout(&manager);
            }
            Ok(AuthEvent::LockoutCleared) => {
                lock(&tickers).stop_lockout();
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                // Tickers stop themselves if their state is gone
                warn!("Session monitor missed {} events, restarting tickers", skipped);
                let mut guard = lock(&tickers);
                guard.restart_session(&manager);
                guard.restart_lockout(&manager);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn spawn_session_ticker(manager: Arc<SessionManager>) -> JoinHandle<()> {
    let period = manager.config().session_check_interval();
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match manager.check_session() {
                SessionCheck::Active { .. } => {}
                SessionCheck::NoSession | SessionCheck::Expired => break,
            }
        }
        debug!("Session ticker finished");
    })
}

fn spawn_lockout_ticker(manager: Arc<SessionManager>) -> JoinHandle<()> {
    let period = manager.config().lockout_check_interval();
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if manager.check_lockout().is_none() {
                break;
            }
        }
        debug!("Lockout ticker finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::AuthConfig;
    use crate::credential::{hash_password, tests::fast_params};
    use crate::store::MemoryStore;
    use chrono::Duration;

    const PASSWORD: &str = "chapter-admin";

    fn test_config() -> AuthConfig {
        AuthConfig::with_password_hash(hash_password(PASSWORD, &fast_params()).unwrap())
    }

    fn manager_on(
        config: AuthConfig,
        store: Arc<MemoryStore>,
        clock: &ManualClock,
    ) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(config, store, Arc::new(clock.clone())).unwrap())
    }

    fn test_manager() -> (Arc<SessionManager>, ManualClock) {
        let clock = ManualClock::default();
        let manager = manager_on(test_config(), Arc::new(MemoryStore::new()), &clock);
        (manager, clock)
    }

    async fn wait_for<F>(rx: &mut broadcast::Receiver<AuthEvent>, pred: F) -> AuthEvent
    where
        F: Fn(&AuthEvent) -> bool,
    {
        time::timeout(std::time::Duration::from_secs(600), async {
            loop {
                let event = rx.recv().await.unwrap();
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event not observed")
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_monitor_tickers_stop() {
        let (manager, _clock) = test_manager();
        let monitor = SessionMonitor::start(manager);
        settle().await;

        assert!(monitor.is_running());
        assert!(!monitor.session_ticker_running());
        assert!(!monitor.lockout_ticker_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_warning_then_expiry() {
        let (manager, clock) = test_manager();
        let mut rx = manager.subscribe();
        let monitor = SessionMonitor::start(Arc::clone(&manager));

        manager.login(PASSWORD, false).unwrap();
        settle().await;
        assert!(monitor.session_ticker_running());

        clock.advance(Duration::minutes(115));
        let event = wait_for(&mut rx, |e| matches!(e, AuthEvent::SessionWarning { .. })).await;
        assert_eq!(event, AuthEvent::SessionWarning { remaining_minutes: 5 });
        assert!(manager.snapshot().session_warning);

        clock.advance(Duration::minutes(6));
        wait_for(&mut rx, |e| *e == AuthEvent::SessionExpired).await;
        settle().await;

        assert!(!manager.is_session_valid());
        assert!(!monitor.session_ticker_running());
        assert!(monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_stops_session_ticker() {
        let (manager, _clock) = test_manager();
        let monitor = SessionMonitor::start(Arc::clone(&manager));

        manager.login(PASSWORD, false).unwrap();
        settle().await;
        assert!(monitor.session_ticker_running());

        manager.logout();
        settle().await;
        assert!(!monitor.session_ticker_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lockout_countdown_clears() {
        let (manager, clock) = test_manager();
        let mut rx = manager.subscribe();
        let monitor = SessionMonitor::start(Arc::clone(&manager));

        for _ in 0..5 {
            manager.login("wrong", false).unwrap_err();
        }
        settle().await;
        assert!(monitor.lockout_ticker_running());

        clock.advance(Duration::minutes(15));
        wait_for(&mut rx, |e| *e == AuthEvent::LockoutCleared).await;
        settle().await;

        assert!(!monitor.lockout_ticker_running());
        assert_eq!(manager.failed_attempts(), 0);
        assert!(manager.snapshot().lockout.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_picks_up_existing_session() {
        let (manager, _clock) = test_manager();
        manager.login(PASSWORD, false).unwrap();

        let monitor = SessionMonitor::start(Arc::clone(&manager));
        settle().await;
        assert!(monitor.session_ticker_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_aborts_everything() {
        let (manager, _clock) = test_manager();
        manager.login(PASSWORD, false).unwrap();

        let mut monitor = SessionMonitor::start(Arc::clone(&manager));
        settle().await;
        assert!(monitor.session_ticker_running());

        monitor.stop();
        assert!(!monitor.is_running());
        assert!(!monitor.session_ticker_running());

        // Stopping twice is harmless
        monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_removed_elsewhere_is_reported() {
        let clock = ManualClock::default();
        let store = Arc::new(MemoryStore::new());
        let config = test_config();
        let watcher = manager_on(config.clone(), Arc::clone(&store), &clock);
        let other = manager_on(config, store, &clock);

        watcher.login(PASSWORD, false).unwrap();
        let mut rx = watcher.subscribe();
        let monitor = SessionMonitor::start(Arc::clone(&watcher));
        settle().await;
        assert!(monitor.session_ticker_running());

        // Another handle hits the lockout, which ends the shared session
        for _ in 0..5 {
            other.login("wrong", false).unwrap_err();
        }

        wait_for(&mut rx, |e| *e == AuthEvent::LoggedOut).await;
        settle().await;

        assert!(!monitor.session_ticker_running());
        assert_eq!(watcher.snapshot().session_time_remaining_minutes, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_replaces_lingering_ticker() {
        let (manager, _clock) = test_manager();
        manager.login(PASSWORD, false).unwrap();

        // Stands in for a ticker that has not finished exiting yet
        let lingering = tokio::spawn(std::future::pending::<()>());
        let lingering_abort = lingering.abort_handle();
        let mut tickers = Tickers {
            session: Some(lingering),
            lockout: None,
        };

        tickers.restart_session(&manager);
        settle().await;

        assert!(lingering_abort.is_finished());
        assert!(is_running(&tickers.session));

        tickers.stop_session();
    }

    #[tokio::test(start_paused = true)]
    async fn test_lagged_supervisor_restarts_tickers() {
        let clock = ManualClock::default();
        let mut config = test_config();
        config.max_login_attempts = 50;
        let manager = manager_on(config, Arc::new(MemoryStore::new()), &clock);

        let monitor = SessionMonitor::start(Arc::clone(&manager));
        settle().await;
        assert!(!monitor.session_ticker_running());

        // LoggedIn is pushed out of the channel by the failures behind it
        manager.login(PASSWORD, false).unwrap();
        for _ in 0..20 {
            manager.login("wrong", false).unwrap_err();
        }
        settle().await;

        assert!(monitor.is_running());
        assert!(monitor.session_ticker_running());
        assert!(!monitor.lockout_ticker_running());
    }
}
