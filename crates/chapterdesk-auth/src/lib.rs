//! Chapterdesk admin authentication
//!
//! Tracks one admin session and one failed-login counter in a persisted
//! key-value store. Sessions time out after a configured period and repeated
//! failed logins trigger a temporary lockout.
//!
//! # Components
//!
//! - [`SessionManager`] owns every session/lockout transition
//! - [`KeyValueStore`] is the persistence port ([`MemoryStore`], [`JsonFileStore`])
//! - [`Clock`] supplies "now" so timeouts can be simulated
//! - [`SessionMonitor`] runs the cancellable session and lockout tickers

pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod events;
pub mod lockout;
pub mod manager;
pub mod monitor;
pub mod records;
pub mod session;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use credential::{hash_password, HashParams};
pub use error::{AuthError, Result};
pub use events::{AuthEvent, AuthSnapshot};
pub use lockout::LockoutPolicy;
pub use manager::{SessionCheck, SessionManager};
pub use monitor::SessionMonitor;
pub use records::{LockoutInfo, LockoutRecord, SessionInfo, SessionRecord, UserDescriptor};
pub use session::SessionPolicy;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, StoreError};
