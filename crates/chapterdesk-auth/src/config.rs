//! Authentication configuration
//!
//! Loaded from TOML. Every field except `password_hash` has a default, and
//! [`AuthConfig::validate`] runs before a manager is built from it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credential;
use crate::error::{AuthError, Result};
use crate::lockout::LockoutPolicy;
use crate::records::UserDescriptor;
use crate::session::SessionPolicy;

/// Environment variable that replaces the configured password hash
pub const PASSWORD_HASH_ENV: &str = "CHAPTERDESK_ADMIN_PASSWORD_HASH";

/// Configuration file name
const CONFIG_FILE_NAME: &str = "auth.toml";

/// Configuration directory name under the platform config dir
const CONFIG_DIR_NAME: &str = "chapterdesk";

/// Session and lockout configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_timeout_minutes: u32,

    /// Time before expiry at which the warning flag is raised
    pub session_warning_minutes: u32,

    pub max_login_attempts: u32,

    pub lockout_minutes: u32,

    /// Argon2 PHC string of the admin password
    pub password_hash: String,

    /// Session re-validation period for the monitor
    pub session_check_interval_secs: u64,

    /// Lockout re-validation period for the monitor
    pub lockout_check_interval_secs: u64,

    /// Descriptor stored in the session on successful login
    // Must stay last: serializes as a trailing TOML table
    pub admin: UserDescriptor,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_timeout_minutes: 120,
            session_warning_minutes: 10,
            max_login_attempts: 5,
            lockout_minutes: 15,
            password_hash: String::new(),
            session_check_interval_secs: 60,
            lockout_check_interval_secs: 1,
            admin: UserDescriptor::admin(),
        }
    }
}

impl AuthConfig {
    /// Default config with the given password hash
    pub fn with_password_hash(password_hash: impl Into<String>) -> Self {
        Self {
            password_hash: password_hash.into(),
            ..Default::default()
        }
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            AuthError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| AuthError::InvalidConfig(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| AuthError::InvalidConfig(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| AuthError::InvalidConfig(format!("Failed to create {}: {}", parent.display(), e)))?;
            }
        }

        fs::write(path, contents)
            .map_err(|e| AuthError::InvalidConfig(format!("Failed to write {}: {}", path.display(), e)))?;

        debug!("Saved auth config to {:?}", path);
        Ok(())
    }

    /// Apply [`PASSWORD_HASH_ENV`] if it is set
    pub fn apply_env(&mut self) {
        self.override_password_hash(std::env::var(PASSWORD_HASH_ENV).ok());
    }

    /// Replace the password hash with a non-empty override
    pub fn override_password_hash(&mut self, hash: Option<String>) {
        if let Some(hash) = hash.filter(|h| !h.trim().is_empty()) {
            debug!("Using admin password hash from environment");
            self.password_hash = hash.trim().to_string();
        }
    }

    /// Reject configurations the manager cannot enforce
    pub fn validate(&self) -> Result<()> {
        if self.session_timeout_minutes == 0 {
            return Err(AuthError::InvalidConfig(
                "session_timeout_minutes must be positive".to_string(),
            ));
        }
        if self.session_warning_minutes >= self.session_timeout_minutes {
            return Err(AuthError::InvalidConfig(format!(
                "session_warning_minutes ({}) must be below session_timeout_minutes ({})",
                self.session_warning_minutes, self.session_timeout_minutes
            )));
        }
        if self.max_login_attempts == 0 {
            return Err(AuthError::InvalidConfig(
                "max_login_attempts must be positive".to_string(),
            ));
        }
        if self.lockout_minutes == 0 {
            return Err(AuthError::InvalidConfig(
                "lockout_minutes must be positive".to_string(),
            ));
        }
        if self.session_check_interval_secs == 0 || self.lockout_check_interval_secs == 0 {
            return Err(AuthError::InvalidConfig(
                "check intervals must be positive".to_string(),
            ));
        }
        if self.password_hash.is_empty() {
            return Err(AuthError::InvalidConfig(format!(
                "password_hash is not set (configure it or set {})",
                PASSWORD_HASH_ENV
            )));
        }
        credential::validate_hash(&self.password_hash)
    }

    pub fn session_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.session_timeout_minutes))
    }

    pub fn session_warning(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.session_warning_minutes))
    }

    pub fn lockout_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.lockout_minutes))
    }

    pub fn session_check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.session_check_interval_secs)
    }

    pub fn lockout_check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.lockout_check_interval_secs)
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy::new(self.session_timeout(), self.session_warning())
    }

    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy::new(self.max_login_attempts, self.lockout_duration())
    }
}
