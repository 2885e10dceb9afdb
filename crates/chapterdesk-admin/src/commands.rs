//! Subcommand implementations

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chapterdesk_auth::{
    hash_password, AuthConfig, AuthError, AuthEvent, HashParams, JsonFileStore, SessionManager,
    SessionMonitor,
};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::{Cli, Commands};

pub async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(AuthConfig::default_path);
    let state_path = cli.state.unwrap_or_else(JsonFileStore::default_path);
    let open = || open_manager(&config_path, &state_path);

    match cli.command {
        Commands::Login { remember_me } => login(&open()?, remember_me),
        Commands::Logout => {
            open()?.logout();
            println!("Logged out");
            Ok(())
        }
        Commands::Status { json } => status(&open()?, json),
        Commands::Extend => extend(&open()?),
        Commands::Lockout => lockout(&open()?),
        Commands::Can { permission } => can(&open()?, &permission),
        Commands::HashPassword => hash_password_cmd(),
        Commands::InitConfig { force } => init_config(&config_path, force),
        Commands::Watch => watch(Arc::new(open()?)).await,
    }
}

/// Load the config (falling back to defaults) and open the state file
fn open_manager(config_path: &Path, state_path: &Path) -> Result<SessionManager> {
    let mut config = if config_path.exists() {
        AuthConfig::load(config_path)?
    } else {
        debug!("No config at {:?}, using defaults", config_path);
        AuthConfig::default()
    };
    config.apply_env();

    let store = JsonFileStore::new(state_path)
        .with_context(|| format!("Failed to open state file {}", state_path.display()))?;

    SessionManager::with_system_clock(config, Arc::new(store)).with_context(|| {
        format!(
            "Invalid auth configuration (run `chapterdesk-admin init-config` to create {})",
            config_path.display()
        )
    })
}

fn read_password() -> Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;

    let trimmed = Zeroizing::new(line.trim_end_matches(['\r', '\n']).to_string());
    if trimmed.is_empty() {
        bail!("Empty password");
    }
    Ok(trimmed)
}

fn hash_password_cmd() -> Result<()> {
    let password = read_password()?;
    let hash = hash_password(&password, &HashParams::default())?;
    println!("{}", hash);
    Ok(())
}

fn init_config(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    let password = read_password()?;
    let config = AuthConfig::with_password_hash(hash_password(&password, &HashParams::default())?);
    config.validate()?;
    config.save(config_path)?;

    info!("Created auth config at {:?}", config_path);
    println!("Wrote {}", config_path.display());
    Ok(())
}

fn login(manager: &SessionManager, remember_me: bool) -> Result<()> {
    let password = read_password()?;

    match manager.login(&password, remember_me) {
        Ok(user) => {
            println!("Logged in as {} ({})", user.id, user.role);
            if !manager.snapshot().storage_available {
                println!("Warning: login state could not be saved and will not persist");
            }
            Ok(())
        }
        Err(AuthError::LockedOut { remaining_minutes }) => match manager.lockout_info() {
            Some(lockout) => bail!("{}", lockout.describe()),
            None => bail!(
                "Too many failed attempts. Try again in {} minutes.",
                remaining_minutes
            ),
        },
        Err(e) => Err(e.into()),
    }
}

fn status(manager: &SessionManager, json: bool) -> Result<()> {
    let session = manager.session_info();
    let lockout = manager.lockout_info();
    let attempts = manager.failed_attempts();
    let storage_available = manager.snapshot().storage_available;

    if json {
        let value = serde_json::json!({
            "session": session,
            "lockout": lockout,
            "failedAttempts": attempts,
            "storageAvailable": storage_available,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match &session {
        Some(info) => {
            println!("Session:   {} ({})", info.user.id, info.user.role);
            println!("Started:   {}", info.start_time.to_rfc3339());
            println!("Remaining: {}", info.remaining_formatted());
            if info.is_expiring_soon {
                println!("           expiring soon - run `chapterdesk-admin extend`");
            }
        }
        None => println!("Session:   none"),
    }

    match &lockout {
        Some(info) => println!("Lockout:   {}", info.describe()),
        None => println!("Lockout:   none ({} failed attempts)", attempts),
    }

    if !storage_available {
        println!("Warning: state file unavailable, login state will not persist");
    }

    Ok(())
}

fn extend(manager: &SessionManager) -> Result<()> {
    manager.extend_session()?;
    if let Some(info) = manager.session_info() {
        println!("Session extended, {} remaining", info.remaining_formatted());
    }
    Ok(())
}

fn lockout(manager: &SessionManager) -> Result<()> {
    match manager.lockout_info() {
        Some(info) => println!("{}", info.describe()),
        None => println!("Not locked out"),
    }
    Ok(())
}

fn can(manager: &SessionManager, permission: &str) -> Result<()> {
    if !manager.is_session_valid() {
        return Err(AuthError::NoActiveSession.into());
    }
    if !manager.has_permission(permission) {
        bail!("Permission '{}' denied", permission);
    }
    println!("Permission '{}' granted", permission);
    Ok(())
}

async fn watch(manager: Arc<SessionManager>) -> Result<()> {
    if !manager.is_session_valid() {
        return Err(AuthError::NoActiveSession.into());
    }

    let mut events = manager.subscribe();
    let mut monitor = SessionMonitor::start(Arc::clone(&manager));

    if let Some(info) = manager.session_info() {
        println!("Watching session, {} remaining (Ctrl-C to stop)", info.remaining_formatted());
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received interrupt");
                break;
            }
            event = events.recv() => match event {
                Ok(AuthEvent::SessionWarning { remaining_minutes }) => {
                    println!(
                        "Session expires in {} minutes - run `chapterdesk-admin extend` to stay logged in",
                        remaining_minutes
                    );
                }
                Ok(AuthEvent::SessionExpired) => {
                    println!("Session expired - please log in again");
                    break;
                }
                Ok(AuthEvent::LoggedOut) => {
                    println!("Logged out");
                    break;
                }
                Ok(AuthEvent::StorageUnavailable { reason }) => {
                    println!("Warning: state file unavailable ({})", reason);
                }
                Ok(other) => debug!("Auth event: {:?}", other),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    monitor.stop();
    Ok(())
}
