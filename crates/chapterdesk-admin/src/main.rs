//! Chapterdesk admin console
//!
//! Drives the admin session from a terminal: log in and out, inspect the
//! session and lockout state, and watch the session until it expires.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chapterdesk-admin")]
#[command(about = "Admin session console for the Chapterdesk tutoring site", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Auth configuration file (TOML)
    #[arg(long, global = true, env = "CHAPTERDESK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Session state file
    #[arg(long, global = true, env = "CHAPTERDESK_STATE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in; the password is read from stdin
    Login {
        /// Keep the "remember me" flag on the session
        #[arg(long)]
        remember_me: bool,
    },

    /// End the current session
    Logout,

    /// Show session and lockout state
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Restart the session timeout
    Extend,

    /// Show the active lockout, if any
    Lockout,

    /// Check a permission of the logged-in user
    Can {
        /// Permission name (e.g. write)
        permission: String,
    },

    /// Hash a password read from stdin for the config file
    HashPassword,

    /// Write a default config with a password read from stdin
    InitConfig {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Follow the session until it ends
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chapterdesk_admin=info,chapterdesk_auth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    commands::run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_login() {
        let cli = Cli::try_parse_from(["chapterdesk-admin", "login", "--remember-me"]).unwrap();
        assert!(matches!(cli.command, Commands::Login { remember_me: true }));
    }

    #[test]
    fn test_parse_global_paths() {
        let cli = Cli::try_parse_from([
            "chapterdesk-admin",
            "status",
            "--json",
            "--state",
            "/tmp/state.json",
        ])
        .unwrap();
        assert_eq!(cli.state, Some(PathBuf::from("/tmp/state.json")));
        assert!(matches!(cli.command, Commands::Status { json: true }));
    }
}
