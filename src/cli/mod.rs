//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod config;
pub mod sessions;
pub mod status;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "attoclaw")]
#[command(version)]
#[command(about = "Small personal AI assistant runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information
    Version,
    /// Show runtime status (paths, sessions, last contact)
    Status,
    /// Show or validate configuration (prints the effective config by default)
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
    /// Inspect and maintain persisted sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as JSON
    Show,
    /// Validate the configuration file
    Check,
}

#[derive(Subcommand)]
pub enum SessionsAction {
    /// List persisted sessions
    List,
    /// Show the history of one session
    Show {
        /// Session key (e.g. "telegram:12345")
        key: String,
    },
    /// Remove sessions idle for longer than the TTL
    Prune,
    /// Delete one session
    Clear {
        /// Session key (e.g. "telegram:12345")
        key: String,
    },
}

pub async fn run() -> Result<()> {
    // Load config early so logging respects it; fall back to defaults if the
    // file is missing or unreadable.
    let logging_cfg = attoclaw::config::Config::load()
        .map(|c| c.logging)
        .unwrap_or_default();
    attoclaw::utils::logging::init_logging(&logging_cfg)?;

    let cli = Cli::parse();

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            cmd_version();
        }
        Some(Commands::Status) => {
            status::cmd_status().await?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(action.unwrap_or(ConfigAction::Show)).await?;
        }
        Some(Commands::Sessions { action }) => {
            sessions::cmd_sessions(action).await?;
        }
    }

    Ok(())
}

fn cmd_version() {
    println!("attoclaw {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Small personal AI assistant runtime");
}
