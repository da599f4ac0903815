//! Status command handler.

use anyhow::{Context, Result};

use attoclaw::agent::StateManager;
use attoclaw::config::Config;

/// Show runtime status.
pub(crate) async fn cmd_status() -> Result<()> {
    let config = Config::load().with_context(|| "Failed to load configuration")?;

    println!("AttoClaw Status");
    println!("===============");
    println!();

    let config_path = Config::path();
    let config_label = if config_path.exists() {
        "found"
    } else {
        "not found, using defaults"
    };
    println!("Config:     {} ({})", config_path.display(), config_label);

    let workspace = config.workspace_path();
    println!("Workspace:  {}", workspace.display());
    println!("Model:      {}", config.agents.defaults.model);

    let sessions_dir = config.sessions_path();
    let session_count = super::sessions::session_files(&sessions_dir)?.len();
    println!("Sessions:   {} ({})", session_count, sessions_dir.display());

    let state = StateManager::new(&workspace).state().await;
    println!();
    println!("Last contact");
    println!("------------");
    println!(
        "  Channel: {}",
        state.last_channel.as_deref().unwrap_or("(none)")
    );
    println!(
        "  Chat ID: {}",
        state.last_chat_id.as_deref().unwrap_or("(none)")
    );
    if let Some(updated) = state.updated_at {
        println!("  Updated: {}", updated.to_rfc3339());
    }

    println!();
    println!(
        "Injection check: {}",
        if config.safety.injection_check_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    Ok(())
}
