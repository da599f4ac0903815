//! Session maintenance command handlers.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use attoclaw::config::Config;
use attoclaw::session::{Role, SessionManager};

use super::SessionsAction;

/// Inspect and maintain persisted sessions.
pub(crate) async fn cmd_sessions(action: SessionsAction) -> Result<()> {
    let config = Config::load().with_context(|| "Failed to load configuration")?;
    let manager = SessionManager::new(&config.session)
        .with_context(|| "Failed to open session store")?;

    match action {
        SessionsAction::List => {
            manager.load().await?;
            let mut keys = manager.keys().await;
            keys.sort();
            if keys.is_empty() {
                println!("No sessions.");
                return Ok(());
            }
            println!("{:<40} {:>8}  UPDATED", "KEY", "MESSAGES");
            for key in keys {
                if let Some(session) = manager.get(&key).await {
                    println!(
                        "{:<40} {:>8}  {}",
                        session.key,
                        session.messages.len(),
                        session.updated_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }
        SessionsAction::Show { key } => {
            manager.load().await?;
            let Some(session) = manager.get(&key).await else {
                bail!("Session not found: {}", key);
            };
            println!("Session: {}", session.key);
            println!("Created: {}", session.created_at.to_rfc3339());
            println!("Updated: {}", session.updated_at.to_rfc3339());
            if let Some(summary) = &session.summary {
                println!();
                println!("Summary:");
                println!("  {}", summary);
            }
            println!();
            for msg in &session.messages {
                match msg.role {
                    Role::Tool => println!(
                        "[tool {}] {}",
                        msg.tool_call_id.as_deref().unwrap_or("?"),
                        msg.content
                    ),
                    _ if msg.has_tool_calls() => {
                        let names: Vec<&str> = msg
                            .tool_calls
                            .iter()
                            .flatten()
                            .map(|c| c.name.as_str())
                            .collect();
                        println!("[{}] {} (calls: {})", msg.role, msg.content, names.join(", "));
                    }
                    _ => println!("[{}] {}", msg.role, msg.content),
                }
            }
        }
        SessionsAction::Prune => {
            let dir = config.sessions_path();
            let before = session_files(&dir)?.len();
            // Loading deletes expired files; evicting covers anything that
            // expired since.
            manager.load().await?;
            manager.evict_expired().await;
            let after = session_files(&dir)?.len();
            println!(
                "Pruned {} expired session(s), {} remaining",
                before.saturating_sub(after),
                after
            );
        }
        SessionsAction::Clear { key } => {
            if manager.delete(&key).await? {
                println!("Deleted session {}", key);
            } else {
                println!("No session named {}", key);
            }
        }
    }
    Ok(())
}

/// Persisted session files in `dir`. A missing directory has none.
pub(crate) fn session_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
    {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    Ok(files)
}
