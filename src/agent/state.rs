//! Persisted agent state.
//!
//! Remembers where the last user message came from so out-of-band work
//! (reminders, restarts) knows which chat to address. Stored at
//! `<workspace>/state/state.json` and rewritten atomically whenever a value
//! changes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::utils::fs::write_atomic_async;

/// Last-contact record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Owner of the on-disk [`AgentState`].
pub struct StateManager {
    path: PathBuf,
    state: Mutex<AgentState>,
}

impl StateManager {
    /// Open the state under `workspace`, loading any existing file.
    ///
    /// A missing or unreadable file starts from an empty state.
    pub fn new(workspace: &Path) -> Self {
        Self::with_path(workspace.join("state").join("state.json"))
    }

    pub fn with_path(path: PathBuf) -> Self {
        let state = load_state(&path);
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current state.
    pub async fn state(&self) -> AgentState {
        self.state.lock().await.clone()
    }

    pub async fn last_channel(&self) -> Option<String> {
        self.state.lock().await.last_channel.clone()
    }

    pub async fn last_chat_id(&self) -> Option<String> {
        self.state.lock().await.last_chat_id.clone()
    }

    /// Record the channel of the latest message. Writes only on change.
    pub async fn set_last_channel(&self, channel: &str) -> Result<()> {
        self.update(|s| replace_if_changed(&mut s.last_channel, channel))
            .await
    }

    /// Record the chat id of the latest message. Writes only on change.
    pub async fn set_last_chat_id(&self, chat_id: &str) -> Result<()> {
        self.update(|s| replace_if_changed(&mut s.last_chat_id, chat_id))
            .await
    }

    async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut AgentState) -> bool,
    {
        // Held across the write so files land in update order.
        let mut state = self.state.lock().await;
        if !f(&mut state) {
            return Ok(());
        }
        state.updated_at = Some(Utc::now());
        let data = serde_json::to_vec_pretty(&*state)?;
        write_atomic_async(self.path.clone(), data).await?;
        debug!(path = %self.path.display(), "Agent state saved");
        Ok(())
    }
}

fn replace_if_changed(slot: &mut Option<String>, value: &str) -> bool {
    if slot.as_deref() == Some(value) {
        return false;
    }
    *slot = Some(value.to_string());
    true
}

/// Read the state file; absent or corrupt files yield the default state.
pub fn load_state(path: &Path) -> AgentState {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return AgentState::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read agent state");
            return AgentState::default();
        }
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Corrupt agent state, starting fresh");
        AgentState::default()
    })
}
