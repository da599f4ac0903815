//! Session module - conversation state management
//!
//! This module provides the session store for AttoClaw:
//! - In-memory session table behind an async read-write lock
//! - Crash-safe persistence (temp file + fsync + rename)
//! - Startup load with TTL pruning and orphaned tool-call repair
//! - Periodic TTL eviction for long-running processes
//!
//! # Example
//!
//! ```
//! use attoclaw::session::{Message, Role, SessionManager};
//!
//! # tokio_test::block_on(async {
//! let manager = SessionManager::new_memory();
//!
//! manager.add_message("telegram:chat123", Role::User, "Hello!").await;
//! manager.add_full_message("telegram:chat123", Message::assistant("Hi there!")).await;
//!
//! let history = manager.get_history("telegram:chat123").await;
//! assert_eq!(history.len(), 2);
//! # });
//! ```

pub mod types;

pub use types::{sanitize_messages, Message, Role, Session, ToolCall};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{AttoError, Result};
use crate::utils::fs::write_atomic_async;

/// Extension of persisted session files.
const SESSION_FILE_EXT: &str = "json";

/// Session store for conversation histories.
///
/// Sessions are identified by opaque keys (e.g., "telegram:chat123") and
/// created lazily on first reference. Every accessor hands out copies; the
/// store is the only owner of live `Session` values.
///
/// # Persistence
///
/// With a storage path, [`save`](Self::save) mirrors one session to
/// `<storage>/<sanitized key>.json` and [`load`](Self::load) restores all of
/// them at startup. `new_memory()` disables persistence.
pub struct SessionManager {
    /// In-memory table of live sessions
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    /// Directory for session files, if persistence is enabled
    storage_path: Option<PathBuf>,
    /// Idle time after which a session is evicted
    ttl: chrono::Duration,
}

impl SessionManager {
    /// Create a session store from configuration.
    ///
    /// Uses `session.storage_dir` when set, `~/.attoclaw/sessions` otherwise.
    /// The directory is created if it doesn't exist.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        Ok(Self::with_path(config.storage_path())?.with_ttl(config.ttl()))
    }

    /// Create an in-memory session store without persistence.
    pub fn new_memory() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: None,
            ttl: SessionConfig::default().ttl(),
        }
    }

    /// Create a session store persisting to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn with_path(path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: Some(path),
            ttl: SessionConfig::default().ttl(),
        })
    }

    /// Override the session time-to-live.
    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Directory sessions are persisted to, if any.
    pub fn storage_path(&self) -> Option<&Path> {
        self.storage_path.as_deref()
    }

    // ------------------------------------------------------------------
    // Table operations
    // ------------------------------------------------------------------

    /// Get a copy of the session for `key`, creating an empty one if needed.
    pub async fn get_or_create(&self, key: &str) -> Session {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key.to_string())
            .or_insert_with(|| Session::new(key))
            .clone()
    }

    /// Get a copy of the session for `key`, if it exists.
    pub async fn get(&self, key: &str) -> Option<Session> {
        self.sessions.read().await.get(key).cloned()
    }

    /// Append a plain message, creating the session if needed.
    pub async fn add_message(&self, key: &str, role: Role, content: &str) {
        self.add_full_message(key, Message::new(role, content)).await;
    }

    /// Append a message as-is (tool calls and tool-call id included).
    pub async fn add_full_message(&self, key: &str, message: Message) {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key.to_string())
            .or_insert_with(|| Session::new(key))
            .add_message(message);
    }

    /// Copy of the message history for `key` (empty if unknown).
    pub async fn get_history(&self, key: &str) -> Vec<Message> {
        self.sessions
            .read()
            .await
            .get(key)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    /// Replace the history for `key`, creating the session if needed.
    pub async fn set_history(&self, key: &str, messages: Vec<Message>) {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key.to_string())
            .or_insert_with(|| Session::new(key))
            .set_messages(messages);
    }

    /// Keep only the last `keep_last` messages of `key`.
    ///
    /// Truncating to zero removes the session entirely, from memory and disk.
    pub async fn truncate_history(&self, key: &str, keep_last: usize) -> Result<()> {
        if keep_last == 0 {
            return self.delete(key).await.map(|_| ());
        }
        if let Some(session) = self.sessions.write().await.get_mut(key) {
            session.truncate(keep_last);
        }
        Ok(())
    }

    pub async fn get_summary(&self, key: &str) -> Option<String> {
        self.sessions
            .read()
            .await
            .get(key)
            .and_then(|s| s.summary.clone())
    }

    pub async fn set_summary(&self, key: &str, summary: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(key) {
            session.set_summary(summary);
        }
    }

    /// Remove a session from memory and disk. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let existed = self.sessions.write().await.remove(key).is_some();
        let removed_file = self.remove_file(key).await?;
        Ok(existed || removed_file)
    }

    /// Keys of all live sessions.
    pub async fn keys(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Persist the session for `key`.
    ///
    /// The session is snapshotted under a brief read lock; the file is
    /// written after the lock is released. No-op without a storage path or
    /// when the session does not exist.
    ///
    /// # Errors
    ///
    /// [`AttoError::Validation`] for keys that are empty, `.`/`..`, or
    /// contain a path separator. I/O errors from the write.
    pub async fn save(&self, key: &str) -> Result<()> {
        let path = self.session_path(key)?;
        let Some(path) = path else {
            return Ok(());
        };

        let snapshot = {
            let sessions = self.sessions.read().await;
            match sessions.get(key) {
                Some(session) => session.clone(),
                None => return Ok(()),
            }
        };

        let data = serde_json::to_vec_pretty(&snapshot)?;
        write_atomic_async(path, data).await?;
        debug!(session = %key, messages = snapshot.messages.len(), "Session saved");
        Ok(())
    }

    /// Load every persisted session into memory. Run once at startup.
    ///
    /// Files whose `updated` is older than the TTL are deleted instead of
    /// loaded. Loaded histories are repaired with [`sanitize_messages`].
    /// Unreadable files are skipped with a warning. Returns the number of
    /// sessions loaded.
    pub async fn load(&self) -> Result<usize> {
        let Some(dir) = &self.storage_path else {
            return Ok(0);
        };

        let now = Utc::now();
        let mut loaded = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SESSION_FILE_EXT) {
                continue;
            }

            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read session file");
                    continue;
                }
            };
            let mut session: Session = match serde_json::from_str(&content) {
                Ok(session) => session,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping corrupt session file");
                    continue;
                }
            };

            if session.is_expired(self.ttl, now) {
                debug!(session = %session.key, "Dropping expired session file");
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "Failed to remove expired session file");
                }
                continue;
            }

            let before = session.messages.len();
            session.messages = sanitize_messages(std::mem::take(&mut session.messages));
            if session.messages.len() < before {
                info!(
                    session = %session.key,
                    dropped = before - session.messages.len(),
                    "Stripped orphaned tool calls from session tail"
                );
            }
            loaded.push(session);
        }

        let count = loaded.len();
        let mut sessions = self.sessions.write().await;
        for session in loaded {
            sessions.insert(session.key.clone(), session);
        }
        info!(count, "Sessions loaded");
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Eviction
    // ------------------------------------------------------------------

    /// Evict every session idle for longer than the TTL, from memory and disk.
    /// Returns the evicted keys.
    pub async fn evict_expired(&self) -> Vec<String> {
        let evicted = self.take_expired(Utc::now()).await;
        self.remove_evicted_files(&evicted).await;
        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted expired sessions");
        }
        evicted
    }

    /// Remove expired sessions from the table and return their keys.
    async fn take_expired(&self, now: chrono::DateTime<Utc>) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.is_expired(self.ttl, now))
            .map(|s| s.key.clone())
            .collect();
        for key in &expired {
            sessions.remove(key);
        }
        expired
    }

    /// Delete the files of evicted sessions.
    ///
    /// A key that is live again has been recreated by a newer turn; its file
    /// belongs to that turn and is left alone. The table read lock is held
    /// across each removal so a recreation cannot slip in between the check
    /// and the delete.
    async fn remove_evicted_files(&self, keys: &[String]) {
        for key in keys {
            let sessions = self.sessions.read().await;
            if sessions.contains_key(key) {
                debug!(session = %key, "Session recreated since eviction, keeping file");
                continue;
            }
            if let Err(e) = self.remove_file(key).await {
                warn!(session = %key, error = %e, "Failed to remove evicted session file");
            }
        }
    }

    /// Spawn a background sweep that calls [`evict_expired`](Self::evict_expired)
    /// every `interval` until `cancel` fires.
    pub fn start_periodic_cleanup(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        crate::log_component!(debug, "session", "Session cleanup stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = manager.evict_expired().await;
                        crate::log_component!(
                            trace,
                            "session",
                            "Cleanup sweep finished",
                            evicted = evicted.len()
                        );
                    }
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------

    fn session_path(&self, key: &str) -> Result<Option<PathBuf>> {
        validate_key(key)?;
        Ok(self
            .storage_path
            .as_ref()
            .map(|dir| dir.join(format!("{}.{}", sanitize_key(key), SESSION_FILE_EXT))))
    }

    async fn remove_file(&self, key: &str) -> Result<bool> {
        let Ok(Some(path)) = self.session_path(key) else {
            return Ok(false);
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new_memory()
    }
}

/// Reject keys that cannot be mapped to a file inside the storage root.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key == "." || key == ".." || key.contains('/') || key.contains('\\') {
        return Err(AttoError::Validation(format!("invalid session key: {:?}", key)));
    }
    Ok(())
}

/// Map a session key to a file stem. `:` is reserved on some filesystems.
pub fn sanitize_key(key: &str) -> String {
    key.replace(':', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> SessionManager {
        SessionManager::with_path(dir.path().to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_is_lazy_and_unique() {
        let manager = SessionManager::new_memory();
        assert!(manager.is_empty().await);
        let a = manager.get_or_create("k").await;
        let b = manager.get_or_create("k").await;
        assert_eq!(a.created_at, b.created_at);
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn test_add_message_creates_session() {
        let manager = SessionManager::new_memory();
        manager.add_message("k", Role::User, "hi").await;
        let history = manager.get_history("k").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_add_full_message_preserves_tool_structure() {
        let manager = SessionManager::new_memory();
        manager
            .add_full_message(
                "k",
                Message::assistant_with_tools("", vec![ToolCall::new("c1", "search", "{}")]),
            )
            .await;
        manager
            .add_full_message("k", Message::tool_result("c1", "found"))
            .await;

        let history = manager.get_history("k").await;
        assert!(history[0].has_tool_calls());
        assert_eq!(history[1].tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_get_history_is_isolated_copy() {
        let manager = SessionManager::new_memory();
        manager.add_message("k", Role::User, "original").await;

        let mut history = manager.get_history("k").await;
        history[0].content = "mutated".to_string();
        history.push(Message::user("extra"));

        let stored = manager.get_history("k").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "original");
    }

    #[tokio::test]
    async fn test_set_history_replaces() {
        let manager = SessionManager::new_memory();
        manager.add_message("k", Role::User, "old").await;
        manager
            .set_history("k", vec![Message::user("a"), Message::assistant("b")])
            .await;
        let history = manager.get_history("k").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "a");
    }

    #[tokio::test]
    async fn test_truncate_history_keeps_last() {
        let manager = SessionManager::new_memory();
        for i in 0..6 {
            manager.add_message("k", Role::User, &format!("m{}", i)).await;
        }
        manager.truncate_history("k", 2).await.unwrap();
        let history = manager.get_history("k").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "m4");
    }

    #[tokio::test]
    async fn test_truncate_history_drops_detached_tool_results() {
        let manager = SessionManager::new_memory();
        manager.add_message("k", Role::User, "look it up").await;
        manager
            .add_full_message(
                "k",
                Message::assistant_with_tools("", vec![ToolCall::new("c1", "search", "{}")]),
            )
            .await;
        manager
            .add_full_message("k", Message::tool_result("c1", "found"))
            .await;
        manager.add_message("k", Role::Assistant, "here it is").await;

        manager.truncate_history("k", 2).await.unwrap();
        let history = manager.get_history("k").await;
        assert_eq!(history.len(), 1);
        assert_ne!(history[0].role, Role::Tool);
        assert_eq!(history[0].content, "here it is");
    }

    #[tokio::test]
    async fn test_truncate_to_zero_removes_session_and_file() {
        let dir = TempDir::new().unwrap();
        let manager = store(&dir);
        manager.add_message("telegram:1", Role::User, "hi").await;
        manager.save("telegram:1").await.unwrap();
        let file = dir.path().join("telegram_1.json");
        assert!(file.exists());

        manager.truncate_history("telegram:1", 0).await.unwrap();
        assert!(manager.get("telegram:1").await.is_none());
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_summary_roundtrip() {
        let manager = SessionManager::new_memory();
        assert!(manager.get_summary("k").await.is_none());
        manager.get_or_create("k").await;
        manager.set_summary("k", "user likes rust").await;
        assert_eq!(
            manager.get_summary("k").await.as_deref(),
            Some("user likes rust")
        );
    }

    #[tokio::test]
    async fn test_save_with_colon_in_key() {
        let dir = TempDir::new().unwrap();
        let manager = store(&dir);
        manager.add_message("telegram:123456", Role::User, "hello").await;
        manager.save("telegram:123456").await.unwrap();

        assert!(dir.path().join("telegram_123456.json").exists());

        let reloaded = store(&dir);
        assert_eq!(reloaded.load().await.unwrap(), 1);
        let history = reloaded.get_history("telegram:123456").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hello");
    }

    #[tokio::test]
    async fn test_save_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let manager = store(&dir);
        for key in ["", ".", "..", "foo/bar", "foo\\bar"] {
            manager.add_message(key, Role::User, "x").await;
            let err = manager.save(key).await.unwrap_err();
            assert!(
                matches!(err, AttoError::Validation(_)),
                "key {:?} should be rejected",
                key
            );
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_save_memory_store_is_noop() {
        let manager = SessionManager::new_memory();
        manager.add_message("k", Role::User, "x").await;
        manager.save("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_save_load_preserves_summary_and_tools() {
        let dir = TempDir::new().unwrap();
        let manager = store(&dir);
        manager.add_message("cli:direct", Role::User, "search").await;
        manager
            .add_full_message(
                "cli:direct",
                Message::assistant_with_tools("", vec![ToolCall::new("1", "search", "{}")]),
            )
            .await;
        manager
            .add_full_message("cli:direct", Message::tool_result("1", "done"))
            .await;
        manager.set_summary("cli:direct", "earlier chat").await;
        manager.save("cli:direct").await.unwrap();

        let reloaded = store(&dir);
        reloaded.load().await.unwrap();
        let original = manager.get("cli:direct").await.unwrap();
        let restored = reloaded.get("cli:direct").await.unwrap();
        assert_eq!(restored.messages, original.messages);
        assert_eq!(restored.summary, original.summary);
    }

    #[tokio::test]
    async fn test_load_strips_orphaned_tool_calls() {
        let dir = TempDir::new().unwrap();
        let manager = store(&dir);
        manager.add_message("k", Role::User, "search").await;
        manager
            .add_full_message(
                "k",
                Message::assistant_with_tools("", vec![ToolCall::new("1", "search", "{}")]),
            )
            .await;
        manager.save("k").await.unwrap();

        let reloaded = store(&dir);
        reloaded.load().await.unwrap();
        let history = reloaded.get_history("k").await;
        assert_eq!(history.len(), 1);
        assert!(!history.last().unwrap().has_tool_calls());
    }

    #[tokio::test]
    async fn test_load_drops_expired_files() {
        let dir = TempDir::new().unwrap();
        let mut session = Session::new("old:1");
        session.add_message(Message::user("ancient"));
        session.updated_at = Utc::now() - chrono::Duration::days(30);
        let path = dir.path().join("old_1.json");
        std::fs::write(&path, serde_json::to_string(&session).unwrap()).unwrap();

        let manager = store(&dir).with_ttl(chrono::Duration::days(7));
        assert_eq!(manager.load().await.unwrap(), 0);
        assert!(manager.get("old:1").await.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_load_skips_corrupt_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join(".atto-123.tmp"), "partial").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let manager = store(&dir);
        assert_eq!(manager.load().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_evict_expired() {
        let dir = TempDir::new().unwrap();
        let manager = store(&dir).with_ttl(chrono::Duration::hours(1));
        manager.add_message("fresh", Role::User, "x").await;
        manager.add_message("stale", Role::User, "x").await;
        manager.save("stale").await.unwrap();
        manager.sessions.write().await.get_mut("stale").unwrap().updated_at =
            Utc::now() - chrono::Duration::hours(2);

        let evicted = manager.evict_expired().await;
        assert_eq!(evicted, vec!["stale".to_string()]);
        assert!(manager.get("fresh").await.is_some());
        assert!(manager.get("stale").await.is_none());
        assert!(!dir.path().join("stale.json").exists());
    }

    #[tokio::test]
    async fn test_eviction_keeps_file_of_recreated_session() {
        let dir = TempDir::new().unwrap();
        let manager = store(&dir).with_ttl(chrono::Duration::hours(1));
        manager.add_message("telegram:7", Role::User, "old").await;
        manager.save("telegram:7").await.unwrap();

        let later = Utc::now() + chrono::Duration::hours(2);
        let evicted = manager.take_expired(later).await;
        assert_eq!(evicted, vec!["telegram:7".to_string()]);

        // A new turn for the same chat lands before the files are swept.
        manager.add_message("telegram:7", Role::User, "new").await;
        manager.save("telegram:7").await.unwrap();

        manager.remove_evicted_files(&evicted).await;
        let file = dir.path().join("telegram_7.json");
        assert!(file.exists());

        let reloaded = store(&dir);
        reloaded.load().await.unwrap();
        let history = reloaded.get_history("telegram:7").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "new");
    }

    #[tokio::test]
    async fn test_periodic_cleanup_stops_on_cancel() {
        let manager = Arc::new(SessionManager::new_memory().with_ttl(chrono::Duration::zero()));
        manager.add_message("k", Role::User, "x").await;

        let cancel = CancellationToken::new();
        let handle = manager.start_periodic_cleanup(Duration::from_millis(10), cancel.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.get("k").await.is_none());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cleanup task should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete() {
        let manager = SessionManager::new_memory();
        manager.get_or_create("k").await;
        assert!(manager.delete("k").await.unwrap());
        assert!(!manager.delete("k").await.unwrap());
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("telegram:123"), "telegram_123");
        assert_eq!(sanitize_key("plain"), "plain");
    }
}
