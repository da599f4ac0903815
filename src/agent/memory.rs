//! Workspace memory: markdown notes that become prompt context.
//!
//! Layout under `<workspace>/memory/`:
//!
//! ```text
//! MEMORY.md                      long-term notes (default chat)
//! YYYYMM/YYYYMMDD.md             daily notes (default chat)
//! chat_<id>/MEMORY.md            long-term notes for one chat
//! chat_<id>/YYYYMM/YYYYMMDD.md   daily notes for one chat
//! ```

use std::path::{Path, PathBuf};

use chrono::{Days, Local, NaiveDate};
use tracing::warn;

use crate::error::Result;
use crate::utils::fs::write_atomic;

/// Days of daily notes included in the prompt context.
pub const RECENT_NOTE_DAYS: u64 = 3;

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Source of prior-context text for a chat.
///
/// The agent loop treats the returned block as inert text placed in the
/// system prompt.
pub trait MemoryProvider: Send + Sync {
    fn context_for(&self, chat_id: &str) -> Option<String>;
}

/// File-backed memory rooted at `<workspace>/memory`.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    memory_dir: PathBuf,
}

impl MemoryStore {
    pub fn new(workspace: &Path) -> Self {
        Self {
            memory_dir: workspace.join("memory"),
        }
    }

    pub fn memory_dir(&self) -> &Path {
        &self.memory_dir
    }

    fn chat_dir(&self, chat_id: &str) -> PathBuf {
        if chat_id.is_empty() || chat_id == "default" {
            return self.memory_dir.clone();
        }
        let safe: String = chat_id
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.memory_dir.join(format!("chat_{}", safe))
    }

    fn daily_file(&self, chat_id: &str, date: NaiveDate) -> PathBuf {
        self.chat_dir(chat_id)
            .join(date.format("%Y%m").to_string())
            .join(format!("{}.md", date.format("%Y%m%d")))
    }

    fn long_term_file(&self, chat_id: &str) -> PathBuf {
        self.chat_dir(chat_id).join("MEMORY.md")
    }

    /// Long-term notes, empty if none.
    pub fn read_long_term(&self, chat_id: &str) -> String {
        read_or_empty(&self.long_term_file(chat_id))
    }

    pub fn write_long_term(&self, chat_id: &str, content: &str) -> Result<()> {
        write_atomic(&self.long_term_file(chat_id), content.as_bytes())
    }

    /// Today's daily note, empty if none.
    pub fn read_today(&self, chat_id: &str) -> String {
        read_or_empty(&self.daily_file(chat_id, today()))
    }

    /// Append to today's daily note, creating it with a date header.
    pub fn append_today(&self, chat_id: &str, content: &str) -> Result<()> {
        self.append_on(chat_id, today(), content)
    }

    /// Append to the daily note for `date`.
    pub fn append_on(&self, chat_id: &str, date: NaiveDate, content: &str) -> Result<()> {
        let path = self.daily_file(chat_id, date);
        let existing = read_or_empty(&path);
        let updated = if existing.is_empty() {
            format!("# {}\n\n{}", date.format("%Y-%m-%d"), content)
        } else {
            format!("{}\n{}", existing, content)
        };
        write_atomic(&path, updated.as_bytes())
    }

    /// Daily notes of the last `days` days, newest first, joined by `---`.
    pub fn recent_daily_notes(&self, chat_id: &str, days: u64) -> String {
        self.recent_daily_notes_from(chat_id, today(), days)
    }

    /// Same as [`recent_daily_notes`](Self::recent_daily_notes) counting back from `today`.
    pub fn recent_daily_notes_from(&self, chat_id: &str, today: NaiveDate, days: u64) -> String {
        let notes: Vec<String> = (0..days)
            .filter_map(|offset| today.checked_sub_days(Days::new(offset)))
            .map(|date| read_or_empty(&self.daily_file(chat_id, date)))
            .filter(|note| !note.is_empty())
            .collect();
        notes.join(SECTION_SEPARATOR)
    }

    /// Memory block for the prompt, or `None` if there is nothing to say.
    pub fn memory_context(&self, chat_id: &str) -> Option<String> {
        self.memory_context_from(chat_id, today())
    }

    fn memory_context_from(&self, chat_id: &str, today: NaiveDate) -> Option<String> {
        let mut parts = Vec::new();

        let long_term = self.read_long_term(chat_id);
        if !long_term.is_empty() {
            parts.push(format!("## Long-term Memory\n\n{}", long_term));
        }

        let notes = self.recent_daily_notes_from(chat_id, today, RECENT_NOTE_DAYS);
        if !notes.is_empty() {
            parts.push(format!("## Recent Daily Notes\n\n{}", notes));
        }

        if parts.is_empty() {
            return None;
        }
        Some(format!("# Memory\n\n{}", parts.join(SECTION_SEPARATOR)))
    }
}

impl MemoryProvider for MemoryStore {
    fn context_for(&self, chat_id: &str) -> Option<String> {
        self.memory_context(chat_id)
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn read_or_empty(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read memory file");
            String::new()
        }
    }
}
