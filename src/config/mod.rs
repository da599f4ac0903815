//! Configuration management for AttoClaw
//!
//! Configuration is loaded from `~/.attoclaw/config.json` with environment
//! variable overrides. A missing file means defaults.

mod types;
mod validate;

pub use types::*;
pub use validate::{validate_config, Diagnostic, DiagnosticLevel};

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::warn;

use crate::error::Result;

impl Config {
    /// Returns the AttoClaw configuration directory path (~/.attoclaw)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".attoclaw")
    }

    /// Returns the path to the config file (~/.attoclaw/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// Environment variables override file values using the pattern
    /// `ATTOCLAW_SECTION_KEY`, e.g. `ATTOCLAW_BUS_BUFFER_SIZE`.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        // Agent defaults
        let defaults = &mut self.agents.defaults;
        if let Ok(val) = std::env::var("ATTOCLAW_AGENTS_DEFAULTS_WORKSPACE") {
            defaults.workspace = val;
        }
        if let Ok(val) = std::env::var("ATTOCLAW_AGENTS_DEFAULTS_MODEL") {
            defaults.model = val;
        }
        override_parsed("ATTOCLAW_AGENTS_DEFAULTS_MAX_TOKENS", &mut defaults.max_tokens);
        override_parsed("ATTOCLAW_AGENTS_DEFAULTS_TEMPERATURE", &mut defaults.temperature);
        override_parsed(
            "ATTOCLAW_AGENTS_DEFAULTS_MAX_TOOL_ITERATIONS",
            &mut defaults.max_tool_iterations,
        );
        override_parsed(
            "ATTOCLAW_AGENTS_DEFAULTS_CONTEXT_WINDOW",
            &mut defaults.context_window,
        );
        override_parsed(
            "ATTOCLAW_AGENTS_DEFAULTS_SUMMARIZE_MESSAGE_THRESHOLD",
            &mut defaults.summarize_message_threshold,
        );
        override_parsed(
            "ATTOCLAW_AGENTS_DEFAULTS_SUMMARIZE_TOKEN_PERCENT",
            &mut defaults.summarize_token_percent,
        );
        override_parsed(
            "ATTOCLAW_AGENTS_DEFAULTS_SUMMARY_KEEP_RECENT",
            &mut defaults.summary_keep_recent,
        );

        // Session store
        override_parsed("ATTOCLAW_SESSION_TTL_SECS", &mut self.session.ttl_secs);
        override_parsed(
            "ATTOCLAW_SESSION_CLEANUP_INTERVAL_SECS",
            &mut self.session.cleanup_interval_secs,
        );
        if let Ok(val) = std::env::var("ATTOCLAW_SESSION_STORAGE_DIR") {
            self.session.storage_dir = Some(val);
        }

        // Bus
        override_parsed("ATTOCLAW_BUS_BUFFER_SIZE", &mut self.bus.buffer_size);

        // Safety
        override_parsed(
            "ATTOCLAW_SAFETY_INJECTION_CHECK_ENABLED",
            &mut self.safety.injection_check_enabled,
        );

        // Logging
        if let Ok(val) = std::env::var("ATTOCLAW_LOG_LEVEL") {
            self.logging.level = val;
        }
        override_parsed("ATTOCLAW_LOG_FORMAT", &mut self.logging.format);
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_vec_pretty(self)?;
        crate::utils::fs::write_atomic(path, &content)
    }

    /// Returns the expanded workspace path (resolves ~ to home directory)
    pub fn workspace_path(&self) -> PathBuf {
        expand_home(&self.agents.defaults.workspace)
    }

    /// Directory the session store persists to.
    pub fn sessions_path(&self) -> PathBuf {
        self.session.storage_path()
    }
}

impl SessionConfig {
    /// `storage_dir` with `~` expanded, or `~/.attoclaw/sessions`.
    pub fn storage_path(&self) -> PathBuf {
        self.storage_dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| Config::dir().join("sessions"))
    }
}

/// Replace `target` with the parsed value of `var` when it is set and valid.
fn override_parsed<T: FromStr>(var: &str, target: &mut T) {
    if let Ok(val) = std::env::var(var) {
        match val.parse() {
            Ok(v) => *target = v,
            Err(_) => warn!(var, value = %val, "Ignoring unparsable environment override"),
        }
    }
}

/// Expand ~ to home directory in a path string
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return match rest.strip_prefix('/') {
                Some(rest) => home.join(rest),
                None if rest.is_empty() => home,
                None => PathBuf::from(path),
            };
        }
    }
    PathBuf::from(path)
}
