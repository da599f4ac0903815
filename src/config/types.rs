//! Configuration type definitions for AttoClaw
//!
//! All types implement serde traits for JSON serialization and have sensible
//! defaults, so a partial config file only needs the fields it changes.

use serde::{Deserialize, Serialize};

/// Main configuration struct for AttoClaw
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent configuration (model, tokens, iterations, summarization)
    pub agents: AgentConfig,
    /// Session store configuration
    pub session: SessionConfig,
    /// Message bus configuration
    pub bus: BusConfig,
    /// Safety checks applied to inbound content
    pub safety: SafetyConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

// ============================================================================
// Agent Configuration
// ============================================================================

/// Agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Default agent settings
    pub defaults: AgentDefaults,
}

/// Default agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    /// Workspace directory path (state, memory)
    pub workspace: String,
    /// Default model to use
    pub model: String,
    /// Maximum tokens for responses
    pub max_tokens: u32,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum tool-requesting model calls per turn
    pub max_tool_iterations: u32,
    /// Model context window in tokens
    pub context_window: usize,
    /// History length above which a background summary is started
    pub summarize_message_threshold: usize,
    /// Percentage of the context window above which a background summary is started
    pub summarize_token_percent: u8,
    /// Messages kept verbatim after summarization
    pub summary_keep_recent: usize,
}

/// Default model compile-time configuration.
/// Set `ATTOCLAW_DEFAULT_MODEL` at compile time to override.
const COMPILE_TIME_DEFAULT_MODEL: &str = match option_env!("ATTOCLAW_DEFAULT_MODEL") {
    Some(v) => v,
    None => "claude-sonnet-4-5-20250929",
};

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: "~/.attoclaw/workspace".to_string(),
            model: COMPILE_TIME_DEFAULT_MODEL.to_string(),
            max_tokens: 8192,
            temperature: 0.7,
            max_tool_iterations: 20,
            context_window: 128_000,
            summarize_message_threshold: 20,
            summarize_token_percent: 75,
            summary_keep_recent: 4,
        }
    }
}

impl AgentDefaults {
    /// Estimated-token count above which a background summary is started.
    pub fn summarize_token_threshold(&self) -> usize {
        self.context_window * self.summarize_token_percent as usize / 100
    }
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle seconds after which a session is evicted
    pub ttl_secs: u64,
    /// Seconds between background eviction sweeps
    pub cleanup_interval_secs: u64,
    /// Override for the session directory (default: ~/.attoclaw/sessions)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 7 * 24 * 60 * 60,
            cleanup_interval_secs: 60 * 60,
            storage_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs.min(i64::MAX as u64) as i64)
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_secs)
    }
}

// ============================================================================
// Bus Configuration
// ============================================================================

/// Message bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Capacity of each of the inbound and outbound queues
    pub buffer_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            buffer_size: crate::bus::DEFAULT_BUFFER_SIZE,
        }
    }
}

// ============================================================================
// Safety Configuration
// ============================================================================

/// Safety configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Refuse inbound messages that try to override the system prompt
    pub injection_check_enabled: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            injection_check_enabled: true,
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human-readable output
    Pretty,
    /// Compact single-line output
    #[default]
    Component,
    /// JSON lines
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "component" => Ok(Self::Component),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Level filter, used when `RUST_LOG` is unset
    pub level: String,
    /// Append JSON logs to this file instead of stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: "info".to_string(),
            file: None,
        }
    }
}
