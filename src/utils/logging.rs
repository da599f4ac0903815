//! Logging initialization for AttoClaw.
//!
//! Supports three formats:
//! - `pretty`: multi-line human-readable output
//! - `component`: compact single-line output; use [`log_component!`] to tag
//!   events with a `component` field for per-subsystem filtering
//! - `json`: structured JSON lines, optionally appended to a file

use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{AttoError, Result};

/// Initialize the global tracing subscriber from config.
///
/// Call this once at startup before any tracing events are emitted.
/// `RUST_LOG` wins over `cfg.level` when set. Fails if the log file cannot
/// be opened or a global subscriber is already installed. Events go to
/// stderr unless a JSON log file is configured; stdout belongs to the CLI.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    let installed = match cfg.format {
        LogFormat::Json => match &cfg.file {
            Some(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(Mutex::new(file))
                    .try_init()
            }
            None => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init(),
        },
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .pretty()
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Component => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .try_init(),
    };

    installed.map_err(|e| AttoError::Config(format!("failed to install logger: {}", e)))
}

/// Emit a component-tagged tracing event.
///
/// ```
/// # use attoclaw::log_component;
/// log_component!(info, "bus", "message published");
/// log_component!(warn, "agent", "context nearly full", used = 96000u64, limit = 128000u64);
/// ```
#[macro_export]
macro_rules! log_component {
    ($level:ident, $component:expr, $msg:expr) => {
        tracing::$level!(component = $component, $msg)
    };
    ($level:ident, $component:expr, $msg:expr, $($key:ident = $val:expr),+ $(,)?) => {
        tracing::$level!(component = $component, $($key = $val,)+ $msg)
    };
}

#[cfg(test)]
mod tests {
    use crate::config::{LogFormat, LoggingConfig};

    #[test]
    fn test_default_logging_config() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.format, LogFormat::Component);
        assert_eq!(cfg.level, "info");
        assert!(cfg.file.is_none());
    }

    #[test]
    fn test_log_format_deserialize() {
        let cfg: LoggingConfig =
            serde_json::from_str(r#"{"format":"json","level":"debug"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.level, "debug");

        let cfg: LoggingConfig = serde_json::from_str(r#"{"format":"pretty"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Pretty);
        assert_eq!(cfg.level, "info");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: LoggingConfig = serde_json::from_str(r#"{"level":"trace"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Component);
        assert!(cfg.file.is_none());
        assert_eq!(cfg.level, "trace");
    }

    #[test]
    fn test_log_component_macro_expands() {
        crate::log_component!(debug, "session", "loaded", count = 3usize);
        crate::log_component!(trace, "bus", "idle");
    }
}
