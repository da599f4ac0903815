//! Config show/check command handlers.

use anyhow::{Context, Result};

use attoclaw::config::{validate_config, Config, DiagnosticLevel};

use super::ConfigAction;

/// Show or validate the configuration.
pub(crate) async fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load().with_context(|| "Failed to load configuration")?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Check => {
            let config_path = Config::path();
            println!("Config file: {}", config_path.display());

            if !config_path.exists() {
                println!("[OK] No config file found (using defaults)");
                return Ok(());
            }

            let content =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;

            let raw: serde_json::Value = match serde_json::from_str(&content) {
                Ok(v) => v,
                Err(e) => {
                    println!("[ERROR] Invalid JSON: {}", e);
                    return Ok(());
                }
            };

            let diagnostics = validate_config(&raw);
            let values_ok = match Config::load_from_path(&config_path) {
                Ok(config) => match config.validate() {
                    Ok(()) => true,
                    Err(e) => {
                        println!("[ERROR] {}", e);
                        false
                    }
                },
                Err(e) => {
                    println!("[ERROR] {}", e);
                    false
                }
            };
            for diag in &diagnostics {
                println!("{}", diag);
            }

            let errors = diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Error)
                .count()
                + usize::from(!values_ok);
            let warnings = diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Warn)
                .count();

            if errors == 0 && warnings == 0 {
                println!("\nConfiguration looks good!");
            } else {
                println!("\nFound {} error(s), {} warning(s)", errors, warnings);
            }
        }
    }
    Ok(())
}
