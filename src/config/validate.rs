//! Configuration validation.
//!
//! Two layers: [`validate_config`] inspects the raw JSON for unknown field
//! names (with "did you mean" suggestions), [`Config::validate`] rejects
//! values the runtime cannot work with.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::{AttoError, Result};

use super::Config;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &["agents", "session", "bus", "safety", "logging"];

const KNOWN_AGENTS_DEFAULTS: &[&str] = &[
    "workspace",
    "model",
    "max_tokens",
    "temperature",
    "max_tool_iterations",
    "context_window",
    "summarize_message_threshold",
    "summarize_token_percent",
    "summary_keep_recent",
];

const KNOWN_SESSION: &[&str] = &["ttl_secs", "cleanup_interval_secs", "storage_dir"];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut row = vec![i + 1; b_chars.len() + 1];
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        prev = row;
    }
    prev[b_chars.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn check_section(
    section: &serde_json::Map<String, Value>,
    known: &[&str],
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    let mut has_unknown = false;
    for key in section.keys() {
        if known_set.contains(key.as_str()) {
            continue;
        }
        has_unknown = true;
        let message = match suggest_field(key, known) {
            Some(suggestion) => format!("Unknown field '{}', {}", key, suggestion),
            None => format!("Unknown field '{}'", key),
        };
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Error,
            path,
            message,
        });
    }
    has_unknown
}

/// Validate a raw JSON config value against known field names.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let Some(obj) = raw.as_object() else {
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Error,
            path: String::new(),
            message: "Config must be a JSON object".to_string(),
        });
        return diagnostics;
    };

    diagnostics.push(Diagnostic {
        level: DiagnosticLevel::Ok,
        path: String::new(),
        message: "Valid JSON".to_string(),
    });

    let mut has_unknown = check_section(obj, KNOWN_TOP_LEVEL, "", &mut diagnostics);

    if let Some(defaults) = obj
        .get("agents")
        .and_then(|v| v.get("defaults"))
        .and_then(|v| v.as_object())
    {
        has_unknown |= check_section(
            defaults,
            KNOWN_AGENTS_DEFAULTS,
            "agents.defaults",
            &mut diagnostics,
        );
    }

    if let Some(session) = obj.get("session").and_then(|v| v.as_object()) {
        has_unknown |= check_section(session, KNOWN_SESSION, "session", &mut diagnostics);
    }

    if !has_unknown {
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Ok,
            path: String::new(),
            message: "All fields recognized".to_string(),
        });
    }

    if obj
        .get("safety")
        .and_then(|v| v.get("injection_check_enabled"))
        .and_then(|v| v.as_bool())
        == Some(false)
    {
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Warn,
            path: "safety.injection_check_enabled".to_string(),
            message: "Disabled, instruction-override attempts reach the model".to_string(),
        });
    }

    diagnostics
}

impl Config {
    /// Reject values the runtime cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let defaults = &self.agents.defaults;
        if defaults.max_tool_iterations == 0 {
            return Err(AttoError::Config(
                "agents.defaults.max_tool_iterations must be at least 1".into(),
            ));
        }
        if defaults.context_window == 0 {
            return Err(AttoError::Config(
                "agents.defaults.context_window must be positive".into(),
            ));
        }
        if defaults.summarize_token_percent > 100 {
            return Err(AttoError::Config(
                "agents.defaults.summarize_token_percent must be within 0..=100".into(),
            ));
        }
        if self.bus.buffer_size == 0 {
            return Err(AttoError::Config("bus.buffer_size must be positive".into()));
        }
        if self.session.ttl_secs == 0 {
            return Err(AttoError::Config("session.ttl_secs must be positive".into()));
        }
        if self.session.cleanup_interval_secs == 0 {
            return Err(AttoError::Config(
                "session.cleanup_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}
