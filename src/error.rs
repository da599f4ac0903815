//! Error types for AttoClaw
//!
//! All fallible operations in the crate return [`Result`], whose error side is
//! [`AttoError`]. Backend failures carry a structured [`ProviderError`] when the
//! provider can classify them itself.

use std::fmt;
use thiserror::Error;

use crate::providers::error_classifier::is_context_overflow_message;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured provider error classification.
///
/// Providers that can tell what went wrong should return one of these (wrapped
/// in [`AttoError::ProviderTyped`]) instead of a bare string, so the agent
/// loop does not have to guess from message text.
#[derive(Debug)]
pub enum ProviderError {
    /// 401: Invalid API key or authentication failure
    Auth(String),
    /// 429: Rate limit or quota exceeded
    RateLimit(String),
    /// 402: Payment required or billing issue
    Billing(String),
    /// 500/502/503/504: Server-side errors
    ServerError(String),
    /// 400: Bad request, invalid JSON, malformed parameters
    InvalidRequest(String),
    /// 404: Model not found or endpoint not available
    ModelNotFound(String),
    /// Connection or read timeout
    Timeout(String),
    /// Provider is overloaded
    Overloaded(String),
    /// Request format error (e.g. malformed tool_use.id)
    Format(String),
    /// The prompt did not fit in the model's context window
    ContextOverflow(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::Billing(msg) => write!(f, "Billing error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Overloaded(msg) => write!(f, "Overloaded error: {}", msg),
            ProviderError::Format(msg) => write!(f, "Format error: {}", msg),
            ProviderError::ContextOverflow(msg) => write!(f, "Context overflow: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Returns `true` if this error is transient.
    ///
    /// The agent loop never retries these itself; the flag is for providers
    /// that wrap their own retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit(_)
                | ProviderError::ServerError(_)
                | ProviderError::Timeout(_)
                | ProviderError::Overloaded(_)
        )
    }

    /// Returns `true` if the request was rejected for exceeding the context window.
    pub fn is_context_overflow(&self) -> bool {
        match self {
            ProviderError::ContextOverflow(_) => true,
            // Some backends report overflow as a plain 400.
            ProviderError::InvalidRequest(msg) | ProviderError::Unknown(msg) => {
                is_context_overflow_message(msg)
            }
            _ => false,
        }
    }
}

impl From<ProviderError> for AttoError {
    fn from(err: ProviderError) -> Self {
        AttoError::ProviderTyped(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for AttoClaw operations.
#[derive(Error, Debug)]
pub enum AttoError {
    /// Configuration-related errors (invalid values, unreadable file, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Untyped provider errors; classified from their text when needed.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Structured provider error.
    #[error("Provider error: {0}")]
    ProviderTyped(ProviderError),

    /// Tool execution errors (invalid parameters, execution failures, etc.)
    #[error("Tool error: {0}")]
    Tool(String),

    /// Session management errors (persistence failures, corrupt files, etc.)
    #[error("Session error: {0}")]
    Session(String),

    /// Rejected input, such as a session key that would escape the storage root
    #[error("Validation error: {0}")]
    Validation(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Message bus closed
    #[error("Bus error: channel closed")]
    BusClosed,

    /// Resource not found (sessions, tools, handlers, etc.)
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation was cancelled before it completed
    #[error("Operation cancelled")]
    Cancelled,
}

impl AttoError {
    /// Returns `true` if this error means the prompt exceeded the model's
    /// context window.
    ///
    /// Structured [`ProviderError::ContextOverflow`] is authoritative; plain
    /// provider strings fall back to text classification.
    pub fn is_context_overflow(&self) -> bool {
        match self {
            AttoError::ProviderTyped(err) => err.is_context_overflow(),
            AttoError::Provider(msg) => is_context_overflow_message(msg),
            _ => false,
        }
    }
}

/// A specialized `Result` type for AttoClaw operations.
pub type Result<T> = std::result::Result<T, AttoError>;
