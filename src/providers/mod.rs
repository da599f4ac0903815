//! Providers module - the language-model backend seam
//!
//! AttoClaw does not ship a backend. It defines the [`LLMProvider`] trait the
//! agent loop drives and helpers for turning backend failures into a
//! structured [`ProviderError`].
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use attoclaw::error::Result;
//! use attoclaw::providers::{ChatOptions, LLMProvider, LLMResponse, ToolDefinition};
//! use attoclaw::session::Message;
//!
//! struct Canned;
//!
//! #[async_trait]
//! impl LLMProvider for Canned {
//!     async fn chat(
//!         &self,
//!         _messages: Vec<Message>,
//!         _tools: Vec<ToolDefinition>,
//!         _model: Option<&str>,
//!         _options: ChatOptions,
//!     ) -> Result<LLMResponse> {
//!         Ok(LLMResponse::text("hello"))
//!     }
//!
//!     fn default_model(&self) -> &str {
//!         "canned-1"
//!     }
//!
//!     fn name(&self) -> &str {
//!         "canned"
//!     }
//! }
//! ```

pub mod error_classifier;
mod types;

use crate::error::ProviderError;

pub use error_classifier::{classify_error_message, is_context_overflow_message};
pub use types::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition, Usage};

/// Map an HTTP status code and response body to a structured [`ProviderError`].
///
/// For providers built on an HTTP API. A 413, or a 400 whose body reads like a
/// context overflow, becomes [`ProviderError::ContextOverflow`].
pub fn parse_provider_error(status: u16, body: &str) -> ProviderError {
    match status {
        400 if is_context_overflow_message(body) => ProviderError::ContextOverflow(body.to_string()),
        413 => ProviderError::ContextOverflow(body.to_string()),
        401 | 403 => ProviderError::Auth(body.to_string()),
        402 => ProviderError::Billing(body.to_string()),
        404 => ProviderError::ModelNotFound(body.to_string()),
        429 => ProviderError::RateLimit(body.to_string()),
        400 => ProviderError::InvalidRequest(body.to_string()),
        529 => ProviderError::Overloaded(body.to_string()),
        500..=599 => ProviderError::ServerError(body.to_string()),
        _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_error_401() {
        let err = parse_provider_error(401, "Invalid API key");
        assert!(matches!(err, ProviderError::Auth(_)));
    }

    #[test]
    fn test_parse_provider_error_429() {
        let err = parse_provider_error(429, "slow down");
        assert!(matches!(err, ProviderError::RateLimit(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_parse_provider_error_400_overflow() {
        let err = parse_provider_error(400, "prompt is too long: 210000 tokens > 200000 maximum");
        assert!(matches!(err, ProviderError::ContextOverflow(_)));
    }

    #[test]
    fn test_parse_provider_error_400_plain() {
        let err = parse_provider_error(400, "missing field `messages`");
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[test]
    fn test_parse_provider_error_413() {
        assert!(parse_provider_error(413, "payload too large").is_context_overflow());
    }

    #[test]
    fn test_parse_provider_error_5xx() {
        assert!(matches!(
            parse_provider_error(503, "unavailable"),
            ProviderError::ServerError(_)
        ));
        assert!(matches!(
            parse_provider_error(529, "overloaded"),
            ProviderError::Overloaded(_)
        ));
    }

    #[test]
    fn test_parse_provider_error_unknown_status() {
        let err = parse_provider_error(418, "teapot");
        assert_eq!(err.to_string(), "Unknown provider error: HTTP 418: teapot");
    }
}
