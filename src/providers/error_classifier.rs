//! Pattern-based error classification for LLM provider errors.
//!
//! Providers that cannot produce a structured [`ProviderError`] surface plain
//! text. This module maps that text to a classification.
//!
//! Checks patterns in priority order: context overflow > billing > auth >
//! rate_limit > overloaded > timeout > format. Falls back to `Unknown`.

use crate::error::ProviderError;

/// Phrases that mean "the prompt is too large" on their own.
const OVERFLOW_PHRASES: &[&str] = &[
    "context length",
    "context_length_exceeded",
    "context window",
    "maximum context",
    "too many tokens",
    "prompt is too long",
];

/// Phrases that mark a throughput limit rather than a prompt-size limit.
const RATE_LIMIT_PHRASES: &[&str] = &["rate limit", "rate_limit", "429", "tokens per min"];

/// Returns `true` if an error message reports a context/token limit overflow.
///
/// Matches "token" together with "exceed" anywhere in the text, or one of the
/// well-known overflow phrases. Case-insensitive.
pub fn is_context_overflow_message(msg: &str) -> bool {
    let lower = msg.to_lowercase();

    if contains_any(&lower, RATE_LIMIT_PHRASES) {
        return false;
    }

    (lower.contains("token") && lower.contains("exceed")) || contains_any(&lower, OVERFLOW_PHRASES)
}

type Rule = (&'static [&'static str], fn(String) -> ProviderError);

/// Classification rules after the overflow check, first match wins.
///
/// Billing precedes auth because 402 bodies often mention credentials too.
const RULES: &[Rule] = &[
    (
        &[
            "402",
            "payment required",
            "insufficient credits",
            "credit balance",
            "insufficient balance",
            "billing",
        ],
        ProviderError::Billing,
    ),
    (
        &[
            "invalid_api_key",
            "invalid api key",
            "incorrect api key",
            "authentication",
            "unauthorized",
            "forbidden",
            "access denied",
            "401",
            "403",
        ],
        ProviderError::Auth,
    ),
    (
        &[
            "rate_limit",
            "rate limit",
            "too many requests",
            "429",
            "exceeded your current quota",
            "resource_exhausted",
            "quota exceeded",
        ],
        ProviderError::RateLimit,
    ),
    (&["overloaded_error", "overloaded"], ProviderError::Overloaded),
    (
        &["timeout", "timed out", "deadline exceeded"],
        ProviderError::Timeout,
    ),
    (
        &[
            "string should match pattern",
            "tool_use_id",
            "tool_use.id",
            "invalid request format",
        ],
        ProviderError::Format,
    ),
];

/// Classify an error message string into a `ProviderError`.
pub fn classify_error_message(msg: &str) -> ProviderError {
    if is_context_overflow_message(msg) {
        return ProviderError::ContextOverflow(msg.to_string());
    }

    let lower = msg.to_lowercase();
    RULES
        .iter()
        .find(|(patterns, _)| contains_any(&lower, patterns))
        .map_or_else(
            || ProviderError::Unknown(msg.to_string()),
            |(_, make)| make(msg.to_string()),
        )
}

fn contains_any(haystack: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| haystack.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_token_exceed() {
        assert!(is_context_overflow_message(
            "InvalidParameter: Total tokens of image and text exceed max message tokens"
        ));
    }

    #[test]
    fn test_overflow_case_insensitive() {
        assert!(is_context_overflow_message("TOKEN COUNT EXCEEDED"));
        assert!(is_context_overflow_message(
            "This model's Maximum Context length is 8192 tokens"
        ));
    }

    #[test]
    fn test_overflow_phrases() {
        assert!(is_context_overflow_message("prompt is too long: 210000 > 200000"));
        assert!(is_context_overflow_message("error code: context_length_exceeded"));
    }

    #[test]
    fn test_token_without_exceed_is_not_overflow() {
        assert!(!is_context_overflow_message("invalid token"));
        assert!(!is_context_overflow_message("limit exceeded for uploads"));
    }

    #[test]
    fn test_rate_limit_on_tokens_is_not_overflow() {
        let msg = "Rate limit reached: tokens per min exceeded, retry in 2s";
        assert!(!is_context_overflow_message(msg));
        assert!(matches!(
            classify_error_message(msg),
            ProviderError::RateLimit(_)
        ));
    }

    #[test]
    fn test_classify_overflow() {
        let e = classify_error_message("Total tokens exceed the model limit");
        assert!(matches!(e, ProviderError::ContextOverflow(_)));
    }

    #[test]
    fn test_rate_limit_429() {
        let e = classify_error_message("HTTP 429: Too many requests");
        assert!(matches!(e, ProviderError::RateLimit(_)));
    }

    #[test]
    fn test_billing_wins_over_auth_on_402() {
        let e = classify_error_message("HTTP 402 payment required");
        assert!(matches!(e, ProviderError::Billing(_)));
    }

    #[test]
    fn test_auth_401() {
        let e = classify_error_message("HTTP 401: unauthorized");
        assert!(matches!(e, ProviderError::Auth(_)));
    }

    #[test]
    fn test_timeout() {
        let e = classify_error_message("request timed out after 120s");
        assert!(matches!(e, ProviderError::Timeout(_)));
    }

    #[test]
    fn test_format_tool_use_id() {
        let e = classify_error_message("messages.1.content.1.tool_use.id: string should match pattern");
        assert!(matches!(e, ProviderError::Format(_)));
    }

    #[test]
    fn test_unknown_fallback() {
        let e = classify_error_message("something completely unrecognized happened");
        assert!(matches!(e, ProviderError::Unknown(_)));
    }
}
