//! Tools module - the tool-calling seam
//!
//! Concrete tools (calculators, web search, file readers) live outside the
//! core. This module provides what the agent loop needs to drive them:
//!
//! - `Tool` trait: the interface all tools implement
//! - `ContextualTool`: optional capability to receive the current chat
//! - `ToolOutput`: dual-audience result (model vs user)
//! - `ToolRegistry`: lookup, execution and metrics
//!
//! # Example
//!
//! ```rust
//! use attoclaw::tools::{EchoTool, ToolRegistry};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let mut registry = ToolRegistry::new();
//! registry.register(Box::new(EchoTool));
//!
//! let result = registry.execute("echo", json!({"message": "Hello!"})).await;
//! assert_eq!(result.for_llm, "Hello!");
//! assert_eq!(registry.definitions().len(), 1);
//! # });
//! ```

mod registry;
mod types;

pub use registry::ToolRegistry;
pub use types::{ContextualTool, Tool, ToolContext, ToolOutput};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AttoError, Result};

/// Echoes its `message` argument back.
///
/// With `"to_user": true` the echo is user-facing, otherwise silent.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the provided message"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to echo"
                },
                "to_user": {
                    "type": "boolean",
                    "description": "Show the echo to the user directly"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AttoError::Tool("missing required argument: message".into()))?;
        let to_user = args
            .get("to_user")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        Ok(if to_user {
            ToolOutput::user_visible(message)
        } else {
            ToolOutput::llm_only(message)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_echo_tool_parameters() {
        let params = EchoTool.parameters();
        assert_eq!(params["type"], "object");
        assert_eq!(params["properties"]["message"]["type"], "string");
        assert_eq!(params["required"][0], "message");
    }

    #[tokio::test]
    async fn test_echo_tool_silent_by_default() {
        let out = EchoTool
            .execute(json!({"message": "Hello"}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(out.for_llm, "Hello");
        assert!(!out.is_user_facing());
    }

    #[tokio::test]
    async fn test_echo_tool_user_facing() {
        let out = EchoTool
            .execute(json!({"message": "Hi", "to_user": true}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(out.for_user.as_deref(), Some("Hi"));
    }

    #[tokio::test]
    async fn test_echo_tool_missing_message() {
        let err = EchoTool
            .execute(json!({}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AttoError::Tool(_)));
    }
}
