//! Provider types for AttoClaw
//!
//! The language-model backend is an abstract capability: anything that
//! implements [`LLMProvider`] can drive the agent loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::{Message, ToolCall};

/// Definition of a tool offered to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (must be unique)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    ///
    /// # Example
    /// ```
    /// use attoclaw::providers::ToolDefinition;
    /// use serde_json::json;
    ///
    /// let tool = ToolDefinition::new(
    ///     "web_search",
    ///     "Search the web for information",
    ///     json!({
    ///         "type": "object",
    ///         "properties": { "query": { "type": "string" } },
    ///         "required": ["query"]
    ///     }),
    /// );
    /// assert_eq!(tool.name, "web_search");
    /// ```
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// Trait for LLM backends.
///
/// An empty `tools` list means the caller wants a plain text answer; the agent
/// loop relies on this for its final synthesis call.
///
/// Implementations should return [`crate::error::ProviderError::ContextOverflow`]
/// when they know the prompt was too large. Untyped errors are classified from
/// their text.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a chat completion request.
    ///
    /// # Arguments
    /// * `messages` - The full prompt, system message first
    /// * `tools` - Tools the model may call
    /// * `model` - Model override (provider default if `None`)
    /// * `options` - Sampling options
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse>;

    /// The model used when the caller does not name one.
    fn default_model(&self) -> &str;

    /// Provider name, for logs.
    fn name(&self) -> &str;
}

/// Options for chat completion requests.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Maximum number of tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature for sampling
    pub temperature: Option<f32>,
}

impl ChatOptions {
    /// Create new default chat options.
    ///
    /// # Example
    /// ```
    /// use attoclaw::providers::ChatOptions;
    ///
    /// let options = ChatOptions::new().with_max_tokens(1000).with_temperature(0.7);
    /// assert_eq!(options.max_tokens, Some(1000));
    /// assert_eq!(options.temperature, Some(0.7));
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Response from an LLM chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    /// Text content of the response
    pub content: String,
    /// Tool calls requested by the model
    pub tool_calls: Vec<LLMToolCall>,
    /// Token usage, when the backend reports it
    pub usage: Option<Usage>,
}

impl LLMResponse {
    /// Create a plain text response.
    ///
    /// # Example
    /// ```
    /// use attoclaw::providers::LLMResponse;
    ///
    /// let response = LLMResponse::text("Hello, world!");
    /// assert_eq!(response.content, "Hello, world!");
    /// assert!(!response.has_tool_calls());
    /// ```
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            tool_calls: vec![],
            usage: None,
        }
    }

    /// Create a response carrying tool calls.
    pub fn with_tools(content: &str, tool_calls: Vec<LLMToolCall>) -> Self {
        Self {
            content: content.to_string(),
            tool_calls,
            usage: None,
        }
    }

    /// Check if this response requests any tools.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Attach usage information.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMToolCall {
    /// Call id, echoed back in the matching tool-role message
    pub id: String,
    /// Name of the tool to execute
    pub name: String,
    /// Arguments as a JSON string, exactly as the model produced them
    pub arguments: String,
}

impl LLMToolCall {
    /// Create a new tool call.
    ///
    /// # Example
    /// ```
    /// use attoclaw::providers::LLMToolCall;
    ///
    /// let call = LLMToolCall::new("call_1", "web_search", r#"{"query":"rust"}"#);
    /// assert_eq!(call.name, "web_search");
    /// ```
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}

impl From<&LLMToolCall> for ToolCall {
    fn from(call: &LLMToolCall) -> Self {
        ToolCall::new(&call.id, &call.name, &call.arguments)
    }
}

/// Token usage reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens in the completion
    pub completion_tokens: u32,
    /// Sum of both
    pub total_tokens: u32,
}

impl Usage {
    /// Create a usage record; `total_tokens` is derived.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}
