//! Tool types for AttoClaw
//!
//! Tools are external collaborators. The agent loop only sees them through
//! the [`Tool`] trait, plus the optional [`ContextualTool`] capability.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Dual-audience tool result.
///
/// `for_llm` is always folded into the conversation as a tool-role message.
/// `for_user` decides visibility: `None` keeps the result silent, `Some`
/// makes it user-facing, in which case it replaces the model's own reply
/// when it comes from the last tool executed in a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Content sent to the LLM as the tool result. Always required.
    pub for_llm: String,
    /// Content sent to the user. `None` = silent.
    pub for_user: Option<String>,
    /// Whether this result represents an error condition.
    pub is_error: bool,
}

impl ToolOutput {
    /// LLM-only result. User sees nothing.
    pub fn llm_only(content: impl Into<String>) -> Self {
        Self {
            for_llm: content.into(),
            for_user: None,
            is_error: false,
        }
    }

    /// Both LLM and user see the same content.
    pub fn user_visible(content: impl Into<String>) -> Self {
        let s = content.into();
        Self {
            for_llm: s.clone(),
            for_user: Some(s),
            is_error: false,
        }
    }

    /// Error result. LLM sees the error; user sees nothing.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            for_llm: content.into(),
            for_user: None,
            is_error: true,
        }
    }

    /// Different content for LLM vs user.
    pub fn split(for_llm: impl Into<String>, for_user: impl Into<String>) -> Self {
        Self {
            for_llm: for_llm.into(),
            for_user: Some(for_user.into()),
            is_error: false,
        }
    }

    /// Whether this result should reach the user directly.
    pub fn is_user_facing(&self) -> bool {
        self.for_user.is_some()
    }
}

/// Trait that all tools must implement.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use attoclaw::tools::{Tool, ToolContext, ToolOutput};
/// use attoclaw::error::Result;
///
/// struct MyTool;
///
/// #[async_trait]
/// impl Tool for MyTool {
///     fn name(&self) -> &str { "my_tool" }
///     fn description(&self) -> &str { "Does something useful" }
///     fn parameters(&self) -> Value {
///         serde_json::json!({ "type": "object", "properties": {} })
///     }
///     async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
///         Ok(ToolOutput::llm_only("Done!"))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name; the model requests tools by this name.
    fn name(&self) -> &str;

    /// Description sent to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments.
    fn parameters(&self) -> Value;

    /// Execute the tool.
    ///
    /// An `Err` is not fatal to the turn: the agent loop turns it into an
    /// error tool-result that the model gets to see.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput>;

    /// Capability query for [`ContextualTool`].
    ///
    /// Tools that want the current channel/chat before each execution
    /// override this to return `Some(self)`.
    fn as_contextual(&self) -> Option<&dyn ContextualTool> {
        None
    }
}

/// Optional capability: receive the current channel and chat identifiers
/// before execution.
pub trait ContextualTool: Send + Sync {
    fn set_context(&self, channel: &str, chat_id: &str);
}

/// Context provided to tools during execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// The channel name (e.g., "telegram", "cli")
    pub channel: Option<String>,
    /// The chat/conversation ID within the channel
    pub chat_id: Option<String>,
    /// The workspace directory for file operations
    pub workspace: Option<String>,
}

impl ToolContext {
    /// Create a new empty tool context.
    ///
    /// # Example
    /// ```
    /// use attoclaw::tools::ToolContext;
    ///
    /// let ctx = ToolContext::new().with_channel("telegram", "123456");
    /// assert_eq!(ctx.channel.as_deref(), Some("telegram"));
    /// assert_eq!(ctx.chat_id.as_deref(), Some("123456"));
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: &str, chat_id: &str) -> Self {
        self.channel = Some(channel.to_string());
        self.chat_id = Some(chat_id.to_string());
        self
    }

    pub fn with_workspace(mut self, workspace: &str) -> Self {
        self.workspace = Some(workspace.to_string());
        self
    }
}
