//! Context builder for agent conversations
//!
//! Composes the message list sent to the model: one system message (base
//! prompt, runtime details, memory block, conversation summary) followed by
//! the session history.

use crate::session::Message;

/// Default system prompt for the AttoClaw agent
const DEFAULT_SYSTEM_PROMPT: &str = r#"You are AttoClaw, a small personal AI assistant.

You have access to tools to help accomplish tasks. Use them when needed.

Be concise but helpful. Focus on completing the user's request efficiently."#;

/// Heading under which the session summary is placed.
pub const SUMMARY_HEADING: &str = "## Summary of Previous Conversation";

/// Per-turn facts about where the agent is running.
///
/// # Example
///
/// ```rust
/// use attoclaw::agent::RuntimeContext;
///
/// let ctx = RuntimeContext::new()
///     .with_chat("telegram", "42")
///     .with_tools(vec!["echo".to_string(), "search".to_string()]);
///
/// let rendered = ctx.render().unwrap();
/// assert!(rendered.contains("Channel: telegram"));
/// assert!(rendered.contains("echo, search"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuntimeContext {
    pub channel: Option<String>,
    pub chat_id: Option<String>,
    pub available_tools: Vec<String>,
    /// RFC 3339 timestamp
    pub current_time: Option<String>,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chat(mut self, channel: &str, chat_id: &str) -> Self {
        self.channel = Some(channel.to_string());
        self.chat_id = Some(chat_id.to_string());
        self
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.available_tools = tools;
        self
    }

    /// Stamp the current local time.
    pub fn with_current_time(mut self) -> Self {
        self.current_time = Some(chrono::Local::now().to_rfc3339());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_none()
            && self.chat_id.is_none()
            && self.available_tools.is_empty()
            && self.current_time.is_none()
    }

    /// Render as a markdown section, or `None` when nothing is set.
    pub fn render(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let mut lines = Vec::new();
        if let Some(ref channel) = self.channel {
            lines.push(format!("- Channel: {}", channel));
        }
        if let Some(ref chat_id) = self.chat_id {
            lines.push(format!("- Chat ID: {}", chat_id));
        }
        if !self.available_tools.is_empty() {
            lines.push(format!(
                "- Available tools: {}",
                self.available_tools.join(", ")
            ));
        }
        if let Some(ref time) = self.current_time {
            lines.push(format!("- Current time: {}", time));
        }

        Some(format!("## Runtime Context\n\n{}", lines.join("\n")))
    }
}

/// Optional per-turn sections of the system message.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptSections<'a> {
    pub runtime: Option<&'a RuntimeContext>,
    /// Opaque block from the memory collaborator
    pub memory: Option<&'a str>,
    /// Condensed older conversation
    pub summary: Option<&'a str>,
}

/// Builder for constructing conversation context for LLM calls.
///
/// # Example
///
/// ```rust
/// use attoclaw::agent::{ContextBuilder, PromptSections};
/// use attoclaw::session::Message;
///
/// let builder = ContextBuilder::new();
/// let system = builder.build_system_message(&PromptSections {
///     summary: Some("User is planning a trip."),
///     ..Default::default()
/// });
/// let messages = builder.build_messages(system, &[Message::user("Hello!")]);
/// assert_eq!(messages.len(), 2);
/// assert!(messages[0].content.contains("planning a trip"));
/// ```
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Replace the base system prompt.
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Build the system message: base prompt, then runtime context, memory
    /// and summary, each separated by a blank line. Empty sections are skipped.
    pub fn build_system_message(&self, sections: &PromptSections<'_>) -> Message {
        let mut content = self.system_prompt.clone();

        if let Some(rendered) = sections.runtime.and_then(RuntimeContext::render) {
            content.push_str("\n\n");
            content.push_str(&rendered);
        }
        if let Some(memory) = sections.memory.filter(|m| !m.trim().is_empty()) {
            content.push_str("\n\n");
            content.push_str(memory);
        }
        if let Some(summary) = sections.summary.filter(|s| !s.trim().is_empty()) {
            content.push_str("\n\n");
            content.push_str(SUMMARY_HEADING);
            content.push_str("\n\n");
            content.push_str(summary);
        }

        Message::system(&content)
    }

    /// Full prompt: `system` followed by `history`.
    pub fn build_messages(&self, system: Message, history: &[Message]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(system);
        messages.extend_from_slice(history);
        messages
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
