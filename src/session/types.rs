//! Session types for AttoClaw
//!
//! This module defines the conversation record persisted by the session store:
//! sessions, messages, roles, and tool calls.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation session containing messages and metadata.
///
/// Serialized as `{key, messages, summary, created, updated}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for this session (e.g., "telegram:chat123")
    pub key: String,
    /// Ordered list of messages in this conversation
    pub messages: Vec<Message>,
    /// Condensed form of older conversation turns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// When this session was created
    #[serde(rename = "created")]
    pub created_at: DateTime<Utc>,
    /// When this session was last modified
    #[serde(rename = "updated")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new empty session with the given key.
    ///
    /// # Example
    /// ```
    /// use attoclaw::session::Session;
    ///
    /// let session = Session::new("telegram:chat123");
    /// assert!(session.messages.is_empty());
    /// ```
    pub fn new(key: &str) -> Self {
        let now = Utc::now();
        Self {
            key: key.to_string(),
            messages: Vec::new(),
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message and bump `updated_at`.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    /// Replace the whole message list.
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.touch();
    }

    /// Keep at most the last `keep_last` messages.
    ///
    /// Tool results whose requesting assistant message falls before the cut
    /// are dropped as well, so the kept history never opens with a tool
    /// message.
    pub fn truncate(&mut self, keep_last: usize) {
        let mut cut = self.messages.len().saturating_sub(keep_last);
        if cut > 0 {
            while self.messages.get(cut).map_or(false, |m| m.role == Role::Tool) {
                cut += 1;
            }
            self.messages.drain(..cut);
        }
        self.touch();
    }

    pub fn set_summary(&mut self, summary: &str) {
        self.summary = Some(summary.to_string());
        self.touch();
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Whether the session has been idle for longer than `ttl`.
    pub fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.updated_at) > ttl
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// The text content of the message
    #[serde(default)]
    pub content: String,
    /// Tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call this message answers (tool role only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a plain message with the given role.
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a new user message.
    ///
    /// # Example
    /// ```
    /// use attoclaw::session::{Message, Role};
    ///
    /// let msg = Message::user("Hello!");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: &str) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: &str) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a tool-result message answering `tool_call_id`.
    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        Self {
            role: Role::Tool,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.to_string()),
        }
    }

    /// Create an assistant message that requests tools.
    pub fn assistant_with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls
            .as_ref()
            .map(|tc| !tc.is_empty())
            .unwrap_or(false)
    }

    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool && self.tool_call_id.is_some()
    }
}

/// Role of a message sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool invocation recorded on an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id; the answering tool-role message carries the same id
    pub id: String,
    /// Tool name
    pub name: String,
    /// Raw JSON arguments
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    /// Deserialize the arguments into `T`.
    pub fn parse_arguments<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.arguments)
    }
}

/// Strip an incomplete tool-call group from the end of a history.
///
/// A crash between "model requested tools" and "tool results recorded" leaves
/// an assistant message whose calls were never answered. Backends reject such
/// a history outright, so the tail is repaired:
///
/// - a trailing assistant message with tool calls is dropped (repeatedly);
/// - a trailing run of tool results is kept only if it answers every call of
///   the assistant message before it, otherwise the whole group is dropped.
///
/// Any other tail (user message, plain assistant reply) is left alone.
pub fn sanitize_messages(mut messages: Vec<Message>) -> Vec<Message> {
    loop {
        let Some(last) = messages.last() else {
            break;
        };

        match last.role {
            Role::Assistant if last.has_tool_calls() => {
                messages.pop();
            }
            Role::Tool => {
                let run_start = messages
                    .iter()
                    .rposition(|m| m.role != Role::Tool)
                    .map(|i| i + 1)
                    .unwrap_or(0);

                let Some(owner) = run_start.checked_sub(1) else {
                    break;
                };
                let complete = {
                    let answered: HashSet<&str> = messages[run_start..]
                        .iter()
                        .filter_map(|m| m.tool_call_id.as_deref())
                        .collect();
                    messages[owner]
                        .tool_calls
                        .as_ref()
                        .map(|calls| calls.iter().all(|c| answered.contains(c.id.as_str())))
                        .unwrap_or(true)
                };

                if complete {
                    break;
                }
                messages.truncate(owner);
            }
            _ => break,
        }
    }

    messages.shrink_to_fit();
    messages
}
