//! Message types for the AttoClaw message bus
//!
//! Adapters turn platform traffic into [`InboundMessage`]s; the agent loop
//! answers with [`OutboundMessage`]s.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Channel name used for messages the runtime sends itself.
pub const SYSTEM_CHANNEL: &str = "system";

/// A request arriving from an external surface (chat bot, webhook, CLI).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The channel this message came from (e.g., "telegram", "webhook")
    pub channel: String,
    /// Unique identifier of the sender
    pub sender_id: String,
    /// Unique identifier of the chat/conversation
    pub chat_id: String,
    /// The text content of the message
    pub content: String,
    /// Session key for history lookup (default: "channel:chat_id")
    pub session_key: String,
    /// Additional metadata key-value pairs
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl InboundMessage {
    /// Create a new inbound message keyed to `channel:chat_id`.
    ///
    /// # Example
    /// ```
    /// use attoclaw::bus::InboundMessage;
    ///
    /// let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello!");
    /// assert_eq!(msg.session_key, "telegram:chat456");
    /// ```
    pub fn new(channel: &str, sender_id: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sender_id: sender_id.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            session_key: format!("{}:{}", channel, chat_id),
            metadata: HashMap::new(),
        }
    }

    /// Route this message to an explicit session instead of `channel:chat_id`.
    pub fn with_session_key(mut self, session_key: &str) -> Self {
        self.session_key = session_key.to_string();
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Whether the message was generated by the runtime rather than a user.
    pub fn is_internal(&self) -> bool {
        self.channel == SYSTEM_CHANNEL
    }
}

/// A reply headed back to an external surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// The channel to send this message through
    pub channel: String,
    /// The chat/conversation to send to
    pub chat_id: String,
    /// The text content to send
    pub content: String,
}

impl OutboundMessage {
    pub fn new(channel: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
        }
    }

    /// Create a reply addressed to the chat an inbound message came from.
    ///
    /// # Example
    /// ```
    /// use attoclaw::bus::{InboundMessage, OutboundMessage};
    ///
    /// let inbound = InboundMessage::new("telegram", "user123", "chat456", "Hello!");
    /// let reply = OutboundMessage::reply_to(&inbound, "Hi there!");
    /// assert_eq!(reply.chat_id, "chat456");
    /// ```
    pub fn reply_to(msg: &InboundMessage, content: &str) -> Self {
        Self::new(&msg.channel, &msg.chat_id, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_default_session_key() {
        let msg = InboundMessage::new("discord", "u1", "c9", "hi");
        assert_eq!(msg.session_key, "discord:c9");
        assert!(msg.metadata.is_empty());
    }

    #[test]
    fn test_inbound_custom_session_key() {
        let msg = InboundMessage::new("cli", "me", "direct", "hi").with_session_key("scratch");
        assert_eq!(msg.session_key, "scratch");
    }

    #[test]
    fn test_inbound_metadata() {
        let msg = InboundMessage::new("telegram", "u", "c", "hi")
            .with_metadata("message_id", "42")
            .with_metadata("username", "alice");
        assert_eq!(msg.metadata.get("message_id").map(String::as_str), Some("42"));
        assert_eq!(msg.metadata.len(), 2);
    }

    #[test]
    fn test_is_internal() {
        assert!(InboundMessage::new(SYSTEM_CHANNEL, "cron", "c", "tick").is_internal());
        assert!(!InboundMessage::new("telegram", "u", "c", "hi").is_internal());
    }

    #[test]
    fn test_reply_to() {
        let inbound = InboundMessage::new("slack", "u", "general", "ping");
        let reply = OutboundMessage::reply_to(&inbound, "pong");
        assert_eq!(reply, OutboundMessage::new("slack", "general", "pong"));
    }

    #[test]
    fn test_inbound_deserialize_without_metadata() {
        let json = r#"{"channel":"webhook","sender_id":"s","chat_id":"c","content":"x","session_key":"webhook:c"}"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        assert!(msg.metadata.is_empty());
    }
}
