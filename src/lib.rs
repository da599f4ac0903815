//! AttoClaw - Small personal AI assistant runtime
//!
//! The core is three pieces: a [`MessageBus`] between chat adapters and the
//! agent, an [`AgentLoop`](agent::AgentLoop) that runs the tool-calling
//! conversation, and a [`SessionManager`] that keeps conversation histories
//! on disk. Language-model backends and tools plug in through the
//! [`LLMProvider`] and [`Tool`](tools::Tool) traits.

pub mod agent;
pub mod bus;
pub mod config;
pub mod error;
pub mod providers;
pub mod safety;
pub mod session;
pub mod tools;
pub mod utils;

pub use agent::AgentLoop;
pub use bus::{InboundMessage, MessageBus, OutboundMessage};
pub use config::Config;
pub use error::{AttoError, Result};
pub use providers::{
    ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition, Usage,
};
pub use session::{Message, Role, Session, SessionManager, ToolCall};
