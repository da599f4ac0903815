//! Agent module - Core AI agent logic and conversation handling
//!
//! The agent is responsible for:
//!
//! - Processing inbound messages from the bus
//! - Building conversation context with system prompt, memory and summary
//! - Calling the LLM provider and executing the tools it requests
//! - Committing finished turns to the session store
//! - Summarizing long sessions in the background
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  MessageBus │────>│  AgentLoop  │────>│ LLMProvider │
//! │  (inbound)  │     │             │     │             │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                   │
//!                            │                   │
//!                            ▼                   ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │   Session   │     │    Tools    │
//!                     │   Manager   │     │  Registry   │
//!                     └─────────────┘     └─────────────┘
//! ```

pub mod compaction;
mod context;
pub mod memory;
pub mod state;
pub mod summary;
mod r#loop;

pub use context::{ContextBuilder, PromptSections, RuntimeContext, SUMMARY_HEADING};
pub use memory::{MemoryProvider, MemoryStore};
pub use r#loop::AgentLoop;
pub use state::{AgentState, StateManager};
pub use summary::{Summarizer, SummaryPolicy};
