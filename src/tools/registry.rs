//! Tool registry for AttoClaw
//!
//! Holds the tools offered to the model and executes them by name. Every
//! outcome, including a missing tool or a failing one, comes back as a
//! [`ToolOutput`] so the model can react to it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::providers::ToolDefinition;
use crate::utils::metrics::{MetricsSink, NoopMetrics};

use super::{Tool, ToolContext, ToolOutput};

/// A registry that holds and executes tools.
///
/// # Example
///
/// ```rust
/// use attoclaw::tools::{EchoTool, ToolRegistry};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let mut registry = ToolRegistry::new();
/// registry.register(Box::new(EchoTool));
///
/// let output = registry.execute("echo", json!({"message": "hello"})).await;
/// assert_eq!(output.for_llm, "hello");
/// # });
/// ```
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    metrics: Arc<dyn MetricsSink>,
}

impl ToolRegistry {
    /// Create an empty registry that discards metrics.
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(NoopMetrics))
    }

    /// Create an empty registry reporting executions to `metrics`.
    pub fn with_metrics(metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            tools: HashMap::new(),
            metrics,
        }
    }

    /// Replace the metrics sink.
    pub fn set_metrics(&mut self, metrics: Arc<dyn MetricsSink>) {
        self.metrics = metrics;
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        info!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Execute a tool by name with an empty context.
    pub async fn execute(&self, name: &str, args: Value) -> ToolOutput {
        self.execute_with_context(name, args, &ToolContext::default())
            .await
    }

    /// Execute a tool by name.
    ///
    /// Contextual tools receive the channel/chat from `ctx` first. Unknown
    /// tools and tool errors are returned as error outputs. Each execution of
    /// a known tool is reported to the metrics sink.
    pub async fn execute_with_context(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> ToolOutput {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "Model requested unknown tool");
            return ToolOutput::error(format!("Tool not found: {}", name));
        };

        if let (Some(contextual), Some(channel), Some(chat_id)) =
            (tool.as_contextual(), ctx.channel.as_deref(), ctx.chat_id.as_deref())
        {
            contextual.set_context(channel, chat_id);
        }

        let start = Instant::now();
        let result = tool.execute(args, ctx).await;
        let elapsed = start.elapsed();

        let output = match result {
            Ok(output) => {
                info!(
                    tool = name,
                    duration_ms = elapsed.as_millis() as u64,
                    is_error = output.is_error,
                    "Tool executed"
                );
                output
            }
            Err(e) => {
                error!(
                    tool = name,
                    error = %e,
                    duration_ms = elapsed.as_millis() as u64,
                    "Tool execution failed"
                );
                ToolOutput::error(format!("Error: {}", e))
            }
        };

        self.metrics
            .record_tool_execution(name, elapsed, !output.is_error);
        output
    }

    /// Tool definitions for the provider, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.parameters()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
