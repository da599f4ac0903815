//! Agent loop implementation
//!
//! This module provides the core agent loop that turns inbound messages into
//! replies: it composes the prompt, calls the LLM provider, executes tools,
//! and commits the finished turn to the session store.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::config::Config;
use crate::error::{AttoError, Result};
use crate::providers::{ChatOptions, LLMProvider, LLMResponse, ToolDefinition};
use crate::safety::{InjectionGuard, REFUSAL};
use crate::session::{Message, SessionManager, ToolCall};
use crate::tools::{Tool, ToolContext, ToolOutput, ToolRegistry};
use crate::utils::metrics::{MetricsSink, NoopMetrics};

use super::compaction::{compress_history, estimate_tokens};
use super::context::{ContextBuilder, PromptSections, RuntimeContext};
use super::memory::MemoryProvider;
use super::state::StateManager;
use super::summary::{Summarizer, SummaryJob, SummaryPolicy};

/// The main agent loop that processes messages and coordinates with LLM providers.
///
/// The `AgentLoop` is responsible for:
/// - Receiving messages from the message bus
/// - Short-circuiting prompt-injection attempts
/// - Building conversation context with memory, summary and session history
/// - Calling the LLM provider and executing the tools it asks for
/// - Publishing replies back to the message bus
/// - Keeping long sessions short with background summarization
///
/// Turn state lives in local variables until the turn completes; a
/// cancelled or failed turn leaves the session store untouched.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use attoclaw::agent::AgentLoop;
/// use attoclaw::bus::MessageBus;
/// use attoclaw::config::Config;
/// use attoclaw::error::Result;
/// use attoclaw::providers::{ChatOptions, LLMProvider, LLMResponse, ToolDefinition};
/// use attoclaw::session::{Message, SessionManager};
/// use attoclaw::tools::ToolRegistry;
///
/// struct Hello;
///
/// #[async_trait]
/// impl LLMProvider for Hello {
///     async fn chat(
///         &self,
///         _messages: Vec<Message>,
///         _tools: Vec<ToolDefinition>,
///         _model: Option<&str>,
///         _options: ChatOptions,
///     ) -> Result<LLMResponse> {
///         Ok(LLMResponse::text("Hello!"))
///     }
///     fn default_model(&self) -> &str { "hello-1" }
///     fn name(&self) -> &str { "hello" }
/// }
///
/// # tokio_test::block_on(async {
/// let agent = AgentLoop::new(
///     Config::default(),
///     Arc::new(SessionManager::new_memory()),
///     Arc::new(MessageBus::new()),
///     Arc::new(Hello),
///     ToolRegistry::new(),
/// );
/// let reply = agent.process_direct("Hi", "cli:direct", "cli", "direct").await.unwrap();
/// assert_eq!(reply, "Hello!");
/// # });
/// ```
pub struct AgentLoop {
    /// Agent configuration
    config: Config,
    /// Session store for conversation state
    session_manager: Arc<SessionManager>,
    /// Message bus for input/output
    bus: Arc<MessageBus>,
    /// The language-model backend
    provider: Arc<dyn LLMProvider>,
    /// Registered tools
    tools: RwLock<ToolRegistry>,
    /// Context builder for constructing LLM messages
    context_builder: ContextBuilder,
    /// Prompt-injection screen for inbound content
    guard: InjectionGuard,
    /// Optional prior-context collaborator
    memory: Option<Arc<dyn MemoryProvider>>,
    /// Metrics sink shared with the tool registry
    metrics: Arc<dyn MetricsSink>,
    /// Optional last-contact persistence
    state: Option<Arc<StateManager>>,
    /// Background summarization supervisor
    summarizer: Summarizer,
    /// Per-session locks to serialize concurrent messages for the same session
    session_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    /// Whether `start` is currently running
    running: AtomicBool,
    /// Cancels the current `start` run
    shutdown: StdMutex<CancellationToken>,
}

/// A turn that ran to completion, ready to commit.
struct Turn {
    history: Vec<Message>,
    reply: String,
}

impl AgentLoop {
    /// Create a new agent loop.
    ///
    /// The tool registry's metrics are redirected to the loop's sink, which
    /// starts as [`NoopMetrics`].
    pub fn new(
        config: Config,
        session_manager: Arc<SessionManager>,
        bus: Arc<MessageBus>,
        provider: Arc<dyn LLMProvider>,
        mut tools: ToolRegistry,
    ) -> Self {
        let metrics: Arc<dyn MetricsSink> = Arc::new(NoopMetrics);
        tools.set_metrics(Arc::clone(&metrics));
        let guard = InjectionGuard::new(config.safety.injection_check_enabled);
        let summarizer = Summarizer::new(SummaryPolicy::from_defaults(&config.agents.defaults));

        Self {
            config,
            session_manager,
            bus,
            provider,
            tools: RwLock::new(tools),
            context_builder: ContextBuilder::new(),
            guard,
            memory: None,
            metrics,
            state: None,
            summarizer,
            session_locks: Arc::new(Mutex::new(HashMap::new())),
            running: AtomicBool::new(false),
            shutdown: StdMutex::new(CancellationToken::new()),
        }
    }

    /// Use a custom context builder (e.g. a different system prompt).
    pub fn with_context_builder(mut self, context_builder: ContextBuilder) -> Self {
        self.context_builder = context_builder;
        self
    }

    /// Attach a memory collaborator whose block is added to every prompt.
    pub fn with_memory(mut self, memory: Arc<dyn MemoryProvider>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Report LLM calls, tokens, tool executions and failures to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.tools.get_mut().set_metrics(Arc::clone(&metrics));
        self.metrics = metrics;
        self
    }

    /// Persist the last channel and chat id through `state`.
    pub fn with_state_manager(mut self, state: Arc<StateManager>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register a tool with the agent.
    pub async fn register_tool(&self, tool: Box<dyn Tool>) {
        self.tools.write().await.register(tool);
    }

    /// Names of the registered tools, sorted.
    pub async fn tool_names(&self) -> Vec<String> {
        self.tools
            .read()
            .await
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Startup summary for logs and the CLI.
    pub async fn startup_info(&self) -> Value {
        let names = self.tool_names().await;
        let defaults = &self.config.agents.defaults;
        json!({
            "provider": self.provider.name(),
            "model": self.model(),
            "tools": {
                "count": names.len(),
                "names": names,
            },
            "max_tool_iterations": defaults.max_tool_iterations,
            "injection_check": self.guard.is_enabled(),
            "memory": self.memory.is_some(),
        })
    }

    /// Record the channel of the latest user message. Failures are logged.
    pub async fn record_last_channel(&self, channel: &str) {
        if let Some(state) = &self.state {
            if let Err(e) = state.set_last_channel(channel).await {
                warn!(error = %e, "Failed to persist last channel");
            }
        }
    }

    /// Record the chat id of the latest user message. Failures are logged.
    pub async fn record_last_chat_id(&self, chat_id: &str) {
        if let Some(state) = &self.state {
            if let Err(e) = state.set_last_chat_id(chat_id).await {
                warn!(error = %e, "Failed to persist last chat id");
            }
        }
    }

    /// Process a single inbound message.
    ///
    /// Returns the reply to publish, or `None` if `cancel` fired before the
    /// turn finished. A finished turn is committed to the session store in
    /// one step; a cancelled or failed one commits nothing.
    ///
    /// Injection attempts are answered with a fixed refusal and never reach
    /// the model or the session.
    ///
    /// # Errors
    /// Returns an error if the LLM call fails (after at most one compression
    /// retry for context overflow).
    pub async fn process_message(
        &self,
        msg: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        if let Some(pattern) = self.guard.detect(&msg.content) {
            warn!(pattern, "Prompt injection detected, refusing");
            return Ok(Some(REFUSAL.to_string()));
        }

        if !msg.is_internal() {
            self.record_last_channel(&msg.channel).await;
            self.record_last_chat_id(&msg.chat_id).await;
        }

        // Serialize turns of the same session; different sessions proceed
        // concurrently.
        let session_lock = self.session_lock(&msg.session_key).await;
        let Some(session_guard) = or_cancel(cancel, session_lock.lock()).await else {
            return Ok(None);
        };

        let turn = match self.run_turn(msg, cancel).await {
            Ok(Some(turn)) => turn,
            Ok(None) => {
                debug!("Turn cancelled, nothing committed");
                return Ok(None);
            }
            Err(e) => {
                self.metrics.record_error();
                return Err(e);
            }
        };

        self.session_manager
            .set_history(&msg.session_key, turn.history)
            .await;
        if let Err(e) = self.session_manager.save(&msg.session_key).await {
            error!(error = %e, "Failed to persist session");
        }
        drop(session_guard);

        self.maybe_summarize(&msg.session_key).await;
        Ok(Some(turn.reply))
    }

    /// Process `content` as if it arrived on `channel`/`chat_id`, routed to
    /// `session_key`. Convenience for the CLI and tests.
    pub async fn process_direct(
        &self,
        content: &str,
        session_key: &str,
        channel: &str,
        chat_id: &str,
    ) -> Result<String> {
        let msg = InboundMessage::new(channel, "user", chat_id, content).with_session_key(session_key);
        self.process_message(&msg, &CancellationToken::new())
            .await?
            .ok_or(AttoError::Cancelled)
    }

    /// Start summarizing `session_key` in the background if its history has
    /// crossed a threshold. Returns whether a task was started.
    ///
    /// The task never publishes to the bus.
    pub async fn maybe_summarize(&self, session_key: &str) -> bool {
        let history = self.session_manager.get_history(session_key).await;
        if !self.summarizer.policy().should_summarize(&history) {
            return false;
        }
        let job = SummaryJob {
            session_key: session_key.to_string(),
            provider: Arc::clone(&self.provider),
            sessions: Arc::clone(&self.session_manager),
            metrics: Arc::clone(&self.metrics),
            session_lock: self.session_lock(session_key).await,
            model: self.model().to_string(),
            options: self.chat_options(),
        };
        self.summarizer.maybe_spawn(&history, job)
    }

    /// Wait for every background summarization task to finish.
    pub async fn wait_for_background(&self) {
        self.summarizer.wait().await;
    }

    /// Start the agent loop, consuming from the message bus.
    ///
    /// Each inbound message is processed in its own task inside an
    /// `info_span!("request")`. Runs until `cancel` fires, [`stop`](Self::stop)
    /// is called, or the bus is closed and drained; then waits for in-flight
    /// turns.
    ///
    /// # Errors
    /// Returns an error if the loop is already running.
    pub async fn start(self: &Arc<Self>, cancel: CancellationToken) -> Result<()> {
        // The run token is installed under the same lock `stop` takes, so a
        // `stop` that observes `running` always cancels this run.
        let run = {
            let mut shutdown = self.shutdown.lock().unwrap_or_else(|e| e.into_inner());
            if self.running.swap(true, Ordering::SeqCst) {
                return Err(AttoError::Config("Agent loop already running".into()));
            }
            let run = cancel.child_token();
            *shutdown = run.clone();
            run
        };
        info!("Starting agent loop");
        let turns = TaskTracker::new();

        while let Some(msg) = self.bus.consume_inbound(&run).await {
            let request_span = info_span!(
                "request",
                request_id = %uuid::Uuid::new_v4(),
                channel = %msg.channel,
                chat_id = %msg.chat_id,
                session_id = %msg.session_key,
                sender = %msg.sender_id,
            );
            let agent = Arc::clone(self);
            let turn_cancel = run.child_token();
            turns.spawn(
                async move { agent.handle_inbound(msg, turn_cancel).await }.instrument(request_span),
            );
        }

        turns.close();
        turns.wait().await;
        self.running.store(false, Ordering::SeqCst);
        info!("Agent loop stopped");
        Ok(())
    }

    /// Stop the agent loop and cancel background summarization.
    ///
    /// In-flight turns are cancelled and commit nothing.
    pub fn stop(&self) {
        info!("Stopping agent loop");
        self.shutdown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
        self.summarizer.shutdown();
    }

    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.session_manager
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn handle_inbound(&self, msg: InboundMessage, cancel: CancellationToken) {
        info!("Processing message");
        let start = Instant::now();

        let reply = match self.process_message(&msg, &cancel).await {
            Ok(Some(reply)) => {
                info!(
                    latency_ms = start.elapsed().as_millis() as u64,
                    response_len = reply.len(),
                    "Request completed"
                );
                reply
            }
            Ok(None) => {
                debug!("Request cancelled");
                return;
            }
            Err(e) => {
                error!(
                    latency_ms = start.elapsed().as_millis() as u64,
                    error = %e,
                    "Request failed"
                );
                format!("Error: {}", e)
            }
        };

        if reply.is_empty() {
            debug!("Empty reply, nothing to publish");
            return;
        }
        if !self.bus.publish_outbound(OutboundMessage::reply_to(&msg, &reply)) {
            warn!("Outbound message dropped");
        }
    }

    /// Run the tool-calling state machine for one message without touching
    /// the session store.
    async fn run_turn(&self, msg: &InboundMessage, cancel: &CancellationToken) -> Result<Option<Turn>> {
        let defaults = &self.config.agents.defaults;
        let mut history = self.session_manager.get_history(&msg.session_key).await;
        history.push(Message::user(&msg.content));

        let summary = self.session_manager.get_summary(&msg.session_key).await;
        let memory = self.memory_context(&msg.chat_id).await;

        let (tool_definitions, tool_names) = {
            let tools = self.tools.read().await;
            let names: Vec<String> = tools.names().into_iter().map(str::to_string).collect();
            (tools.definitions(), names)
        };
        let runtime = RuntimeContext::new()
            .with_chat(&msg.channel, &msg.chat_id)
            .with_tools(tool_names)
            .with_current_time();
        let system = self.context_builder.build_system_message(&PromptSections {
            runtime: Some(&runtime),
            memory: memory.as_deref(),
            summary: summary.as_deref(),
        });

        let workspace = self.config.workspace_path();
        let tool_ctx = ToolContext::new()
            .with_channel(&msg.channel, &msg.chat_id)
            .with_workspace(&workspace.to_string_lossy());

        let max_iterations = defaults.max_tool_iterations;
        let mut iteration = 0;
        let mut last_output: Option<ToolOutput> = None;

        let final_response = loop {
            let synthesis = iteration >= max_iterations;
            let offered = if synthesis {
                Vec::new()
            } else {
                tool_definitions.clone()
            };
            if synthesis {
                info!(
                    iterations = iteration,
                    "Tool budget exhausted, requesting final answer"
                );
            }

            let Some(response) = self
                .call_model(&system, &mut history, offered, cancel)
                .await?
            else {
                return Ok(None);
            };
            if synthesis || !response.has_tool_calls() {
                break response;
            }

            iteration += 1;
            debug!(iteration, max_iterations, "Tool iteration");
            let calls: Vec<ToolCall> = response.tool_calls.iter().map(ToolCall::from).collect();
            history.push(Message::assistant_with_tools(&response.content, calls));

            for call in &response.tool_calls {
                info!(tool = %call.name, id = %call.id, "Executing tool");
                let args = parse_arguments(&call.name, &call.arguments);
                let execution = async {
                    let tools = self.tools.read().await;
                    tools.execute_with_context(&call.name, args, &tool_ctx).await
                };
                let Some(output) = or_cancel(cancel, execution).await else {
                    return Ok(None);
                };
                history.push(Message::tool_result(&call.id, &output.for_llm));
                last_output = Some(output);
            }
        };

        history.push(Message::assistant(&final_response.content));
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let reply = match last_output.and_then(|o| o.for_user) {
            Some(for_user) => {
                debug!("Last tool result is user-facing, replacing model reply");
                for_user
            }
            None => final_response.content,
        };
        Ok(Some(Turn { history, reply }))
    }

    /// One model call with a single compression retry on context overflow.
    ///
    /// Compression rewrites `history` in place, so the committed history is
    /// the compressed one.
    async fn call_model(
        &self,
        system: &Message,
        history: &mut Vec<Message>,
        tools: Vec<ToolDefinition>,
        cancel: &CancellationToken,
    ) -> Result<Option<LLMResponse>> {
        let mut compressed = false;
        loop {
            let messages = self.context_builder.build_messages(system.clone(), history);
            self.metrics.record_llm_call();
            self.metrics.record_tokens(estimate_tokens(&messages) as u64);

            let call = self
                .provider
                .chat(messages, tools.clone(), Some(self.model()), self.chat_options());
            let Some(result) = or_cancel(cancel, call).await else {
                return Ok(None);
            };

            match result {
                Ok(response) => return Ok(Some(response)),
                Err(e) if e.is_context_overflow() && !compressed => {
                    let (shorter, dropped) = compress_history(std::mem::take(history));
                    *history = shorter;
                    compressed = true;
                    warn!(
                        dropped,
                        remaining = history.len(),
                        error = %e,
                        "Context overflow, compressed history and retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Lock serializing turns of `session_key`.
    ///
    /// Entries nobody holds or waits on are pruned first, so the map tracks
    /// active sessions only and shrinks once evicted chats go quiet.
    async fn session_lock(&self, session_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(
            locks
                .entry(session_key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Memory block for `chat_id`. Providers may hit the filesystem, so the
    /// read runs on the blocking pool.
    async fn memory_context(&self, chat_id: &str) -> Option<String> {
        let memory = Arc::clone(self.memory.as_ref()?);
        let chat_id = chat_id.to_string();
        match tokio::task::spawn_blocking(move || memory.context_for(&chat_id)).await {
            Ok(block) => block,
            Err(e) => {
                warn!(error = %e, "Memory lookup failed, continuing without it");
                None
            }
        }
    }

    fn model(&self) -> &str {
        let model = self.config.agents.defaults.model.as_str();
        if model.is_empty() {
            self.provider.default_model()
        } else {
            model
        }
    }

    fn chat_options(&self) -> ChatOptions {
        let defaults = &self.config.agents.defaults;
        ChatOptions::new()
            .with_max_tokens(defaults.max_tokens)
            .with_temperature(defaults.temperature)
    }
}

/// Parse model-produced tool arguments.
///
/// Empty arguments mean "no arguments"; anything else that is not JSON is
/// handed to the tool as `{"_raw": "<text>"}`.
fn parse_arguments(tool: &str, raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(tool, error = %e, "Invalid JSON in tool arguments");
        json!({ "_raw": raw })
    })
}

/// Run `fut` unless `cancel` fires first.
async fn or_cancel<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}
