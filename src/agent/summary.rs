//! Background conversation summarization.
//!
//! When a session grows past the configured message count or token share,
//! the older part of its history is condensed by the model into the session
//! summary and dropped from the history. The work runs on a supervised
//! [`TaskTracker`] so shutdown can cancel it and tests can await it.
//!
//! Summarization never publishes anything; it only changes what later
//! prompts are built from.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn, Instrument};

use crate::config::AgentDefaults;
use crate::error::{AttoError, Result};
use crate::providers::{ChatOptions, LLMProvider};
use crate::session::{Message, SessionManager};
use crate::utils::metrics::MetricsSink;

use super::compaction::{build_summary_prompt, estimate_tokens, split_for_summary};

/// When a history is worth summarizing, and how much of it to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryPolicy {
    /// Summarize once the history holds more messages than this.
    pub message_threshold: usize,
    /// Summarize once the estimated tokens exceed this.
    pub token_threshold: usize,
    /// Messages kept verbatim after summarizing.
    pub keep_recent: usize,
}

impl SummaryPolicy {
    pub fn from_defaults(defaults: &AgentDefaults) -> Self {
        Self {
            message_threshold: defaults.summarize_message_threshold,
            token_threshold: defaults.summarize_token_threshold(),
            keep_recent: defaults.summary_keep_recent,
        }
    }

    /// Whether `history` has crossed either threshold.
    pub fn should_summarize(&self, history: &[Message]) -> bool {
        history.len() > self.message_threshold || estimate_tokens(history) > self.token_threshold
    }
}

/// Collaborators a summarization task needs.
#[derive(Clone)]
pub struct SummaryJob {
    pub session_key: String,
    pub provider: Arc<dyn LLMProvider>,
    pub sessions: Arc<SessionManager>,
    pub metrics: Arc<dyn MetricsSink>,
    /// Per-session turn lock; held while the summary is applied.
    pub session_lock: Arc<Mutex<()>>,
    pub model: String,
    pub options: ChatOptions,
}

/// Supervisor for background summarization tasks.
///
/// At most one task runs per session key.
pub struct Summarizer {
    policy: SummaryPolicy,
    in_flight: Arc<StdMutex<HashSet<String>>>,
    tracker: TaskTracker,
    cancel: StdMutex<CancellationToken>,
}

impl Summarizer {
    pub fn new(policy: SummaryPolicy) -> Self {
        Self {
            policy,
            in_flight: Arc::new(StdMutex::new(HashSet::new())),
            tracker: TaskTracker::new(),
            cancel: StdMutex::new(CancellationToken::new()),
        }
    }

    pub fn policy(&self) -> &SummaryPolicy {
        &self.policy
    }

    /// Spawn a summarization task for `job.session_key` if `history` calls
    /// for one and none is already running. Returns whether a task started.
    ///
    /// `history` is the snapshot that gets summarized; the result is only
    /// applied if the stored history still starts with the summarized part.
    pub fn maybe_spawn(&self, history: &[Message], job: SummaryJob) -> bool {
        if !self.policy.should_summarize(history) {
            return false;
        }
        if split_for_summary(history, self.policy.keep_recent).is_none() {
            return false;
        }

        let key = job.session_key.clone();
        let Some(slot) = InFlight::claim(&self.in_flight, &key) else {
            debug!(session = %key, "Summarization already running");
            return false;
        };

        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .child_token();
        let keep_recent = self.policy.keep_recent;
        let snapshot = history.to_vec();
        let span = tracing::info_span!("summarize", session = %key);

        self.tracker.spawn(
            async move {
                let _slot = slot;
                match summarize(&job, &snapshot, keep_recent, &cancel).await {
                    Ok(true) => {}
                    Ok(false) => debug!("Summarization skipped"),
                    Err(AttoError::Cancelled) => debug!("Summarization cancelled"),
                    Err(e) => warn!(error = %e, "Summarization failed"),
                }
            }
            .instrument(span),
        );
        true
    }

    /// Number of sessions currently being summarized.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Wait until every spawned task has finished.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancel running tasks. Tasks spawned afterwards run normally.
    pub fn shutdown(&self) {
        let old = std::mem::replace(
            &mut *self.cancel.lock().unwrap_or_else(|e| e.into_inner()),
            CancellationToken::new(),
        );
        old.cancel();
    }
}

/// Claim on a session key, released on drop.
struct InFlight {
    set: Arc<StdMutex<HashSet<String>>>,
    key: String,
}

impl InFlight {
    fn claim(set: &Arc<StdMutex<HashSet<String>>>, key: &str) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string());
        inserted.then(|| Self {
            set: Arc::clone(set),
            key: key.to_string(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

/// Summarize `snapshot` into the session. Returns `Ok(false)` when nothing
/// was applied.
async fn summarize(
    job: &SummaryJob,
    snapshot: &[Message],
    keep_recent: usize,
    cancel: &CancellationToken,
) -> Result<bool> {
    let key = job.session_key.as_str();
    let Some(split) = split_for_summary(snapshot, keep_recent) else {
        return Ok(false);
    };
    let previous = job.sessions.get_summary(key).await;
    let prompt = build_summary_prompt(previous.as_deref(), &snapshot[..split]);
    let messages = vec![Message::user(&prompt)];

    job.metrics.record_llm_call();
    job.metrics.record_tokens(estimate_tokens(&messages) as u64);
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AttoError::Cancelled),
        r = job.provider.chat(messages, vec![], Some(job.model.as_str()), job.options.clone()) => r?,
    };

    let summary = response.content.trim();
    if summary.is_empty() {
        return Ok(false);
    }

    let _turn = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AttoError::Cancelled),
        guard = job.session_lock.lock() => guard,
    };

    // A turn may have rewritten the history while the model was busy.
    let current = job.sessions.get_history(key).await;
    if current.len() < split || current[..split] != snapshot[..split] {
        debug!("History changed during summarization, discarding summary");
        return Ok(false);
    }

    let kept = current[split..].to_vec();
    job.sessions.set_summary(key, summary).await;
    job.sessions.set_history(key, kept).await;
    job.sessions.save(key).await?;
    info!(summarized = split, kept = current.len() - split, "Session summarized");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{LLMResponse, ToolDefinition};
    use crate::utils::metrics::NoopMetrics;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedSummary {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LLMProvider for CannedSummary {
        async fn chat(
            &self,
            _messages: Vec<Message>,
            tools: Vec<ToolDefinition>,
            _model: Option<&str>,
            _options: ChatOptions,
        ) -> Result<LLMResponse> {
            assert!(tools.is_empty());
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LLMResponse::text("the user said hello many times"))
        }

        fn default_model(&self) -> &str {
            "canned"
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn policy() -> SummaryPolicy {
        SummaryPolicy {
            message_threshold: 20,
            token_threshold: 100_000,
            keep_recent: 4,
        }
    }

    fn chatter(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(&format!("hello {}", i))
                } else {
                    Message::assistant(&format!("hi {}", i))
                }
            })
            .collect()
    }

    fn job(sessions: &Arc<SessionManager>, provider: Arc<CannedSummary>) -> SummaryJob {
        SummaryJob {
            session_key: "cli:direct".to_string(),
            provider,
            sessions: Arc::clone(sessions),
            metrics: Arc::new(NoopMetrics),
            session_lock: Arc::new(Mutex::new(())),
            model: "canned".to_string(),
            options: ChatOptions::new(),
        }
    }

    #[test]
    fn test_policy_thresholds() {
        let p = policy();
        assert!(!p.should_summarize(&chatter(20)));
        assert!(p.should_summarize(&chatter(21)));

        let tight = SummaryPolicy {
            token_threshold: 10,
            ..p
        };
        assert!(tight.should_summarize(&chatter(3)));
    }

    #[tokio::test]
    async fn test_summarizes_and_keeps_recent() {
        let sessions = Arc::new(SessionManager::new_memory());
        sessions.set_history("cli:direct", chatter(30)).await;
        let provider = Arc::new(CannedSummary {
            calls: AtomicUsize::new(0),
        });

        let summarizer = Summarizer::new(policy());
        let history = sessions.get_history("cli:direct").await;
        assert!(summarizer.maybe_spawn(&history, job(&sessions, Arc::clone(&provider))));
        summarizer.wait().await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            sessions.get_summary("cli:direct").await.as_deref(),
            Some("the user said hello many times")
        );
        let kept = sessions.get_history("cli:direct").await;
        assert_eq!(kept.len(), 4);
        assert_eq!(kept[3].content, "hi 29");
        assert_eq!(summarizer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_short_history_not_spawned() {
        let sessions = Arc::new(SessionManager::new_memory());
        let provider = Arc::new(CannedSummary {
            calls: AtomicUsize::new(0),
        });
        let summarizer = Summarizer::new(policy());
        assert!(!summarizer.maybe_spawn(&chatter(5), job(&sessions, provider)));
    }

    #[tokio::test]
    async fn test_one_task_per_session() {
        let sessions = Arc::new(SessionManager::new_memory());
        sessions.set_history("cli:direct", chatter(30)).await;
        let provider = Arc::new(CannedSummary {
            calls: AtomicUsize::new(0),
        });
        let summarizer = Summarizer::new(policy());
        let history = sessions.get_history("cli:direct").await;

        // Hold the turn lock so the first task cannot finish.
        let j = job(&sessions, Arc::clone(&provider));
        let held = Arc::clone(&j.session_lock);
        let guard = held.lock().await;
        assert!(summarizer.maybe_spawn(&history, j.clone()));
        assert!(!summarizer.maybe_spawn(&history, j));
        drop(guard);

        summarizer.wait().await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_changed_history_discards_summary() {
        let sessions = Arc::new(SessionManager::new_memory());
        sessions.set_history("cli:direct", chatter(30)).await;
        let provider = Arc::new(CannedSummary {
            calls: AtomicUsize::new(0),
        });
        let summarizer = Summarizer::new(policy());
        let history = sessions.get_history("cli:direct").await;

        let j = job(&sessions, provider);
        let held = Arc::clone(&j.session_lock);
        let guard = held.lock().await;
        assert!(summarizer.maybe_spawn(&history, j));
        // Rewrite the history while the task waits for the lock.
        sessions.set_history("cli:direct", chatter(2)).await;
        drop(guard);

        summarizer.wait().await;
        assert!(sessions.get_summary("cli:direct").await.is_none());
        assert_eq!(sessions.get_history("cli:direct").await.len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_task() {
        let sessions = Arc::new(SessionManager::new_memory());
        sessions.set_history("cli:direct", chatter(30)).await;
        let provider = Arc::new(CannedSummary {
            calls: AtomicUsize::new(0),
        });
        let summarizer = Summarizer::new(policy());
        let history = sessions.get_history("cli:direct").await;

        let j = job(&sessions, provider);
        let held = Arc::clone(&j.session_lock);
        let guard = held.lock().await;
        assert!(summarizer.maybe_spawn(&history, j));
        summarizer.shutdown();
        summarizer.wait().await;
        drop(guard);

        assert!(sessions.get_summary("cli:direct").await.is_none());
        assert_eq!(sessions.get_history("cli:direct").await.len(), 30);
    }
}
