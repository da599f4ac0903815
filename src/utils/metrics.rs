//! Metrics collection for the agent loop and tool executor.
//!
//! There are no process-wide counters. Components receive an
//! `Arc<dyn MetricsSink>`; production wires a [`MetricsCollector`], tests can
//! pass [`NoopMetrics`] or inspect a collector's [`snapshot`](MetricsCollector::snapshot).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Receiver for runtime metrics.
///
/// All methods take `&self`; implementations use interior mutability so a
/// single sink can be shared across tasks.
pub trait MetricsSink: Send + Sync {
    /// One call to the language-model backend was made.
    fn record_llm_call(&self);

    /// A turn failed.
    fn record_error(&self);

    /// Estimated prompt tokens for one backend call.
    fn record_tokens(&self, tokens: u64);

    /// One tool execution finished.
    fn record_tool_execution(&self, tool: &str, duration: Duration, success: bool);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_llm_call(&self) {}
    fn record_error(&self) {}
    fn record_tokens(&self, _tokens: u64) {}
    fn record_tool_execution(&self, _tool: &str, _duration: Duration, _success: bool) {}
}

/// Per-tool execution statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolStats {
    /// Total number of executions.
    pub calls: u64,
    /// Executions that returned an error.
    pub errors: u64,
    /// Cumulative execution time in milliseconds.
    pub total_ms: u64,
    /// Longest execution in milliseconds.
    pub max_ms: u64,
}

impl ToolStats {
    /// Average execution time, or `None` before the first call.
    pub fn average_ms(&self) -> Option<u64> {
        (self.calls > 0).then(|| self.total_ms / self.calls)
    }
}

/// Point-in-time copy of a collector's counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub llm_calls: u64,
    pub errors: u64,
    pub tokens_estimated: u64,
    pub tool_executions: u64,
    pub tools: HashMap<String, ToolStats>,
    pub uptime_secs: u64,
}

/// Recording sink.
#[derive(Debug)]
pub struct MetricsCollector {
    llm_calls: AtomicU64,
    errors: AtomicU64,
    tokens: AtomicU64,
    tools: Mutex<HashMap<String, ToolStats>>,
    started: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            llm_calls: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            tokens: AtomicU64::new(0),
            tools: Mutex::new(HashMap::new()),
            started: Instant::now(),
        }
    }

    /// Copy the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let tools = self.tools().clone();
        MetricsSnapshot {
            llm_calls: self.llm_calls.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            tokens_estimated: self.tokens.load(Ordering::Relaxed),
            tool_executions: tools.values().map(|s| s.calls).sum(),
            tools,
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }

    fn tools(&self) -> MutexGuard<'_, HashMap<String, ToolStats>> {
        // Counters stay usable even if a recording thread panicked.
        self.tools.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for MetricsCollector {
    fn record_llm_call(&self) {
        self.llm_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_tokens(&self, tokens: u64) {
        self.tokens.fetch_add(tokens, Ordering::Relaxed);
    }

    fn record_tool_execution(&self, tool: &str, duration: Duration, success: bool) {
        let ms = duration.as_millis() as u64;
        let mut tools = self.tools();
        let stats = tools.entry(tool.to_string()).or_default();
        stats.calls += 1;
        if !success {
            stats.errors += 1;
        }
        stats.total_ms += ms;
        stats.max_ms = stats.max_ms.max(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_collector_counts() {
        let metrics = MetricsCollector::new();
        metrics.record_llm_call();
        metrics.record_llm_call();
        metrics.record_error();
        metrics.record_tokens(120);
        metrics.record_tokens(30);

        let snap = metrics.snapshot();
        assert_eq!(snap.llm_calls, 2);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.tokens_estimated, 150);
        assert_eq!(snap.tool_executions, 0);
    }

    #[test]
    fn test_tool_stats() {
        let metrics = MetricsCollector::new();
        metrics.record_tool_execution("search", Duration::from_millis(10), true);
        metrics.record_tool_execution("search", Duration::from_millis(30), false);

        let snap = metrics.snapshot();
        let search = &snap.tools["search"];
        assert_eq!(search.calls, 2);
        assert_eq!(search.errors, 1);
        assert_eq!(search.max_ms, 30);
        assert_eq!(search.average_ms(), Some(20));
        assert_eq!(snap.tool_executions, 2);
    }

    #[test]
    fn test_average_without_calls() {
        assert_eq!(ToolStats::default().average_ms(), None);
    }

    #[test]
    fn test_sinks_are_object_safe() {
        let sinks: Vec<Arc<dyn MetricsSink>> =
            vec![Arc::new(NoopMetrics), Arc::new(MetricsCollector::new())];
        for sink in sinks {
            sink.record_llm_call();
            sink.record_tool_execution("echo", Duration::ZERO, true);
        }
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = MetricsCollector::new();
        metrics.record_tool_execution("echo", Duration::from_millis(1), true);
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["tools"]["echo"]["calls"], 1);
    }
}
