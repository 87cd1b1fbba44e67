//! Progress event callbacks
//!
//! The engine reports progress through this plain trait so any front end
//! (GUI, CLI, persistence layer) can observe a run without the engine
//! knowing about it.

use tracing::info;

use crate::verdict::{RunSummary, TestVerdict};

/// Observer for per-test and per-run progress
pub trait EventSink: Send + Sync {
    /// A test task has started executing
    fn test_started(&self, test_index: usize, total: usize);

    /// A test has produced its verdict
    fn test_completed(&self, verdict: &TestVerdict);

    /// The run has finished (completed, cancelled or failed to build)
    fn run_completed(&self, summary: &RunSummary);
}

/// Sink that ignores all events
pub struct NullSink;

impl EventSink for NullSink {
    fn test_started(&self, _test_index: usize, _total: usize) {}
    fn test_completed(&self, _verdict: &TestVerdict) {}
    fn run_completed(&self, _summary: &RunSummary) {}
}

/// Sink that logs progress through `tracing`, used by the headless front end
pub struct TracingSink;

impl EventSink for TracingSink {
    fn test_started(&self, test_index: usize, total: usize) {
        info!("Test {}/{} started", test_index + 1, total);
    }

    fn test_completed(&self, verdict: &TestVerdict) {
        info!(
            "Test {} completed: {} ({}ms)",
            verdict.test_index,
            verdict.outcome,
            verdict.timings.candidate.as_millis()
        );
    }

    fn run_completed(&self, summary: &RunSummary) {
        let stats = summary.statistics();
        info!(
            "Run completed: {}/{} passed, cancelled={}, overall_passed={}",
            stats.passed, stats.total, summary.cancelled, summary.overall_passed
        );
    }
}
