// src/report.rs

//! Result accumulation and the final run report.
//!
//! The aggregator accepts exactly one terminal result per node. Duplicate
//! deliveries (possible when cancellation races completion) are rejected
//! with a warning and leave the report untouched. Partial snapshots are
//! cheap and may be taken at any time; the full report is sealed only when
//! the coordinator signals run completion.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tracing::warn;

use crate::graph::TestGraph;
use crate::types::{NodeId, RunClassification, TestStatus};

/// Immutable outcome of a single test node.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub id: NodeId,
    pub status: TestStatus,
    pub duration: Duration,
    /// Failure message, panic payload, timeout note, or skip reason.
    pub diagnostic: Option<String>,
    pub stdout: String,
    pub stderr: String,
}

impl TestResult {
    /// A result for a node that never executed (skipped, cancelled, or
    /// blocked by a failed dependency).
    pub(crate) fn unexecuted(id: impl Into<NodeId>, status: TestStatus, diagnostic: String) -> Self {
        Self {
            id: id.into(),
            status,
            duration: Duration::ZERO,
            diagnostic: Some(diagnostic),
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// Aggregate terminal-status counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    pub skipped: usize,
}

impl ReportCounts {
    fn record(&mut self, status: TestStatus) {
        match status {
            TestStatus::Passed => self.passed += 1,
            TestStatus::Failed => self.failed += 1,
            TestStatus::TimedOut => self.timed_out += 1,
            TestStatus::Cancelled => self.cancelled += 1,
            TestStatus::Skipped => self.skipped += 1,
            // Non-terminal statuses never reach the aggregator.
            TestStatus::Pending | TestStatus::Ready | TestStatus::Running => {}
        }
    }
}

/// Final report for one orchestrator run.
#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub suite: String,
    pub classification: RunClassification,
    pub counts: ReportCounts,
    /// One entry per node, in suite insertion order.
    pub results: Vec<TestResult>,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
    pub wall_time: Duration,
}

/// Streaming view of an in-progress run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReportSnapshot {
    pub counts: ReportCounts,
    pub completed: usize,
    pub total: usize,
}

/// Thread-safe accumulator for terminal results.
#[derive(Debug)]
pub struct ResultAggregator {
    suite: String,
    /// Suite insertion order, used to emit a deterministic report.
    order: Vec<NodeId>,
    started_at: SystemTime,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    results: HashMap<NodeId, TestResult>,
    counts: ReportCounts,
}

impl ResultAggregator {
    pub fn new(graph: &TestGraph, suite: impl Into<String>) -> Self {
        let order: Vec<NodeId> = graph.indices().map(|ix| graph.id(ix).to_string()).collect();
        let total = order.len();
        Self {
            suite: suite.into(),
            order,
            started_at: SystemTime::now(),
            inner: Mutex::new(Inner {
                results: HashMap::with_capacity(total),
                counts: ReportCounts {
                    total,
                    ..Default::default()
                },
            }),
        }
    }

    /// Record a terminal result. Returns `false` (and logs a warning)
    /// when the node already has a recorded result or is not part of the
    /// run; the report is unchanged in that case.
    pub fn record(&self, result: TestResult) -> bool {
        if !self.order.iter().any(|id| *id == result.id) {
            warn!(test = %result.id, "result for unknown test; ignoring");
            return false;
        }

        let mut inner = self.inner.lock().expect("aggregator lock poisoned");
        if inner.results.contains_key(&result.id) {
            warn!(
                test = %result.id,
                status = ?result.status,
                "duplicate terminal result; keeping first delivery"
            );
            return false;
        }

        inner.counts.record(result.status);
        inner.results.insert(result.id.clone(), result);
        true
    }

    /// Cheap partial snapshot for progress consumers.
    pub fn snapshot(&self) -> ReportSnapshot {
        let inner = self.inner.lock().expect("aggregator lock poisoned");
        ReportSnapshot {
            counts: inner.counts,
            completed: inner.results.len(),
            total: self.order.len(),
        }
    }

    /// Whether every node has a recorded terminal result.
    pub fn is_complete(&self) -> bool {
        let inner = self.inner.lock().expect("aggregator lock poisoned");
        inner.results.len() == self.order.len()
    }

    /// Seal the report. Called by the coordinator only after every node has
    /// reached a terminal status.
    pub fn finalize(&self, classification: RunClassification) -> TestReport {
        let inner = self.inner.lock().expect("aggregator lock poisoned");
        debug_assert_eq!(inner.results.len(), self.order.len());

        let results: Vec<TestResult> = self
            .order
            .iter()
            .filter_map(|id| inner.results.get(id).cloned())
            .collect();

        let finished_at = SystemTime::now();
        let wall_time = finished_at
            .duration_since(self.started_at)
            .unwrap_or_default();

        TestReport {
            suite: self.suite.clone(),
            classification,
            counts: inner.counts,
            results,
            started_at: self.started_at,
            finished_at,
            wall_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_graph;
    use crate::suite::{TestCase, TestSuite};

    fn aggregator() -> ResultAggregator {
        let mut suite = TestSuite::new("agg");
        suite.push(TestCase::new("a", "true"));
        suite.push(TestCase::new("b", "true"));
        let graph = build_graph(&suite).expect("valid suite");
        ResultAggregator::new(&graph, suite.name.clone())
    }

    fn passed(id: &str) -> TestResult {
        TestResult {
            id: id.to_string(),
            status: TestStatus::Passed,
            duration: Duration::from_millis(5),
            diagnostic: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    #[test]
    fn duplicate_delivery_leaves_report_unchanged() {
        let agg = aggregator();
        assert!(agg.record(passed("a")));

        let mut dup = passed("a");
        dup.status = TestStatus::Failed;
        assert!(!agg.record(dup));

        let snap = agg.snapshot();
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.counts.passed, 1);
        assert_eq!(snap.counts.failed, 0);
    }

    #[test]
    fn unknown_node_is_rejected() {
        let agg = aggregator();
        assert!(!agg.record(passed("ghost")));
        assert_eq!(agg.snapshot().completed, 0);
    }

    #[test]
    fn finalize_preserves_suite_order() {
        let agg = aggregator();
        agg.record(passed("b"));
        agg.record(passed("a"));
        assert!(agg.is_complete());

        let report = agg.finalize(RunClassification::Completed);
        let ids: Vec<&str> = report.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(report.counts.passed, 2);
        assert_eq!(report.counts.total, 2);
    }
}
