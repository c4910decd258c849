// src/lib.rs

//! Concurrent test-execution orchestrator.
//!
//! Given a suite of test cases with explicit inter-dependencies, `testdag`
//! compiles them into a validated DAG and runs them in parallel:
//! dependency order is respected, concurrency adapts to host load, per-test
//! and whole-run deadlines are enforced with cooperative-then-forceful
//! cancellation, and the run always ends with a complete report: one
//! terminal result per node, even under partial failure, timeout, or
//! cancellation.
//!
//! Test execution itself is a capability: anything implementing
//! [`TestRunner`] can be plugged in. [`ProcessRunner`] runs each case's
//! `source` as a shell command.

pub mod config;
pub mod errors;
pub mod graph;
pub mod limit;
pub mod logging;
pub mod pool;
pub mod progress;
pub mod report;
pub mod sched;
pub mod suite;
pub mod timeout;
pub mod types;

use std::sync::Arc;

pub use config::ExecutionConfig;
pub use errors::{Result, TestDagError};
pub use pool::{ProcessRunner, RawOutcome, TestRunner};
pub use progress::{ProgressStream, ProgressUpdate};
pub use report::{TestReport, TestResult};
pub use sched::Orchestrator;
pub use suite::{TestCase, TestSuite};
pub use types::{BackpressurePolicy, RetryPolicy, RunClassification, TestStatus};

/// High-level entry point: build an [`Orchestrator`] and run the suite to
/// completion.
///
/// Fails fast on configuration or graph errors (nothing is dispatched);
/// everything else (per-node failures, timeouts, even the global deadline
/// firing) is folded into the returned report.
pub async fn run_suite(
    suite: TestSuite,
    config: ExecutionConfig,
    runner: Arc<dyn TestRunner>,
) -> Result<TestReport> {
    let orchestrator = Orchestrator::new(suite, config, runner)?;
    orchestrator.run().await
}
