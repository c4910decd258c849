// src/sched/mod.rs

//! Scheduling and coordination.
//!
//! This module ties together:
//! - the pure scheduler core ([`core`]): a synchronous, deterministic state
//!   machine that consumes [`SchedulerEvent`]s and produces commands for
//!   the IO shell
//! - the async coordinator ([`coordinator`]): the single control loop that
//!   owns channels, timers, the worker pool, and cancellation
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, or processes; all graph-state mutation happens inside it.

use std::time::Duration;

use crate::pool::Verdict;
use crate::report::TestResult;

pub mod coordinator;
pub mod core;
pub mod step;

pub use coordinator::Orchestrator;
pub use core::CoreScheduler;
pub use step::SchedulerStep;

/// Events flowing into the scheduler core.
#[derive(Debug)]
pub enum SchedulerEvent {
    /// A worker delivered a verdict for a dispatched node.
    NodeFinished {
        index: usize,
        verdict: Verdict,
        duration: Duration,
    },
    /// A retry delay elapsed; the node may re-enter the frontier.
    RetryElapsed { index: usize },
    /// The concurrency controller published a new ceiling.
    LimitChanged { limit: usize },
    /// External cancellation signal.
    CancelRequested,
    /// The whole-run deadline fired.
    GlobalDeadline,
}

/// Command produced by the pure core, executed by the coordinator.
#[derive(Debug)]
pub enum CoreCommand {
    /// Hand these nodes (arena indices) to the worker pool.
    Dispatch(Vec<usize>),
    /// Re-dispatch the node after the delay.
    ScheduleRetry { index: usize, delay: Duration },
    /// Fire the run-level cancellation token so running nodes are escalated.
    CancelRunning,
    /// Record a terminal result with the aggregator.
    Record(TestResult),
}
