// src/timeout.rs

//! Deadline tracking and the cooperative-then-forceful escalation ladder.
//!
//! Every dispatched node gets a deadline (its explicit timeout, else the
//! configured default); the run as a whole may have one too. When a node
//! deadline fires, the node's cancellation token is triggered first; a
//! runner that has not returned within the grace period is reclaimed by
//! aborting its task. Run-level cancellation walks the same ladder but
//! records Cancelled instead of TimedOut.

use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ExecutionConfig;
use crate::pool::{RawOutcome, Verdict};
use crate::suite::TestCase;

/// Deadline bookkeeping for one orchestrator run.
#[derive(Debug, Clone)]
pub struct TimeoutManager {
    per_test_default: Duration,
    grace: Duration,
    run_deadline: Option<Instant>,
}

impl TimeoutManager {
    pub fn new(config: &ExecutionConfig, started: Instant) -> Self {
        Self {
            per_test_default: config.per_test_timeout_default,
            grace: config.grace_period,
            run_deadline: config.global_timeout.map(|t| started + t),
        }
    }

    /// Deadline for a node dispatched now.
    pub fn node_deadline(&self, case: &TestCase) -> Instant {
        Instant::now() + case.timeout.unwrap_or(self.per_test_default)
    }

    /// Whole-run deadline, if a global timeout is configured.
    pub fn run_deadline(&self) -> Option<Instant> {
        self.run_deadline
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }
}

/// Supervise a spawned runner execution until it finishes, times out, or
/// the run is cancelled.
///
/// `node_token` is the token threaded into the runner (a child of
/// `run_token`, so run-level cancellation reaches the runner on its own).
pub(crate) async fn escalate(
    handle: &mut JoinHandle<RawOutcome>,
    deadline: Instant,
    grace: Duration,
    node_token: &CancellationToken,
    run_token: &CancellationToken,
) -> Verdict {
    tokio::select! {
        joined = &mut *handle => verdict_of(joined),
        _ = tokio::time::sleep_until(deadline) => {
            debug!("per-test deadline elapsed; requesting cooperative cancellation");
            node_token.cancel();
            match tokio::time::timeout(grace, &mut *handle).await {
                Ok(joined) => Verdict::TimedOut {
                    cooperative: true,
                    partial: partial_of(joined),
                },
                Err(_) => {
                    debug!("runner ignored cancellation; reclaiming slot");
                    handle.abort();
                    Verdict::TimedOut {
                        cooperative: false,
                        partial: None,
                    }
                }
            }
        }
        _ = run_token.cancelled() => {
            match tokio::time::timeout(grace, &mut *handle).await {
                Ok(joined) => Verdict::Cancelled {
                    partial: partial_of(joined),
                },
                Err(_) => {
                    handle.abort();
                    Verdict::Cancelled { partial: None }
                }
            }
        }
    }
}

fn verdict_of(joined: Result<RawOutcome, JoinError>) -> Verdict {
    match joined {
        Ok(outcome) => Verdict::Finished(outcome),
        Err(err) if err.is_panic() => Verdict::Panicked(panic_message(err)),
        Err(_) => Verdict::Cancelled { partial: None },
    }
}

fn partial_of(joined: Result<RawOutcome, JoinError>) -> Option<RawOutcome> {
    joined.ok()
}

fn panic_message(err: JoinError) -> String {
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "runner panicked".to_string()
    }
}
