use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Canonical test identifier type used throughout the crate.
pub type NodeId = String;

/// Lifecycle status of a single test node.
///
/// Transitions: Pending -> Ready -> Running -> {Passed, Failed, TimedOut,
/// Cancelled}, plus Pending -> Skipped when a dependency fails under the
/// skip policy. Terminal statuses have no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Pending,
    Ready,
    Running,
    Passed,
    Failed,
    TimedOut,
    Cancelled,
    Skipped,
}

impl TestStatus {
    /// Whether this status admits no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TestStatus::Passed
                | TestStatus::Failed
                | TestStatus::TimedOut
                | TestStatus::Cancelled
                | TestStatus::Skipped
        )
    }
}

/// Overall classification of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunClassification {
    /// Every node reached a terminal status on its own.
    Completed,
    /// The run-level deadline fired before all nodes completed.
    TimedOut,
    /// An external cancellation signal ended the run early.
    Cancelled,
}

/// Re-dispatch policy for tests that fail or time out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Every attempt is final.
    #[default]
    None,
    /// Up to `retries` immediate re-dispatches.
    Fixed { retries: u32 },
    /// Up to `retries` re-dispatches with exponential delay: the n-th retry
    /// waits `base * 2^(n-1)`.
    Backoff { retries: u32, base: Duration },
}

impl RetryPolicy {
    /// Number of re-dispatches allowed beyond the first attempt.
    pub fn budget(&self) -> u32 {
        match *self {
            RetryPolicy::None => 0,
            RetryPolicy::Fixed { retries } | RetryPolicy::Backoff { retries, .. } => retries,
        }
    }

    /// Delay before the retry following the given completed attempt count.
    pub fn delay(&self, completed_attempts: u32) -> Duration {
        match *self {
            RetryPolicy::None | RetryPolicy::Fixed { .. } => Duration::ZERO,
            RetryPolicy::Backoff { base, .. } => {
                let shift = completed_attempts.saturating_sub(1).min(16);
                base.saturating_mul(1u32 << shift)
            }
        }
    }
}

/// What to do when the progress queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Block the producer until the consumer catches up.
    #[default]
    Block,
    /// Drop the oldest queued events; the consumer observes the drop count.
    DropOldest,
}
