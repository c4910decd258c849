// src/config.rs

//! Execution configuration and its startup validation.
//!
//! Invalid configurations are rejected with [`TestDagError::Config`] before
//! any node is dispatched; there is no partial run with a bad config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, TestDagError};
use crate::types::{BackpressurePolicy, RetryPolicy};

/// Recognized execution options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Upper bound on concurrently running tests; also the worker-slot count.
    pub max_concurrency: usize,
    /// Floor the adaptive controller may never go below.
    pub min_concurrency: usize,
    /// Whole-run deadline. `None` disables the run-level timeout.
    pub global_timeout: Option<Duration>,
    /// Deadline for tests without an explicit per-test timeout.
    pub per_test_timeout_default: Duration,
    /// Wait after a cooperative cancellation request before forceful
    /// reclamation of the worker slot.
    pub grace_period: Duration,
    pub retry_policy: RetryPolicy,
    /// When a dependency fails terminally: `true` marks transitive
    /// dependents Skipped, `false` marks them Failed.
    pub skip_on_dependency_failure: bool,

    /// Resource telemetry sampling interval.
    pub sample_interval: Duration,
    /// Utilization fraction above which the limit is decreased.
    pub high_watermark: f32,
    /// Utilization fraction below which samples count toward an increase.
    pub low_watermark: f32,
    /// Consecutive below-low samples required before an increase.
    pub steady_samples: u32,
    /// Minimum time between two limit adjustments.
    pub cooldown: Duration,

    /// Capacity of the progress event queue.
    pub progress_capacity: usize,
    pub progress_backpressure: BackpressurePolicy,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_concurrency(),
            min_concurrency: 1,
            global_timeout: None,
            per_test_timeout_default: Duration::from_secs(30),
            grace_period: Duration::from_secs(2),
            retry_policy: RetryPolicy::None,
            skip_on_dependency_failure: true,
            sample_interval: Duration::from_secs(1),
            high_watermark: 0.90,
            low_watermark: 0.60,
            steady_samples: 3,
            cooldown: Duration::from_secs(5),
            progress_capacity: 64,
            progress_backpressure: BackpressurePolicy::Block,
        }
    }
}

/// Default worker count derived from the host's available parallelism.
fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl ExecutionConfig {
    /// Semantic validation run once at startup.
    pub fn validate(&self) -> Result<()> {
        if self.min_concurrency == 0 {
            return Err(TestDagError::Config(
                "min_concurrency must be >= 1 (got 0)".to_string(),
            ));
        }
        if self.max_concurrency < self.min_concurrency {
            return Err(TestDagError::Config(format!(
                "max_concurrency ({}) must be >= min_concurrency ({})",
                self.max_concurrency, self.min_concurrency
            )));
        }
        if self.per_test_timeout_default.is_zero() {
            return Err(TestDagError::Config(
                "per_test_timeout_default must be non-zero".to_string(),
            ));
        }
        if let Some(t) = self.global_timeout {
            if t.is_zero() {
                return Err(TestDagError::Config(
                    "global_timeout must be non-zero when set".to_string(),
                ));
            }
        }
        if self.sample_interval.is_zero() {
            return Err(TestDagError::Config(
                "sample_interval must be non-zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.high_watermark)
            || !(0.0..=1.0).contains(&self.low_watermark)
            || self.low_watermark >= self.high_watermark
        {
            return Err(TestDagError::Config(format!(
                "watermarks must satisfy 0 <= low < high <= 1 (got low={}, high={})",
                self.low_watermark, self.high_watermark
            )));
        }
        if self.steady_samples == 0 {
            return Err(TestDagError::Config(
                "steady_samples must be >= 1".to_string(),
            ));
        }
        if self.progress_capacity == 0 {
            return Err(TestDagError::Config(
                "progress_capacity must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}
