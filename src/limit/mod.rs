// src/limit/mod.rs

//! Adaptive concurrency ceiling driven by resource telemetry.
//!
//! The controller owns an atomic worker-slot limit between
//! `min_concurrency` and `max_concurrency`. A background task samples host
//! utilization on a fixed interval and nudges the limit: down one step when
//! utilization crosses the high watermark, up one step after enough
//! consecutive samples below the low watermark, never more often than the
//! cooldown period. If sampling itself fails the controller falls back to
//! the static maximum and keeps running (fail-open).
//!
//! The scheduler core is the dispatch authority; it observes limit changes
//! through the watch channel returned by [`ConcurrencyController::subscribe`].
//! `permit`/`release` maintain the in-flight count that resource snapshots
//! and diagnostics see.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::config::ExecutionConfig;

/// Point-in-time resource utilization. Transient; never persisted.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSnapshot {
    /// CPU utilization fraction in `0.0..=1.0`.
    pub cpu: f32,
    /// Memory utilization fraction in `0.0..=1.0`.
    pub memory: f32,
    pub active_workers: usize,
}

impl ResourceSnapshot {
    fn overloaded(&self, high: f32) -> bool {
        self.cpu > high || self.memory > high
    }

    fn settled(&self, low: f32) -> bool {
        self.cpu < low && self.memory < low
    }
}

/// Capability seam for resource telemetry.
///
/// Production code uses [`SystemSampler`]; tests script their own load
/// curves without touching the host.
pub trait ResourceSampler: Send + 'static {
    /// Sample host utilization. `active_workers` is supplied by the
    /// controller for inclusion in the snapshot.
    fn sample(&mut self, active_workers: usize) -> anyhow::Result<ResourceSnapshot>;
}

/// Host-backed sampler.
pub struct SystemSampler {
    sys: sysinfo::System,
}

impl SystemSampler {
    pub fn new() -> Self {
        Self {
            sys: sysinfo::System::new(),
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SystemSampler {
    fn sample(&mut self, active_workers: usize) -> anyhow::Result<ResourceSnapshot> {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();

        let total = self.sys.total_memory();
        if total == 0 {
            anyhow::bail!("memory totals unavailable");
        }

        Ok(ResourceSnapshot {
            cpu: self.sys.global_cpu_usage() / 100.0,
            memory: self.sys.used_memory() as f32 / total as f32,
            active_workers,
        })
    }
}

/// Adaptive worker-slot ceiling.
#[derive(Debug)]
pub struct ConcurrencyController {
    limit: AtomicUsize,
    in_flight: AtomicUsize,
    min: usize,
    max: usize,
    limit_tx: watch::Sender<usize>,
}

impl ConcurrencyController {
    pub fn new(config: &ExecutionConfig) -> Arc<Self> {
        let (limit_tx, _) = watch::channel(config.max_concurrency);
        Arc::new(Self {
            limit: AtomicUsize::new(config.max_concurrency),
            in_flight: AtomicUsize::new(0),
            min: config.min_concurrency,
            max: config.max_concurrency,
            limit_tx,
        })
    }

    /// Current worker-slot ceiling.
    pub fn current_limit(&self) -> usize {
        self.limit.load(Ordering::Relaxed)
    }

    /// Current in-flight execution count.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Claim a slot for accounting. Dispatch decisions are made by the
    /// scheduler core against the limit it observed.
    pub fn permit(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Release a previously claimed slot.
    pub fn release(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Watch channel carrying every limit adjustment.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.limit_tx.subscribe()
    }

    fn set_limit(&self, value: usize) {
        self.limit.store(value, Ordering::Relaxed);
        self.limit_tx.send_replace(value);
    }

    /// Spawn the periodic sampling/adaptation loop. The task runs until
    /// aborted by the orchestrator at the end of the run.
    pub fn spawn_adaptation(
        self: &Arc<Self>,
        config: &ExecutionConfig,
        mut sampler: Box<dyn ResourceSampler>,
    ) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        let interval = config.sample_interval;
        let high = config.high_watermark;
        let low = config.low_watermark;
        let steady_samples = config.steady_samples;
        let cooldown = config.cooldown;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut below_low: u32 = 0;
            let mut last_change: Option<Instant> = None;
            let mut degraded = false;

            loop {
                ticker.tick().await;

                let snapshot = match sampler
                    .sample(controller.in_flight())
                    .context("resource sampling failed")
                {
                    Ok(s) => {
                        if degraded {
                            debug!("resource sampling recovered");
                            degraded = false;
                        }
                        s
                    }
                    Err(err) => {
                        if !degraded {
                            warn!(
                                error = %err,
                                fallback_limit = controller.max,
                                "falling back to static max concurrency"
                            );
                            controller.set_limit(controller.max);
                            degraded = true;
                        }
                        continue;
                    }
                };

                trace!(
                    cpu = snapshot.cpu,
                    memory = snapshot.memory,
                    active = snapshot.active_workers,
                    limit = controller.current_limit(),
                    "resource sample"
                );

                if snapshot.overloaded(high) {
                    below_low = 0;
                } else if snapshot.settled(low) {
                    below_low = below_low.saturating_add(1);
                } else {
                    below_low = 0;
                }

                let cooled = last_change
                    .map(|t| t.elapsed() >= cooldown)
                    .unwrap_or(true);
                if !cooled {
                    continue;
                }

                let limit = controller.current_limit();
                if snapshot.overloaded(high) && limit > controller.min {
                    controller.set_limit(limit - 1);
                    last_change = Some(Instant::now());
                    debug!(
                        cpu = snapshot.cpu,
                        memory = snapshot.memory,
                        new_limit = limit - 1,
                        "utilization above high watermark; lowering concurrency limit"
                    );
                } else if below_low >= steady_samples && limit < controller.max {
                    below_low = 0;
                    controller.set_limit(limit + 1);
                    last_change = Some(Instant::now());
                    debug!(
                        new_limit = limit + 1,
                        "sustained low utilization; raising concurrency limit"
                    );
                }
            }
        })
    }
}
