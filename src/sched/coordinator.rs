// src/sched/coordinator.rs

//! Async IO shell around the pure scheduler core.
//!
//! The coordinator owns every channel and timer for one run: the worker
//! pool and its completion channel, the concurrency controller's limit
//! watch, retry timers, the run deadline, and the external cancellation
//! token. It feeds events into [`CoreScheduler`] and executes the commands
//! that come back. It performs no test execution itself.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ExecutionConfig;
use crate::errors::Result;
use crate::graph::build_graph;
use crate::limit::{ConcurrencyController, ResourceSampler, SystemSampler};
use crate::pool::{Completion, Dispatch, TestRunner, WorkerPool};
use crate::progress::{self, ProgressReporter, ProgressStream};
use crate::report::{ResultAggregator, TestReport};
use crate::sched::core::CoreScheduler;
use crate::sched::{CoreCommand, SchedulerEvent, SchedulerStep};
use crate::suite::TestSuite;
use crate::timeout::TimeoutManager;

/// One orchestrator invocation: builds the graph, runs it, produces the
/// report. All run state lives here; there are no process-wide singletons.
pub struct Orchestrator {
    core: CoreScheduler,
    config: ExecutionConfig,
    runner: Arc<dyn TestRunner>,
    aggregator: Arc<ResultAggregator>,
    controller: Arc<ConcurrencyController>,
    run_token: CancellationToken,
    progress: Option<ProgressReporter>,
    sampler: Option<Box<dyn ResourceSampler>>,
}

impl Orchestrator {
    /// Validate the config, compile the graph, and wire up run state.
    /// Fails fast on config or graph errors; zero nodes are dispatched in
    /// that case.
    pub fn new(
        suite: TestSuite,
        config: ExecutionConfig,
        runner: Arc<dyn TestRunner>,
    ) -> Result<Self> {
        config.validate()?;
        let graph = build_graph(&suite)?;

        let aggregator = Arc::new(ResultAggregator::new(&graph, suite.name.clone()));
        let core = CoreScheduler::new(graph, &config);
        let controller = ConcurrencyController::new(&config);

        Ok(Self {
            core,
            config,
            runner,
            aggregator,
            controller,
            run_token: CancellationToken::new(),
            progress: None,
            sampler: None,
        })
    }

    /// Token external callers may fire to cancel the run.
    pub fn cancel_token(&self) -> CancellationToken {
        self.run_token.clone()
    }

    /// Shared handle for live partial snapshots.
    pub fn aggregator(&self) -> Arc<ResultAggregator> {
        Arc::clone(&self.aggregator)
    }

    /// Attach a progress consumer. Backpressure follows the configured
    /// policy; without a subscriber no events are produced at all.
    pub fn subscribe_progress(&mut self) -> ProgressStream {
        let (reporter, stream) = progress::channel(
            self.config.progress_backpressure,
            self.config.progress_capacity,
        );
        self.progress = Some(reporter);
        stream
    }

    /// Replace the resource sampler (tests script their own load curves).
    pub fn with_sampler(mut self, sampler: Box<dyn ResourceSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Run the suite to completion.
    ///
    /// Always returns a complete report: a run that hits the global
    /// timeout or is cancelled yields TimedOut/Cancelled entries rather
    /// than an error.
    pub async fn run(mut self) -> Result<TestReport> {
        let started = Instant::now();
        let timeouts = TimeoutManager::new(&self.config, started);

        let slots = self.config.max_concurrency;
        let (completion_tx, mut completion_rx) = mpsc::channel::<Completion>(slots);
        let pool = WorkerPool::spawn(
            slots,
            Arc::clone(&self.runner),
            completion_tx,
            self.run_token.clone(),
            timeouts.grace(),
        );

        // Subscribe before the sampler starts so no limit change is missed.
        let mut limit_rx = self.controller.subscribe();
        let sampler = self
            .sampler
            .take()
            .unwrap_or_else(|| Box::new(SystemSampler::new()));
        let sampler_task = self.controller.spawn_adaptation(&self.config, sampler);

        let (retry_tx, mut retry_rx) = mpsc::channel::<usize>(16);

        info!(
            nodes = self.aggregator.snapshot().total,
            max_concurrency = slots,
            "orchestrator run started"
        );

        let step = self.core.start();
        self.apply(step, &pool, &timeouts, &retry_tx).await?;

        let global_deadline = timeouts.run_deadline();
        let mut deadline_armed = global_deadline.is_some();
        let mut cancel_armed = true;

        while !self.core.is_finished() {
            let event = tokio::select! {
                completion = completion_rx.recv() => {
                    match completion {
                        Some(c) => {
                            self.controller.release();
                            SchedulerEvent::NodeFinished {
                                index: c.index,
                                verdict: c.verdict,
                                duration: c.duration,
                            }
                        }
                        None => {
                            warn!("completion channel closed unexpectedly; cancelling run");
                            SchedulerEvent::CancelRequested
                        }
                    }
                }
                Some(index) = retry_rx.recv() => SchedulerEvent::RetryElapsed { index },
                changed = limit_rx.changed() => {
                    match changed {
                        Ok(()) => {
                            let limit = *limit_rx.borrow_and_update();
                            SchedulerEvent::LimitChanged { limit }
                        }
                        Err(_) => continue,
                    }
                }
                _ = self.run_token.cancelled(), if cancel_armed => {
                    cancel_armed = false;
                    deadline_armed = false;
                    SchedulerEvent::CancelRequested
                }
                _ = sleep_until_opt(global_deadline), if deadline_armed => {
                    deadline_armed = false;
                    cancel_armed = false;
                    SchedulerEvent::GlobalDeadline
                }
            };

            let step = self.core.step(event);
            self.apply(step, &pool, &timeouts, &retry_tx).await?;
        }

        sampler_task.abort();
        pool.shutdown();

        let classification = self.core.classification();
        let report = self.aggregator.finalize(classification);
        info!(
            ?classification,
            passed = report.counts.passed,
            failed = report.counts.failed,
            timed_out = report.counts.timed_out,
            cancelled = report.counts.cancelled,
            skipped = report.counts.skipped,
            wall_ms = report.wall_time.as_millis() as u64,
            "orchestrator run finished"
        );

        Ok(report)
    }

    /// Execute one step's commands and forward its status changes.
    async fn apply(
        &mut self,
        step: SchedulerStep,
        pool: &WorkerPool,
        timeouts: &TimeoutManager,
        retry_tx: &mpsc::Sender<usize>,
    ) -> Result<()> {
        for (ix, status) in &step.status_changes {
            if let Some(reporter) = &self.progress {
                reporter.emit(self.core.id_of(*ix), *status).await;
            }
        }

        for command in step.commands {
            match command {
                CoreCommand::Dispatch(nodes) => {
                    for ix in nodes {
                        self.controller.permit();
                        let case = Arc::clone(self.core.case_of(ix));
                        let deadline = timeouts.node_deadline(&case);
                        debug!(test = %case.id, "dispatching to worker pool");
                        pool.submit(Dispatch {
                            index: ix,
                            case,
                            token: self.run_token.child_token(),
                            deadline,
                        })
                        .await?;
                    }
                }
                CoreCommand::ScheduleRetry { index, delay } => {
                    let tx = retry_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(index).await;
                    });
                }
                CoreCommand::CancelRunning => {
                    debug!("cancelling all running nodes");
                    self.run_token.cancel();
                }
                CoreCommand::Record(result) => {
                    self.aggregator.record(result);
                }
            }
        }

        Ok(())
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
