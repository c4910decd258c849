// src/pool/mod.rs

//! Bounded worker pool.
//!
//! A fixed number of worker tasks share one dispatch queue; a freed slot
//! immediately pulls the next dispatched node, so execution contexts are
//! reused rather than created per node. Each runner invocation is spawned
//! on its own task so panics are contained into a Failed-style verdict and
//! can never take down the pool or other in-flight executions.

pub mod runner;

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::Result;
use crate::suite::TestCase;
use crate::timeout;

pub use runner::{ProcessRunner, RawOutcome, RunnerFuture, TestRunner};

/// A node handed to the pool for execution.
#[derive(Debug)]
pub struct Dispatch {
    /// Arena index of the node in the execution graph.
    pub index: usize,
    pub case: Arc<TestCase>,
    /// Per-node cancellation token (child of the run token).
    pub token: CancellationToken,
    pub deadline: Instant,
}

/// How a single execution ended, before scheduler interpretation.
#[derive(Debug)]
pub enum Verdict {
    /// The runner returned; `exit_status` decides pass/fail.
    Finished(RawOutcome),
    /// The runner panicked; contained, with the panic payload.
    Panicked(String),
    /// The per-node deadline fired. `cooperative` records whether the
    /// runner honoured the cancellation token within the grace period.
    TimedOut {
        cooperative: bool,
        partial: Option<RawOutcome>,
    },
    /// The run was cancelled while this node was executing.
    Cancelled { partial: Option<RawOutcome> },
}

/// Terminal message sent back to the coordinator for each execution.
#[derive(Debug)]
pub struct Completion {
    pub index: usize,
    pub verdict: Verdict,
    pub duration: Duration,
}

/// Fixed-size pool of execution slots.
pub struct WorkerPool {
    dispatch_tx: mpsc::Sender<Dispatch>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `slots` workers feeding completions into `completion_tx`.
    pub fn spawn(
        slots: usize,
        runner: Arc<dyn TestRunner>,
        completion_tx: mpsc::Sender<Completion>,
        run_token: CancellationToken,
        grace: Duration,
    ) -> Self {
        let slots = slots.max(1);
        let (dispatch_tx, dispatch_rx) = mpsc::channel::<Dispatch>(slots);
        let dispatch_rx = Arc::new(Mutex::new(dispatch_rx));

        let workers = (0..slots)
            .map(|slot| {
                let rx = Arc::clone(&dispatch_rx);
                let runner = Arc::clone(&runner);
                let tx = completion_tx.clone();
                let run_token = run_token.clone();
                tokio::spawn(worker_loop(slot, rx, runner, tx, run_token, grace))
            })
            .collect();

        Self {
            dispatch_tx,
            workers,
        }
    }

    /// Hand a node to the next free slot.
    pub async fn submit(&self, dispatch: Dispatch) -> Result<()> {
        self.dispatch_tx
            .send(dispatch)
            .await
            .map_err(|_| anyhow!("worker pool is shut down").into())
    }

    /// Tear the pool down. Idle workers exit when the dispatch channel
    /// closes; this also aborts any straggler still supervising a runner.
    pub fn shutdown(self) {
        drop(self.dispatch_tx);
        for worker in self.workers {
            worker.abort();
        }
    }
}

async fn worker_loop(
    slot: usize,
    dispatch_rx: Arc<Mutex<mpsc::Receiver<Dispatch>>>,
    runner: Arc<dyn TestRunner>,
    completion_tx: mpsc::Sender<Completion>,
    run_token: CancellationToken,
    grace: Duration,
) {
    debug!(slot, "worker slot started");

    loop {
        // Hold the queue lock only while pulling the next dispatch.
        let dispatch = {
            let mut rx = dispatch_rx.lock().await;
            rx.recv().await
        };
        let Some(dispatch) = dispatch else { break };

        let completion = execute_one(dispatch, &runner, &run_token, grace).await;
        if completion_tx.send(completion).await.is_err() {
            break;
        }
    }

    debug!(slot, "worker slot finished");
}

/// Run one node to a verdict, containing panics and enforcing deadlines.
async fn execute_one(
    dispatch: Dispatch,
    runner: &Arc<dyn TestRunner>,
    run_token: &CancellationToken,
    grace: Duration,
) -> Completion {
    let started = Instant::now();

    let future = runner.execute(Arc::clone(&dispatch.case), dispatch.token.clone());
    let mut handle = tokio::spawn(future);

    let verdict = timeout::escalate(
        &mut handle,
        dispatch.deadline,
        grace,
        &dispatch.token,
        run_token,
    )
    .await;

    Completion {
        index: dispatch.index,
        verdict,
        duration: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRunner {
        calls: Arc<AtomicUsize>,
        panic_on: Option<String>,
    }

    impl TestRunner for CountingRunner {
        fn execute(&self, case: Arc<TestCase>, _token: CancellationToken) -> RunnerFuture {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let panic_on = self.panic_on.clone();
            Box::pin(async move {
                if panic_on.as_deref() == Some(case.id.as_str()) {
                    panic!("scripted panic in {}", case.id);
                }
                RawOutcome {
                    stdout: format!("ran {}", case.id),
                    stderr: String::new(),
                    exit_status: 0,
                    duration: Duration::ZERO,
                }
            })
        }
    }

    fn dispatch(index: usize, id: &str) -> Dispatch {
        Dispatch {
            index,
            case: Arc::new(TestCase::new(id, "noop")),
            token: CancellationToken::new(),
            deadline: Instant::now() + Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn slots_are_reused_across_dispatches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = Arc::new(CountingRunner {
            calls: Arc::clone(&calls),
            panic_on: None,
        });
        let (tx, mut rx) = mpsc::channel(8);
        let pool = WorkerPool::spawn(1, runner, tx, CancellationToken::new(), Duration::from_secs(1));

        for i in 0..4 {
            pool.submit(dispatch(i, &format!("t{i}"))).await.unwrap();
        }

        for _ in 0..4 {
            let completion = rx.recv().await.expect("completion");
            assert!(matches!(completion.verdict, Verdict::Finished(_)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        pool.shutdown();
    }

    #[tokio::test]
    async fn panic_in_one_execution_does_not_poison_the_pool() {
        let runner = Arc::new(CountingRunner {
            calls: Arc::new(AtomicUsize::new(0)),
            panic_on: Some("bad".to_string()),
        });
        let (tx, mut rx) = mpsc::channel(8);
        let pool = WorkerPool::spawn(1, runner, tx, CancellationToken::new(), Duration::from_secs(1));

        pool.submit(dispatch(0, "bad")).await.unwrap();
        pool.submit(dispatch(1, "good")).await.unwrap();

        let first = rx.recv().await.expect("panic completion");
        assert!(matches!(first.verdict, Verdict::Panicked(msg) if msg.contains("bad")));

        let second = rx.recv().await.expect("pool survived");
        assert!(matches!(second.verdict, Verdict::Finished(_)));
        pool.shutdown();
    }
}
