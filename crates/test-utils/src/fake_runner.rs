use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use testdag::limit::{ResourceSampler, ResourceSnapshot};
use testdag::pool::{RawOutcome, RunnerFuture, TestRunner};
use testdag::suite::TestCase;

/// Scripted behaviour for one test id.
#[derive(Debug, Clone)]
pub enum FakeBehaviour {
    Pass { delay: Duration },
    Fail { exit: i32 },
    Panic,
    /// Ignores the cancellation token entirely (exercises forceful
    /// reclamation).
    Hang,
    /// Waits for the cancellation token, then returns non-zero (exercises
    /// cooperative cancellation).
    BlockUntilCancelled,
    /// Fails the first `failures` attempts, then passes.
    FlakyThenPass { failures: u32 },
}

/// A fake runner that:
/// - records which tests were executed (and how often)
/// - resolves each execution according to its scripted behaviour.
///
/// Unscripted tests pass immediately.
pub struct FakeRunner {
    scripts: HashMap<String, FakeBehaviour>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn script(mut self, id: &str, behaviour: FakeBehaviour) -> Self {
        self.scripts.insert(id.to_string(), behaviour);
        self
    }

    /// Handle onto the execution log; grab it before moving the runner into
    /// an `Arc<dyn TestRunner>`.
    pub fn executed_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.executed)
    }
}

impl Default for FakeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRunner for FakeRunner {
    fn execute(&self, case: Arc<TestCase>, token: CancellationToken) -> RunnerFuture {
        let attempt = {
            let mut log = self.executed.lock().unwrap();
            log.push(case.id.clone());
            log.iter().filter(|id| **id == case.id).count() as u32
        };

        let behaviour = self
            .scripts
            .get(&case.id)
            .cloned()
            .unwrap_or(FakeBehaviour::Pass {
                delay: Duration::ZERO,
            });

        Box::pin(async move {
            match behaviour {
                FakeBehaviour::Pass { delay } => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    outcome(0, "ok")
                }
                FakeBehaviour::Fail { exit } => outcome(exit, ""),
                FakeBehaviour::Panic => panic!("scripted panic in {}", case.id),
                FakeBehaviour::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                FakeBehaviour::BlockUntilCancelled => {
                    token.cancelled().await;
                    outcome(-1, "")
                }
                FakeBehaviour::FlakyThenPass { failures } => {
                    if attempt <= failures {
                        outcome(1, "")
                    } else {
                        outcome(0, "ok")
                    }
                }
            }
        })
    }
}

fn outcome(exit_status: i32, stdout: &str) -> RawOutcome {
    RawOutcome {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_status,
        duration: Duration::ZERO,
    }
}

/// Sampler reporting a constant host load; keeps adaptive-control tests
/// independent of the machine they run on.
pub struct SteadyLoad {
    pub cpu: f32,
    pub memory: f32,
}

impl ResourceSampler for SteadyLoad {
    fn sample(&mut self, active_workers: usize) -> anyhow::Result<ResourceSnapshot> {
        Ok(ResourceSnapshot {
            cpu: self.cpu,
            memory: self.memory,
            active_workers,
        })
    }
}
