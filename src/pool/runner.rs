// src/pool/runner.rs

//! The `TestRunner` capability and the bundled subprocess implementation.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::suite::TestCase;

/// Raw outcome of one runner invocation.
#[derive(Debug, Clone)]
pub struct RawOutcome {
    pub stdout: String,
    pub stderr: String,
    /// Process-style exit status; zero means success.
    pub exit_status: i32,
    pub duration: Duration,
}

impl RawOutcome {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

pub type RunnerFuture = Pin<Box<dyn Future<Output = RawOutcome> + Send + 'static>>;

/// Capability interface for executing a single test case.
///
/// Anything implementing this trait qualifies as a runner; there is no
/// inheritance hierarchy. Implementations are expected to observe the
/// cancellation token promptly; non-cooperative runners are forcefully
/// reclaimed after the grace period.
pub trait TestRunner: Send + Sync + 'static {
    fn execute(&self, case: Arc<TestCase>, token: CancellationToken) -> RunnerFuture;
}

/// Runner that executes `case.source` as a shell command.
///
/// Stdout/stderr are captured in full; on cancellation the child process is
/// killed and whatever output was collected so far is returned.
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRunner for ProcessRunner {
    fn execute(&self, case: Arc<TestCase>, token: CancellationToken) -> RunnerFuture {
        Box::pin(async move {
            let started = Instant::now();
            match run_process(&case, &token).await {
                Ok((stdout, stderr, exit_status)) => RawOutcome {
                    stdout,
                    stderr,
                    exit_status,
                    duration: started.elapsed(),
                },
                Err(err) => {
                    warn!(test = %case.id, error = %err, "test process error");
                    RawOutcome {
                        stdout: String::new(),
                        stderr: err.to_string(),
                        exit_status: -1,
                        duration: started.elapsed(),
                    }
                }
            }
        })
    }
}

async fn run_process(
    case: &TestCase,
    token: &CancellationToken,
) -> anyhow::Result<(String, String, i32)> {
    debug!(test = %case.id, source = %case.source, "starting test process");

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&case.source);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&case.source);
        c
    };

    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for test '{}'", case.id))?;

    // Collect output concurrently so pipe buffers never fill up.
    let stdout_task = child.stdout.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf).await;
            buf
        })
    });
    let stderr_task = child.stderr.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf).await;
            buf
        })
    });

    let status = tokio::select! {
        status = child.wait() => {
            status.with_context(|| format!("waiting for process of test '{}'", case.id))?
        }
        _ = token.cancelled() => {
            debug!(test = %case.id, "cancellation requested; killing test process");
            if let Err(err) = child.kill().await {
                warn!(test = %case.id, error = %err, "failed to kill test process");
            }
            child
                .wait()
                .await
                .with_context(|| format!("reaping cancelled process of test '{}'", case.id))?
        }
    };

    let stdout = collect(stdout_task).await;
    let stderr = collect(stderr_task).await;
    let code = status.code().unwrap_or(-1);

    debug!(test = %case.id, exit_code = code, "test process exited");
    Ok((stdout, stderr, code))
}

async fn collect(task: Option<tokio::task::JoinHandle<Vec<u8>>>) -> String {
    match task {
        Some(handle) => match handle.await {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => String::new(),
        },
        None => String::new(),
    }
}
