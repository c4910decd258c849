// src/sched/core.rs

//! Pure scheduler core.
//!
//! Owns the execution graph and all per-node run state. Consumes
//! [`SchedulerEvent`]s, produces [`SchedulerStep`]s. No channels, no Tokio
//! types, no IO; the async coordinator is responsible for all of that.
//!
//! Capacity authority: the ConcurrencyController sets the ceiling (fed in
//! as `LimitChanged` events); the core only picks which ready nodes fill
//! the available slots, highest complexity first, ties broken by suite
//! insertion order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ExecutionConfig;
use crate::graph::TestGraph;
use crate::pool::Verdict;
use crate::report::TestResult;
use crate::sched::step::SchedulerStep;
use crate::sched::{CoreCommand, SchedulerEvent};
use crate::types::{RetryPolicy, RunClassification, TestStatus};

/// Internal per-node run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    /// Waiting on dependencies.
    Pending,
    /// All dependencies passed; queued in the frontier.
    Ready,
    /// Dispatched to a worker.
    Running,
    /// Failed or timed out with retry budget left; waiting out the delay.
    AwaitingRetry,
    /// Terminal.
    Done(TestStatus),
}

/// Frontier entry ordered by complexity (descending), then suite insertion
/// order (ascending).
#[derive(Debug, PartialEq, Eq)]
struct FrontierEntry {
    complexity: u32,
    order: usize,
}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.complexity
            .cmp(&other.complexity)
            .then_with(|| other.order.cmp(&self.order))
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
pub struct CoreScheduler {
    graph: TestGraph,
    states: Vec<NodeState>,
    /// Unsatisfied dependency count per node; decremented as deps pass.
    unmet: Vec<usize>,
    /// Completed execution attempts per node.
    attempts: Vec<u32>,
    frontier: BinaryHeap<FrontierEntry>,
    limit: usize,
    running: usize,
    terminal: usize,
    retry: RetryPolicy,
    skip_on_dep_failure: bool,
    /// Set once the run is being torn down early, with the classification
    /// the report will carry.
    draining: Option<RunClassification>,
}

impl CoreScheduler {
    pub fn new(graph: TestGraph, config: &ExecutionConfig) -> Self {
        let n = graph.len();
        let mut states = vec![NodeState::Pending; n];
        let unmet: Vec<usize> = graph.indices().map(|ix| graph.deps_of(ix).len()).collect();
        let mut frontier = BinaryHeap::new();

        for ix in graph.indices() {
            if unmet[ix] == 0 {
                states[ix] = NodeState::Ready;
                frontier.push(FrontierEntry {
                    complexity: graph.case(ix).complexity,
                    order: ix,
                });
            }
        }

        Self {
            graph,
            states,
            unmet,
            attempts: vec![0; n],
            frontier,
            limit: config.max_concurrency,
            running: 0,
            terminal: 0,
            retry: config.retry_policy,
            skip_on_dep_failure: config.skip_on_dependency_failure,
            draining: None,
        }
    }

    /// Begin the run: report the initial frontier and fill the first slots.
    /// Call once, before any [`step`](Self::step).
    pub fn start(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        for ix in 0..self.states.len() {
            if self.states[ix] == NodeState::Ready {
                step.status_changes.push((ix, TestStatus::Ready));
            }
        }
        self.fill_slots(&mut step);
        self.seal(step)
    }

    /// Handle a single event.
    pub fn step(&mut self, event: SchedulerEvent) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        match event {
            SchedulerEvent::NodeFinished {
                index,
                verdict,
                duration,
            } => self.on_node_finished(index, verdict, duration, &mut step),
            SchedulerEvent::RetryElapsed { index } => self.on_retry_elapsed(index, &mut step),
            SchedulerEvent::LimitChanged { limit } => {
                debug!(limit, "scheduler observed new concurrency ceiling");
                self.limit = limit;
            }
            SchedulerEvent::CancelRequested => {
                self.begin_drain(RunClassification::Cancelled, &mut step)
            }
            SchedulerEvent::GlobalDeadline => {
                self.begin_drain(RunClassification::TimedOut, &mut step)
            }
        }

        self.fill_slots(&mut step);
        self.seal(step)
    }

    pub fn is_finished(&self) -> bool {
        self.terminal == self.graph.len()
    }

    /// Overall classification for the final report.
    pub fn classification(&self) -> RunClassification {
        self.draining.unwrap_or(RunClassification::Completed)
    }

    pub fn id_of(&self, ix: usize) -> &str {
        self.graph.id(ix)
    }

    pub fn case_of(&self, ix: usize) -> &std::sync::Arc<crate::suite::TestCase> {
        self.graph.case(ix)
    }

    /// Public view of a node's status (retry waits surface as Ready).
    pub fn status_of(&self, ix: usize) -> TestStatus {
        match self.states[ix] {
            NodeState::Pending => TestStatus::Pending,
            NodeState::Ready | NodeState::AwaitingRetry => TestStatus::Ready,
            NodeState::Running => TestStatus::Running,
            NodeState::Done(status) => status,
        }
    }

    pub fn running_count(&self) -> usize {
        self.running
    }

    fn seal(&self, mut step: SchedulerStep) -> SchedulerStep {
        step.finished = self.is_finished();
        step
    }

    /// Dispatch ready nodes while slots are available under the ceiling.
    fn fill_slots(&mut self, step: &mut SchedulerStep) {
        if self.draining.is_some() {
            return;
        }

        let mut dispatch = Vec::new();
        while self.running < self.limit {
            let Some(entry) = self.frontier.pop() else { break };
            let ix = entry.order;
            // Entries for nodes terminated while queued are stale.
            if self.states[ix] != NodeState::Ready {
                continue;
            }
            self.states[ix] = NodeState::Running;
            self.running += 1;
            step.status_changes.push((ix, TestStatus::Running));
            dispatch.push(ix);
        }

        if !dispatch.is_empty() {
            step.commands.push(CoreCommand::Dispatch(dispatch));
        }
    }

    fn on_node_finished(
        &mut self,
        ix: usize,
        verdict: Verdict,
        duration: Duration,
        step: &mut SchedulerStep,
    ) {
        if self.states[ix] != NodeState::Running {
            warn!(
                test = %self.graph.id(ix),
                state = ?self.states[ix],
                "completion for node that is not running; ignoring"
            );
            return;
        }

        self.running -= 1;
        self.attempts[ix] += 1;
        let result = self.interpret(ix, verdict, duration);

        let retryable = matches!(result.status, TestStatus::Failed | TestStatus::TimedOut);
        if self.draining.is_none() && retryable && self.attempts[ix] <= self.retry.budget() {
            let delay = self.retry.delay(self.attempts[ix]);
            debug!(
                test = %self.graph.id(ix),
                attempt = self.attempts[ix],
                delay_ms = delay.as_millis() as u64,
                "attempt failed; scheduling retry"
            );
            self.states[ix] = NodeState::AwaitingRetry;
            step.commands
                .push(CoreCommand::ScheduleRetry { index: ix, delay });
            return;
        }

        self.finish(ix, result, step);
    }

    fn on_retry_elapsed(&mut self, ix: usize, step: &mut SchedulerStep) {
        if self.states[ix] != NodeState::AwaitingRetry {
            // The run may have been cancelled while the delay was pending.
            debug!(test = %self.graph.id(ix), "stale retry timer; ignoring");
            return;
        }
        self.states[ix] = NodeState::Ready;
        step.status_changes.push((ix, TestStatus::Ready));
        self.frontier.push(FrontierEntry {
            complexity: self.graph.case(ix).complexity,
            order: ix,
        });
    }

    /// Convert a worker verdict into a terminal result, applying the drain
    /// relabelling rules: a verdict that raced the teardown is recorded
    /// TimedOut after the run deadline and Cancelled after an external
    /// cancel, while genuinely finished executions keep their real status.
    fn interpret(&self, ix: usize, verdict: Verdict, duration: Duration) -> TestResult {
        let id = self.graph.id(ix).to_string();
        match verdict {
            Verdict::Finished(out) => {
                let status = if out.success() {
                    TestStatus::Passed
                } else {
                    TestStatus::Failed
                };
                let diagnostic =
                    (!out.success()).then(|| format!("exit status {}", out.exit_status));
                TestResult {
                    id,
                    status,
                    duration,
                    diagnostic,
                    stdout: out.stdout,
                    stderr: out.stderr,
                }
            }
            Verdict::Panicked(msg) => TestResult {
                id,
                status: TestStatus::Failed,
                duration,
                diagnostic: Some(format!("runner panicked: {msg}")),
                stdout: String::new(),
                stderr: String::new(),
            },
            Verdict::TimedOut {
                cooperative,
                partial,
            } => {
                let diagnostic = if cooperative {
                    "per-test deadline exceeded".to_string()
                } else {
                    "per-test deadline exceeded; runner forcefully reclaimed".to_string()
                };
                let (stdout, stderr) = split_partial(partial);
                TestResult {
                    id,
                    status: TestStatus::TimedOut,
                    duration,
                    diagnostic: Some(diagnostic),
                    stdout,
                    stderr,
                }
            }
            Verdict::Cancelled { partial } => {
                let (status, diagnostic) = match self.draining {
                    Some(RunClassification::TimedOut) => (
                        TestStatus::TimedOut,
                        "run deadline exceeded while executing".to_string(),
                    ),
                    _ => (
                        TestStatus::Cancelled,
                        "run cancelled while executing".to_string(),
                    ),
                };
                let (stdout, stderr) = split_partial(partial);
                TestResult {
                    id,
                    status,
                    duration,
                    diagnostic: Some(diagnostic),
                    stdout,
                    stderr,
                }
            }
        }
    }

    /// Seal a node's terminal status and react: passed nodes release their
    /// dependents, failed ones doom theirs.
    fn finish(&mut self, ix: usize, result: TestResult, step: &mut SchedulerStep) {
        let status = result.status;
        self.states[ix] = NodeState::Done(status);
        self.terminal += 1;
        step.status_changes.push((ix, status));
        step.commands.push(CoreCommand::Record(result));

        match status {
            TestStatus::Passed => self.release_dependents(ix, step),
            TestStatus::Failed | TestStatus::TimedOut | TestStatus::Cancelled => {
                // During a drain every undispatched node is already terminal.
                if self.draining.is_none() {
                    self.propagate_failure(ix, status, step);
                }
            }
            _ => {}
        }
    }

    /// A dependency passed: move dependents with no remaining unmet
    /// dependencies into the frontier.
    fn release_dependents(&mut self, ix: usize, step: &mut SchedulerStep) {
        for dep_ix in self.graph.dependents_of(ix).to_vec() {
            if self.states[dep_ix] != NodeState::Pending {
                continue;
            }
            self.unmet[dep_ix] -= 1;
            if self.unmet[dep_ix] == 0 {
                self.states[dep_ix] = NodeState::Ready;
                step.status_changes.push((dep_ix, TestStatus::Ready));
                self.frontier.push(FrontierEntry {
                    complexity: self.graph.case(dep_ix).complexity,
                    order: dep_ix,
                });
            }
        }
    }

    /// A node failed terminally: every transitive dependent that has not
    /// been dispatched is marked Skipped (skip policy) or Failed (strict
    /// policy) without ever reaching a worker.
    fn propagate_failure(&mut self, root: usize, root_status: TestStatus, step: &mut SchedulerStep) {
        let root_id = self.graph.id(root).to_string();
        let mut stack: Vec<usize> = self.graph.dependents_of(root).to_vec();

        while let Some(ix) = stack.pop() {
            if self.states[ix] != NodeState::Pending {
                continue;
            }

            let (status, diagnostic) = if self.skip_on_dep_failure {
                (
                    TestStatus::Skipped,
                    format!(
                        "skipped: dependency '{root_id}' {}",
                        status_word(root_status)
                    ),
                )
            } else {
                (
                    TestStatus::Failed,
                    format!("blocked by failed dependency '{root_id}'"),
                )
            };

            debug!(
                test = %self.graph.id(ix),
                dependency = %root_id,
                ?status,
                "dependency failed terminally; sealing dependent without dispatch"
            );

            let result = TestResult::unexecuted(self.graph.id(ix), status, diagnostic);
            self.states[ix] = NodeState::Done(status);
            self.terminal += 1;
            step.status_changes.push((ix, status));
            step.commands.push(CoreCommand::Record(result));

            stack.extend_from_slice(self.graph.dependents_of(ix));
        }
    }

    /// Early teardown: cancel the run token (escalating every Running node
    /// through the timeout ladder) and seal every undispatched node as
    /// Cancelled immediately.
    fn begin_drain(&mut self, classification: RunClassification, step: &mut SchedulerStep) {
        if self.draining.is_some() {
            return;
        }
        self.draining = Some(classification);
        debug!(?classification, "tearing the run down early");

        step.commands.push(CoreCommand::CancelRunning);

        let reason = match classification {
            RunClassification::TimedOut => "cancelled: run deadline exceeded",
            _ => "cancelled before dispatch",
        };

        for ix in 0..self.states.len() {
            if matches!(
                self.states[ix],
                NodeState::Pending | NodeState::Ready | NodeState::AwaitingRetry
            ) {
                let result = TestResult::unexecuted(
                    self.graph.id(ix),
                    TestStatus::Cancelled,
                    reason.to_string(),
                );
                self.states[ix] = NodeState::Done(TestStatus::Cancelled);
                self.terminal += 1;
                step.status_changes.push((ix, TestStatus::Cancelled));
                step.commands.push(CoreCommand::Record(result));
            }
        }

        self.frontier.clear();
    }
}

fn split_partial(partial: Option<crate::pool::RawOutcome>) -> (String, String) {
    match partial {
        Some(out) => (out.stdout, out.stderr),
        None => (String::new(), String::new()),
    }
}

fn status_word(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Failed => "failed",
        TestStatus::TimedOut => "timed out",
        TestStatus::Cancelled => "was cancelled",
        TestStatus::Skipped => "was skipped",
        _ => "did not pass",
    }
}
