// src/sched/step.rs

//! Result type for a single scheduler core step.

use crate::sched::CoreCommand;
use crate::types::TestStatus;

/// Structured result of one core step.
///
/// Tests step the core manually and assert on these fields; the coordinator
/// executes the commands and forwards the status changes to the progress
/// reporter.
#[derive(Debug, Default)]
pub struct SchedulerStep {
    /// Commands for the IO shell, in order.
    pub commands: Vec<CoreCommand>,
    /// Every `(node index, new status)` transition this step caused.
    pub status_changes: Vec<(usize, TestStatus)>,
    /// Whether this step brought the run to completion (every node
    /// terminal).
    pub finished: bool,
}

impl SchedulerStep {
    /// Node indices dispatched in this step, flattened across commands.
    pub fn dispatched(&self) -> Vec<usize> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                CoreCommand::Dispatch(nodes) => Some(nodes.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }
}
