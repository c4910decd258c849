//! Input descriptors consumed by the orchestrator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::NodeId;

/// A single test descriptor.
///
/// The orchestrator never interprets `source` itself; it is handed verbatim
/// to the [`TestRunner`](crate::pool::TestRunner) capability (for the
/// bundled process runner it is a shell command).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: NodeId,
    pub source: String,
    /// Estimated complexity/duration hint; higher values are dispatched
    /// first among ready nodes.
    #[serde(default)]
    pub complexity: u32,
    /// Ids of tests that must pass before this one may run.
    #[serde(default)]
    pub depends_on: Vec<NodeId>,
    /// Per-test timeout override; falls back to
    /// `ExecutionConfig::per_test_timeout_default`.
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl TestCase {
    pub fn new(id: impl Into<NodeId>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            complexity: 0,
            depends_on: Vec::new(),
            timeout: None,
        }
    }
}

/// Ordered collection of test cases. Insertion order breaks dispatch ties
/// between nodes of equal complexity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuite {
    pub name: String,
    pub cases: Vec<TestCase>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
        }
    }

    pub fn push(&mut self, case: TestCase) {
        self.cases.push(case);
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}
