#![allow(dead_code)]

use std::time::Duration;

use testdag::{ExecutionConfig, TestCase, TestSuite};

/// Builder for `TestSuite` to simplify test setup.
pub struct SuiteBuilder {
    suite: TestSuite,
}

impl SuiteBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            suite: TestSuite::new(name),
        }
    }

    pub fn with_case(mut self, case: TestCase) -> Self {
        self.suite.push(case);
        self
    }

    pub fn build(self) -> TestSuite {
        self.suite
    }
}

/// Builder for `TestCase`.
pub struct CaseBuilder {
    case: TestCase,
}

impl CaseBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            case: TestCase::new(id, format!("run {id}")),
        }
    }

    pub fn source(mut self, source: &str) -> Self {
        self.case.source = source.to_string();
        self
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.case.depends_on.push(dep.to_string());
        self
    }

    pub fn complexity(mut self, complexity: u32) -> Self {
        self.case.complexity = complexity;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.case.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> TestCase {
        self.case
    }
}

/// An `ExecutionConfig` tuned for fast deterministic tests: short timeouts,
/// no adaptive surprises (the sampler interval is long enough to never fire
/// within a test).
pub fn test_config(max_concurrency: usize) -> ExecutionConfig {
    ExecutionConfig {
        max_concurrency,
        min_concurrency: 1,
        per_test_timeout_default: Duration::from_secs(5),
        grace_period: Duration::from_millis(200),
        sample_interval: Duration::from_secs(3600),
        ..Default::default()
    }
}
