// tests/process_runner.rs

//! End-to-end tests against the real subprocess runner.

#![cfg(unix)]

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use testdag::{ProcessRunner, RunClassification, TestStatus, run_suite};
use testdag_test_utils::builders::{CaseBuilder, SuiteBuilder, test_config};
use testdag_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn shell_commands_pass_and_fail_by_exit_status() -> TestResult {
    with_timeout(async {
        init_tracing();

        let suite = SuiteBuilder::new("shell")
            .with_case(CaseBuilder::new("ok").source("echo hello").build())
            .with_case(CaseBuilder::new("bad").source("echo oops >&2; exit 3").build())
            .build();

        let report = run_suite(suite, test_config(2), Arc::new(ProcessRunner::new())).await?;

        assert_eq!(report.classification, RunClassification::Completed);

        let ok = report.results.iter().find(|r| r.id == "ok").unwrap();
        assert_eq!(ok.status, TestStatus::Passed);
        assert!(ok.stdout.contains("hello"), "got: {:?}", ok.stdout);

        let bad = report.results.iter().find(|r| r.id == "bad").unwrap();
        assert_eq!(bad.status, TestStatus::Failed);
        assert!(bad.stderr.contains("oops"), "got: {:?}", bad.stderr);
        let diag = bad.diagnostic.clone().unwrap_or_default();
        assert!(diag.contains('3'), "got: {diag}");

        Ok(())
    })
    .await
}

#[tokio::test]
async fn sleeping_process_is_killed_on_timeout() -> TestResult {
    with_timeout(async {
        init_tracing();

        let suite = SuiteBuilder::new("sleeper")
            .with_case(
                CaseBuilder::new("sleeper")
                    .source("sleep 30")
                    .timeout(Duration::from_millis(100))
                    .build(),
            )
            .build();

        let report = run_suite(suite, test_config(1), Arc::new(ProcessRunner::new())).await?;

        let sleeper = report.results.iter().find(|r| r.id == "sleeper").unwrap();
        assert_eq!(sleeper.status, TestStatus::TimedOut);

        Ok(())
    })
    .await
}
