// tests/timeout_behaviour.rs

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use testdag::{ExecutionConfig, Orchestrator, RunClassification, TestStatus, run_suite};
use testdag_test_utils::builders::{CaseBuilder, SuiteBuilder, test_config};
use testdag_test_utils::fake_runner::{FakeBehaviour, FakeRunner};
use testdag_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn unresponsive_runner_is_timed_out_promptly() -> TestResult {
    with_timeout(async {
        init_tracing();

        let suite = SuiteBuilder::new("hang")
            .with_case(
                CaseBuilder::new("stuck")
                    .timeout(Duration::from_millis(100))
                    .build(),
            )
            .build();

        let runner = FakeRunner::new().script("stuck", FakeBehaviour::Hang);
        let started = Instant::now();

        let report = run_suite(suite, test_config(1), Arc::new(runner)).await?;
        let elapsed = started.elapsed();

        let stuck = report.results.iter().find(|r| r.id == "stuck").unwrap();
        assert_eq!(stuck.status, TestStatus::TimedOut);
        let diag = stuck.diagnostic.clone().unwrap_or_default();
        assert!(diag.contains("forcefully"), "got: {diag}");

        // Deadline 100ms + grace 200ms, with generous slack for CI.
        assert!(
            elapsed < Duration::from_secs(3),
            "took {elapsed:?} to reclaim a hung runner"
        );

        // The run as a whole completed normally.
        assert_eq!(report.classification, RunClassification::Completed);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn cooperative_runner_times_out_without_force() -> TestResult {
    with_timeout(async {
        init_tracing();

        let suite = SuiteBuilder::new("coop")
            .with_case(
                CaseBuilder::new("polite")
                    .timeout(Duration::from_millis(100))
                    .build(),
            )
            .build();

        let runner = FakeRunner::new().script("polite", FakeBehaviour::BlockUntilCancelled);

        let report = run_suite(suite, test_config(1), Arc::new(runner)).await?;

        let polite = report.results.iter().find(|r| r.id == "polite").unwrap();
        assert_eq!(polite.status, TestStatus::TimedOut);
        let diag = polite.diagnostic.clone().unwrap_or_default();
        assert!(!diag.contains("forcefully"), "got: {diag}");

        Ok(())
    })
    .await
}

#[tokio::test]
async fn global_deadline_times_out_running_and_cancels_pending() -> TestResult {
    with_timeout(async {
        init_tracing();

        // A runs past the global deadline; B never gets dispatched.
        let suite = SuiteBuilder::new("global")
            .with_case(CaseBuilder::new("A").build())
            .with_case(CaseBuilder::new("B").depends_on("A").build())
            .build();

        let runner = FakeRunner::new().script("A", FakeBehaviour::BlockUntilCancelled);
        let config = ExecutionConfig {
            global_timeout: Some(Duration::from_millis(200)),
            ..test_config(2)
        };

        let report = run_suite(suite, config, Arc::new(runner)).await?;

        assert_eq!(report.classification, RunClassification::TimedOut);
        assert_eq!(report.results.len(), 2);

        let a = report.results.iter().find(|r| r.id == "A").unwrap();
        let b = report.results.iter().find(|r| r.id == "B").unwrap();
        assert_eq!(a.status, TestStatus::TimedOut);
        assert_eq!(b.status, TestStatus::Cancelled);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn external_cancellation_ends_the_run_with_a_complete_report() -> TestResult {
    with_timeout(async {
        init_tracing();

        let suite = SuiteBuilder::new("cancel")
            .with_case(CaseBuilder::new("running").build())
            .with_case(CaseBuilder::new("queued").depends_on("running").build())
            .build();

        let runner = FakeRunner::new().script("running", FakeBehaviour::BlockUntilCancelled);
        let orchestrator = Orchestrator::new(suite, test_config(1), Arc::new(runner))?;

        let token = orchestrator.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });

        let report = orchestrator.run().await?;

        assert_eq!(report.classification, RunClassification::Cancelled);
        let running = report.results.iter().find(|r| r.id == "running").unwrap();
        let queued = report.results.iter().find(|r| r.id == "queued").unwrap();
        assert_eq!(running.status, TestStatus::Cancelled);
        assert_eq!(queued.status, TestStatus::Cancelled);

        Ok(())
    })
    .await
}
