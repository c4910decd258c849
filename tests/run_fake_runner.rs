// tests/run_fake_runner.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use testdag::{Orchestrator, RunClassification, TestStatus, run_suite};
use testdag_test_utils::builders::{CaseBuilder, SuiteBuilder, test_config};
use testdag_test_utils::fake_runner::{FakeBehaviour, FakeRunner};
use testdag_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn independent_roots_run_first_and_dependent_waits() -> TestResult {
    with_timeout(async {
        init_tracing();

        // A and C are both ready at the start; B may only run after A passes.
        let suite = SuiteBuilder::new("roots")
            .with_case(CaseBuilder::new("A").complexity(5).build())
            .with_case(CaseBuilder::new("B").depends_on("A").build())
            .with_case(CaseBuilder::new("C").complexity(1).build())
            .build();

        let runner = FakeRunner::new().script(
            "A",
            FakeBehaviour::Pass {
                delay: Duration::from_millis(20),
            },
        );
        let executed = runner.executed_handle();

        let report = run_suite(suite, test_config(2), Arc::new(runner)).await?;

        assert_eq!(report.classification, RunClassification::Completed);
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.counts.passed, 3);

        let log = executed.lock().unwrap().clone();
        assert_eq!(log.len(), 3);
        // First wave is {A, C}; B is dispatched strictly after A passes.
        assert!(log[..2].contains(&"A".to_string()), "got: {log:?}");
        assert!(log[..2].contains(&"C".to_string()), "got: {log:?}");
        assert_eq!(log[2], "B");

        Ok(())
    })
    .await
}

#[tokio::test]
async fn complexity_orders_the_first_wave() -> TestResult {
    with_timeout(async {
        init_tracing();

        let suite = SuiteBuilder::new("ordering")
            .with_case(CaseBuilder::new("small").complexity(1).build())
            .with_case(CaseBuilder::new("large").complexity(10).build())
            .with_case(CaseBuilder::new("medium").complexity(5).build())
            .build();

        // One slot forces fully sequential execution in frontier order.
        let runner = FakeRunner::new();
        let executed = runner.executed_handle();

        let report = run_suite(suite, test_config(1), Arc::new(runner)).await?;

        assert_eq!(report.counts.passed, 3);
        let log = executed.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![
                "large".to_string(),
                "medium".to_string(),
                "small".to_string()
            ]
        );

        Ok(())
    })
    .await
}

#[tokio::test]
async fn report_keeps_suite_order_regardless_of_completion_order() -> TestResult {
    with_timeout(async {
        init_tracing();

        let suite = SuiteBuilder::new("order")
            .with_case(
                CaseBuilder::new("slow")
                    .complexity(9)
                    .build(),
            )
            .with_case(CaseBuilder::new("fast").build())
            .build();

        let runner = FakeRunner::new().script(
            "slow",
            FakeBehaviour::Pass {
                delay: Duration::from_millis(50),
            },
        );

        let report = run_suite(suite, test_config(2), Arc::new(runner)).await?;

        let ids: Vec<&str> = report.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["slow", "fast"]);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn progress_stream_reports_lifecycle_events() -> TestResult {
    with_timeout(async {
        init_tracing();

        let suite = SuiteBuilder::new("progress")
            .with_case(CaseBuilder::new("A").build())
            .with_case(CaseBuilder::new("B").depends_on("A").build())
            .build();

        let mut orchestrator =
            Orchestrator::new(suite, test_config(1), Arc::new(FakeRunner::new()))?;
        let mut stream = orchestrator.subscribe_progress();

        let consumer = tokio::spawn(async move {
            let mut events = Vec::new();
            while let Some(update) = stream.recv().await {
                events.push((update.id, update.status));
            }
            events
        });

        let report = orchestrator.run().await?;
        assert_eq!(report.counts.passed, 2);

        let events = consumer.await?;
        let a_events: Vec<TestStatus> = events
            .iter()
            .filter(|(id, _)| id == "A")
            .map(|(_, s)| *s)
            .collect();
        assert_eq!(
            a_events,
            vec![TestStatus::Ready, TestStatus::Running, TestStatus::Passed]
        );

        // B becomes ready only after A passed.
        let a_passed_at = events
            .iter()
            .position(|(id, s)| id == "A" && *s == TestStatus::Passed)
            .expect("A passed event");
        let b_ready_at = events
            .iter()
            .position(|(id, s)| id == "B" && *s == TestStatus::Ready)
            .expect("B ready event");
        assert!(b_ready_at > a_passed_at);

        Ok(())
    })
    .await
}
