// tests/property_scheduler.rs

//! Property test: for any valid DAG and any set of failing tests, the core
//! scheduler terminates with exactly one terminal status per node, never
//! dispatches a node whose dependencies have not all passed, and never
//! exceeds the concurrency ceiling.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use proptest::prelude::*;

use testdag::ExecutionConfig;
use testdag::graph::build_graph;
use testdag::pool::{RawOutcome, Verdict};
use testdag::sched::{CoreCommand, CoreScheduler, SchedulerEvent};
use testdag::suite::{TestCase, TestSuite};
use testdag::types::TestStatus;

/// Generate a valid DAG: task N may only depend on tasks 0..N-1, which
/// makes cycles impossible by construction.
fn dag_suite_strategy(max_tasks: usize) -> impl Strategy<Value = TestSuite> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        let deps_strat = proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..3),
            num_tasks,
        );
        let complexity_strat = proptest::collection::vec(0u32..10, num_tasks);

        (deps_strat, complexity_strat).prop_map(move |(raw_deps, complexities)| {
            let mut suite = TestSuite::new("prop");
            for (i, potential_deps) in raw_deps.into_iter().enumerate() {
                let mut case = TestCase::new(format!("t{i}"), format!("run t{i}"));
                case.complexity = complexities[i];

                let mut deps: Vec<usize> = potential_deps
                    .into_iter()
                    .filter(|_| i > 0)
                    .map(|d| d % i)
                    .collect();
                deps.sort_unstable();
                deps.dedup();
                case.depends_on = deps.into_iter().map(|d| format!("t{d}")).collect();

                suite.push(case);
            }
            suite
        })
    })
}

fn verdict(pass: bool) -> Verdict {
    Verdict::Finished(RawOutcome {
        stdout: String::new(),
        stderr: String::new(),
        exit_status: if pass { 0 } else { 1 },
        duration: Duration::ZERO,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_node_reaches_exactly_one_terminal_status(
        suite in dag_suite_strategy(8),
        failing in proptest::collection::vec(any::<bool>(), 8),
        max_concurrency in 1usize..=4,
    ) {
        let graph = build_graph(&suite).expect("generated suite is valid");
        let n = graph.len();

        let config = ExecutionConfig {
            max_concurrency,
            min_concurrency: 1,
            ..Default::default()
        };
        let mut core = CoreScheduler::new(graph.clone(), &config);

        let mut executing: VecDeque<usize> = VecDeque::new();
        let mut recorded: HashMap<String, TestStatus> = HashMap::new();

        let mut step = core.start();
        let mut steps = 0usize;

        loop {
            // Process the step: records are unique, dispatches are legal.
            for cmd in &step.commands {
                if let CoreCommand::Record(result) = cmd {
                    prop_assert!(
                        !recorded.contains_key(&result.id),
                        "second terminal record for {}",
                        result.id
                    );
                    prop_assert!(result.status.is_terminal());
                    recorded.insert(result.id.clone(), result.status);
                }
            }
            for ix in step.dispatched() {
                for &dep in graph.deps_of(ix) {
                    prop_assert_eq!(
                        recorded.get(graph.id(dep)).copied(),
                        Some(TestStatus::Passed),
                        "node {} dispatched with unsatisfied dependency {}",
                        graph.id(ix),
                        graph.id(dep)
                    );
                }
                executing.push_back(ix);
            }

            prop_assert!(
                core.running_count() <= max_concurrency,
                "running {} exceeds limit {}",
                core.running_count(),
                max_concurrency
            );

            if core.is_finished() {
                break;
            }

            prop_assert!(
                !executing.is_empty(),
                "scheduler stuck: not finished but nothing executing"
            );

            let ix = executing.pop_front().unwrap();
            let pass = !failing.get(ix).copied().unwrap_or(false);
            step = core.step(SchedulerEvent::NodeFinished {
                index: ix,
                verdict: verdict(pass),
                duration: Duration::ZERO,
            });

            steps += 1;
            prop_assert!(steps <= 10 * n + 10, "simulation did not converge");
        }

        prop_assert_eq!(recorded.len(), n, "missing terminal results");
        for ix in 0..n {
            prop_assert!(core.status_of(ix).is_terminal());
        }
    }
}
