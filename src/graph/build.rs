// src/graph/build.rs

//! Compile flat test descriptors into a validated [`TestGraph`].

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;

use crate::errors::{Result, TestDagError};
use crate::graph::graph::{TestGraph, TestNode};
use crate::suite::TestSuite;

/// Build and validate the execution graph for a suite.
///
/// Checks, in order:
/// - the suite is non-empty
/// - test ids are unique
/// - every dependency references an existing id
/// - no test depends on itself
/// - the dependency graph is acyclic
///
/// No partial graph is ever returned on failure.
pub fn build_graph(suite: &TestSuite) -> Result<TestGraph> {
    if suite.cases.is_empty() {
        return Err(TestDagError::EmptySuite);
    }

    let mut index: HashMap<String, usize> = HashMap::with_capacity(suite.cases.len());
    for (ix, case) in suite.cases.iter().enumerate() {
        if index.insert(case.id.clone(), ix).is_some() {
            return Err(TestDagError::DuplicateTestId(case.id.clone()));
        }
    }

    let mut nodes: Vec<TestNode> = suite
        .cases
        .iter()
        .map(|case| TestNode {
            case: Arc::new(case.clone()),
            deps: Vec::new(),
            dependents: Vec::new(),
        })
        .collect();

    // Resolve dependency ids to arena indices.
    for (ix, case) in suite.cases.iter().enumerate() {
        for dep in &case.depends_on {
            let dep_ix = match index.get(dep) {
                Some(d) => *d,
                None => {
                    return Err(TestDagError::UnknownDependency {
                        test: case.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            };
            if dep_ix == ix {
                return Err(TestDagError::CyclicDependency(format!(
                    "test '{}' depends on itself",
                    case.id
                )));
            }
            nodes[ix].deps.push(dep_ix);
        }
    }

    // Populate dependents from the resolved dependency lists.
    for ix in 0..nodes.len() {
        let deps = nodes[ix].deps.clone();
        for dep_ix in deps {
            nodes[dep_ix].dependents.push(ix);
        }
    }

    validate_acyclic(&nodes, suite)?;

    Ok(TestGraph { nodes, index })
}

/// Reject cyclic dependency structures.
///
/// Edge direction: dep -> dependent, so a topological order exists iff the
/// suite is executable. On failure the offending cycle members are named in
/// the error, recovered via strongly connected components.
fn validate_acyclic(nodes: &[TestNode], suite: &TestSuite) -> Result<()> {
    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();

    for ix in 0..nodes.len() {
        graph.add_node(ix);
    }
    for (ix, node) in nodes.iter().enumerate() {
        for &dep_ix in &node.deps {
            graph.add_edge(dep_ix, ix, ());
        }
    }

    if toposort(&graph, None).is_ok() {
        return Ok(());
    }

    // Name the cycle for the error message.
    let cycle = tarjan_scc(&graph)
        .into_iter()
        .find(|scc| scc.len() > 1)
        .unwrap_or_default();
    let mut members: Vec<&str> = cycle
        .iter()
        .map(|&ix| suite.cases[ix].id.as_str())
        .collect();
    members.sort_unstable();

    Err(TestDagError::CyclicDependency(members.join(" -> ")))
}
