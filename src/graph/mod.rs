// src/graph/mod.rs

//! Dependency graph representation and validation.
//!
//! - [`graph`] holds the arena-backed DAG of test nodes.
//! - [`build`] compiles and validates flat test descriptors into a
//!   [`TestGraph`], rejecting cycles and unknown references outright.

pub mod build;
pub mod graph;

pub use build::build_graph;
pub use graph::{TestGraph, TestNode};
