// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestDagError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cycle detected in test graph: {0}")]
    CyclicDependency(String),

    #[error("test '{test}' has unknown dependency '{dependency}'")]
    UnknownDependency { test: String, dependency: String },

    #[error("duplicate test id '{0}'")]
    DuplicateTestId(String),

    #[error("test suite contains no test cases")]
    EmptySuite,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TestDagError>;
