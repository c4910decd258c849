// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log filter:
//! 1. `RUST_LOG` / `TESTDAG_LOG` environment variables
//! 2. default to `info`
//!
//! Logs go to STDERR so that embedding applications keep stdout for their
//! own output.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            std::env::var("TESTDAG_LOG")
                .ok()
                .and_then(|s| EnvFilter::try_new(s).ok())
        })
        .unwrap_or_else(|| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
