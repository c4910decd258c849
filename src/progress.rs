// src/progress.rs

//! Bounded stream of status-change events for external consumers.
//!
//! Backpressure is configurable per [`BackpressurePolicy`]:
//! - `Block` routes events through a bounded mpsc channel; a slow consumer
//!   blocks the coordinator at the channel boundary.
//! - `DropOldest` routes events through a broadcast channel; a lagging
//!   consumer loses the oldest events and observes the drop count via
//!   [`ProgressStream::dropped`].
//!
//! Dropped events only affect progress visibility; the report produced by
//! the aggregator is unaffected.

use std::time::SystemTime;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::types::{BackpressurePolicy, NodeId, TestStatus};

/// A single status-change event.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub id: NodeId,
    pub status: TestStatus,
    pub timestamp: SystemTime,
}

/// Producer half, held by the coordinator.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    inner: ReporterInner,
}

#[derive(Debug, Clone)]
enum ReporterInner {
    Block(mpsc::Sender<ProgressUpdate>),
    DropOldest(broadcast::Sender<ProgressUpdate>),
}

/// Consumer half, handed to dashboards/CLIs.
#[derive(Debug)]
pub struct ProgressStream {
    inner: StreamInner,
    dropped: u64,
}

#[derive(Debug)]
enum StreamInner {
    Block(mpsc::Receiver<ProgressUpdate>),
    DropOldest(broadcast::Receiver<ProgressUpdate>),
}

/// Create a connected reporter/stream pair.
pub fn channel(policy: BackpressurePolicy, capacity: usize) -> (ProgressReporter, ProgressStream) {
    let capacity = capacity.max(1);
    match policy {
        BackpressurePolicy::Block => {
            let (tx, rx) = mpsc::channel(capacity);
            (
                ProgressReporter {
                    inner: ReporterInner::Block(tx),
                },
                ProgressStream {
                    inner: StreamInner::Block(rx),
                    dropped: 0,
                },
            )
        }
        BackpressurePolicy::DropOldest => {
            let (tx, rx) = broadcast::channel(capacity);
            (
                ProgressReporter {
                    inner: ReporterInner::DropOldest(tx),
                },
                ProgressStream {
                    inner: StreamInner::DropOldest(rx),
                    dropped: 0,
                },
            )
        }
    }
}

impl ProgressReporter {
    /// Emit a status change. A closed consumer is not an error; progress is
    /// purely advisory.
    pub async fn emit(&self, id: &str, status: TestStatus) {
        let update = ProgressUpdate {
            id: id.to_string(),
            status,
            timestamp: SystemTime::now(),
        };
        match &self.inner {
            ReporterInner::Block(tx) => {
                if tx.send(update).await.is_err() {
                    debug!(test = %id, "progress consumer gone; dropping event");
                }
            }
            ReporterInner::DropOldest(tx) => {
                // broadcast overwrites the oldest entries on overflow; an
                // Err here only means there is no receiver at the moment.
                let _ = tx.send(update);
            }
        }
    }
}

impl ProgressStream {
    /// Next status-change event, or `None` once the run is over and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<ProgressUpdate> {
        match &mut self.inner {
            StreamInner::Block(rx) => rx.recv().await,
            StreamInner::DropOldest(rx) => loop {
                match rx.recv().await {
                    Ok(update) => return Some(update),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        self.dropped += n;
                        debug!(lost = n, "progress consumer lagged; oldest events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
        }
    }

    /// Total events lost to the drop-oldest policy so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
