//! Repository snapshot/diff monitoring
//!
//! The monitor periodically captures the repository's current state through a
//! [`SnapshotSource`], diffs it against the previous capture, and reports
//! every insert/update/delete to the queue's [`ChangeSink`] producer callback
//! with a checkpoint of (snapshot ordinal, offset within the diff).
//!
//! The previous snapshot only advances once every diffed change has been
//! accepted by the sink, so a full queue delays the crawl instead of dropping
//! changes. Re-emission after a partially accepted diff is possible and
//! bounded by one snapshot cycle; downstream delivery is at-least-once by
//! design.

use crate::config::{calculate_backoff, DEFAULT_MONITOR_INTERVAL, MAX_PRODUCE_RETRIES};
use crate::queue::{ChangeSink, QueueError};
use crate::shutdown::SharedShutdown;
use crate::{ChangeKind, Checkpoint, DocumentHandle};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// One captured repository state: document id to version stamp.
pub type Snapshot = BTreeMap<String, u64>;

/// Repository-specific snapshot capture, the external collaborator side of
/// the monitor. Implementations know how to list one repository type; the
/// engine never interprets document ids beyond equality.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Capture the repository's current state.
    async fn capture(&self) -> Result<Snapshot, MonitorError>;
}

/// Monitor-layer errors
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Snapshot capture failed (transient network/auth faults included)
    #[error("snapshot capture failed: {0}")]
    Capture(String),

    /// The change sink rejected a diffed change
    #[error("change sink error: {0}")]
    Sink(#[from] QueueError),
}

/// Compute the changes that turn `old` into `new`.
///
/// New or re-stamped documents come first in document-id order, followed by
/// deletions in document-id order, so one diff always replays in a stable
/// sequence.
pub fn diff(old: &Snapshot, new: &Snapshot) -> Vec<(ChangeKind, String)> {
    let mut changes = Vec::new();
    for (doc_id, stamp) in new {
        if old.get(doc_id) != Some(stamp) {
            changes.push((ChangeKind::CreatedOrUpdated, doc_id.clone()));
        }
    }
    for doc_id in old.keys() {
        if !new.contains_key(doc_id) {
            changes.push((ChangeKind::Deleted, doc_id.clone()));
        }
    }
    changes
}

/// Drives the snapshot/diff cycle for one source.
pub struct RepositoryMonitor {
    source_id: String,
    source: Arc<dyn SnapshotSource>,
    sink: Arc<dyn ChangeSink>,
    interval: Duration,
    initial_ordinal: u64,
    shutdown: SharedShutdown,
}

impl RepositoryMonitor {
    /// Create a monitor polling `source` and feeding `sink`.
    pub fn new(
        source_id: impl Into<String>,
        source: Arc<dyn SnapshotSource>,
        sink: Arc<dyn ChangeSink>,
        shutdown: SharedShutdown,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source,
            sink,
            interval: DEFAULT_MONITOR_INTERVAL,
            initial_ordinal: 0,
            shutdown,
        }
    }

    /// Override the interval between snapshot cycles.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Resume snapshot ordinals above `ordinal` instead of starting at zero.
    ///
    /// The sink enforces strict checkpoint monotonicity across restarts, so a
    /// restarted monitor must emit above everything the queue already
    /// accepted. Seed this from
    /// [`CheckpointAndChangeQueue::last_accepted`](crate::queue::CheckpointAndChangeQueue::last_accepted)
    /// after `start()` has replayed durable state.
    pub fn with_initial_ordinal(mut self, ordinal: u64) -> Self {
        self.initial_ordinal = ordinal;
        self
    }

    /// Run the snapshot/diff loop until shutdown is requested.
    pub async fn run(&self) {
        info!(source = %self.source_id, "Repository monitor started");
        let mut last: Option<Snapshot> = None;
        let mut ordinal: u64 = self.initial_ordinal;

        while !self.shutdown.is_shutdown_requested() {
            match self.source.capture().await {
                Ok(snapshot) => {
                    ordinal += 1;
                    let baseline = last.clone().unwrap_or_default();
                    let changes = diff(&baseline, &snapshot);
                    debug!(
                        source = %self.source_id,
                        snapshot_ordinal = ordinal,
                        changes = changes.len(),
                        "Snapshot diffed"
                    );
                    match self.emit(ordinal, changes).await {
                        Ok(true) => last = Some(snapshot),
                        // Not every change was accepted; keep the old
                        // baseline and re-diff on the next cycle
                        Ok(false) => {}
                        Err(e) => {
                            error!(source = %self.source_id, error = %e, "Failed to emit diff")
                        }
                    }
                }
                Err(e) => {
                    warn!(source = %self.source_id, error = %e, "Snapshot capture failed")
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.wait_for_shutdown() => break,
            }
        }
        info!(source = %self.source_id, "Repository monitor stopped");
    }

    /// Emit one diff through the sink. Returns `Ok(true)` when every change
    /// was accepted, `Ok(false)` when shutdown or a persistently full queue
    /// interrupted the emission.
    async fn emit(
        &self,
        snapshot_ordinal: u64,
        changes: Vec<(ChangeKind, String)>,
    ) -> Result<bool, MonitorError> {
        for (offset, (kind, doc_id)) in changes.into_iter().enumerate() {
            if self.shutdown.is_shutdown_requested() {
                return Ok(false);
            }
            let checkpoint = Checkpoint::new(&self.source_id, snapshot_ordinal, offset as u64);
            if !self.emit_one(kind, doc_id, checkpoint).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Push one change, backing off while the queue stays full.
    async fn emit_one(
        &self,
        kind: ChangeKind,
        doc_id: String,
        checkpoint: Checkpoint,
    ) -> Result<bool, MonitorError> {
        let mut attempt: u32 = 0;
        loop {
            let outcome = match kind {
                ChangeKind::CreatedOrUpdated => {
                    self.sink
                        .on_created_or_updated(DocumentHandle::client(&doc_id), checkpoint.clone())
                        .await
                }
                ChangeKind::Deleted => {
                    self.sink
                        .on_deleted(DocumentHandle::internal(&doc_id), checkpoint.clone())
                        .await
                }
            };

            match outcome {
                Ok(()) => return Ok(true),
                Err(QueueError::Timeout(_)) if attempt < MAX_PRODUCE_RETRIES => {
                    let backoff = calculate_backoff(attempt);
                    attempt += 1;
                    warn!(
                        source = %self.source_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Change queue full; backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = self.shutdown.wait_for_shutdown() => return Ok(false),
                    }
                }
                Err(QueueError::Timeout(_)) => return Ok(false),
                Err(e) => return Err(e.into()),
            }
        }
    }
}
