//! Durable, checkpoint-aware wrapper around the change queue
//!
//! Owns two durable artifacts alongside the in-memory FIFO: the
//! last-delivered checkpoint and a pending log of changes not yet confirmed
//! delivered. Every producer callback appends to the pending log before the
//! change becomes visible to the consumer, and every
//! [`record_checkpoint`](CheckpointAndChangeQueue::record_checkpoint) call is
//! durable before it acknowledges, so a crash between dequeue and
//! downstream-confirm never loses a change and a restart never re-delivers
//! past the recorded checkpoint.

use super::change_queue::ChangeQueue;
use super::{ChangeSink, QueueError};
use crate::config::{DEFAULT_PRODUCE_TIMEOUT, DEFAULT_QUEUE_CAPACITY};
use crate::metrics;
use crate::store::{ChangeLogStore, CheckpointStore};
use crate::traversal::{ChangeFeed, TraversalError};
use crate::{Change, Checkpoint, DocumentHandle};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Default, PartialEq)]
enum Lifecycle {
    #[default]
    New,
    Accepting,
    Stopped,
}

#[derive(Default)]
struct Inner {
    lifecycle: Lifecycle,
    /// Last checkpoint durably confirmed delivered
    last_delivered: Option<Checkpoint>,
    /// Newest checkpoint accepted from the producer, for monotonicity checks
    last_accepted: Option<Checkpoint>,
    /// Mirror of the durable pending log, oldest first. Entries stay here
    /// after consumption until their checkpoint is recorded.
    pending: Vec<Change>,
    /// Changes recovered from the log at start, served before live entries
    replay: VecDeque<Change>,
}

/// Checkpoint-aware, durably backed change queue for one source.
pub struct CheckpointAndChangeQueue {
    source_id: String,
    queue: ChangeQueue,
    checkpoints: Arc<dyn CheckpointStore>,
    change_log: Arc<dyn ChangeLogStore>,
    produce_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CheckpointAndChangeQueue {
    /// Create a queue for `source_id` over the given durable stores, bounded
    /// at the default capacity.
    pub fn new(
        source_id: impl Into<String>,
        checkpoints: Arc<dyn CheckpointStore>,
        change_log: Arc<dyn ChangeLogStore>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            queue: ChangeQueue::new(DEFAULT_QUEUE_CAPACITY),
            checkpoints,
            change_log,
            produce_timeout: DEFAULT_PRODUCE_TIMEOUT,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Override the in-memory capacity bound. Call before `start()`.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.queue = ChangeQueue::new(capacity);
        self
    }

    /// Override how long producer callbacks wait for queue capacity.
    pub fn with_produce_timeout(mut self, timeout: Duration) -> Self {
        self.produce_timeout = timeout;
        self
    }

    /// Newest checkpoint accepted from the producer, restored from durable
    /// state by `start()`.
    ///
    /// A restarted producer must resume emitting strictly above this point;
    /// the [`crate::monitor::RepositoryMonitor`] seeds its snapshot ordinal
    /// from it via `with_initial_ordinal`.
    pub fn last_accepted(&self) -> Option<Checkpoint> {
        self.inner
            .lock()
            .expect("checkpoint queue poisoned")
            .last_accepted
            .clone()
    }

    /// Source this queue is bound to.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Load durable state and replay undelivered changes.
    ///
    /// Log entries at or below the recorded checkpoint were already delivered
    /// and are discarded; the rest become visible to the consumer again, in
    /// their original order, before any newly produced change.
    pub fn start(&self) -> Result<(), QueueError> {
        let last_delivered = self.checkpoints.get_checkpoint(&self.source_id)?;
        let logged = self.change_log.load_pending(&self.source_id)?;

        let pending: Vec<Change> = logged
            .into_iter()
            .filter(|change| match &last_delivered {
                Some(delivered) => matches!(
                    change.checkpoint.partial_cmp(delivered),
                    Some(std::cmp::Ordering::Greater)
                ),
                None => true,
            })
            .collect();

        info!(
            source = %self.source_id,
            replayed = pending.len(),
            resumed_from = ?last_delivered,
            "Checkpoint queue started"
        );

        let mut inner = self.inner.lock().expect("checkpoint queue poisoned");
        inner.last_accepted = pending
            .last()
            .map(|change| change.checkpoint.clone())
            .or_else(|| last_delivered.clone());
        inner.replay = pending.iter().cloned().collect();
        inner.pending = pending;
        inner.last_delivered = last_delivered;
        inner.lifecycle = Lifecycle::Accepting;
        Ok(())
    }

    /// Stop accepting producer callbacks. Durable state stays on disk for the
    /// next `start()`.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().expect("checkpoint queue poisoned");
        inner.lifecycle = Lifecycle::Stopped;
        info!(source = %self.source_id, "Checkpoint queue stopped");
    }

    /// Non-blocking consumer pull; `None` when no change is available.
    pub fn next_change(&self) -> Option<Change> {
        let replayed = {
            let mut inner = self.inner.lock().expect("checkpoint queue poisoned");
            inner.replay.pop_front()
        };
        let change = replayed.or_else(|| self.queue.try_consume())?;
        metrics::record_change_delivered();
        Some(change)
    }

    /// Durably advance the last-delivered marker.
    ///
    /// Write-then-acknowledge: the checkpoint is persisted and the pending
    /// log pruned before any in-memory state moves, so a failed durable write
    /// leaves the queue exactly as it was.
    pub fn record_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), QueueError> {
        if checkpoint.source_id != self.source_id {
            return Err(QueueError::SourceMismatch {
                expected: self.source_id.clone(),
                offered: checkpoint.source_id,
            });
        }

        let mut inner = self.inner.lock().expect("checkpoint queue poisoned");
        if let Some(delivered) = &inner.last_delivered {
            if !matches!(
                checkpoint.partial_cmp(delivered),
                Some(std::cmp::Ordering::Greater)
            ) {
                return Err(QueueError::StaleCheckpoint {
                    last: delivered.clone(),
                    offered: checkpoint,
                });
            }
        }

        self.checkpoints.store_checkpoint(&checkpoint)?;

        let remaining: Vec<Change> = inner
            .pending
            .iter()
            .filter(|change| {
                matches!(
                    change.checkpoint.partial_cmp(&checkpoint),
                    Some(std::cmp::Ordering::Greater)
                )
            })
            .cloned()
            .collect();
        self.change_log.store_pending(&self.source_id, &remaining)?;

        debug!(
            source = %self.source_id,
            snapshot_ordinal = checkpoint.snapshot_ordinal,
            offset = checkpoint.within_snapshot_offset,
            pending = remaining.len(),
            "Delivery checkpoint advanced"
        );
        metrics::record_checkpoint_recorded();

        inner.pending = remaining;
        inner.last_delivered = Some(checkpoint);
        Ok(())
    }

    /// Producer path shared by both sink callbacks.
    async fn accept(&self, change: Change) -> Result<(), QueueError> {
        if change.checkpoint.source_id != self.source_id {
            return Err(QueueError::SourceMismatch {
                expected: self.source_id.clone(),
                offered: change.checkpoint.source_id.clone(),
            });
        }

        // Reserve queue capacity before touching durable state; the permit is
        // released automatically if the log write fails.
        let slot = self.queue.reserve(self.produce_timeout).await?;

        let mut inner = self.inner.lock().expect("checkpoint queue poisoned");
        match inner.lifecycle {
            Lifecycle::New => return Err(QueueError::NotStarted),
            Lifecycle::Stopped => return Err(QueueError::Stopped),
            Lifecycle::Accepting => {}
        }

        if let Some(last) = &inner.last_accepted {
            if !matches!(
                change.checkpoint.partial_cmp(last),
                Some(std::cmp::Ordering::Greater)
            ) {
                return Err(QueueError::StaleCheckpoint {
                    last: last.clone(),
                    offered: change.checkpoint,
                });
            }
        }

        // Durable append first; the in-memory queue only changes on success.
        let mut logged = inner.pending.clone();
        logged.push(change.clone());
        if let Err(e) = self.change_log.store_pending(&self.source_id, &logged) {
            warn!(source = %self.source_id, error = %e, "Pending log append failed");
            return Err(e.into());
        }

        inner.pending = logged;
        inner.last_accepted = Some(change.checkpoint.clone());
        self.queue.produce_with(slot, change);
        metrics::record_change_produced();
        Ok(())
    }
}

#[async_trait]
impl ChangeSink for CheckpointAndChangeQueue {
    async fn on_created_or_updated(
        &self,
        handle: DocumentHandle,
        checkpoint: Checkpoint,
    ) -> Result<(), QueueError> {
        self.accept(Change::created_or_updated(handle, checkpoint)).await
    }

    async fn on_deleted(
        &self,
        handle: DocumentHandle,
        checkpoint: Checkpoint,
    ) -> Result<(), QueueError> {
        self.accept(Change::deleted(handle, checkpoint)).await
    }
}

#[async_trait]
impl ChangeFeed for CheckpointAndChangeQueue {
    async fn next_change(&self) -> Result<Option<Change>, TraversalError> {
        Ok(CheckpointAndChangeQueue::next_change(self))
    }

    async fn record_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), TraversalError> {
        CheckpointAndChangeQueue::record_checkpoint(self, checkpoint)
            .map_err(|e| TraversalError::Checkpoint(e.to_string()))
    }
}
