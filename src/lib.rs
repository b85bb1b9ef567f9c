//! # Crawlfeed
//!
//! An engine for incrementally discovering changes in an external content
//! repository and delivering them downstream as a durable, checkpointed,
//! rate-bounded stream of change events.
//!
//! ## Features
//!
//! - **Incremental Discovery**: Periodic snapshot/diff of a monitored source
//!   produces created/updated/deleted change events
//! - **Durable Checkpointing**: Every delivered change advances a crash-safe
//!   checkpoint, so a restart resumes exactly where processing left off
//! - **Bounded Queueing**: A capacity-limited FIFO provides backpressure from
//!   the consumer back to the producer
//! - **Host Load Budgets**: A declarative per-source schedule caps how many
//!   documents are processed per time window
//! - **Batch Traversal**: Bounded pull-and-push batches with cooperative
//!   cancellation and retry/backoff classification
//!
//! ## Quick Start
//!
//! ```no_run
//! use crawlfeed::queue::CheckpointAndChangeQueue;
//! use crawlfeed::store::FileStore;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FileStore::new("./state")?);
//! let queue = CheckpointAndChangeQueue::new("wiki", store.clone(), store.clone());
//! queue.start()?;
//!
//! // Producer side: the repository monitor calls the ChangeSink callbacks.
//! // Consumer side: the traverser pulls changes and records checkpoints.
//! while let Some(change) = queue.next_change() {
//!     // push downstream, then confirm delivery:
//!     queue.record_checkpoint(change.checkpoint.clone())?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The crate is organized into several core modules:
//!
//! - [`queue`] - Bounded change queue and its durable, checkpoint-aware wrapper
//! - [`monitor`] - Repository snapshot/diff loop feeding the producer callback
//! - [`schedule`] - Per-source load/retry/active-hours configuration
//! - [`load`] - Host load manager converting schedules into batch-size hints
//! - [`traversal`] - Batch runner, result classification, and result recorder
//! - [`store`] - Durable schedule/checkpoint/change-log persistence contracts
//!
//! ## Control Flow
//!
//! RepositoryMonitor → CheckpointAndChangeQueue (producer callback) ⇄ durable
//! store; the traverser asks the HostLoadManager for a batch-size hint, pulls
//! up to that many changes, hands each to a [`traversal::Pusher`], reports a
//! [`traversal::BatchResult`], and the recorder feeds that result back into
//! the load manager and schedule to pick the delay before the next batch.

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};

/// Configuration constants and backoff calculation
pub mod config;

/// Host load accounting and batch-size hints
pub mod load;

/// Tracing setup for embedding applications
pub mod logging;

/// Production observability metrics
pub mod metrics;

/// Repository snapshot/diff monitoring
pub mod monitor;

/// Bounded change queue and checkpoint-aware wrapper
pub mod queue;

/// Per-source traversal schedules
pub mod schedule;

/// Graceful shutdown coordination shared across tasks
pub mod shutdown;

/// Durable persistence contracts and the file-backed store
pub mod store;

/// Batch traversal, results, and result recording
pub mod traversal;

// Re-export commonly used types
pub use schedule::Schedule;

/// An ordered cursor into one source's change history.
///
/// A checkpoint marks "everything up to here has been durably processed" for
/// one monitored source. Checkpoints are immutable, compared by value, and
/// totally ordered per source by `(snapshot_ordinal, within_snapshot_offset)`.
/// Checkpoints from different sources are unordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Stable identifier of the monitored source
    pub source_id: String,
    /// Ordinal of the repository snapshot this checkpoint belongs to
    pub snapshot_ordinal: u64,
    /// Position within that snapshot's diff
    pub within_snapshot_offset: u64,
}

impl Checkpoint {
    /// Create a checkpoint at the given position.
    pub fn new(source_id: impl Into<String>, snapshot_ordinal: u64, offset: u64) -> Self {
        Self {
            source_id: source_id.into(),
            snapshot_ordinal,
            within_snapshot_offset: offset,
        }
    }

    /// The checkpoint immediately after this one within the same snapshot.
    pub fn next_in_snapshot(&self) -> Self {
        Self {
            source_id: self.source_id.clone(),
            snapshot_ordinal: self.snapshot_ordinal,
            within_snapshot_offset: self.within_snapshot_offset + 1,
        }
    }

    /// The first checkpoint of the next snapshot for the same source.
    pub fn next_snapshot(&self) -> Self {
        Self {
            source_id: self.source_id.clone(),
            snapshot_ordinal: self.snapshot_ordinal + 1,
            within_snapshot_offset: 0,
        }
    }
}

impl PartialOrd for Checkpoint {
    /// Checkpoints are ordered only within one source; comparing checkpoints
    /// from different sources yields `None`.
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if self.source_id != other.source_id {
            return None;
        }
        Some(
            (self.snapshot_ordinal, self.within_snapshot_offset)
                .cmp(&(other.snapshot_ordinal, other.within_snapshot_offset)),
        )
    }
}

/// What kind of repository change a [`Change`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    /// A document was created or its content changed
    CreatedOrUpdated,
    /// A document was removed from the repository
    Deleted,
}

/// Which factory produced a [`DocumentHandle`] payload.
///
/// The discriminant is persisted with the handle so a stored change can be
/// reconstructed without knowing the originating repository type up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleFactory {
    /// Caller-supplied factory, used for created/updated documents
    Client,
    /// Engine-internal factory, used for deletions
    Internal,
}

/// An opaque reference to a changed document.
///
/// The engine never interprets the payload; it is round-tripped unchanged to
/// the downstream [`traversal::Pusher`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHandle {
    /// Which factory produced (and can reconstruct) this handle
    pub factory: HandleFactory,
    /// Factory-specific serialized payload identifying the document
    pub payload: String,
}

impl DocumentHandle {
    /// Create a client-factory handle for a created or updated document.
    pub fn client(payload: impl Into<String>) -> Self {
        Self {
            factory: HandleFactory::Client,
            payload: payload.into(),
        }
    }

    /// Create an internal-factory handle for a deleted document.
    pub fn internal(payload: impl Into<String>) -> Self {
        Self {
            factory: HandleFactory::Internal,
            payload: payload.into(),
        }
    }
}

/// One queued unit of work: a document change plus its resume point.
///
/// The checkpoint carried by a change is the cursor that would resume
/// traversal immediately after this change has been delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Whether this is a created/updated or deleted document
    pub kind: ChangeKind,
    /// Opaque reference to the changed document
    pub handle: DocumentHandle,
    /// Resume point immediately after this change
    pub checkpoint: Checkpoint,
}

impl Change {
    /// Create a created-or-updated change from a client-factory handle.
    pub fn created_or_updated(handle: DocumentHandle, checkpoint: Checkpoint) -> Self {
        Self {
            kind: ChangeKind::CreatedOrUpdated,
            handle,
            checkpoint,
        }
    }

    /// Create a deletion change from an internal-factory handle.
    pub fn deleted(handle: DocumentHandle, checkpoint: Checkpoint) -> Self {
        Self {
            kind: ChangeKind::Deleted,
            handle,
            checkpoint,
        }
    }
}
