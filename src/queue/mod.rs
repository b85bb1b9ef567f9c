//! Change queueing between the repository monitor and the traverser
//!
//! Two layers:
//!
//! 1. [`ChangeQueue`] - a bounded in-memory FIFO bridging one producer task
//!    and one consumer task, with blocking-with-timeout production and
//!    non-blocking consumption.
//! 2. [`CheckpointAndChangeQueue`] - wraps the FIFO with durable persistence
//!    of the last-delivered checkpoint and of queued-but-undelivered changes,
//!    so a restart resumes delivery exactly where it left off.
//!
//! The producer side is driven through the [`ChangeSink`] callback contract;
//! the consumer side polls [`CheckpointAndChangeQueue::next_change`] and
//! confirms delivery with [`CheckpointAndChangeQueue::record_checkpoint`].

pub mod change_queue;
pub mod checkpoint_queue;

pub use change_queue::{ChangeQueue, ProducePermit};
pub use checkpoint_queue::CheckpointAndChangeQueue;

use crate::store::StoreError;
use crate::{Checkpoint, DocumentHandle};
use async_trait::async_trait;

/// Producer callback contract fed by the repository monitor.
///
/// Implemented by [`CheckpointAndChangeQueue`]; the monitor never sees the
/// queue directly. Both callbacks may wait (bounded) for queue capacity,
/// providing backpressure from the consumer to the producer.
#[async_trait]
pub trait ChangeSink: Send + Sync {
    /// A document was created or updated. The handle comes from the client
    /// factory; the checkpoint resumes traversal immediately after it.
    async fn on_created_or_updated(
        &self,
        handle: DocumentHandle,
        checkpoint: Checkpoint,
    ) -> Result<(), QueueError>;

    /// A document was deleted. The handle comes from the internal factory.
    async fn on_deleted(
        &self,
        handle: DocumentHandle,
        checkpoint: Checkpoint,
    ) -> Result<(), QueueError>;
}

/// Queue-layer errors
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue stayed full past the producer's timeout
    #[error("queue full: no capacity freed within {0:?}")]
    Timeout(std::time::Duration),

    /// Produce was called before `start()` replayed durable state
    #[error("queue not started")]
    NotStarted,

    /// Produce was called after `stop()`
    #[error("queue stopped")]
    Stopped,

    /// The offered checkpoint does not advance past the newest queued change
    #[error("stale checkpoint: offered {offered:?} does not follow {last:?}")]
    StaleCheckpoint {
        /// Newest checkpoint already accepted for this source
        last: Checkpoint,
        /// Checkpoint carried by the rejected change
        offered: Checkpoint,
    },

    /// The offered checkpoint belongs to a different source than this queue
    #[error("checkpoint source {offered} does not match queue source {expected}")]
    SourceMismatch {
        /// Source this queue is bound to
        expected: String,
        /// Source named by the rejected checkpoint
        offered: String,
    },

    /// Durable persistence failed; in-memory state was left unchanged
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
