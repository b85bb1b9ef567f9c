//! Batch traversal of the change feed
//!
//! One batch is a bounded pull-and-push cycle: the
//! [`QueryTraverser`](traverser::QueryTraverser) pulls up to a host-load
//! determined number of changes, hands each to a [`Pusher`], and reports a
//! [`BatchResult`] classifying why the batch ended. The
//! [`BatchResultRecorder`](recorder::BatchResultRecorder) feeds that result
//! back into load accounting and schedule state to pick the wait before the
//! next batch.

pub mod recorder;
pub mod traverser;

pub use recorder::BatchResultRecorder;
pub use traverser::{Pusher, QueryTraverser};

use crate::{Change, Checkpoint};
use async_trait::async_trait;

/// Why a batch ended, and therefore how long to wait before the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelayPolicy {
    /// The batch hit its size limit; more work is likely available now
    Immediate,
    /// The upstream source has no more data right now; wait and poll again
    Poll,
    /// An unrecoverable fault occurred; back off before retrying
    Error,
}

impl DelayPolicy {
    /// Stable lowercase label, used for logging and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            DelayPolicy::Immediate => "immediate",
            DelayPolicy::Poll => "poll",
            DelayPolicy::Error => "error",
        }
    }
}

/// Outcome summary of one traversal batch.
///
/// The delay policy is carried by value, so the "policy is never null"
/// contract holds by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    delay_policy: DelayPolicy,
    count_processed: u32,
    start_time_millis: i64,
    end_time_millis: i64,
}

impl BatchResult {
    /// Build a result; `end_time_millis` is clamped so the elapsed span is
    /// always positive even under clock skew or a zero-duration batch.
    pub fn new(
        delay_policy: DelayPolicy,
        count_processed: u32,
        start_time_millis: i64,
        end_time_millis: i64,
    ) -> Self {
        Self {
            delay_policy,
            count_processed,
            start_time_millis,
            end_time_millis: end_time_millis.max(start_time_millis + 1),
        }
    }

    /// Why the batch ended.
    pub fn delay_policy(&self) -> DelayPolicy {
        self.delay_policy
    }

    /// Documents successfully pushed during the batch.
    pub fn count_processed(&self) -> u32 {
        self.count_processed
    }

    /// Batch start, Unix milliseconds.
    pub fn start_time_millis(&self) -> i64 {
        self.start_time_millis
    }

    /// Batch end, Unix milliseconds; always after the start.
    pub fn end_time_millis(&self) -> i64 {
        self.end_time_millis
    }

    /// Elapsed batch time in milliseconds, always at least 1.
    pub fn elapsed_millis(&self) -> i64 {
        (self.end_time_millis - self.start_time_millis).max(1)
    }
}

/// Downstream push outcomes that are not success.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The item was rejected but may succeed later; the batch stops and the
    /// item will be re-attempted by a future batch
    #[error("retryable push failure: {0}")]
    Retryable(String),

    /// The item can never be delivered; surfaced as an ERROR batch result
    #[error("fatal push failure: {0}")]
    Fatal(String),
}

/// Traversal-layer errors
#[derive(Debug, thiserror::Error)]
pub enum TraversalError {
    /// Upstream repository/queue fault while pulling changes
    #[error("upstream source error: {0}")]
    Upstream(String),

    /// Durable checkpoint persistence failed
    #[error("checkpoint persistence error: {0}")]
    Checkpoint(String),
}

/// Upstream feed of changes for one source, plus the durable resume marker.
///
/// Implemented by [`crate::queue::CheckpointAndChangeQueue`] in the queued
/// deployment mode, or by a live connector query interface when the engine
/// pulls straight from a repository.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Pull the next change; `Ok(None)` when the feed has no data right now.
    async fn next_change(&self) -> Result<Option<Change>, TraversalError>;

    /// Durably record that everything up to `checkpoint` was delivered.
    async fn record_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), TraversalError>;
}
