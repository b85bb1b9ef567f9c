//! Durable persistence contracts
//!
//! The engine only depends on these abstract store traits; any backend that
//! honors the durable-write contract (nothing acknowledged before it is safe
//! on storage) can stand in. [`FileStore`] is the bundled file-backed
//! implementation with atomic writes and advisory locking.
//!
//! Storage failures are surfaced, never swallowed: a failed write must leave
//! the caller's in-memory state unchanged so no phantom success is recorded.

pub mod file;

pub use file::FileStore;

use crate::{Change, Checkpoint, Schedule};

/// Persistence of per-source schedules.
///
/// Schedule mutation is last-writer-wins at the persistence layer: a manual
/// re-enable racing the recorder's auto-disable resolves to whichever write
/// lands last. Callers needing stronger consistency must serialize their own
/// updates.
pub trait ScheduleStore: Send + Sync {
    /// Fetch the schedule for a source, `None` if the source is unknown.
    fn get_schedule(&self, source: &str) -> Result<Option<Schedule>, StoreError>;

    /// Create or replace the schedule for `schedule.source_name`.
    fn store_schedule(&self, schedule: &Schedule) -> Result<(), StoreError>;

    /// Replace an existing schedule; [`StoreError::NotFound`] if the source
    /// has never been stored. Direct configuration mutation goes through
    /// this method so a deleted source is reported, not silently recreated.
    fn update_schedule(&self, schedule: &Schedule) -> Result<(), StoreError>;
}

/// Persistence of the last-delivered checkpoint per source.
pub trait CheckpointStore: Send + Sync {
    /// Fetch the last durably recorded checkpoint, `None` on first start.
    fn get_checkpoint(&self, source: &str) -> Result<Option<Checkpoint>, StoreError>;

    /// Durably record a checkpoint. Must not return `Ok` before the write is
    /// safe against a process crash.
    fn store_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;
}

/// Persistence of queued-but-undelivered changes for crash recovery.
pub trait ChangeLogStore: Send + Sync {
    /// Load the pending change log for a source, oldest first. An unknown
    /// source yields an empty log.
    fn load_pending(&self, source: &str) -> Result<Vec<Change>, StoreError>;

    /// Durably replace the pending change log for a source.
    fn store_pending(&self, source: &str, changes: &[Change]) -> Result<(), StoreError>;
}

/// Storage-layer errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The named source has no stored record
    #[error("source not found: {0}")]
    NotFound(String),

    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Lock error
    #[error("lock error: {0}")]
    Lock(String),
}
