//! File-backed store with atomic writes and advisory locking
//!
//! Every record is a small JSON file under the store root. Writes go through
//! a temp file in the same directory, are flushed and fsynced, then renamed
//! over the target, and the parent directory is fsynced so the rename itself
//! is durable. Reads and writes are coordinated with `fd-lock` advisory locks
//! on a sibling `.lock` file.

use super::{ChangeLogStore, CheckpointStore, ScheduleStore, StoreError};
use crate::config::MAX_STATE_FILE_SIZE;
use crate::{Change, Checkpoint, Schedule};
use fd_lock::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File-backed implementation of all three store contracts.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self { root })
    }

    fn record_path(&self, source: &str, suffix: &str) -> PathBuf {
        // Source ids may carry separator characters; keep filenames flat.
        let safe = source.replace([':', '/', '\\'], "_");
        self.root.join(format!("{safe}_{suffix}.json"))
    }

    fn open_lock_file(path: &Path) -> Result<File, StoreError> {
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path.with_extension("lock"))
            .map_err(|e| StoreError::Lock(format!("Failed to open lock file: {e}")))
    }

    /// Load a JSON record, `None` if the file does not exist.
    fn load_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }

        let lock_file = Self::open_lock_file(path)?;
        let lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire read lock: {e}")))?;

        // Check file size before reading to prevent memory exhaustion
        let metadata = std::fs::metadata(path).map_err(|e| StoreError::Io(e.to_string()))?;
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(StoreError::StateTooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| StoreError::Io(e.to_string()))?;
        let value = serde_json::from_str(&contents).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Failed to deserialize stored record");
            StoreError::Deserialization(e.to_string())
        })?;
        Ok(Some(value))
    }

    /// Atomically replace a JSON record: temp file, flush, fsync, rename,
    /// directory fsync.
    fn save_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let lock_file = Self::open_lock_file(path)?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire write lock: {e}")))?;

        let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| StoreError::Io(format!("Failed to create temp file: {e}")))?;

        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| StoreError::Io(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| StoreError::Io(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| StoreError::Io(format!("Failed to sync temp file: {e}")))?;

        temp_file
            .persist(path)
            .map_err(|e| StoreError::Io(format!("Failed to persist temp file: {e}")))?;

        // Fsync parent directory to ensure the rename is durable
        if let Ok(dir) = File::open(parent_dir) {
            let _ = dir.sync_all();
        }

        debug!(path = %path.display(), "Stored record durably");
        Ok(())
    }
}

impl ScheduleStore for FileStore {
    fn get_schedule(&self, source: &str) -> Result<Option<Schedule>, StoreError> {
        self.load_json(&self.record_path(source, "schedule"))
    }

    fn store_schedule(&self, schedule: &Schedule) -> Result<(), StoreError> {
        let path = self.record_path(&schedule.source_name, "schedule");
        self.save_json(&path, schedule)?;
        info!(
            source = %schedule.source_name,
            load = schedule.load,
            disabled = schedule.disabled,
            "Schedule stored"
        );
        Ok(())
    }

    fn update_schedule(&self, schedule: &Schedule) -> Result<(), StoreError> {
        let path = self.record_path(&schedule.source_name, "schedule");
        if !path.exists() {
            return Err(StoreError::NotFound(schedule.source_name.clone()));
        }
        self.save_json(&path, schedule)
    }
}

impl CheckpointStore for FileStore {
    fn get_checkpoint(&self, source: &str) -> Result<Option<Checkpoint>, StoreError> {
        self.load_json(&self.record_path(source, "checkpoint"))
    }

    fn store_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let path = self.record_path(&checkpoint.source_id, "checkpoint");
        self.save_json(&path, checkpoint)?;
        debug!(
            source = %checkpoint.source_id,
            snapshot_ordinal = checkpoint.snapshot_ordinal,
            offset = checkpoint.within_snapshot_offset,
            "Checkpoint recorded"
        );
        Ok(())
    }
}

impl ChangeLogStore for FileStore {
    fn load_pending(&self, source: &str) -> Result<Vec<Change>, StoreError> {
        Ok(self
            .load_json(&self.record_path(source, "pending"))?
            .unwrap_or_default())
    }

    fn store_pending(&self, source: &str, changes: &[Change]) -> Result<(), StoreError> {
        self.save_json(&self.record_path(source, "pending"), &changes)
    }
}
