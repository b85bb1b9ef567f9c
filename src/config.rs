//! Engine configuration constants

use std::time::Duration;

/// Default bound on the in-memory change queue.
/// A small buffer is enough: the queue only decouples the monitor's diff
/// cycle from the traverser's batch cycle, and every queued entry is also
/// held in the durable pending log.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// How long a producer callback waits for queue capacity before giving up.
/// Long enough for a slow consumer batch to drain a slot, short enough that
/// the monitor can notice shutdown and re-drive the diff.
pub const DEFAULT_PRODUCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default host-load accounting window.
/// The per-source document budget (`Schedule::load`) applies to one window;
/// the counter resets when the window elapses.
pub const DEFAULT_LOAD_PERIOD: Duration = Duration::from_secs(100);

/// Default wait after a POLL batch result, in milliseconds (5 minutes).
/// Applied when a schedule does not carry an explicit retry delay.
pub const DEFAULT_RETRY_DELAY_MILLIS: i64 = 300_000;

/// Sentinel retry delay meaning "do not re-poll once the repository is
/// exhausted". A POLL result against this sentinel auto-disables the schedule.
pub const RETRY_DELAY_POLLING_DISABLED: i64 = -1;

/// Fixed wait after an ERROR batch result before the next attempt.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Default interval between repository snapshot/diff cycles.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Maximum number of backoff steps the monitor takes when the queue stays
/// full before re-checking for shutdown and re-driving the diff.
pub const MAX_PRODUCE_RETRIES: u32 = 5;

/// Initial backoff delay in milliseconds for a full-queue retry.
pub const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

/// Maximum backoff delay in milliseconds for a full-queue retry.
/// 30 seconds caps exponential backoff to prevent excessive wait times.
pub const MAX_BACKOFF_MS: u64 = 30000; // 30 seconds

/// Maximum allowed durable state file size (10 MB) to prevent memory
/// exhaustion when loading.
pub const MAX_STATE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Calculate exponential backoff delay
pub fn calculate_backoff(retry_count: u32) -> Duration {
    let delay_ms = INITIAL_BACKOFF_MS * 2u64.pow(retry_count);
    let delay_ms = delay_ms.min(MAX_BACKOFF_MS);
    Duration::from_millis(delay_ms)
}
