//! Batch result recording
//!
//! Feeds each [`BatchResult`] back into host load accounting and schedule
//! state, and answers how long the scheduler should wait before the next
//! batch for the source. This is the only component permitted to auto-disable
//! a schedule, and it only does so when a POLL result meets the
//! polling-disabled retry-delay sentinel.

use super::{BatchResult, DelayPolicy};
use crate::config::DEFAULT_ERROR_BACKOFF;
use crate::load::HostLoadManager;
use crate::store::{ScheduleStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Routes batch outcomes into load accounting and schedule state.
pub struct BatchResultRecorder {
    load_manager: Arc<HostLoadManager>,
    schedules: Arc<dyn ScheduleStore>,
    error_backoff: Duration,
}

impl BatchResultRecorder {
    /// Create a recorder with the default error backoff.
    pub fn new(load_manager: Arc<HostLoadManager>, schedules: Arc<dyn ScheduleStore>) -> Self {
        Self {
            load_manager,
            schedules,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }

    /// Override the fixed wait applied after an ERROR result.
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Record one batch result and return the wait before the next batch.
    ///
    /// A concurrently deleted source (`NotFound` from the schedule store) is
    /// a benign no-op: there is nothing left to update, so the error backoff
    /// is returned and nothing propagates. Other storage failures surface.
    pub fn record_result(
        &self,
        source: &str,
        result: &BatchResult,
    ) -> Result<Duration, StoreError> {
        debug!(
            source,
            policy = result.delay_policy().as_str(),
            processed = result.count_processed(),
            elapsed_ms = result.elapsed_millis(),
            "Recording batch result"
        );

        match result.delay_policy() {
            DelayPolicy::Immediate => Ok(Duration::ZERO),
            DelayPolicy::Error => {
                self.load_manager
                    .update_num_docs_traversed(source, u64::from(result.count_processed()));
                Ok(self.error_backoff)
            }
            DelayPolicy::Poll => {
                self.load_manager
                    .update_num_docs_traversed(source, u64::from(result.count_processed()));
                self.record_poll(source)
            }
        }
    }

    fn record_poll(&self, source: &str) -> Result<Duration, StoreError> {
        let mut schedule = match self.schedules.get_schedule(source)? {
            Some(schedule) => schedule,
            None => {
                // Source deleted while the batch was running
                debug!(source, "Schedule gone; nothing to record");
                return Ok(self.error_backoff);
            }
        };

        if schedule.polling_disabled() {
            // Repository drained and re-polling is not desired: retire the
            // source until an administrator re-enables it.
            if !schedule.disabled {
                schedule.disabled = true;
                match self.schedules.update_schedule(&schedule) {
                    Ok(()) => {
                        info!(source, "Repository exhausted; schedule auto-disabled")
                    }
                    Err(StoreError::NotFound(_)) => {
                        debug!(source, "Schedule deleted before auto-disable; ignoring")
                    }
                    Err(e) => {
                        warn!(source, error = %e, "Failed to persist auto-disable");
                        return Err(e);
                    }
                }
            }
            return Ok(self.error_backoff);
        }

        let delay = Duration::from_millis(schedule.retry_delay_millis.max(0) as u64);
        self.load_manager.connector_finished_traversal(source, delay);
        Ok(delay)
    }
}
