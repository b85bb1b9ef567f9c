//! Host load accounting
//!
//! Converts a source's [`Schedule`](crate::Schedule) load budget plus recent
//! throughput into a bounded batch-size hint. Each source owns an independent
//! rolling window record behind its own lock, so unrelated sources never
//! contend; the outer map lock is only taken to find or insert a record.
//!
//! Transitions are driven by calls, not by a background timer: the window is
//! lazily reset whenever an operation notices the period has elapsed.

use crate::config::DEFAULT_LOAD_PERIOD;
use crate::store::{ScheduleStore, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

struct HostWindow {
    window_start: Instant,
    docs_traversed: u64,
    /// Earliest instant the next poll of an exhausted repository may run
    next_poll_at: Option<Instant>,
}

impl HostWindow {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            docs_traversed: 0,
            next_poll_at: None,
        }
    }

    /// Reset the window if the accounting period has elapsed.
    fn roll(&mut self, period: Duration) {
        if self.window_start.elapsed() >= period {
            self.window_start = Instant::now();
            self.docs_traversed = 0;
        }
    }
}

/// Tracks per-source document throughput against schedule load budgets.
///
/// One shared instance handles all sources; operations are safe under
/// concurrent calls for the same or different sources.
pub struct HostLoadManager {
    schedules: Arc<dyn ScheduleStore>,
    period: Duration,
    windows: RwLock<HashMap<String, Mutex<HostWindow>>>,
}

impl HostLoadManager {
    /// Create a manager with the default accounting period.
    pub fn new(schedules: Arc<dyn ScheduleStore>) -> Self {
        Self::with_period(schedules, DEFAULT_LOAD_PERIOD)
    }

    /// Create a manager with an explicit accounting period.
    pub fn with_period(schedules: Arc<dyn ScheduleStore>, period: Duration) -> Self {
        Self {
            schedules,
            period,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Accounting period currently in effect.
    pub fn period(&self) -> Duration {
        self.period
    }

    fn with_window<R>(&self, source: &str, f: impl FnOnce(&mut HostWindow) -> R) -> R {
        {
            let windows = self.windows.read().expect("host load windows poisoned");
            if let Some(window) = windows.get(source) {
                let mut window = window.lock().expect("host window poisoned");
                return f(&mut window);
            }
        }
        let mut windows = self.windows.write().expect("host load windows poisoned");
        let window = windows
            .entry(source.to_string())
            .or_insert_with(|| Mutex::new(HostWindow::new()));
        let mut window = window.lock().expect("host window poisoned");
        f(&mut window)
    }

    /// Add `count` documents to the source's current window, rolling the
    /// window first if the period has elapsed.
    pub fn update_num_docs_traversed(&self, source: &str, count: u64) {
        let period = self.period;
        self.with_window(source, |window| {
            window.roll(period);
            window.docs_traversed += count;
            debug!(
                source,
                count,
                window_total = window.docs_traversed,
                "Recorded traversed documents"
            );
        });
    }

    /// Remaining document budget for the source's next batch.
    ///
    /// Reads the CURRENT schedule on every call, so a shrunk or grown load
    /// takes effect immediately. A missing or disabled schedule, or a zero
    /// load, yields 0.
    pub fn determine_batch_hint(&self, source: &str) -> Result<u32, StoreError> {
        let schedule = match self.schedules.get_schedule(source)? {
            Some(schedule) => schedule,
            None => {
                warn!(source, "No schedule for source; batch hint is 0");
                return Ok(0);
            }
        };
        if schedule.disabled || schedule.load == 0 {
            return Ok(0);
        }

        let period = self.period;
        let traversed = self.with_window(source, |window| {
            window.roll(period);
            window.docs_traversed
        });

        let hint = u64::from(schedule.load).saturating_sub(traversed);
        let hint = u32::try_from(hint).unwrap_or(u32::MAX);
        debug!(source, load = schedule.load, traversed, hint, "Batch hint determined");
        Ok(hint)
    }

    /// Record that a batch ended with a POLL result and the scheduler should
    /// wait `delay` before polling this source again.
    pub fn connector_finished_traversal(&self, source: &str, delay: Duration) {
        self.with_window(source, |window| {
            window.next_poll_at = Some(Instant::now() + delay);
        });
        debug!(source, delay_ms = delay.as_millis() as u64, "Poll delay recorded");
    }

    /// Remaining wait before the source may be polled again, `None` if no
    /// poll delay is pending (or it already elapsed).
    pub fn until_next_poll(&self, source: &str) -> Option<Duration> {
        self.with_window(source, |window| {
            let at = window.next_poll_at?;
            let remaining = at.checked_duration_since(Instant::now())?;
            (remaining > Duration::ZERO).then_some(remaining)
        })
    }
}
