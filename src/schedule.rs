//! Per-source traversal schedules
//!
//! A [`Schedule`] declares how hard one monitored source may be traversed:
//! a document budget per load window, active time-of-day intervals, the wait
//! between polls of an exhausted repository, and a disabled flag. Schedules
//! are stored through [`crate::store::ScheduleStore`] and read by the
//! [`crate::load::HostLoadManager`] before every batch.

use crate::config::{DEFAULT_RETRY_DELAY_MILLIS, RETRY_DELAY_POLLING_DISABLED};
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A half-open `[start_hour, end_hour)` window of active traversal hours.
///
/// Hour resolution is 0–24; `end_hour == 24` means "through midnight".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeInterval {
    /// First active hour (inclusive), 0–23
    pub start_hour: u8,
    /// First inactive hour (exclusive), 1–24
    pub end_hour: u8,
}

impl TimeInterval {
    /// Create a validated interval.
    pub fn new(start_hour: u8, end_hour: u8) -> Result<Self, ScheduleError> {
        if start_hour >= 24 || end_hour > 24 || start_hour >= end_hour {
            return Err(ScheduleError::InvalidInterval {
                start: start_hour,
                end: end_hour,
            });
        }
        Ok(Self {
            start_hour,
            end_hour,
        })
    }

    /// Whether the given hour of day falls inside this interval.
    pub fn contains_hour(&self, hour: u8) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_hour, self.end_hour)
    }
}

/// Declarative per-source traversal configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Unique key of the monitored source
    pub source_name: String,
    /// When true, no batches run for this source
    pub disabled: bool,
    /// Document budget per load window; 0 means "do not traverse"
    pub load: u32,
    /// Wait between polls of an exhausted repository, in milliseconds.
    /// [`RETRY_DELAY_POLLING_DISABLED`] means "stop after exhausting the
    /// repository" and triggers auto-disable on the next POLL result.
    pub retry_delay_millis: i64,
    /// Active traversal hours, sorted, non-overlapping, at least one
    pub time_intervals: Vec<TimeInterval>,
}

impl Schedule {
    /// Create a validated schedule with the default retry delay.
    pub fn new(
        source_name: impl Into<String>,
        load: u32,
        time_intervals: Vec<TimeInterval>,
    ) -> Result<Self, ScheduleError> {
        Self::with_retry_delay(source_name, load, DEFAULT_RETRY_DELAY_MILLIS, time_intervals)
    }

    /// Create a validated schedule with an explicit retry delay.
    pub fn with_retry_delay(
        source_name: impl Into<String>,
        load: u32,
        retry_delay_millis: i64,
        mut time_intervals: Vec<TimeInterval>,
    ) -> Result<Self, ScheduleError> {
        let source_name = source_name.into();
        if source_name.is_empty() {
            return Err(ScheduleError::EmptySourceName);
        }
        if time_intervals.is_empty() {
            return Err(ScheduleError::MissingTimeInterval);
        }
        time_intervals.sort();
        for pair in time_intervals.windows(2) {
            if pair[1].start_hour < pair[0].end_hour {
                return Err(ScheduleError::OverlappingIntervals {
                    first: pair[0],
                    second: pair[1],
                });
            }
        }
        Ok(Self {
            source_name,
            disabled: false,
            load,
            retry_delay_millis,
            time_intervals,
        })
    }

    /// Whether re-polling an exhausted repository is disabled for this source.
    pub fn polling_disabled(&self) -> bool {
        self.retry_delay_millis == RETRY_DELAY_POLLING_DISABLED
    }

    /// Whether the schedule permits traversal at the given instant.
    ///
    /// Combines the disabled flag, a zero load budget, and the active-hours
    /// intervals. The load window budget itself is enforced separately by the
    /// [`crate::load::HostLoadManager`].
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        if self.disabled || self.load == 0 {
            return false;
        }
        let hour = at.hour() as u8;
        self.time_intervals.iter().any(|i| i.contains_hour(hour))
    }
}

impl fmt::Display for Schedule {
    /// Canonical string encoding:
    /// `[#]sourceName:load:retryDelayMillis:interval1:interval2:...`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.disabled {
            write!(f, "#")?;
        }
        write!(f, "{}:{}:{}", self.source_name, self.load, self.retry_delay_millis)?;
        for interval in &self.time_intervals {
            write!(f, ":{interval}")?;
        }
        Ok(())
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (disabled, body) = match s.strip_prefix('#') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let mut fields = body.split(':');
        let source_name = fields
            .next()
            .filter(|name| !name.is_empty())
            .ok_or(ScheduleError::EmptySourceName)?;
        let load_field = fields
            .next()
            .ok_or_else(|| ScheduleError::MissingField("load"))?;
        let load: u32 = load_field
            .parse()
            .map_err(|_| ScheduleError::InvalidLoad(load_field.to_string()))?;

        // The retry delay is optional; an interval field always looks like
        // `start-end` with a nonempty start, so a plain integer (possibly
        // negative, for the sentinel) in the first position is a retry delay.
        let mut retry_delay_millis = DEFAULT_RETRY_DELAY_MILLIS;
        let mut intervals = Vec::new();
        for (index, field) in fields.enumerate() {
            let interval_parts = field
                .split_once('-')
                .filter(|(start, _)| !start.is_empty());
            let Some((start, end)) = interval_parts else {
                if index != 0 {
                    return Err(ScheduleError::InvalidIntervalFormat(field.to_string()));
                }
                retry_delay_millis = field
                    .parse()
                    .map_err(|_| ScheduleError::InvalidRetryDelay(field.to_string()))?;
                continue;
            };
            let start: u8 = start
                .parse()
                .map_err(|_| ScheduleError::InvalidIntervalFormat(field.to_string()))?;
            let end: u8 = end
                .parse()
                .map_err(|_| ScheduleError::InvalidIntervalFormat(field.to_string()))?;
            intervals.push(TimeInterval::new(start, end)?);
        }

        let mut schedule =
            Schedule::with_retry_delay(source_name, load, retry_delay_millis, intervals)?;
        schedule.disabled = disabled;
        Ok(schedule)
    }
}

/// Schedule construction and parse errors
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// Source name missing or empty
    #[error("schedule source name must not be empty")]
    EmptySourceName,

    /// A required encoding field is missing
    #[error("schedule string missing required field: {0}")]
    MissingField(&'static str),

    /// Load field is not a non-negative integer
    #[error("invalid schedule load: {0}")]
    InvalidLoad(String),

    /// Retry delay field is not an integer
    #[error("invalid schedule retry delay: {0}")]
    InvalidRetryDelay(String),

    /// A time interval field is not `startHour-endHour`
    #[error("invalid time interval format: {0}")]
    InvalidIntervalFormat(String),

    /// Interval hours out of range or inverted
    #[error("invalid time interval: {start}-{end} (hours must satisfy 0 <= start < end <= 24)")]
    InvalidInterval {
        /// Start hour as parsed
        start: u8,
        /// End hour as parsed
        end: u8,
    },

    /// Two intervals overlap
    #[error("overlapping time intervals: {first} and {second}")]
    OverlappingIntervals {
        /// Earlier interval
        first: TimeInterval,
        /// Overlapping later interval
        second: TimeInterval,
    },

    /// A schedule needs at least one active interval
    #[error("schedule requires at least one time interval")]
    MissingTimeInterval,
}
