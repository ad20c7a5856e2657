use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("a maximum of two executions can be recorded")]
    TooManyExecutions,
    #[error("interval is not calculated yet")]
    IntervalNotReady,
}

/// Learns a task's repetition interval from two observed executions.
///
/// The interval is the signed difference `second - first`; zero and negative
/// values are kept as-is so the caller decides how to treat them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TrackerRecord")]
pub struct IntervalTracker {
    #[serde(with = "time::serde::rfc3339::option")]
    first_execution: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    second_execution: Option<OffsetDateTime>,
    #[serde(skip)]
    interval: Option<Duration>,
}

#[derive(Deserialize)]
struct TrackerRecord {
    #[serde(default, with = "time::serde::rfc3339::option")]
    first_execution: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    second_execution: Option<OffsetDateTime>,
}

impl TryFrom<TrackerRecord> for IntervalTracker {
    type Error = String;

    fn try_from(record: TrackerRecord) -> Result<Self, Self::Error> {
        match (record.first_execution, record.second_execution) {
            (None, Some(_)) => Err("second_execution recorded without first_execution".into()),
            (first, second) => Ok(Self {
                first_execution: first,
                second_execution: second,
                interval: first.zip(second).map(|(first, second)| second - first),
            }),
        }
    }
}

impl IntervalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_execution(&mut self, timestamp: OffsetDateTime) -> Result<(), TrackerError> {
        match (self.first_execution, self.second_execution) {
            (Some(_), Some(_)) => Err(TrackerError::TooManyExecutions),
            (None, _) => {
                self.first_execution = Some(timestamp);
                Ok(())
            }
            (Some(first), None) => {
                self.second_execution = Some(timestamp);
                self.interval = Some(timestamp - first);
                Ok(())
            }
        }
    }

    /// Slides the two-slot window forward once the interval is known:
    /// the second execution becomes the first and `timestamp` the second.
    pub fn advance(&mut self, timestamp: OffsetDateTime) -> Result<(), TrackerError> {
        let second = self.second_execution.ok_or(TrackerError::IntervalNotReady)?;
        self.first_execution = Some(second);
        self.second_execution = Some(timestamp);
        self.interval = Some(timestamp - second);
        Ok(())
    }

    /// Moves the window onto the latest slot of the learned cadence that is
    /// not after `at`, at least one interval past the second execution. The
    /// interval is unchanged. Returns the new second execution.
    pub fn catch_up(&mut self, at: OffsetDateTime) -> Result<OffsetDateTime, TrackerError> {
        let second = self.second_execution.ok_or(TrackerError::IntervalNotReady)?;
        let interval = self.interval.ok_or(TrackerError::IntervalNotReady)?;

        let step = interval.whole_seconds();
        let slots = if step > 0 {
            ((at - second).whole_seconds() / step).max(1)
        } else {
            1
        };
        let offset = match slots {
            1 => interval,
            _ => step
                .checked_mul(slots)
                .map(Duration::seconds)
                .unwrap_or(interval),
        };
        let slot = second.checked_add(offset).unwrap_or(at);

        self.first_execution = Some(slot - interval);
        self.second_execution = Some(slot);
        Ok(slot)
    }

    pub fn get_interval(&self) -> Result<Duration, TrackerError> {
        self.interval.ok_or(TrackerError::IntervalNotReady)
    }

    pub fn get_next_execution_time(&self) -> Option<OffsetDateTime> {
        let second = self.second_execution?;
        let interval = self.interval?;
        second.checked_add(interval)
    }

    pub fn get_last_execution(&self) -> Option<OffsetDateTime> {
        self.second_execution.or(self.first_execution)
    }

    pub fn is_interval_set(&self) -> bool {
        self.interval.is_some()
    }

    pub fn execution_count(&self) -> usize {
        usize::from(self.first_execution.is_some()) + usize::from(self.second_execution.is_some())
    }

    pub fn first_execution(&self) -> Option<OffsetDateTime> {
        self.first_execution
    }

    pub fn second_execution(&self) -> Option<OffsetDateTime> {
        self.second_execution
    }
}
