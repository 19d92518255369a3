//! Reconnect backoff: a fixed, tuned table of delays.
//!
//! Attempt `n` waits `intervals[n]`; attempts past the end of the table
//! reuse its last entry. Once the attempt counter exceeds `max_attempts`
//! the manager gives up and rejects every pending connect.

use std::time::Duration;

use crate::error::RealtimeError;

/// Default reconnect delays in milliseconds.
pub const DEFAULT_RECONNECT_INTERVALS_MS: [u64; 7] = [200, 300, 500, 1000, 1200, 1500, 2000];

/// Reconnect delay table and attempt ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    intervals: Vec<Duration>,
    max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Creates a policy. `max_attempts` of `None` retries forever.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Config`] if `intervals` is empty.
    pub fn new(intervals: Vec<Duration>, max_attempts: Option<u32>) -> Result<Self, RealtimeError> {
        if intervals.is_empty() {
            return Err(RealtimeError::Config(
                "reconnect intervals must not be empty".to_string(),
            ));
        }
        Ok(Self {
            intervals,
            max_attempts,
        })
    }

    /// Returns the delay before reconnect attempt `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        usize::try_from(attempt)
            .ok()
            .and_then(|idx| self.intervals.get(idx))
            .or_else(|| self.intervals.last())
            .copied()
            .unwrap_or_default()
    }

    /// Returns `true` once `attempts` is past the ceiling.
    #[must_use]
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts > max)
    }

    /// Returns the delay table.
    #[must_use]
    pub fn intervals(&self) -> &[Duration] {
        &self.intervals
    }

    /// Returns the attempt ceiling, `None` meaning unlimited.
    #[must_use]
    pub const fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            intervals: DEFAULT_RECONNECT_INTERVALS_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            max_attempts: None,
        }
    }
}
