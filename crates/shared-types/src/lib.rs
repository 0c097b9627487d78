//! Shared types for the Pulse dashboard client
//!
//! This crate contains the types passed between the storage, data-manager and
//! renderer crates: identities of subjects and backend jobs, the job status
//! model, the error taxonomy and the clock used for cache expiry.

use serde::{Deserialize, Serialize};

pub mod clock;
pub mod data_types;
pub mod errors;
pub mod profile;

pub use clock::{Clock, ManualClock, SystemClock};
pub use data_types::{JobId, JobSnapshot, JobStatus, SubjectId};
pub use errors::{PulseError, PulseResult};
pub use profile::ProfileStats;

/// Milliseconds in one day
pub const DAY_MS: i64 = 86_400_000;

/// Time range for series queries, in epoch milliseconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Range ending at `end` and reaching `days` back
    pub fn days_until(end: i64, days: i64) -> Self {
        Self {
            start: end - days * DAY_MS,
            end,
        }
    }

    pub fn duration(&self) -> i64 {
        (self.end - self.start).max(0)
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range() {
        let range = TimeRange::days_until(10 * DAY_MS, 7);
        assert_eq!(range.start, 3 * DAY_MS);
        assert_eq!(range.duration(), 7 * DAY_MS);
        assert!(range.contains(5 * DAY_MS));
        assert!(!range.contains(11 * DAY_MS));

        let inverted = TimeRange::new(10, 5);
        assert_eq!(inverted.duration(), 0);
    }
}
