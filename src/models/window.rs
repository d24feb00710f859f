use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LimitError, Result};

/// Half-open time interval `[from, to)`.
///
/// There is no default and no implicit "now": callers always supply both
/// ends. Construction rejects `from > to` so a reversed window surfaces as an
/// error instead of silently counting zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if from > to {
            return Err(LimitError::InvalidWindow { from, to });
        }
        Ok(Self { from, to })
    }

    /// The window of length `period` ending (exclusively) at `to`.
    pub fn ending_at(to: DateTime<Utc>, period: Duration) -> Result<Self> {
        match to.checked_sub_signed(period) {
            Some(from) => Self::new(from, to),
            None => Err(LimitError::InvalidWindow {
                from: if period > Duration::zero() {
                    DateTime::<Utc>::MIN_UTC
                } else {
                    DateTime::<Utc>::MAX_UTC
                },
                to,
            }),
        }
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at < self.to
    }

    /// Bounds as stored in the counting tables (unix microseconds).
    pub(crate) fn bounds_micros(&self) -> (i64, i64) {
        (self.from.timestamp_micros(), self.to.timestamp_micros())
    }
}
