//! Summary windows and the end-of-day tick counter.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 100 ns ticks per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;
pub const TICKS_PER_HOUR: i64 = TICKS_PER_SECOND * 60 * 60;
pub const TICKS_PER_DAY: i64 = TICKS_PER_HOUR * 24;

/// Encoded "next due" summary boundary of a project.
///
/// The value counts 100 ns ticks since the Unix epoch and always sits on a UTC
/// midnight when produced by [`EndOfDayTicks::end_of_day`]. It only moves
/// forward, one day at a time, through [`EndOfDayTicks::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndOfDayTicks(pub i64);

impl EndOfDayTicks {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let secs = at.timestamp();
        let sub = i64::from(at.timestamp_subsec_nanos()) / 100;
        Self(secs * TICKS_PER_SECOND + sub)
    }

    /// The midnight that ends the UTC day containing `at`.
    pub fn end_of_day(at: DateTime<Utc>) -> Self {
        let ticks = Self::from_datetime(at).0;
        Self(ticks - ticks.rem_euclid(TICKS_PER_DAY) + TICKS_PER_DAY)
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        let secs = self.0.div_euclid(TICKS_PER_SECOND);
        let nanos = (self.0.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
        Utc.timestamp_opt(secs, nanos)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// One day later. The only way a project's counter changes.
    pub fn advance(self) -> Self {
        Self(self.0 + TICKS_PER_DAY)
    }

    /// Is this boundary due, i.e. has `offset_hours` past it elapsed by `now`?
    pub fn is_due(self, now: DateTime<Utc>, offset_hours: u32) -> bool {
        self.0 + i64::from(offset_hours) * TICKS_PER_HOUR <= Self::from_datetime(now).0
    }

    /// The day that ends at this boundary.
    pub fn window(self) -> SummaryWindow {
        let end = self.to_datetime();
        SummaryWindow {
            utc_start: end - Duration::days(1),
            utc_end: end,
        }
    }
}

/// Half-open UTC interval `[utc_start, utc_end)` a summary is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryWindow {
    pub utc_start: DateTime<Utc>,
    pub utc_end: DateTime<Utc>,
}

impl SummaryWindow {
    /// Builds a window, swapping the bounds if they arrive reversed.
    pub fn new(a: DateTime<Utc>, b: DateTime<Utc>) -> Self {
        if a <= b {
            Self {
                utc_start: a,
                utc_end: b,
            }
        } else {
            Self {
                utc_start: b,
                utc_end: a,
            }
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.utc_start <= at && at < self.utc_end
    }

    pub fn hours(&self) -> f64 {
        (self.utc_end - self.utc_start).num_seconds() as f64 / 3600.0
    }

    /// Started more than `stale_after` before `now`.
    ///
    /// A cutoff before the representable range means nothing is stale.
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        now.checked_sub_signed(stale_after)
            .is_some_and(|cutoff| self.utc_start < cutoff)
    }
}
