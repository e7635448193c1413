//! Half-open time intervals.
//!
//! Every time range in the engine (reservations, maintenance blocks,
//! availability windows, booking slots) is an [`Interval`]: a half-open
//! range `[start, end)` over UTC instants. A single interval type with one
//! overlap test keeps conflict detection consistent across the availability
//! calculator, the reservation service, and the storage collaborators.
//!
//! # Half-open semantics
//!
//! `[14:00, 16:00)` and `[16:00, 18:00)` are back-to-back and do **not**
//! overlap: a booking may start at the exact instant the previous one ends.
//! Two intervals overlap iff `a.start < b.end && b.start < a.end`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error returned when an interval's bounds are not in order.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalError {
    /// The start instant is not strictly before the end instant.
    ///
    /// Zero-length intervals are rejected as well: a reservation for
    /// `[t, t)` books nothing and would silently pass every overlap check.
    #[error("interval start {start} is not before end {end}")]
    Empty {
        /// Requested start instant.
        start: DateTime<Utc>,
        /// Requested end instant.
        end: DateTime<Utc>,
    },
}

/// A half-open time range `[start, end)` with `start < end`.
///
/// The invariant is enforced at construction, so holding an `Interval`
/// means holding a non-empty, well-ordered range. Fields are private for
/// exactly that reason.
///
/// # Examples
///
/// ```
/// use bookable_core::interval::Interval;
///
/// let a = Interval::new(
///     "2025-06-01T14:00:00Z".parse().unwrap(),
///     "2025-06-01T16:00:00Z".parse().unwrap(),
/// ).unwrap();
/// let b = Interval::new(
///     "2025-06-01T16:00:00Z".parse().unwrap(),
///     "2025-06-01T18:00:00Z".parse().unwrap(),
/// ).unwrap();
///
/// // Back-to-back intervals do not overlap.
/// assert!(!a.overlaps(&b));
/// assert_eq!(a.duration_hours(), 2.0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Interval {
    /// Create an interval, validating `start < end`.
    ///
    /// # Errors
    ///
    /// Returns [`IntervalError::Empty`] if `start >= end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, IntervalError> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(IntervalError::Empty { start, end })
        }
    }

    /// The inclusive start instant.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// The exclusive end instant.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whether two intervals share any instant.
    ///
    /// Symmetric; touching endpoints do not count as overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether `inner` lies entirely within this interval.
    #[must_use]
    pub fn contains(&self, inner: &Self) -> bool {
        self.start <= inner.start && inner.end <= self.end
    }

    /// The length of the interval.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// The length of the interval in fractional hours.
    ///
    /// A 90-minute interval has a duration of `1.5` hours.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Sub-second precision is irrelevant at hour scale
    pub fn duration_hours(&self) -> f64 {
        self.duration().num_seconds() as f64 / 3600.0
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
