//! Domain types for the reservation engine.
//!
//! Value objects (identifiers, [`Money`], [`Version`]) and entities
//! ([`Resource`], [`Reservation`], [`BlockedInterval`]) shared by the
//! availability calculator, the pricing calculator, and the reservation
//! service. All types serialize with serde since they cross the storage
//! boundary.

use crate::interval::Interval;
use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc, Weekday};
use chrono::Datelike;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a bookable resource (a venue or space).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(Uuid);

impl ResourceId {
    /// Creates a new random `ResourceId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ResourceId` from a `Uuid`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Creates a new random `ReservationId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ReservationId` from a `Uuid`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque key identifying an actor (a requester or a venue owner).
///
/// Supplied by the external identity provider; the engine never inspects it
/// beyond equality. A newtype rather than a bare `String` so signatures make
/// clear which string is the actor.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequesterId(String);

impl RequesterId {
    /// Create a new `RequesterId` from an identity-provider key.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RequesterId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RequesterId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Optimistic-concurrency token
// ============================================================================

/// Version number for optimistic concurrency control.
///
/// Both resources and reservations carry a version that increments on every
/// state change. Mutating store operations assert the expected version and
/// fail with a conflict when another writer got there first; the engine
/// never holds locks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// The version a freshly created record starts at.
    pub const INITIAL: Self = Self(0);

    /// Create a `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The next version (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

// ============================================================================
// Money (minor units, to keep pricing off floating point)
// ============================================================================

/// An amount in a currency's minor units (cents).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Zero amount.
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from minor units.
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole currency units, checking overflow.
    #[must_use]
    pub const fn checked_from_dollars(dollars: u64) -> Option<Self> {
        match dollars.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Creates a `Money` value from whole currency units.
    ///
    /// # Panics
    ///
    /// Panics on overflow (`dollars * 100 > u64::MAX`). Use
    /// [`Money::checked_from_dollars`] for a non-panicking conversion.
    #[must_use]
    #[allow(clippy::panic)]
    pub const fn from_dollars(dollars: u64) -> Self {
        match Self::checked_from_dollars(dollars) {
            Some(money) => money,
            None => panic!("Money::from_dollars overflow"),
        }
    }

    /// The amount in minor units.
    #[must_use]
    pub const fn cents(self) -> u64 {
        self.0
    }

    /// Whether the amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts, checking overflow.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Rate schedule
// ============================================================================

/// What part of the week a rate entry applies to.
///
/// Times are venue-local (interpreted in the resource's timezone).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateApplies {
    /// Applies from this time-of-day until the next time-of-day boundary or
    /// venue-local midnight, whichever comes first.
    TimeOfDayFrom(NaiveTime),
    /// Applies to the whole named weekday, wherever no time-of-day entry
    /// resolves.
    DayOfWeek(Weekday),
}

/// A single rate-schedule entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateEntry {
    /// When this entry applies.
    pub applies: RateApplies,
    /// Hourly price while it applies.
    pub price_per_hour: Money,
}

/// A resource's hourly rates.
///
/// Resolution for a venue-local instant is deterministic, so exactly one
/// rate resolves (or none, which prices as "no rate defined"):
///
/// 1. the time-of-day entry with the latest `from` not after the instant's
///    time-of-day, if any;
/// 2. otherwise the first day-of-week entry matching the instant's weekday;
/// 3. otherwise the default rate, if one is set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSchedule {
    entries: Vec<RateEntry>,
    default_rate: Option<Money>,
}

impl RateSchedule {
    /// Create a schedule from entries and an optional default rate.
    #[must_use]
    pub const fn new(entries: Vec<RateEntry>, default_rate: Option<Money>) -> Self {
        Self {
            entries,
            default_rate,
        }
    }

    /// A schedule that charges one flat hourly rate at all times.
    #[must_use]
    pub const fn flat(rate: Money) -> Self {
        Self {
            entries: Vec::new(),
            default_rate: Some(rate),
        }
    }

    /// Resolve the hourly rate for a venue-local instant.
    #[must_use]
    pub fn resolve(&self, local: NaiveDateTime) -> Option<Money> {
        let time = local.time();
        let time_of_day = self
            .entries
            .iter()
            .filter_map(|entry| match entry.applies {
                RateApplies::TimeOfDayFrom(from) if from <= time => {
                    Some((from, entry.price_per_hour))
                }
                _ => None,
            })
            .max_by_key(|(from, _)| *from);
        if let Some((_, rate)) = time_of_day {
            return Some(rate);
        }

        let weekday = local.weekday();
        let day_rate = self.entries.iter().find_map(|entry| match entry.applies {
            RateApplies::DayOfWeek(day) if day == weekday => Some(entry.price_per_hour),
            _ => None,
        });
        day_rate.or(self.default_rate)
    }

    /// Distinct time-of-day boundaries in the schedule, sorted.
    ///
    /// Pricing splits a booked interval at each of these (plus venue-local
    /// midnights) so every sub-interval resolves to a single rate.
    #[must_use]
    pub fn time_of_day_boundaries(&self) -> Vec<NaiveTime> {
        let mut times: Vec<NaiveTime> = self
            .entries
            .iter()
            .filter_map(|entry| match entry.applies {
                RateApplies::TimeOfDayFrom(from) => Some(from),
                RateApplies::DayOfWeek(_) => None,
            })
            .collect();
        times.sort_unstable();
        times.dedup();
        times
    }
}

// ============================================================================
// Resource
// ============================================================================

/// Daily opening window, in venue-local time.
///
/// A resource without opening hours cannot be partitioned into booking
/// slots; `free_slots` yields nothing for it. A window where `open >= close`
/// is treated the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningHours {
    /// First bookable time-of-day.
    pub open: NaiveTime,
    /// Closing time-of-day (exclusive).
    pub close: NaiveTime,
}

/// A bookable venue.
///
/// Owned by a venue-owner account; only the owner mutates it (and its
/// maintenance blocks). `version` increments on every owner-side change so
/// that a commit priced against stale rates or blocks is detected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource identifier.
    pub id: ResourceId,
    /// Owning account (external identity).
    pub owner: RequesterId,
    /// Display name.
    pub name: String,
    /// Venue timezone; opening hours and rate boundaries are local to it.
    pub timezone: Tz,
    /// Maximum guest count per reservation.
    pub capacity: u32,
    /// Daily opening window, if the venue has one.
    pub opening_hours: Option<OpeningHours>,
    /// Hourly rates.
    pub rate_schedule: RateSchedule,
    /// Optimistic-concurrency token for owner-side changes.
    pub version: Version,
}

// ============================================================================
// Reservation
// ============================================================================

/// Lifecycle status of a reservation.
///
/// Permitted transitions: `Pending → Confirmed` (external payment capture),
/// `Pending → Cancelled`, `Confirmed → Cancelled`. Nothing leaves
/// `Cancelled`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Committed but not yet paid; holds the interval.
    Pending,
    /// Paid; holds the interval.
    Confirmed,
    /// Released; the interval is free again.
    Cancelled,
}

impl ReservationStatus {
    /// Whether this status holds its interval against other bookings.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Storage string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Error type for [`ReservationStatus`] parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid reservation status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for ReservationStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested or confirmed booking of a resource for an interval.
///
/// The interval never changes after creation; cancellation changes `status`,
/// not the interval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation identifier.
    pub id: ReservationId,
    /// The booked resource.
    pub resource_id: ResourceId,
    /// Who requested the booking.
    pub requester: RequesterId,
    /// The booked time range.
    pub interval: Interval,
    /// Number of guests.
    pub guest_count: u32,
    /// Lifecycle status.
    pub status: ReservationStatus,
    /// Total amount due, as priced at commit time.
    pub total_amount: Money,
    /// When the reservation was committed.
    pub created_at: DateTime<Utc>,
    /// Optimistic-concurrency token, incremented on every state change.
    pub version: Version,
}

/// Owner-blocked time (maintenance, private use).
///
/// Blocks always bar new reservations but are never conflict-checked against
/// each other; overlapping blocks are allowed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedInterval {
    /// The blocked resource.
    pub resource_id: ResourceId,
    /// The blocked time range.
    pub interval: Interval,
    /// Owner-supplied reason, e.g. "maintenance".
    pub reason: String,
}

/// Convert a UTC instant to the venue-local wall clock.
#[must_use]
pub fn to_local(instant: DateTime<Utc>, tz: Tz) -> DateTime<Tz> {
    use chrono::TimeZone;
    tz.from_utc_datetime(&instant.naive_utc())
}
