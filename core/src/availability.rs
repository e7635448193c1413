//! Advisory availability queries.
//!
//! Answers "is this interval free?" and "which slots of this day are free?"
//! from the store's listings. Both answers are **advisory**: they can go
//! stale the moment a concurrent booking commits. The authoritative
//! conflict check lives in [`ReservationStore::try_commit`]; callers must
//! never treat a positive answer here as a guarantee that a subsequent
//! commit will succeed.

use crate::interval::Interval;
use crate::store::{ReservationStore, StoreError};
use crate::types::{Resource, ResourceId};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

/// Read-side calculator over a reservation store.
#[derive(Clone)]
pub struct AvailabilityCalculator {
    store: Arc<dyn ReservationStore>,
}

impl AvailabilityCalculator {
    /// Create a calculator reading from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ReservationStore>) -> Self {
        Self { store }
    }

    /// Whether `interval` overlaps no active reservation and no block.
    ///
    /// Idempotent: calling twice with no intervening commits yields the
    /// same answer.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the listings.
    pub async fn is_available(
        &self,
        resource_id: ResourceId,
        interval: &Interval,
    ) -> Result<bool, StoreError> {
        let busy = self.busy_intervals(resource_id, *interval).await?;
        Ok(!busy.iter().any(|taken| taken.overlaps(interval)))
    }

    /// Enumerate the free fixed-size slots of a venue-local day.
    ///
    /// The day is partitioned into `slot_size` slots starting at the
    /// venue's opening time; a slot is yielded only if it is fully free.
    /// A slot partially overlapping a reservation or block is unavailable
    /// in full, and a slot that would extend past closing time is not
    /// emitted. The returned sequence is lazy, finite, and recomputed on
    /// every call, so it always reflects the latest state known at call
    /// time.
    ///
    /// A resource without opening hours (or with an empty opening window)
    /// yields an empty sequence, not an error.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the listings.
    pub async fn free_slots(
        &self,
        resource: &Resource,
        day: NaiveDate,
        slot_size: Duration,
    ) -> Result<FreeSlots, StoreError> {
        let Some(hours) = resource.opening_hours else {
            return Ok(FreeSlots::empty());
        };
        let Some(open) = local_instant(resource.timezone, day, hours.open) else {
            return Ok(FreeSlots::empty());
        };
        let Some(close) = local_instant(resource.timezone, day, hours.close) else {
            return Ok(FreeSlots::empty());
        };
        let Ok(window) = Interval::new(open, close) else {
            // open >= close: no bookable window that day.
            return Ok(FreeSlots::empty());
        };

        let busy = self.busy_intervals(resource.id, window).await?;
        Ok(FreeSlots {
            busy,
            cursor: open,
            close,
            step: slot_size,
        })
    }

    /// All intervals holding time within `window`: active reservations
    /// plus owner blocks.
    async fn busy_intervals(
        &self,
        resource_id: ResourceId,
        window: Interval,
    ) -> Result<Vec<Interval>, StoreError> {
        let reservations = self.store.list_reservations(resource_id, window).await?;
        let blocks = self.store.list_blocks(resource_id, window).await?;

        let mut busy: Vec<Interval> = reservations
            .iter()
            .filter(|reservation| reservation.status.is_active())
            .map(|reservation| reservation.interval)
            .collect();
        busy.extend(blocks.iter().map(|block| block.interval));
        Ok(busy)
    }
}

/// Resolve a venue-local date and time-of-day to a UTC instant.
///
/// Returns `None` for local times made nonexistent by a DST transition;
/// ambiguous times resolve to the earlier instant.
fn local_instant(tz: Tz, day: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&day.and_time(time))
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

/// Lazy, finite iterator over the free slots of one day.
///
/// Produced by [`AvailabilityCalculator::free_slots`]; never cached, each
/// call recomputes against fresh listings.
#[derive(Clone, Debug)]
pub struct FreeSlots {
    busy: Vec<Interval>,
    cursor: DateTime<Utc>,
    close: DateTime<Utc>,
    step: Duration,
}

impl FreeSlots {
    /// A sequence yielding nothing (closed day).
    fn empty() -> Self {
        Self {
            busy: Vec::new(),
            cursor: DateTime::UNIX_EPOCH,
            close: DateTime::UNIX_EPOCH,
            step: Duration::hours(1),
        }
    }
}

impl Iterator for FreeSlots {
    type Item = Interval;

    fn next(&mut self) -> Option<Interval> {
        loop {
            let end = self.cursor.checked_add_signed(self.step)?;
            if end > self.close {
                return None;
            }
            // A non-positive step produces an invalid slot; stop rather
            // than spin.
            let slot = Interval::new(self.cursor, end).ok()?;
            self.cursor = end;
            if !self.busy.iter().any(|taken| taken.overlaps(&slot)) {
                return Some(slot);
            }
        }
    }
}
