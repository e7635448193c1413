//! # Bookable Core
//!
//! The availability and reservation engine: intervals, availability
//! queries, rate-schedule pricing, and the reservation lifecycle, all over
//! an abstract storage collaborator.
//!
//! ## Core Concepts
//!
//! - **Interval**: a half-open `[start, end)` time range in UTC
//! - **Resource**: a bookable venue with capacity, opening hours, a
//!   timezone, and a rate schedule
//! - **ReservationStore**: the storage trait; its `try_commit` is the
//!   single authoritative double-booking check
//! - **AvailabilityCalculator**: advisory reads (`is_available`,
//!   `free_slots`)
//! - **ReservationService**: the booking pipeline
//!   (validate → check → price → commit) plus cancel, confirm, and block
//!
//! ## Concurrency Model
//!
//! Availability answers are advisory and may go stale; conflicts are
//! decided once, atomically, inside the store. State transitions use
//! optimistic versioning. Of the error taxonomy only
//! [`ReservationError::SlotConflict`] and
//! [`ReservationError::StoreUnavailable`] are retryable.
//!
//! ## Example
//!
//! ```ignore
//! use bookable_core::{ReservationRequest, ReservationService, SystemClock};
//! use std::sync::Arc;
//!
//! let service = ReservationService::new(store, Arc::new(SystemClock));
//! let reservation = service
//!     .reserve(ReservationRequest {
//!         resource_id,
//!         requester,
//!         start,
//!         end,
//!         guest_count: 4,
//!     })
//!     .await?;
//! ```

pub mod availability;
pub mod environment;
pub mod interval;
pub mod pricing;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use availability::{AvailabilityCalculator, FreeSlots};
pub use environment::{Clock, SystemClock};
pub use interval::{Interval, IntervalError};
pub use pricing::{price, PricingError};
pub use service::{ReservationError, ReservationRequest, ReservationService};
pub use store::{NewReservation, ReservationStore, StoreError, StoreFuture};
pub use types::{
    BlockedInterval, Money, OpeningHours, RateApplies, RateEntry, RateSchedule, RequesterId,
    Reservation, ReservationId, ReservationStatus, Resource, ResourceId, Version,
};
