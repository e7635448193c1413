//! Reservation orchestration.
//!
//! [`ReservationService`] drives each booking attempt through a fixed
//! pipeline: validate the request, check availability (advisory), price the
//! interval, then hand the authoritative conflict decision to the store's
//! atomic commit. The two-phase shape is deliberate: the advisory check can
//! race with a concurrent booking between read and write, so only
//! [`ReservationStore::try_commit`] decides. A lost race surfaces as
//! [`ReservationError::SlotConflict`] and the service does **not** retry or
//! offer alternate slots; the caller re-requests against fresh
//! availability.
//!
//! The service holds no locks and no mutable state; it is safe to share
//! (`Clone`) and to call concurrently from any number of tasks.

use crate::availability::AvailabilityCalculator;
use crate::environment::Clock;
use crate::interval::{Interval, IntervalError};
use crate::pricing::{self, PricingError};
use crate::store::{NewReservation, ReservationStore, StoreError};
use crate::types::{
    BlockedInterval, RequesterId, Reservation, ReservationId, ReservationStatus, ResourceId,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Why a reservation attempt (or transition) was rejected.
///
/// Only [`ReservationError::SlotConflict`] and
/// [`ReservationError::StoreUnavailable`] are worth retrying, and then only
/// after a fresh availability check; every other kind indicates a malformed
/// or unauthorized request that will fail identically if resent unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReservationError {
    /// The requested interval is not a valid half-open range.
    #[error("invalid interval: {0}")]
    InvalidInterval(#[from] IntervalError),

    /// The guest count is outside the resource's capacity bounds.
    #[error("guest count {requested} is outside capacity 1..={capacity}")]
    CapacityExceeded {
        /// Requested number of guests.
        requested: u32,
        /// The resource's maximum.
        capacity: u32,
    },

    /// The requested start is not in the future.
    #[error("requested start {start} is not in the future")]
    PastDateRequested {
        /// The offending start instant.
        start: DateTime<Utc>,
    },

    /// Part of the interval has no rate and the schedule has no default.
    #[error("no rate defined for {at}")]
    NoRateDefined {
        /// Start of the first unpriceable sub-interval.
        at: DateTime<Utc>,
    },

    /// The slot was taken by a concurrent booking (race lost at commit),
    /// or was already busy at the advisory check.
    #[error("the requested slot is no longer available")]
    SlotConflict,

    /// The actor may not perform this operation on this reservation.
    #[error("actor {actor} is not authorized for this operation")]
    NotAuthorized {
        /// The rejected actor.
        actor: RequesterId,
    },

    /// The reservation's lifecycle does not permit the transition.
    #[error("reservation {id} cannot leave status {status}")]
    InvalidTransition {
        /// The reservation.
        id: ReservationId,
        /// Its current status.
        status: ReservationStatus,
    },

    /// No such resource.
    #[error("resource not found: {0}")]
    UnknownResource(ResourceId),

    /// No such reservation.
    #[error("reservation not found: {0}")]
    UnknownReservation(ReservationId),

    /// The storage collaborator failed or timed out.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl ReservationError {
    /// Whether a caller may reasonably retry after a fresh availability
    /// check.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::SlotConflict | Self::StoreUnavailable(_))
    }
}

impl From<StoreError> for ReservationError {
    fn from(error: StoreError) -> Self {
        match error {
            // Both flavors of commit-time race collapse to the same
            // caller-facing answer: somebody else moved first, re-request.
            StoreError::Conflict { .. } | StoreError::VersionConflict { .. } => Self::SlotConflict,
            StoreError::InvalidTransition { id, status } => Self::InvalidTransition { id, status },
            StoreError::ResourceNotFound(id) => Self::UnknownResource(id),
            StoreError::ReservationNotFound(id) => Self::UnknownReservation(id),
            StoreError::Unavailable(detail) => Self::StoreUnavailable(detail),
        }
    }
}

impl From<PricingError> for ReservationError {
    fn from(error: PricingError) -> Self {
        match error {
            PricingError::NoRateDefined { at } => Self::NoRateDefined { at },
        }
    }
}

/// A booking request, as received from the caller.
///
/// Bounds arrive as raw instants (not a pre-built [`Interval`]) so that a
/// malformed range is rejected by the service with
/// [`ReservationError::InvalidInterval`] rather than at some earlier
/// construction site the caller has to find.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservationRequest {
    /// The resource to book.
    pub resource_id: ResourceId,
    /// Who is booking (from the identity provider).
    pub requester: RequesterId,
    /// Requested start instant.
    pub start: DateTime<Utc>,
    /// Requested end instant (exclusive).
    pub end: DateTime<Utc>,
    /// Number of guests.
    pub guest_count: u32,
}

/// Orchestrates reservation attempts over a store and a clock.
#[derive(Clone)]
pub struct ReservationService {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    availability: AvailabilityCalculator,
}

impl ReservationService {
    /// Create a service over the given collaborators.
    #[must_use]
    pub fn new(store: Arc<dyn ReservationStore>, clock: Arc<dyn Clock>) -> Self {
        let availability = AvailabilityCalculator::new(Arc::clone(&store));
        Self {
            store,
            clock,
            availability,
        }
    }

    /// The read-side calculator sharing this service's store.
    #[must_use]
    pub const fn availability(&self) -> &AvailabilityCalculator {
        &self.availability
    }

    /// Attempt to reserve a slot.
    ///
    /// Pipeline: validate → advisory availability → price → atomic commit.
    /// On success the returned reservation has
    /// [`ReservationStatus::Pending`]; payment capture is a separate,
    /// external step that later calls [`Self::confirm`].
    ///
    /// # Errors
    ///
    /// - [`ReservationError::InvalidInterval`]: `start >= end`
    /// - [`ReservationError::UnknownResource`]: no such resource
    /// - [`ReservationError::CapacityExceeded`]: guest count out of bounds
    /// - [`ReservationError::PastDateRequested`]: start not in the future
    /// - [`ReservationError::NoRateDefined`]: unpriceable interval
    /// - [`ReservationError::SlotConflict`]: busy, or race lost at commit
    /// - [`ReservationError::StoreUnavailable`]: collaborator failure
    pub async fn reserve(
        &self,
        request: ReservationRequest,
    ) -> Result<Reservation, ReservationError> {
        // Validating
        let interval = Interval::new(request.start, request.end)?;
        let resource = self.store.get_resource(request.resource_id).await?;
        if request.guest_count == 0 || request.guest_count > resource.capacity {
            return Err(ReservationError::CapacityExceeded {
                requested: request.guest_count,
                capacity: resource.capacity,
            });
        }
        if interval.start() <= self.clock.now() {
            return Err(ReservationError::PastDateRequested {
                start: interval.start(),
            });
        }
        if !self
            .availability
            .is_available(resource.id, &interval)
            .await?
        {
            return Err(ReservationError::SlotConflict);
        }

        // Pricing
        let total_amount = pricing::price(&resource, &interval)?;

        // Committing. The expected resource version pins the rates and
        // blocks the amount was computed against.
        let reservation = self
            .store
            .try_commit(
                NewReservation {
                    resource_id: resource.id,
                    requester: request.requester,
                    interval,
                    guest_count: request.guest_count,
                    total_amount,
                },
                Some(resource.version),
            )
            .await?;
        Ok(reservation)
    }

    /// Cancel a reservation on behalf of `by`.
    ///
    /// Permitted for the original requester and for the resource owner;
    /// anyone else gets [`ReservationError::NotAuthorized`] regardless of
    /// the reservation's state. For an authorized caller the operation is
    /// idempotent: cancelling an already-cancelled reservation returns it
    /// unchanged. On success the interval is released immediately, so a
    /// commit issued after this returns can take it.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::UnknownReservation`]: no such reservation
    /// - [`ReservationError::NotAuthorized`]: `by` is neither requester
    ///   nor owner
    /// - [`ReservationError::SlotConflict`]: a concurrent state change won
    /// - [`ReservationError::StoreUnavailable`]: collaborator failure
    pub async fn cancel(
        &self,
        reservation_id: ReservationId,
        by: &RequesterId,
    ) -> Result<Reservation, ReservationError> {
        let reservation = self.store.find_reservation(reservation_id).await?;
        let resource = self.store.get_resource(reservation.resource_id).await?;
        // Authorization comes first: an unauthorized caller learns nothing
        // about the reservation, not even that it is already cancelled.
        if *by != reservation.requester && *by != resource.owner {
            return Err(ReservationError::NotAuthorized { actor: by.clone() });
        }
        if reservation.status == ReservationStatus::Cancelled {
            return Ok(reservation);
        }
        let cancelled = self
            .store
            .cancel_reservation(reservation_id, reservation.version)
            .await?;
        Ok(cancelled)
    }

    /// Mark a pending reservation as paid (`Pending → Confirmed`).
    ///
    /// Called by the surrounding application after the external payment
    /// collaborator captures payment. Idempotent for already-confirmed
    /// reservations, since payment processors redeliver callbacks.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::UnknownReservation`]: no such reservation
    /// - [`ReservationError::InvalidTransition`]: the reservation was
    ///   cancelled in the meantime
    /// - [`ReservationError::SlotConflict`]: a concurrent state change won
    /// - [`ReservationError::StoreUnavailable`]: collaborator failure
    pub async fn confirm(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Reservation, ReservationError> {
        let reservation = self.store.find_reservation(reservation_id).await?;
        match reservation.status {
            ReservationStatus::Confirmed => Ok(reservation),
            ReservationStatus::Pending => Ok(self
                .store
                .confirm_reservation(reservation_id, reservation.version)
                .await?),
            ReservationStatus::Cancelled => Err(ReservationError::InvalidTransition {
                id: reservation_id,
                status: ReservationStatus::Cancelled,
            }),
        }
    }

    /// Block time on a resource (maintenance, private use).
    ///
    /// Owner-only. Blocks may overlap each other freely; inserting one
    /// bumps the resource version, which invalidates any in-flight commit
    /// priced against the previous state.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::InvalidInterval`]: `start >= end`
    /// - [`ReservationError::UnknownResource`]: no such resource
    /// - [`ReservationError::NotAuthorized`]: `by` is not the owner
    /// - [`ReservationError::StoreUnavailable`]: collaborator failure
    pub async fn block(
        &self,
        resource_id: ResourceId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        reason: impl Into<String>,
        by: &RequesterId,
    ) -> Result<BlockedInterval, ReservationError> {
        let interval = Interval::new(start, end)?;
        let resource = self.store.get_resource(resource_id).await?;
        if *by != resource.owner {
            return Err(ReservationError::NotAuthorized { actor: by.clone() });
        }
        let block = self
            .store
            .insert_block(BlockedInterval {
                resource_id,
                interval,
                reason: reason.into(),
            })
            .await?;
        Ok(block)
    }
}
