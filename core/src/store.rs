//! Reservation store trait and related types.
//!
//! This module defines the core abstraction over the storage collaborator:
//! load a resource and its existing reservations and blocks for a window,
//! and attempt to commit or transition a reservation with conflict detection.
//!
//! # Design
//!
//! The read operations (`get_resource`, `list_reservations`, `list_blocks`,
//! `find_reservation`) are advisory: they may be stale by the time a caller
//! acts on them, and no synchronization is required around them. The write
//! operations carry the correctness requirement of the whole engine:
//!
//! - [`ReservationStore::try_commit`] MUST be atomic with respect to overlap
//!   checking at the storage layer (a database exclusion constraint or a
//!   serializable transaction, never check-then-write in application code).
//!   Two concurrent commits for overlapping intervals on the same resource
//!   must resolve to exactly one success and one [`StoreError::Conflict`].
//! - [`ReservationStore::cancel_reservation`] and
//!   [`ReservationStore::confirm_reservation`] assert an expected version
//!   (optimistic concurrency) and must make the state change visible before
//!   returning; in particular a cancelled interval is immediately free for
//!   subsequent commits.
//!
//! # Implementations
//!
//! - `PostgresStore` (in `bookable-postgres`): production implementation
//! - `InMemoryStore` (in `bookable-testing`): fast, deterministic testing
//!
//! # Dyn Compatibility
//!
//! The trait uses explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` so it can be used as a trait object
//! (`Arc<dyn ReservationStore>`) held by the reservation service.

use crate::interval::Interval;
use crate::types::{
    BlockedInterval, Money, RequesterId, Reservation, ReservationId, ReservationStatus, Resource,
    ResourceId, Version,
};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors surfaced by a reservation store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The requested interval overlaps an active reservation or a block.
    ///
    /// This is the authoritative double-booking rejection: it is raised at
    /// commit time by the storage layer's own constraint, after any advisory
    /// availability check has already passed.
    #[error("interval {interval} conflicts with an existing booking on {resource_id}")]
    Conflict {
        /// The contested resource.
        resource_id: ResourceId,
        /// The interval that lost the race.
        interval: Interval,
    },

    /// Optimistic concurrency conflict: expected version doesn't match.
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict {
        /// The version the caller expected.
        expected: Version,
        /// The version actually stored.
        actual: Version,
    },

    /// The reservation is not in a status that permits the transition.
    #[error("reservation {id} cannot leave status {status}")]
    InvalidTransition {
        /// The reservation.
        id: ReservationId,
        /// Its current status.
        status: ReservationStatus,
    },

    /// No resource with this id.
    #[error("resource not found: {0}")]
    ResourceNotFound(ResourceId),

    /// No reservation with this id.
    #[error("reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The store could not be reached or timed out.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A reservation to be committed.
///
/// Built by the reservation service after validation and pricing; the store
/// assigns the id, the `Pending` status, the creation timestamp, and the
/// initial version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewReservation {
    /// The resource to book.
    pub resource_id: ResourceId,
    /// Who is booking.
    pub requester: RequesterId,
    /// The requested time range.
    pub interval: Interval,
    /// Number of guests.
    pub guest_count: u32,
    /// Amount due, as priced against the resource the caller loaded.
    pub total_amount: Money,
}

/// Storage collaborator for resources, reservations, and blocks.
///
/// Implementations must be `Send + Sync`; all operations must be safe under
/// concurrent invocation from multiple callers targeting the same resource.
/// No operation may block indefinitely; an unreachable backend surfaces as
/// [`StoreError::Unavailable`] within the implementation's own deadline.
pub trait ReservationStore: Send + Sync {
    /// Load a resource.
    ///
    /// # Errors
    ///
    /// [`StoreError::ResourceNotFound`] if the id is unknown,
    /// [`StoreError::Unavailable`] on backend failure.
    fn get_resource(&self, resource_id: ResourceId) -> StoreFuture<'_, Resource>;

    /// List non-cancelled reservations overlapping `window`.
    ///
    /// Includes `Pending` and `Confirmed`; excludes `Cancelled`. Advisory:
    /// the result may be stale by the time the caller acts on it.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] on backend failure.
    fn list_reservations(
        &self,
        resource_id: ResourceId,
        window: Interval,
    ) -> StoreFuture<'_, Vec<Reservation>>;

    /// List owner blocks overlapping `window`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] on backend failure.
    fn list_blocks(
        &self,
        resource_id: ResourceId,
        window: Interval,
    ) -> StoreFuture<'_, Vec<BlockedInterval>>;

    /// Atomically commit a new reservation if and only if it conflicts with
    /// no active reservation or block.
    ///
    /// `expected_resource_version` implements optimistic concurrency against
    /// owner-side changes: `Some(v)` asserts the resource (its rates and
    /// blocks) is still at version `v`, so an amount priced against stale
    /// data cannot be committed. `None` skips the check.
    ///
    /// On success returns the persisted reservation with
    /// `status = Pending` and `version = Version::INITIAL`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`]: the interval lost the race
    /// - [`StoreError::VersionConflict`]: the resource changed under the caller
    /// - [`StoreError::ResourceNotFound`]: unknown resource
    /// - [`StoreError::Unavailable`]: backend failure or timeout
    fn try_commit(
        &self,
        reservation: NewReservation,
        expected_resource_version: Option<Version>,
    ) -> StoreFuture<'_, Reservation>;

    /// Load a single reservation by id.
    ///
    /// # Errors
    ///
    /// [`StoreError::ReservationNotFound`] if the id is unknown,
    /// [`StoreError::Unavailable`] on backend failure.
    fn find_reservation(&self, reservation_id: ReservationId) -> StoreFuture<'_, Reservation>;

    /// Atomically transition a reservation to `Cancelled` and bump its
    /// version, iff the stored version matches `expected_version`.
    ///
    /// The freed interval must be visible to subsequent [`Self::try_commit`]
    /// calls before this returns. Cancelling an already-cancelled
    /// reservation returns it unchanged.
    ///
    /// # Errors
    ///
    /// - [`StoreError::VersionConflict`]: concurrent state change
    /// - [`StoreError::ReservationNotFound`]: unknown reservation
    /// - [`StoreError::Unavailable`]: backend failure
    fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
        expected_version: Version,
    ) -> StoreFuture<'_, Reservation>;

    /// Atomically transition a reservation from `Pending` to `Confirmed`
    /// and bump its version, iff the stored version matches.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidTransition`]: the reservation is not `Pending`
    /// - [`StoreError::VersionConflict`]: concurrent state change
    /// - [`StoreError::ReservationNotFound`]: unknown reservation
    /// - [`StoreError::Unavailable`]: backend failure
    fn confirm_reservation(
        &self,
        reservation_id: ReservationId,
        expected_version: Version,
    ) -> StoreFuture<'_, Reservation>;

    /// Insert an owner block and bump the resource version.
    ///
    /// Blocks are never conflict-checked against each other; overlapping
    /// blocks are permitted. The version bump invalidates in-flight commits
    /// that priced against the previous state of the resource.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ResourceNotFound`]: unknown resource
    /// - [`StoreError::Unavailable`]: backend failure
    fn insert_block(&self, block: BlockedInterval) -> StoreFuture<'_, BlockedInterval>;
}
