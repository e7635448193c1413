//! In-memory reservation store.
//!
//! A complete [`ReservationStore`] holding everything behind one mutex, so
//! every write is atomic by construction. Check-and-insert happens under
//! the lock, which gives `try_commit` the same one-winner guarantee a
//! database exclusion constraint provides. Intended for unit and
//! integration tests; supports seeding resources and injecting failures.

use bookable_core::{
    BlockedInterval, Interval, NewReservation, Reservation, ReservationId, ReservationStatus,
    ReservationStore, Resource, ResourceId, StoreError, StoreFuture, Version,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    resources: HashMap<ResourceId, Resource>,
    reservations: HashMap<ReservationId, Reservation>,
    blocks: Vec<BlockedInterval>,
    fail_next: Option<StoreError>,
}

/// Deterministic in-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource and return its id.
    pub fn add_resource(&self, resource: Resource) -> ResourceId {
        let id = resource.id;
        self.with_state(|state| state.resources.insert(id, resource));
        id
    }

    /// Make the next store operation fail with `error`.
    ///
    /// The failure is consumed by exactly one operation; subsequent calls
    /// behave normally.
    pub fn fail_next_with(&self, error: StoreError) {
        self.with_state(|state| state.fail_next = Some(error));
    }

    /// Number of reservations held, in any status.
    pub fn reservation_count(&self) -> usize {
        self.with_state(|state| state.reservations.len())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        // Tests that poison the lock have already failed; propagate.
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn run<T>(&self, f: impl FnOnce(&mut State) -> Result<T, StoreError>) -> Result<T, StoreError> {
        self.with_state(|state| {
            if let Some(error) = state.fail_next.take() {
                return Err(error);
            }
            f(state)
        })
    }
}

fn conflicts(state: &State, candidate: &NewReservation) -> bool {
    let blocked = state
        .blocks
        .iter()
        .any(|b| b.resource_id == candidate.resource_id && b.interval.overlaps(&candidate.interval));
    let taken = state.reservations.values().any(|r| {
        r.resource_id == candidate.resource_id
            && r.status.is_active()
            && r.interval.overlaps(&candidate.interval)
    });
    blocked || taken
}

impl ReservationStore for InMemoryStore {
    fn get_resource(&self, resource_id: ResourceId) -> StoreFuture<'_, Resource> {
        let result = self.run(|state| {
            state
                .resources
                .get(&resource_id)
                .cloned()
                .ok_or(StoreError::ResourceNotFound(resource_id))
        });
        Box::pin(async move { result })
    }

    fn list_reservations(
        &self,
        resource_id: ResourceId,
        window: Interval,
    ) -> StoreFuture<'_, Vec<Reservation>> {
        let result = self.run(|state| {
            Ok(state
                .reservations
                .values()
                .filter(|r| {
                    r.resource_id == resource_id
                        && r.status.is_active()
                        && r.interval.overlaps(&window)
                })
                .cloned()
                .collect())
        });
        Box::pin(async move { result })
    }

    fn list_blocks(
        &self,
        resource_id: ResourceId,
        window: Interval,
    ) -> StoreFuture<'_, Vec<BlockedInterval>> {
        let result = self.run(|state| {
            Ok(state
                .blocks
                .iter()
                .filter(|b| b.resource_id == resource_id && b.interval.overlaps(&window))
                .cloned()
                .collect())
        });
        Box::pin(async move { result })
    }

    fn try_commit(
        &self,
        reservation: NewReservation,
        expected_resource_version: Option<Version>,
    ) -> StoreFuture<'_, Reservation> {
        let result = self.run(|state| {
            let resource = state
                .resources
                .get(&reservation.resource_id)
                .ok_or(StoreError::ResourceNotFound(reservation.resource_id))?;
            if let Some(expected) = expected_resource_version {
                if expected != resource.version {
                    return Err(StoreError::VersionConflict {
                        expected,
                        actual: resource.version,
                    });
                }
            }
            if conflicts(state, &reservation) {
                return Err(StoreError::Conflict {
                    resource_id: reservation.resource_id,
                    interval: reservation.interval,
                });
            }

            let persisted = Reservation {
                id: ReservationId::new(),
                resource_id: reservation.resource_id,
                requester: reservation.requester,
                interval: reservation.interval,
                guest_count: reservation.guest_count,
                status: ReservationStatus::Pending,
                total_amount: reservation.total_amount,
                created_at: Utc::now(),
                version: Version::INITIAL,
            };
            state.reservations.insert(persisted.id, persisted.clone());
            Ok(persisted)
        });
        Box::pin(async move { result })
    }

    fn find_reservation(&self, reservation_id: ReservationId) -> StoreFuture<'_, Reservation> {
        let result = self.run(|state| {
            state
                .reservations
                .get(&reservation_id)
                .cloned()
                .ok_or(StoreError::ReservationNotFound(reservation_id))
        });
        Box::pin(async move { result })
    }

    fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
        expected_version: Version,
    ) -> StoreFuture<'_, Reservation> {
        let result = self.run(|state| {
            let reservation = state
                .reservations
                .get_mut(&reservation_id)
                .ok_or(StoreError::ReservationNotFound(reservation_id))?;
            if reservation.status == ReservationStatus::Cancelled {
                return Ok(reservation.clone());
            }
            if reservation.version != expected_version {
                return Err(StoreError::VersionConflict {
                    expected: expected_version,
                    actual: reservation.version,
                });
            }
            reservation.status = ReservationStatus::Cancelled;
            reservation.version = reservation.version.next();
            Ok(reservation.clone())
        });
        Box::pin(async move { result })
    }

    fn confirm_reservation(
        &self,
        reservation_id: ReservationId,
        expected_version: Version,
    ) -> StoreFuture<'_, Reservation> {
        let result = self.run(|state| {
            let reservation = state
                .reservations
                .get_mut(&reservation_id)
                .ok_or(StoreError::ReservationNotFound(reservation_id))?;
            if reservation.status != ReservationStatus::Pending {
                return Err(StoreError::InvalidTransition {
                    id: reservation_id,
                    status: reservation.status,
                });
            }
            if reservation.version != expected_version {
                return Err(StoreError::VersionConflict {
                    expected: expected_version,
                    actual: reservation.version,
                });
            }
            reservation.status = ReservationStatus::Confirmed;
            reservation.version = reservation.version.next();
            Ok(reservation.clone())
        });
        Box::pin(async move { result })
    }

    fn insert_block(&self, block: BlockedInterval) -> StoreFuture<'_, BlockedInterval> {
        let result = self.run(|state| {
            let resource = state
                .resources
                .get_mut(&block.resource_id)
                .ok_or(StoreError::ResourceNotFound(block.resource_id))?;
            // Invalidates commits priced against the previous state.
            resource.version = resource.version.next();
            state.blocks.push(block.clone());
            Ok(block)
        });
        Box::pin(async move { result })
    }
}
