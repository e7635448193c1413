//! In-crate test doubles for the store trait.
//!
//! A deliberately simple stub: enough to exercise the calculators and the
//! service pipeline in unit tests. The full-featured `InMemoryStore`
//! (seeding, failure injection, contract tests) lives in the
//! `bookable-testing` crate.

#![allow(clippy::unwrap_used)]

use crate::interval::Interval;
use crate::store::{NewReservation, ReservationStore, StoreError, StoreFuture};
use crate::types::{
    BlockedInterval, Money, OpeningHours, RateSchedule, RequesterId, Reservation, ReservationId,
    ReservationStatus, Resource, ResourceId, Version,
};
use chrono::{NaiveTime, Utc};
use chrono_tz::Tz;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A venue open 08:00-22:00 UTC at a flat 40.00/hour, capacity 12.
pub(crate) fn test_resource() -> Resource {
    Resource {
        id: ResourceId::new(),
        owner: RequesterId::from("owner-1"),
        name: "Hall-1".to_string(),
        timezone: Tz::UTC,
        capacity: 12,
        opening_hours: Some(OpeningHours {
            open: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
        }),
        rate_schedule: RateSchedule::flat(Money::from_dollars(40)),
        version: Version::INITIAL,
    }
}

/// Single-resource stub store.
pub(crate) struct StubStore {
    resource: Resource,
    reservations: Mutex<Vec<Reservation>>,
    blocks: Mutex<Vec<BlockedInterval>>,
    fail_next: AtomicBool,
}

impl StubStore {
    pub(crate) fn new(resource: Resource) -> Self {
        Self {
            resource,
            reservations: Mutex::new(Vec::new()),
            blocks: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Seed an existing reservation, bypassing validation.
    pub(crate) fn seed_reservation(
        &self,
        requester: &str,
        interval: Interval,
        status: ReservationStatus,
    ) -> Reservation {
        let reservation = Reservation {
            id: ReservationId::new(),
            resource_id: self.resource.id,
            requester: RequesterId::from(requester),
            interval,
            guest_count: 2,
            status,
            total_amount: Money::from_dollars(80),
            created_at: Utc::now(),
            version: Version::INITIAL,
        };
        self.reservations.lock().unwrap().push(reservation.clone());
        reservation
    }

    pub(crate) fn seed_block(&self, interval: Interval, reason: &str) {
        self.blocks.lock().unwrap().push(BlockedInterval {
            resource_id: self.resource.id,
            interval,
            reason: reason.to_string(),
        });
    }

    /// Make the next store call fail with `Unavailable`.
    pub(crate) fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn injected_failure(&self) -> Option<StoreError> {
        self.fail_next
            .swap(false, Ordering::SeqCst)
            .then(|| StoreError::Unavailable("injected failure".to_string()))
    }

    fn check_resource(&self, resource_id: ResourceId) -> Result<(), StoreError> {
        if resource_id == self.resource.id {
            Ok(())
        } else {
            Err(StoreError::ResourceNotFound(resource_id))
        }
    }
}

impl ReservationStore for StubStore {
    fn get_resource(&self, resource_id: ResourceId) -> StoreFuture<'_, Resource> {
        let result = self
            .injected_failure()
            .map_or_else(|| self.check_resource(resource_id).map(|()| self.resource.clone()), Err);
        Box::pin(async move { result })
    }

    fn list_reservations(
        &self,
        resource_id: ResourceId,
        window: Interval,
    ) -> StoreFuture<'_, Vec<Reservation>> {
        let result = self.injected_failure().map_or_else(
            || {
                Ok(self
                    .reservations
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|r| {
                        r.resource_id == resource_id
                            && r.status.is_active()
                            && r.interval.overlaps(&window)
                    })
                    .cloned()
                    .collect())
            },
            Err,
        );
        Box::pin(async move { result })
    }

    fn list_blocks(
        &self,
        resource_id: ResourceId,
        window: Interval,
    ) -> StoreFuture<'_, Vec<BlockedInterval>> {
        let result = self.injected_failure().map_or_else(
            || {
                Ok(self
                    .blocks
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|b| b.resource_id == resource_id && b.interval.overlaps(&window))
                    .cloned()
                    .collect())
            },
            Err,
        );
        Box::pin(async move { result })
    }

    fn try_commit(
        &self,
        reservation: NewReservation,
        expected_resource_version: Option<Version>,
    ) -> StoreFuture<'_, Reservation> {
        let result = (|| {
            if let Some(error) = self.injected_failure() {
                return Err(error);
            }
            self.check_resource(reservation.resource_id)?;
            if let Some(expected) = expected_resource_version {
                if expected != self.resource.version {
                    return Err(StoreError::VersionConflict {
                        expected,
                        actual: self.resource.version,
                    });
                }
            }

            let mut reservations = self.reservations.lock().unwrap();
            let blocked = self
                .blocks
                .lock()
                .unwrap()
                .iter()
                .any(|b| b.interval.overlaps(&reservation.interval));
            let taken = reservations
                .iter()
                .any(|r| r.status.is_active() && r.interval.overlaps(&reservation.interval));
            if blocked || taken {
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
            reservations.push(persisted.clone());
            Ok(persisted)
        })();
        Box::pin(async move { result })
    }

    fn find_reservation(&self, reservation_id: ReservationId) -> StoreFuture<'_, Reservation> {
        let result = self.injected_failure().map_or_else(
            || {
                self.reservations
                    .lock()
                    .unwrap()
                    .iter()
                    .find(|r| r.id == reservation_id)
                    .cloned()
                    .ok_or(StoreError::ReservationNotFound(reservation_id))
            },
            Err,
        );
        Box::pin(async move { result })
    }

    fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
        expected_version: Version,
    ) -> StoreFuture<'_, Reservation> {
        let result = (|| {
            if let Some(error) = self.injected_failure() {
                return Err(error);
            }
            let mut reservations = self.reservations.lock().unwrap();
            let reservation = reservations
                .iter_mut()
                .find(|r| r.id == reservation_id)
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
        })();
        Box::pin(async move { result })
    }

    fn confirm_reservation(
        &self,
        reservation_id: ReservationId,
        expected_version: Version,
    ) -> StoreFuture<'_, Reservation> {
        let result = (|| {
            if let Some(error) = self.injected_failure() {
                return Err(error);
            }
            let mut reservations = self.reservations.lock().unwrap();
            let reservation = reservations
                .iter_mut()
                .find(|r| r.id == reservation_id)
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
        })();
        Box::pin(async move { result })
    }

    fn insert_block(&self, block: BlockedInterval) -> StoreFuture<'_, BlockedInterval> {
        let result = (|| {
            if let Some(error) = self.injected_failure() {
                return Err(error);
            }
            self.check_resource(block.resource_id)?;
            self.blocks.lock().unwrap().push(block.clone());
            Ok(block)
        })();
        Box::pin(async move { result })
    }
}
