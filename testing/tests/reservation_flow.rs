//! End-to-end reservation flows over the in-memory store.

#![allow(clippy::unwrap_used)]

use bookable_core::{
    Interval, Money, NewReservation, RequesterId, ReservationError, ReservationRequest,
    ReservationService, ReservationStatus, ReservationStore, ResourceId, StoreError,
};
use bookable_testing::{fixtures, init_test_tracing, test_clock, InMemoryStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

fn instant(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn interval(start: &str, end: &str) -> Interval {
    Interval::new(instant(start), instant(end)).unwrap()
}

fn request(resource_id: ResourceId, start: &str, end: &str) -> ReservationRequest {
    ReservationRequest {
        resource_id,
        requester: RequesterId::from("guest-1"),
        start: instant(start),
        end: instant(end),
        guest_count: 2,
    }
}

fn setup() -> (Arc<InMemoryStore>, ResourceId, ReservationService) {
    init_test_tracing();
    let store = Arc::new(InMemoryStore::new());
    let resource_id = store.add_resource(fixtures::venue().build());
    let service = ReservationService::new(
        Arc::clone(&store) as Arc<dyn ReservationStore>,
        Arc::new(test_clock()),
    );
    (store, resource_id, service)
}

#[tokio::test]
async fn booking_lifecycle_pending_then_confirmed() {
    let (_store, resource_id, service) = setup();

    let reservation = service
        .reserve(request(resource_id, "2025-06-01T14:00:00Z", "2025-06-01T16:00:00Z"))
        .await
        .unwrap();
    assert_eq!(reservation.status, ReservationStatus::Pending);
    assert_eq!(reservation.total_amount, Money::from_dollars(80));

    let confirmed = service.confirm(reservation.id).await.unwrap();
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    assert_eq!(confirmed.version, reservation.version.next());
}

#[tokio::test]
async fn overlapping_booking_is_rejected_back_to_back_succeeds() {
    let (_store, resource_id, service) = setup();

    service
        .reserve(request(resource_id, "2025-06-01T14:00:00Z", "2025-06-01T16:00:00Z"))
        .await
        .unwrap();

    let overlapping = service
        .reserve(request(resource_id, "2025-06-01T15:00:00Z", "2025-06-01T17:00:00Z"))
        .await;
    assert_eq!(overlapping, Err(ReservationError::SlotConflict));

    // [16:00, 18:00) only touches the boundary of [14:00, 16:00).
    let adjacent = service
        .reserve(request(resource_id, "2025-06-01T16:00:00Z", "2025-06-01T18:00:00Z"))
        .await;
    assert!(adjacent.is_ok());
}

#[tokio::test]
async fn malformed_and_past_requests_are_rejected() {
    let (_store, resource_id, service) = setup();

    let empty = service
        .reserve(request(resource_id, "2025-06-01T14:00:00Z", "2025-06-01T14:00:00Z"))
        .await;
    assert!(matches!(empty, Err(ReservationError::InvalidInterval(_))));

    // The fixed clock reads 2025-01-01.
    let past = service
        .reserve(request(resource_id, "2024-12-01T14:00:00Z", "2024-12-01T16:00:00Z"))
        .await;
    assert!(matches!(past, Err(ReservationError::PastDateRequested { .. })));
}

#[tokio::test]
async fn cancelling_frees_the_interval_for_rebooking() {
    let (_store, resource_id, service) = setup();
    let guest = RequesterId::from("guest-1");

    let reservation = service
        .reserve(request(resource_id, "2025-06-01T14:00:00Z", "2025-06-01T16:00:00Z"))
        .await
        .unwrap();

    let cancelled = service.cancel(reservation.id, &guest).await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);

    // Same interval, new guest: goes through.
    let mut rebook = request(resource_id, "2025-06-01T14:00:00Z", "2025-06-01T16:00:00Z");
    rebook.requester = RequesterId::from("guest-2");
    let reservation = service.reserve(rebook).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Pending);
}

#[tokio::test]
async fn concurrent_commits_for_the_same_slot_have_one_winner() {
    let (store, resource_id, _service) = setup();
    let slot = interval("2025-06-01T14:00:00Z", "2025-06-01T16:00:00Z");

    let attempt = |guest: &str| {
        let store = Arc::clone(&store);
        let requester = RequesterId::from(guest);
        async move {
            store
                .try_commit(
                    NewReservation {
                        resource_id,
                        requester,
                        interval: slot,
                        guest_count: 2,
                        total_amount: Money::from_dollars(80),
                    },
                    None,
                )
                .await
        }
    };

    let first = tokio::spawn(attempt("guest-1"));
    let second = tokio::spawn(attempt("guest-2"));
    let results = [first.await.unwrap(), second.await.unwrap()];

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = results.into_iter().find(Result::is_err).unwrap();
    assert!(matches!(loser, Err(StoreError::Conflict { .. })));
    assert_eq!(store.reservation_count(), 1);
}

#[tokio::test]
async fn block_insertion_invalidates_stale_priced_commits() {
    let (store, resource_id, service) = setup();
    let owner = RequesterId::from("owner-1");

    // Capture the resource version a booking pipeline would have seen.
    let before = store.get_resource(resource_id).await.unwrap();

    // Owner blocks an unrelated morning slot; the resource version bumps.
    service
        .block(
            resource_id,
            instant("2025-06-01T08:00:00Z"),
            instant("2025-06-01T10:00:00Z"),
            "maintenance",
            &owner,
        )
        .await
        .unwrap();

    // A commit still asserting the old version is turned away even though
    // its interval is free.
    let stale = store
        .try_commit(
            NewReservation {
                resource_id,
                requester: RequesterId::from("guest-1"),
                interval: interval("2025-06-01T14:00:00Z", "2025-06-01T16:00:00Z"),
                guest_count: 2,
                total_amount: Money::from_dollars(80),
            },
            Some(before.version),
        )
        .await;
    assert!(matches!(stale, Err(StoreError::VersionConflict { .. })));

    // Re-running the full pipeline picks up the new version and succeeds.
    let retried = service
        .reserve(request(resource_id, "2025-06-01T14:00:00Z", "2025-06-01T16:00:00Z"))
        .await;
    assert!(retried.is_ok());
}

#[tokio::test]
async fn free_slots_reflect_bookings_and_blocks() {
    let (store, resource_id, service) = setup();
    let owner = RequesterId::from("owner-1");

    service
        .reserve(request(resource_id, "2025-06-01T14:00:00Z", "2025-06-01T16:00:00Z"))
        .await
        .unwrap();
    service
        .block(
            resource_id,
            instant("2025-06-01T18:00:00Z"),
            instant("2025-06-01T19:00:00Z"),
            "private event",
            &owner,
        )
        .await
        .unwrap();

    let resource = store.get_resource(resource_id).await.unwrap();
    let slots = service
        .availability()
        .free_slots(&resource, "2025-06-01".parse().unwrap(), Duration::hours(1))
        .await
        .unwrap();

    let starts: Vec<DateTime<Utc>> = slots.map(|slot| slot.start()).collect();
    // 14 opening hours minus three busy ones.
    assert_eq!(starts.len(), 11);
    assert!(!starts.contains(&instant("2025-06-01T14:00:00Z")));
    assert!(!starts.contains(&instant("2025-06-01T15:00:00Z")));
    assert!(!starts.contains(&instant("2025-06-01T18:00:00Z")));
}

#[tokio::test]
async fn injected_store_failure_surfaces_as_store_unavailable() {
    let (store, resource_id, service) = setup();

    store.fail_next_with(StoreError::Unavailable("connection reset".to_string()));
    let result = service
        .reserve(request(resource_id, "2025-06-01T14:00:00Z", "2025-06-01T16:00:00Z"))
        .await;
    assert!(matches!(result, Err(ReservationError::StoreUnavailable(_))));
    assert!(result.unwrap_err().is_retryable());
}
