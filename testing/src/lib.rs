//! # Bookable Testing
//!
//! Testing utilities for the Bookable reservation engine.
//!
//! This crate provides:
//! - [`mocks::FixedClock`]: deterministic time
//! - [`InMemoryStore`]: a full, atomic [`ReservationStore`] over a mutex,
//!   with seeding and failure injection
//! - [`fixtures`]: builders for common test resources
//!
//! ## Example
//!
//! ```ignore
//! use bookable_core::ReservationService;
//! use bookable_testing::{fixtures, test_clock, InMemoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn test_booking_flow() {
//!     let store = Arc::new(InMemoryStore::new());
//!     let hall = store.add_resource(fixtures::venue().build());
//!     let service = ReservationService::new(store, Arc::new(test_clock()));
//!     // ...
//! }
//! ```

mod memory_store;

pub use memory_store::InMemoryStore;

/// Mock implementations of engine collaborators.
pub mod mocks {
    use bookable_core::Clock;
    use chrono::{DateTime, Utc};

    /// A clock pinned to one instant.
    ///
    /// The reservation service consults its clock to reject past-dated
    /// requests; pinning it keeps that check deterministic no matter when
    /// the suite runs.
    ///
    /// # Example
    ///
    /// ```
    /// use bookable_testing::mocks::FixedClock;
    /// use bookable_core::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Pin the clock to `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// The suite's default clock: 2025-01-01 00:00:00 UTC.
    ///
    /// Fixtures book intervals later in 2025, so they always read as
    /// future-dated against this instant.
    ///
    /// # Panics
    ///
    /// Only if the hardcoded timestamp were invalid, which it is not.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp is valid")
                .with_timezone(&Utc),
        )
    }
}

/// Builders for common test data.
pub mod fixtures {
    use bookable_core::{Money, OpeningHours, RateSchedule, RequesterId, Resource, ResourceId, Version};
    use chrono::NaiveTime;
    use chrono_tz::Tz;

    /// A venue builder with sensible defaults: "Hall-1", owner `owner-1`,
    /// UTC, capacity 12, open 08:00-22:00, flat 40.00/hour.
    #[derive(Debug, Clone)]
    pub struct VenueBuilder {
        resource: Resource,
    }

    /// Start building a test venue.
    ///
    /// # Panics
    ///
    /// Never in practice; the default opening hours are hardcoded valid
    /// times.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn venue() -> VenueBuilder {
        VenueBuilder {
            resource: Resource {
                id: ResourceId::new(),
                owner: RequesterId::from("owner-1"),
                name: "Hall-1".to_string(),
                timezone: Tz::UTC,
                capacity: 12,
                opening_hours: Some(OpeningHours {
                    open: NaiveTime::from_hms_opt(8, 0, 0)
                        .expect("hardcoded time should always be valid"),
                    close: NaiveTime::from_hms_opt(22, 0, 0)
                        .expect("hardcoded time should always be valid"),
                }),
                rate_schedule: RateSchedule::flat(Money::from_dollars(40)),
                version: Version::INITIAL,
            },
        }
    }

    impl VenueBuilder {
        /// Set the venue name.
        #[must_use]
        pub fn name(mut self, name: &str) -> Self {
            self.resource.name = name.to_string();
            self
        }

        /// Set the owner.
        #[must_use]
        pub fn owner(mut self, owner: &str) -> Self {
            self.resource.owner = RequesterId::from(owner);
            self
        }

        /// Set the capacity.
        #[must_use]
        pub const fn capacity(mut self, capacity: u32) -> Self {
            self.resource.capacity = capacity;
            self
        }

        /// Set the venue timezone.
        #[must_use]
        pub const fn timezone(mut self, tz: Tz) -> Self {
            self.resource.timezone = tz;
            self
        }

        /// Replace the rate schedule.
        #[must_use]
        pub fn rates(mut self, schedule: RateSchedule) -> Self {
            self.resource.rate_schedule = schedule;
            self
        }

        /// Set or clear the opening hours.
        #[must_use]
        pub const fn opening_hours(mut self, hours: Option<OpeningHours>) -> Self {
            self.resource.opening_hours = hours;
            self
        }

        /// Finish building.
        #[must_use]
        pub fn build(self) -> Resource {
            self.resource
        }
    }
}

// Re-export commonly used items
pub use mocks::{test_clock, FixedClock};

/// Initialize tracing for tests, once per process.
///
/// Respects `RUST_LOG`; defaults to `info`. Safe to call from every test,
/// repeated calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}
