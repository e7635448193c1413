//! Injected dependencies.
//!
//! The engine consumes current time only to reject past-dated requests, and
//! only through the [`Clock`] trait so tests can pin it. Production code
//! uses [`SystemClock`]; the testing crate provides a `FixedClock`.

use chrono::{DateTime, Utc};

/// Abstracts time for testability.
///
/// # Examples
///
/// ```
/// use bookable_core::environment::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let now = clock.now();
/// assert!(now <= clock.now());
/// ```
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
