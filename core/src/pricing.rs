//! Pricing for booked intervals.
//!
//! A booked interval is split at every rate-schedule boundary it crosses:
//! venue-local midnights (where day-of-week rates change) and the
//! schedule's time-of-day boundaries. Each sub-interval resolves to exactly
//! one hourly rate; the amounts are accumulated exactly in integer
//! cent-seconds and rounded **once** at the end, half-up, to minor units.
//!
//! Pricing is deterministic and idempotent: same resource, same interval,
//! same amount, every time.

use crate::interval::Interval;
use crate::types::{to_local, Money, Resource};
use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

/// Errors raised while pricing an interval.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingError {
    /// Some part of the interval has no resolving rate entry and the
    /// schedule has no default rate.
    #[error("no rate defined for {at}")]
    NoRateDefined {
        /// Start of the first unpriceable sub-interval.
        at: DateTime<Utc>,
    },
}

/// Seconds per hour, as the fixed denominator of the cent-seconds sum.
const SECONDS_PER_HOUR: u128 = 3600;

/// Compute the amount due for booking `interval` on `resource`.
///
/// The total saturates at the representable maximum amount
/// (`u64::MAX` cents); reaching it would take a booking on the order of a
/// million years at any realistic rate.
///
/// # Errors
///
/// Returns [`PricingError::NoRateDefined`] if any sub-interval resolves to
/// no rate.
pub fn price(resource: &Resource, interval: &Interval) -> Result<Money, PricingError> {
    let tz = resource.timezone;

    let mut points = vec![interval.start()];
    points.extend(boundary_instants(resource, interval));
    points.push(interval.end());

    let mut cent_seconds: u128 = 0;
    for pair in points.windows(2) {
        let (sub_start, sub_end) = (pair[0], pair[1]);
        if sub_start >= sub_end {
            continue;
        }
        let local = to_local(sub_start, tz).naive_local();
        let rate = resource
            .rate_schedule
            .resolve(local)
            .ok_or(PricingError::NoRateDefined { at: sub_start })?;
        let seconds = u128::from((sub_end - sub_start).num_seconds().unsigned_abs());
        cent_seconds = cent_seconds.saturating_add(seconds.saturating_mul(u128::from(rate.cents())));
    }

    // Single round-half-up at the end.
    let total = (cent_seconds.saturating_add(SECONDS_PER_HOUR / 2)) / SECONDS_PER_HOUR;
    Ok(Money::from_cents(u64::try_from(total).unwrap_or(u64::MAX)))
}

/// Rate boundaries strictly inside `interval`, in UTC, sorted.
///
/// For every venue-local calendar day the interval touches, the candidates
/// are local midnight and each time-of-day boundary of the schedule. A
/// local time made nonexistent by a DST transition contributes no boundary
/// (the enclosing sub-interval simply stays on the prior rate).
fn boundary_instants(resource: &Resource, interval: &Interval) -> Vec<DateTime<Utc>> {
    let tz = resource.timezone;
    let times = resource.rate_schedule.time_of_day_boundaries();
    let midnight = chrono::NaiveTime::MIN;

    let first_day = to_local(interval.start(), tz).date_naive();
    let last_day = to_local(interval.end(), tz).date_naive();

    let mut out = Vec::new();
    let mut day = first_day;
    while day <= last_day {
        for time in std::iter::once(midnight).chain(times.iter().copied()) {
            let Some(local) = tz.from_local_datetime(&day.and_time(time)).earliest() else {
                continue;
            };
            let instant = local.with_timezone(&Utc);
            if interval.start() < instant && instant < interval.end() {
                out.push(instant);
            }
        }
        let Some(next) = day.succ_opt() else { break };
        day = next;
    }
    out.sort_unstable();
    out.dedup();
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{
        OpeningHours, RateApplies, RateEntry, RateSchedule, RequesterId, ResourceId, Version,
    };
    use chrono::{Duration, NaiveTime, Weekday};
    use chrono_tz::Tz;
    use proptest::prelude::*;

    fn resource_with(schedule: RateSchedule, tz: Tz) -> Resource {
        Resource {
            id: ResourceId::new(),
            owner: RequesterId::from("owner-1"),
            name: "Hall-1".to_string(),
            timezone: tz,
            capacity: 100,
            opening_hours: Some(OpeningHours {
                open: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                close: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            }),
            rate_schedule: schedule,
            version: Version::INITIAL,
        }
    }

    fn interval(start: &str, end: &str) -> Interval {
        Interval::new(start.parse().unwrap(), end.parse().unwrap()).unwrap()
    }

    fn entry_from(hour: u32, rate: Money) -> RateEntry {
        RateEntry {
            applies: RateApplies::TimeOfDayFrom(NaiveTime::from_hms_opt(hour, 0, 0).unwrap()),
            price_per_hour: rate,
        }
    }

    #[test]
    fn flat_rate_two_hours() {
        let resource = resource_with(RateSchedule::flat(Money::from_dollars(40)), Tz::UTC);
        let amount = price(
            &resource,
            &interval("2025-06-01T14:00:00Z", "2025-06-01T16:00:00Z"),
        )
        .unwrap();
        assert_eq!(amount, Money::from_dollars(80));
    }

    #[test]
    fn crossing_one_rate_boundary_sums_both_rates() {
        // Day rate A from 09:00, evening rate B from 17:00.
        let rate_a = Money::from_dollars(30);
        let rate_b = Money::from_dollars(50);
        let schedule = RateSchedule::new(vec![entry_from(9, rate_a), entry_from(17, rate_b)], None);
        let resource = resource_with(schedule, Tz::UTC);

        // Three hours, two before the boundary and one after: 2*A + 1*B.
        let amount = price(
            &resource,
            &interval("2025-06-02T15:00:00Z", "2025-06-02T18:00:00Z"),
        )
        .unwrap();
        assert_eq!(amount, Money::from_dollars(2 * 30 + 50));
    }

    #[test]
    fn fractional_hours_round_half_up_once() {
        // 90 minutes at 33.33/h = 49.995, which rounds up to 50.00.
        let resource = resource_with(RateSchedule::flat(Money::from_cents(3333)), Tz::UTC);
        let amount = price(
            &resource,
            &interval("2025-06-01T14:00:00Z", "2025-06-01T15:30:00Z"),
        )
        .unwrap();
        assert_eq!(amount, Money::from_cents(5000));
    }

    #[test]
    fn no_rate_and_no_default_fails() {
        let resource = resource_with(RateSchedule::new(vec![], None), Tz::UTC);
        let start: DateTime<Utc> = "2025-06-01T14:00:00Z".parse().unwrap();
        let result = price(
            &resource,
            &Interval::new(start, start + Duration::hours(1)).unwrap(),
        );
        assert_eq!(result, Err(PricingError::NoRateDefined { at: start }));
    }

    #[test]
    fn partial_coverage_names_the_unpriceable_start() {
        // Rates exist only from 09:00; booking starts at 07:00 with no default.
        let schedule = RateSchedule::new(vec![entry_from(9, Money::from_dollars(30))], None);
        let resource = resource_with(schedule, Tz::UTC);
        let result = price(
            &resource,
            &interval("2025-06-02T07:00:00Z", "2025-06-02T10:00:00Z"),
        );
        assert_eq!(
            result,
            Err(PricingError::NoRateDefined {
                at: "2025-06-02T07:00:00Z".parse().unwrap(),
            })
        );
    }

    #[test]
    fn midnight_split_switches_day_of_week_rate() {
        // Friday 40/h, Saturday 80/h; book Fri 23:00 - Sat 01:00 local.
        let schedule = RateSchedule::new(
            vec![
                RateEntry {
                    applies: RateApplies::DayOfWeek(Weekday::Fri),
                    price_per_hour: Money::from_dollars(40),
                },
                RateEntry {
                    applies: RateApplies::DayOfWeek(Weekday::Sat),
                    price_per_hour: Money::from_dollars(80),
                },
            ],
            None,
        );
        let resource = resource_with(schedule, Tz::UTC);
        // 2025-06-06 is a Friday.
        let amount = price(
            &resource,
            &interval("2025-06-06T23:00:00Z", "2025-06-07T01:00:00Z"),
        )
        .unwrap();
        assert_eq!(amount, Money::from_dollars(40 + 80));
    }

    #[test]
    fn boundaries_are_venue_local() {
        // Evening rate from 17:00 *New York time* (21:00 UTC in June).
        let schedule = RateSchedule::new(
            vec![
                entry_from(9, Money::from_dollars(30)),
                entry_from(17, Money::from_dollars(50)),
            ],
            None,
        );
        let resource = resource_with(schedule, chrono_tz::America::New_York);

        // 19:00-23:00 UTC = 15:00-19:00 local: 2h at 30 + 2h at 50.
        let amount = price(
            &resource,
            &interval("2025-06-02T19:00:00Z", "2025-06-02T23:00:00Z"),
        )
        .unwrap();
        assert_eq!(amount, Money::from_dollars(2 * 30 + 2 * 50));
    }

    proptest! {
        #[test]
        fn pricing_is_deterministic(start_hour in 0u32..20, len_minutes in 30i64..600) {
            let schedule = RateSchedule::new(
                vec![entry_from(9, Money::from_dollars(30)), entry_from(17, Money::from_dollars(50))],
                Some(Money::from_dollars(20)),
            );
            let resource = resource_with(schedule, Tz::UTC);
            let start: DateTime<Utc> = "2025-06-02T00:00:00Z".parse().unwrap();
            let start = start + Duration::hours(i64::from(start_hour));
            let booked = Interval::new(start, start + Duration::minutes(len_minutes)).unwrap();

            let first = price(&resource, &booked).unwrap();
            let second = price(&resource, &booked).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn flat_rate_price_is_duration_times_rate(len_minutes in 1i64..1440) {
            let rate = Money::from_cents(6000);
            let resource = resource_with(RateSchedule::flat(rate), Tz::UTC);
            let start: DateTime<Utc> = "2025-06-02T00:00:00Z".parse().unwrap();
            let booked = Interval::new(start, start + Duration::minutes(len_minutes)).unwrap();

            let amount = price(&resource, &booked).unwrap();
            // 6000 cents/h == 100 cents/min: exact, no rounding involved.
            prop_assert_eq!(amount.cents(), 100 * u64::try_from(len_minutes).unwrap());
        }
    }
}
