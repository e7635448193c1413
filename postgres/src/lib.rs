//! `PostgreSQL` reservation store for Bookable.
//!
//! This crate provides the production implementation of the
//! `ReservationStore` trait from `bookable-core`. It uses sqlx over a
//! connection pool and supports:
//!
//! - Atomic conflict-checked commits via an exclusion constraint
//! - Optimistic concurrency on resources and reservations
//! - Connection pooling
//! - Transaction support
//!
//! The schema lives in `migrations/`; the exclusion constraint
//! `reservations_no_overlap` is the single authoritative double-booking
//! check. Application code never does check-then-write for reservation
//! overlaps: it inserts and lets the constraint arbitrate.
//!
//! # Example
//!
//! ```ignore
//! use bookable_postgres::PostgresStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresStore::connect("postgres://localhost/bookable").await?;
//!     store.run_migrations().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use bookable_core::{
    BlockedInterval, Interval, NewReservation, OpeningHours, RateSchedule, RequesterId,
    Reservation, ReservationId, ReservationStatus, ReservationStore, Resource, ResourceId,
    StoreError, StoreFuture, Version,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

/// SQLSTATE codes raised when an insert loses the overlap race.
///
/// `23P01` is an exclusion-constraint violation; `23505` covers the unique
/// key, which a retried insert with a reused id can hit.
const CONFLICT_SQLSTATES: [&str; 2] = ["23P01", "23505"];

fn is_conflict_sqlstate(code: &str) -> bool {
    CONFLICT_SQLSTATES.contains(&code)
}

fn db_error(error: &sqlx::Error) -> StoreError {
    StoreError::Unavailable(error.to_string())
}

fn corrupt(detail: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(format!("corrupt row: {detail}"))
}

/// `PostgreSQL`-backed reservation store.
///
/// Cloning shares the underlying pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to the database and build a store over a fresh pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| db_error(&e))?;
        Ok(Self { pool })
    }

    /// Build a store over an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the schema.
    ///
    /// Idempotent; every statement is `IF NOT EXISTS`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if a statement fails.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(include_str!("../migrations/0001_schema.sql"))
            .execute(&self.pool)
            .await
            .map_err(|e| db_error(&e))?;
        tracing::info!("reservation schema applied");
        Ok(())
    }

    /// Insert a resource, for provisioning and tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the insert fails.
    pub async fn add_resource(&self, resource: &Resource) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO resources (
                id, owner_id, name, timezone, capacity,
                opening_hours, rate_schedule, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(resource.id.as_uuid())
        .bind(resource.owner.as_str())
        .bind(&resource.name)
        .bind(resource.timezone.name())
        .bind(i64::from(resource.capacity))
        .bind(
            resource
                .opening_hours
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(corrupt)?,
        )
        .bind(serde_json::to_value(&resource.rate_schedule).map_err(corrupt)?)
        .bind(to_db_version(resource.version))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error(&e))?;
        Ok(())
    }

    async fn get_resource_inner(&self, resource_id: ResourceId) -> Result<Resource, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, owner_id, name, timezone, capacity,
                   opening_hours, rate_schedule, version
            FROM resources
            WHERE id = $1
            ",
        )
        .bind(resource_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error(&e))?
        .ok_or(StoreError::ResourceNotFound(resource_id))?;
        row_to_resource(&row)
    }

    async fn list_reservations_inner(
        &self,
        resource_id: ResourceId,
        window: Interval,
    ) -> Result<Vec<Reservation>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, resource_id, requester_id, starts_at, ends_at,
                   guest_count, status, total_amount_cents, created_at, version
            FROM reservations
            WHERE resource_id = $1
              AND status <> 'cancelled'
              AND starts_at < $3
              AND ends_at > $2
            ORDER BY starts_at
            ",
        )
        .bind(resource_id.as_uuid())
        .bind(window.start())
        .bind(window.end())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(&e))?;
        rows.iter().map(row_to_reservation).collect()
    }

    async fn list_blocks_inner(
        &self,
        resource_id: ResourceId,
        window: Interval,
    ) -> Result<Vec<BlockedInterval>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT resource_id, starts_at, ends_at, reason
            FROM blocked_intervals
            WHERE resource_id = $1
              AND starts_at < $3
              AND ends_at > $2
            ORDER BY starts_at
            ",
        )
        .bind(resource_id.as_uuid())
        .bind(window.start())
        .bind(window.end())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(&e))?;
        rows.iter().map(row_to_block).collect()
    }

    async fn try_commit_inner(
        &self,
        reservation: NewReservation,
        expected_resource_version: Option<Version>,
    ) -> Result<Reservation, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| db_error(&e))?;

        // Lock the resource row. This serializes commits against
        // `insert_block`, which bumps the version under the same lock.
        let row = sqlx::query("SELECT version FROM resources WHERE id = $1 FOR UPDATE")
            .bind(reservation.resource_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error(&e))?
            .ok_or(StoreError::ResourceNotFound(reservation.resource_id))?;
        let actual = from_db_version(row.try_get("version").map_err(corrupt)?)?;
        if let Some(expected) = expected_resource_version {
            if expected != actual {
                return Err(StoreError::VersionConflict { expected, actual });
            }
        }

        // Blocks carry no exclusion constraint, so they are checked here,
        // under the resource lock.
        let (blocked,): (bool,) = sqlx::query_as(
            r"
            SELECT EXISTS (
                SELECT 1 FROM blocked_intervals
                WHERE resource_id = $1 AND starts_at < $3 AND ends_at > $2
            )
            ",
        )
        .bind(reservation.resource_id.as_uuid())
        .bind(reservation.interval.start())
        .bind(reservation.interval.end())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error(&e))?;
        if blocked {
            return Err(StoreError::Conflict {
                resource_id: reservation.resource_id,
                interval: reservation.interval,
            });
        }

        let id = ReservationId::new();
        let row = sqlx::query(
            r"
            INSERT INTO reservations (
                id, resource_id, requester_id, starts_at, ends_at,
                guest_count, status, total_amount_cents, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, resource_id, requester_id, starts_at, ends_at,
                      guest_count, status, total_amount_cents, created_at, version
            ",
        )
        .bind(id.as_uuid())
        .bind(reservation.resource_id.as_uuid())
        .bind(reservation.requester.as_str())
        .bind(reservation.interval.start())
        .bind(reservation.interval.end())
        .bind(i64::from(reservation.guest_count))
        .bind(ReservationStatus::Pending.as_str())
        .bind(to_db_cents(reservation.total_amount.cents())?)
        .bind(to_db_version(Version::INITIAL))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .and_then(sqlx::error::DatabaseError::code)
                .is_some_and(|code| is_conflict_sqlstate(&code))
            {
                StoreError::Conflict {
                    resource_id: reservation.resource_id,
                    interval: reservation.interval,
                }
            } else {
                db_error(&e)
            }
        })?;
        let persisted = row_to_reservation(&row)?;

        tx.commit().await.map_err(|e| db_error(&e))?;
        tracing::info!(
            reservation_id = %persisted.id,
            resource_id = %persisted.resource_id,
            interval = %persisted.interval,
            "reservation committed"
        );
        Ok(persisted)
    }

    async fn find_reservation_inner(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Reservation, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, resource_id, requester_id, starts_at, ends_at,
                   guest_count, status, total_amount_cents, created_at, version
            FROM reservations
            WHERE id = $1
            ",
        )
        .bind(reservation_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error(&e))?
        .ok_or(StoreError::ReservationNotFound(reservation_id))?;
        row_to_reservation(&row)
    }

    async fn cancel_reservation_inner(
        &self,
        reservation_id: ReservationId,
        expected_version: Version,
    ) -> Result<Reservation, StoreError> {
        let updated = sqlx::query(
            r"
            UPDATE reservations
            SET status = 'cancelled', version = version + 1
            WHERE id = $1 AND version = $2 AND status <> 'cancelled'
            RETURNING id, resource_id, requester_id, starts_at, ends_at,
                      guest_count, status, total_amount_cents, created_at, version
            ",
        )
        .bind(reservation_id.as_uuid())
        .bind(to_db_version(expected_version))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error(&e))?;

        if let Some(row) = updated {
            let cancelled = row_to_reservation(&row)?;
            tracing::info!(reservation_id = %cancelled.id, "reservation cancelled");
            return Ok(cancelled);
        }

        // The guarded update matched nothing; look at the current state to
        // report why.
        let current = self.find_reservation_inner(reservation_id).await?;
        if current.status == ReservationStatus::Cancelled {
            return Ok(current);
        }
        Err(StoreError::VersionConflict {
            expected: expected_version,
            actual: current.version,
        })
    }

    async fn confirm_reservation_inner(
        &self,
        reservation_id: ReservationId,
        expected_version: Version,
    ) -> Result<Reservation, StoreError> {
        let updated = sqlx::query(
            r"
            UPDATE reservations
            SET status = 'confirmed', version = version + 1
            WHERE id = $1 AND version = $2 AND status = 'pending'
            RETURNING id, resource_id, requester_id, starts_at, ends_at,
                      guest_count, status, total_amount_cents, created_at, version
            ",
        )
        .bind(reservation_id.as_uuid())
        .bind(to_db_version(expected_version))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error(&e))?;

        if let Some(row) = updated {
            let confirmed = row_to_reservation(&row)?;
            tracing::info!(reservation_id = %confirmed.id, "reservation confirmed");
            return Ok(confirmed);
        }

        let current = self.find_reservation_inner(reservation_id).await?;
        if current.status == ReservationStatus::Pending {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual: current.version,
            });
        }
        Err(StoreError::InvalidTransition {
            id: reservation_id,
            status: current.status,
        })
    }

    async fn insert_block_inner(
        &self,
        block: BlockedInterval,
    ) -> Result<BlockedInterval, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| db_error(&e))?;

        // The bump invalidates commits priced against the previous state.
        let updated = sqlx::query("UPDATE resources SET version = version + 1 WHERE id = $1")
            .bind(block.resource_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(&e))?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::ResourceNotFound(block.resource_id));
        }

        sqlx::query(
            r"
            INSERT INTO blocked_intervals (resource_id, starts_at, ends_at, reason)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(block.resource_id.as_uuid())
        .bind(block.interval.start())
        .bind(block.interval.end())
        .bind(&block.reason)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error(&e))?;

        tx.commit().await.map_err(|e| db_error(&e))?;
        tracing::info!(
            resource_id = %block.resource_id,
            interval = %block.interval,
            reason = %block.reason,
            "interval blocked"
        );
        Ok(block)
    }
}

impl ReservationStore for PostgresStore {
    fn get_resource(&self, resource_id: ResourceId) -> StoreFuture<'_, Resource> {
        Box::pin(self.get_resource_inner(resource_id))
    }

    fn list_reservations(
        &self,
        resource_id: ResourceId,
        window: Interval,
    ) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(self.list_reservations_inner(resource_id, window))
    }

    fn list_blocks(
        &self,
        resource_id: ResourceId,
        window: Interval,
    ) -> StoreFuture<'_, Vec<BlockedInterval>> {
        Box::pin(self.list_blocks_inner(resource_id, window))
    }

    fn try_commit(
        &self,
        reservation: NewReservation,
        expected_resource_version: Option<Version>,
    ) -> StoreFuture<'_, Reservation> {
        Box::pin(self.try_commit_inner(reservation, expected_resource_version))
    }

    fn find_reservation(&self, reservation_id: ReservationId) -> StoreFuture<'_, Reservation> {
        Box::pin(self.find_reservation_inner(reservation_id))
    }

    fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
        expected_version: Version,
    ) -> StoreFuture<'_, Reservation> {
        Box::pin(self.cancel_reservation_inner(reservation_id, expected_version))
    }

    fn confirm_reservation(
        &self,
        reservation_id: ReservationId,
        expected_version: Version,
    ) -> StoreFuture<'_, Reservation> {
        Box::pin(self.confirm_reservation_inner(reservation_id, expected_version))
    }

    fn insert_block(&self, block: BlockedInterval) -> StoreFuture<'_, BlockedInterval> {
        Box::pin(self.insert_block_inner(block))
    }
}

fn to_db_version(version: Version) -> i64 {
    i64::try_from(version.value()).unwrap_or(i64::MAX)
}

fn from_db_version(value: i64) -> Result<Version, StoreError> {
    u64::try_from(value)
        .map(Version::new)
        .map_err(|_| corrupt(format!("negative version {value}")))
}

fn to_db_cents(cents: u64) -> Result<i64, StoreError> {
    i64::try_from(cents).map_err(|_| corrupt(format!("amount out of range: {cents}")))
}

fn row_to_resource(row: &PgRow) -> Result<Resource, StoreError> {
    let timezone_name: String = row.try_get("timezone").map_err(corrupt)?;
    let timezone: Tz = timezone_name
        .parse()
        .map_err(|_| corrupt(format!("unknown timezone {timezone_name}")))?;
    let opening_hours: Option<OpeningHours> = row
        .try_get::<Option<serde_json::Value>, _>("opening_hours")
        .map_err(corrupt)?
        .map(serde_json::from_value)
        .transpose()
        .map_err(corrupt)?;
    let rate_schedule: RateSchedule =
        serde_json::from_value(row.try_get("rate_schedule").map_err(corrupt)?).map_err(corrupt)?;
    let capacity: i64 = row.try_get("capacity").map_err(corrupt)?;

    Ok(Resource {
        id: ResourceId::from_uuid(row.try_get::<Uuid, _>("id").map_err(corrupt)?),
        owner: RequesterId::new(row.try_get::<String, _>("owner_id").map_err(corrupt)?),
        name: row.try_get("name").map_err(corrupt)?,
        timezone,
        capacity: u32::try_from(capacity).map_err(|_| corrupt("capacity out of range"))?,
        opening_hours,
        rate_schedule,
        version: from_db_version(row.try_get("version").map_err(corrupt)?)?,
    })
}

fn row_to_reservation(row: &PgRow) -> Result<Reservation, StoreError> {
    let starts_at: DateTime<Utc> = row.try_get("starts_at").map_err(corrupt)?;
    let ends_at: DateTime<Utc> = row.try_get("ends_at").map_err(corrupt)?;
    let interval = Interval::new(starts_at, ends_at).map_err(corrupt)?;

    let status_str: String = row.try_get("status").map_err(corrupt)?;
    let status: ReservationStatus = status_str.parse().map_err(corrupt)?;

    let guest_count: i64 = row.try_get("guest_count").map_err(corrupt)?;
    let cents: i64 = row.try_get("total_amount_cents").map_err(corrupt)?;

    Ok(Reservation {
        id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id").map_err(corrupt)?),
        resource_id: ResourceId::from_uuid(row.try_get::<Uuid, _>("resource_id").map_err(corrupt)?),
        requester: RequesterId::new(row.try_get::<String, _>("requester_id").map_err(corrupt)?),
        interval,
        guest_count: u32::try_from(guest_count).map_err(|_| corrupt("guest count out of range"))?,
        status,
        total_amount: bookable_core::Money::from_cents(
            u64::try_from(cents).map_err(|_| corrupt("negative amount"))?,
        ),
        created_at: row.try_get("created_at").map_err(corrupt)?,
        version: from_db_version(row.try_get("version").map_err(corrupt)?)?,
    })
}

fn row_to_block(row: &PgRow) -> Result<BlockedInterval, StoreError> {
    let starts_at: DateTime<Utc> = row.try_get("starts_at").map_err(corrupt)?;
    let ends_at: DateTime<Utc> = row.try_get("ends_at").map_err(corrupt)?;
    Ok(BlockedInterval {
        resource_id: ResourceId::from_uuid(row.try_get::<Uuid, _>("resource_id").map_err(corrupt)?),
        interval: Interval::new(starts_at, ends_at).map_err(corrupt)?,
        reason: row.try_get("reason").map_err(corrupt)?,
    })
}
