use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seatline_core::models::{EventRecord, Hold, Seat};
use seatline_core::repository::{SeatingStore, SeatingTx, StoreError, StoreResult};
use sqlx::{Acquire, PgPool, Postgres, Transaction};
use std::collections::HashSet;
use uuid::Uuid;

/// Postgres-backed seating store.
///
/// Locking discipline, per transaction:
/// - reserve locks the requested `event_seats` rows (`FOR UPDATE`, seat-code order)
///   and, when an idempotency key is given, a transaction-scoped advisory lock on it;
/// - reserve then locks every unreleased `seat_holds` row of those seats, so it
///   waits for an allocate or release that holds them;
/// - allocate/release lock the group's `seat_holds` rows;
/// - a sweep pass locks expired rows with `SKIP LOCKED`, so parallel sweepers split the work.
pub struct PgSeatingStore {
    pool: PgPool,
}

impl PgSeatingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SeatingStore for PgSeatingStore {
    async fn begin(&self) -> StoreResult<Box<dyn SeatingTx>> {
        let tx = self.pool.begin().await.map_err(db)?;
        Ok(Box::new(PgSeatingTx { tx }))
    }
}

pub struct PgSeatingTx {
    tx: Transaction<'static, Postgres>,
}

fn db(err: sqlx::Error) -> StoreError {
    StoreError::Backend(Box::new(err))
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct EventRow {
    event_id: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        EventRecord {
            event_id: row.event_id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: Uuid,
    event_id: String,
    seat_code: String,
    section: Option<String>,
    row_label: Option<String>,
    seat_number: i32,
    price_cents: i64,
}

impl From<SeatRow> for Seat {
    fn from(row: SeatRow) -> Self {
        Seat {
            id: row.id,
            event_id: row.event_id,
            seat_code: row.seat_code,
            section: row.section,
            row_label: row.row_label,
            seat_number: row.seat_number,
            price_cents: row.price_cents,
        }
    }
}

#[derive(sqlx::FromRow)]
struct HoldRow {
    id: Uuid,
    seat_id: Uuid,
    event_id: String,
    seat_code: String,
    user_id: String,
    group_token: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    allocated_at: Option<DateTime<Utc>>,
    order_id: Option<String>,
    idempotency_key: Option<String>,
}

impl TryFrom<HoldRow> for Hold {
    type Error = StoreError;

    fn try_from(row: HoldRow) -> Result<Self, Self::Error> {
        let status = row.status.parse()
            .map_err(|e: String| StoreError::CorruptRow(format!("seat_holds {}: {}", row.id, e)))?;
        Ok(Hold {
            id: row.id,
            seat_id: row.seat_id,
            event_id: row.event_id,
            seat_code: row.seat_code,
            user_id: row.user_id,
            group_token: row.group_token,
            status,
            created_at: row.created_at,
            expires_at: row.expires_at,
            allocated_at: row.allocated_at,
            order_id: row.order_id,
            idempotency_key: row.idempotency_key,
        })
    }
}

const SEAT_SELECT: &str = r#"
    SELECT id, event_id, seat_code, section, row_label, seat_number, price_cents
    FROM event_seats
"#;

const HOLD_SELECT: &str = r#"
    SELECT h.id, h.event_seat_id AS seat_id, s.event_id, s.seat_code, h.user_id, h.group_token,
           h.status, h.created_at, h.hold_expiry AS expires_at, h.allocated_at, h.order_id,
           g.idempotency_key
    FROM seat_holds h
    JOIN event_seats s ON s.id = h.event_seat_id
    JOIN hold_groups g ON g.group_token = h.group_token
"#;

fn into_holds(rows: Vec<HoldRow>) -> StoreResult<Vec<Hold>> {
    rows.into_iter().map(Hold::try_from).collect()
}

#[async_trait]
impl SeatingTx for PgSeatingTx {
    async fn find_event(&mut self, event_id: &str) -> StoreResult<Option<EventRecord>> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT event_id, name, created_at FROM events WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(row.map(EventRecord::from))
    }

    async fn insert_event(&mut self, event: &EventRecord) -> StoreResult<()> {
        sqlx::query("INSERT INTO events (event_id, name, created_at) VALUES ($1, $2, $3)")
            .bind(&event.event_id)
            .bind(&event.name)
            .bind(event.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn list_events(&mut self) -> StoreResult<Vec<EventRecord>> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT event_id, name, created_at FROM events ORDER BY event_id",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(rows.into_iter().map(EventRecord::from).collect())
    }

    async fn seats_for_event(&mut self, event_id: &str) -> StoreResult<Vec<Seat>> {
        let sql = format!("{} WHERE event_id = $1 ORDER BY seat_number, seat_code", SEAT_SELECT);
        let rows = sqlx::query_as::<_, SeatRow>(&sql)
            .bind(event_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(rows.into_iter().map(Seat::from).collect())
    }

    async fn insert_seats(&mut self, seats: &[Seat]) -> StoreResult<()> {
        for seat in seats {
            sqlx::query(
                r#"
                INSERT INTO event_seats (id, event_id, seat_code, section, row_label, seat_number, price_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(seat.id)
            .bind(&seat.event_id)
            .bind(&seat.seat_code)
            .bind(&seat.section)
            .bind(&seat.row_label)
            .bind(seat.seat_number)
            .bind(seat.price_cents)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        }
        Ok(())
    }

    async fn lock_seats(&mut self, event_id: &str, seat_codes: &[String]) -> StoreResult<Vec<Seat>> {
        let sql = format!(
            "{} WHERE event_id = $1 AND seat_code = ANY($2) ORDER BY seat_code FOR UPDATE",
            SEAT_SELECT
        );
        let rows = sqlx::query_as::<_, SeatRow>(&sql)
            .bind(event_id)
            .bind(seat_codes)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(rows.into_iter().map(Seat::from).collect())
    }

    async fn lock_idempotency_key(&mut self, key: &str) -> StoreResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(key)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn holds_by_idempotency_key(&mut self, key: &str) -> StoreResult<Vec<Hold>> {
        let sql = format!("{} WHERE g.idempotency_key = $1 ORDER BY s.seat_code", HOLD_SELECT);
        let rows = sqlx::query_as::<_, HoldRow>(&sql)
            .bind(key)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db)?;
        into_holds(rows)
    }

    async fn lock_holds_for_seats(&mut self, seat_ids: &[Uuid]) -> StoreResult<Vec<Hold>> {
        let sql = format!(
            r#"{} WHERE h.event_seat_id = ANY($1) AND h.status <> 'RELEASED'
               ORDER BY s.seat_code, h.id
               FOR UPDATE OF h"#,
            HOLD_SELECT
        );
        let rows = sqlx::query_as::<_, HoldRow>(&sql)
            .bind(seat_ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db)?;
        into_holds(rows)
    }

    async fn holds_for_seats(&mut self, seat_ids: &[Uuid]) -> StoreResult<Vec<Hold>> {
        let sql = format!("{} WHERE h.event_seat_id = ANY($1) ORDER BY h.created_at", HOLD_SELECT);
        let rows = sqlx::query_as::<_, HoldRow>(&sql)
            .bind(seat_ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db)?;
        into_holds(rows)
    }

    async fn holds_for_group(&mut self, group_token: Uuid) -> StoreResult<Vec<Hold>> {
        let sql = format!("{} WHERE h.group_token = $1 ORDER BY s.seat_code", HOLD_SELECT);
        let rows = sqlx::query_as::<_, HoldRow>(&sql)
            .bind(group_token)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db)?;
        into_holds(rows)
    }

    async fn lock_group(&mut self, group_token: Uuid) -> StoreResult<Vec<Hold>> {
        let sql = format!(
            "{} WHERE h.group_token = $1 ORDER BY s.seat_code, h.id FOR UPDATE OF h",
            HOLD_SELECT
        );
        let rows = sqlx::query_as::<_, HoldRow>(&sql)
            .bind(group_token)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db)?;
        into_holds(rows)
    }

    async fn insert_holds(&mut self, holds: &[Hold]) -> StoreResult<()> {
        let mut groups = HashSet::new();
        for hold in holds.iter().filter(|h| groups.insert(h.group_token)) {
            sqlx::query(
                r#"
                INSERT INTO hold_groups (group_token, user_id, idempotency_key, created_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(hold.group_token)
            .bind(&hold.user_id)
            .bind(&hold.idempotency_key)
            .bind(hold.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        }

        for hold in holds {
            sqlx::query(
                r#"
                INSERT INTO seat_holds (id, group_token, event_seat_id, user_id, status, created_at, hold_expiry, allocated_at, order_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(hold.id)
            .bind(hold.group_token)
            .bind(hold.seat_id)
            .bind(&hold.user_id)
            .bind(hold.status.as_str())
            .bind(hold.created_at)
            .bind(hold.expires_at)
            .bind(hold.allocated_at)
            .bind(&hold.order_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        }
        Ok(())
    }

    async fn mark_allocated(&mut self, hold_ids: &[Uuid], allocated_at: DateTime<Utc>, order_id: &str) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE seat_holds
            SET status = 'ALLOCATED', allocated_at = $2, order_id = $3
            WHERE id = ANY($1) AND status = 'HOLD'
            "#,
        )
        .bind(hold_ids)
        .bind(allocated_at)
        .bind(order_id)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(result.rows_affected())
    }

    async fn release_hold(&mut self, hold_id: Uuid) -> StoreResult<Option<Hold>> {
        // Savepoint, so a failed row does not abort the surrounding sweep.
        let mut savepoint = Acquire::begin(&mut self.tx).await.map_err(db)?;
        let updated: Option<Uuid> = sqlx::query_scalar(
            "UPDATE seat_holds SET status = 'RELEASED' WHERE id = $1 AND status = 'HOLD' RETURNING id",
        )
        .bind(hold_id)
        .fetch_optional(&mut *savepoint)
        .await
        .map_err(db)?;
        savepoint.commit().await.map_err(db)?;

        let sql = format!("{} WHERE h.id = $1", HOLD_SELECT);
        let row = sqlx::query_as::<_, HoldRow>(&sql)
            .bind(hold_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db)?
            .ok_or(StoreError::MissingHold(hold_id))?;
        let hold = Hold::try_from(row)?;

        Ok(updated.map(|_| hold))
    }

    async fn lock_expired_holds(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<Hold>> {
        let sql = format!(
            r#"{} WHERE h.status = 'HOLD' AND h.hold_expiry <= $1
               ORDER BY h.hold_expiry
               FOR UPDATE OF h SKIP LOCKED"#,
            HOLD_SELECT
        );
        let rows = sqlx::query_as::<_, HoldRow>(&sql)
            .bind(now)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db)?;
        into_holds(rows)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let PgSeatingTx { tx } = *self;
        tx.commit().await.map_err(db)
    }
}
