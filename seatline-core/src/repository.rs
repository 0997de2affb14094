use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::models::{EventRecord, Hold, Seat};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync>),
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
    #[error("Hold row not found: {0}")]
    MissingHold(Uuid),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Transactional access to seats and the hold ledger.
///
/// Every engine operation runs inside exactly one transaction obtained from
/// `begin`. Writes become visible only on `commit`; dropping a transaction
/// without committing rolls it back.
#[async_trait]
pub trait SeatingStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn SeatingTx>>;
}

#[async_trait]
pub trait SeatingTx: Send {
    // Event registry
    async fn find_event(&mut self, event_id: &str) -> StoreResult<Option<EventRecord>>;
    async fn insert_event(&mut self, event: &EventRecord) -> StoreResult<()>;
    async fn list_events(&mut self) -> StoreResult<Vec<EventRecord>>;

    // Seats
    async fn seats_for_event(&mut self, event_id: &str) -> StoreResult<Vec<Seat>>;
    async fn insert_seats(&mut self, seats: &[Seat]) -> StoreResult<()>;

    /// Resolve seat codes of one event and lock the matching seat rows until
    /// the transaction ends. Unknown codes are simply absent from the result.
    async fn lock_seats(&mut self, event_id: &str, seat_codes: &[String]) -> StoreResult<Vec<Seat>>;

    // Hold ledger
    /// Serialize concurrent first use of an idempotency key.
    async fn lock_idempotency_key(&mut self, key: &str) -> StoreResult<()>;
    async fn holds_by_idempotency_key(&mut self, key: &str) -> StoreResult<Vec<Hold>>;
    /// Every HOLD or ALLOCATED row of the given seats, locked until the
    /// transaction ends. Expiry is not applied here: a row an in-flight
    /// allocate is about to confirm must be waited on, not skipped.
    async fn lock_holds_for_seats(&mut self, seat_ids: &[Uuid]) -> StoreResult<Vec<Hold>>;
    async fn holds_for_seats(&mut self, seat_ids: &[Uuid]) -> StoreResult<Vec<Hold>>;
    async fn holds_for_group(&mut self, group_token: Uuid) -> StoreResult<Vec<Hold>>;
    /// Like `holds_for_group`, but the rows stay locked until the transaction ends.
    async fn lock_group(&mut self, group_token: Uuid) -> StoreResult<Vec<Hold>>;
    /// Insert the rows of one reservation group as a single batch.
    async fn insert_holds(&mut self, holds: &[Hold]) -> StoreResult<()>;
    async fn mark_allocated(&mut self, hold_ids: &[Uuid], allocated_at: DateTime<Utc>, order_id: &str) -> StoreResult<u64>;
    /// Conditional HOLD -> RELEASED. Returns the updated row, or `None` when the
    /// row had already left HOLD.
    async fn release_hold(&mut self, hold_id: Uuid) -> StoreResult<Option<Hold>>;
    /// HOLD rows whose expiry is at or before `now`, locked for this transaction.
    /// Rows locked by another transaction are skipped.
    async fn lock_expired_holds(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<Hold>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
