pub mod catalog;
pub mod clock;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod projector;
pub mod repository;
pub mod sweeper;

pub use catalog::SeatCatalog;
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Allocation, AllocationOutcome, HoldPolicy, ReservationEngine, ReserveRequest};
pub use memory::InMemoryStore;
pub use models::{EventRecord, Hold, HoldStatus, NewSeat, Reservation, Seat, SeatState, SeatStatusView};
pub use projector::StatusProjector;
pub use repository::{SeatingStore, SeatingTx, StoreError, StoreResult};
pub use sweeper::{ExpirySweeper, SweepReport};

use uuid::Uuid;

/// Failures surfaced by the seating operations. All of them are returned to the
/// caller as-is; nothing here is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum SeatingError {
    #[error("Seat not found: {0}")]
    SeatNotFound(String),
    #[error("Seat already held/allocated: {0}")]
    SeatConflict(String),
    #[error("Hold group not found: {0}")]
    GroupNotFound(Uuid),
    #[error("One or more holds already released in group {0}")]
    GroupAlreadyReleased(Uuid),
    #[error("Hold expired for group {0}")]
    HoldExpired(Uuid),
    #[error("Cannot release allocated hold group {0}")]
    CannotReleaseAllocated(Uuid),
    #[error("Event not found: {0}")]
    EventNotFound(String),
    #[error("Validation failed: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SeatingError {
    /// Stable machine-readable code, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SeatingError::SeatNotFound(_) => "SEAT_NOT_FOUND",
            SeatingError::SeatConflict(_) => "SEAT_CONFLICT",
            SeatingError::GroupNotFound(_) => "GROUP_NOT_FOUND",
            SeatingError::GroupAlreadyReleased(_) => "GROUP_ALREADY_RELEASED",
            SeatingError::HoldExpired(_) => "HOLD_EXPIRED",
            SeatingError::CannotReleaseAllocated(_) => "CANNOT_RELEASE_ALLOCATED",
            SeatingError::EventNotFound(_) => "EVENT_NOT_FOUND",
            SeatingError::InvalidInput(_) => "INVALID_INPUT",
            SeatingError::Store(_) => "STORE_ERROR",
        }
    }
}

pub type SeatingResult<T> = Result<T, SeatingError>;
