//! Hold ledger transitions shared by the reservation engine and the expiry sweeper.

use chrono::{DateTime, Utc};
use crate::models::{Hold, HoldStatus};
use crate::repository::{SeatingTx, StoreResult};

/// HOLD -> RELEASED for one row.
///
/// Idempotent: a row that is already RELEASED (or ALLOCATED) is left untouched
/// and `Ok(None)` is returned. This is the only place a hold gets released, so
/// explicit release, late allocation and the sweeper all agree on the outcome.
pub async fn release_hold(tx: &mut dyn SeatingTx, hold: &Hold) -> StoreResult<Option<Hold>> {
    if hold.status != HoldStatus::Hold {
        return Ok(None);
    }
    tx.release_hold(hold.id).await
}

/// Release every row of `holds` that has expired at `now`, stopping at the
/// first storage failure.
pub async fn release_expired(
    tx: &mut dyn SeatingTx,
    holds: &[Hold],
    now: DateTime<Utc>,
) -> StoreResult<Vec<Hold>> {
    let mut released = Vec::new();
    for hold in holds.iter().filter(|h| h.is_expired(now)) {
        if let Some(updated) = release_hold(tx, hold).await? {
            released.push(updated);
        }
    }
    Ok(released)
}
