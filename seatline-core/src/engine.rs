use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use crate::clock::Clock;
use crate::ledger;
use crate::models::{Hold, HoldStatus, Reservation};
use crate::repository::SeatingStore;
use crate::{SeatingError, SeatingResult};

/// Tunables for hold creation.
#[derive(Debug, Clone, Copy)]
pub struct HoldPolicy {
    pub hold_ttl: Duration,
}

impl HoldPolicy {
    pub fn from_seconds(ttl_seconds: u64) -> Self {
        Self {
            hold_ttl: Duration::seconds(ttl_seconds as i64),
        }
    }
}

impl Default for HoldPolicy {
    fn default() -> Self {
        Self::from_seconds(90)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveRequest {
    pub event_id: String,
    pub user_id: String,
    pub seat_codes: Vec<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationOutcome {
    Allocated,
    /// Every row of the group was already ALLOCATED; nothing was written.
    AlreadyAllocated,
}

/// Result of an allocate call. `order_id` is the order the group is bound
/// to, which on a repeat call is the stored one, not the one just sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub outcome: AllocationOutcome,
    pub order_id: String,
}

/// Drives the hold state machine: reserve, allocate, release.
///
/// Each call runs in one store transaction. Failures are returned immediately
/// and never retried here.
pub struct ReservationEngine {
    store: Arc<dyn SeatingStore>,
    clock: Arc<dyn Clock>,
    policy: HoldPolicy,
}

impl ReservationEngine {
    pub fn new(store: Arc<dyn SeatingStore>, clock: Arc<dyn Clock>, policy: HoldPolicy) -> Self {
        Self { store, clock, policy }
    }

    pub fn policy(&self) -> HoldPolicy {
        self.policy
    }

    /// Place a hold on every requested seat, or on none of them.
    pub async fn reserve(&self, req: ReserveRequest) -> SeatingResult<Reservation> {
        validate_reserve(&req)?;
        let idempotency_key = req.idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        let mut tx = self.store.begin().await?;

        if let Some(key) = idempotency_key.as_deref() {
            tx.lock_idempotency_key(key).await?;
            let previous = tx.holds_by_idempotency_key(key).await?;
            if let Some(reservation) = Reservation::from_group(&previous, true) {
                debug!(idempotency_key = key, group_token = %reservation.group_token, "Replaying reservation");
                return Ok(reservation);
            }
        }

        // Stable lock order keeps overlapping batches from deadlocking.
        let mut seat_codes = req.seat_codes.clone();
        seat_codes.sort();

        let seats = tx.lock_seats(&req.event_id, &seat_codes).await?;
        let mut resolved = Vec::with_capacity(seat_codes.len());
        for code in &req.seat_codes {
            let seat = seats.iter()
                .find(|s| &s.seat_code == code)
                .ok_or_else(|| SeatingError::SeatNotFound(code.clone()))?;
            resolved.push(seat);
        }

        let seat_ids: Vec<Uuid> = resolved.iter().map(|s| s.id).collect();
        let existing = tx.lock_holds_for_seats(&seat_ids).await?;
        // Read the clock only once the rows are ours: a concurrent allocate has
        // either committed already or is queued behind this transaction.
        let now = self.clock.now();
        let live: Vec<&Hold> = existing.iter().filter(|h| h.is_live(now)).collect();
        if let Some(seat) = resolved.iter().find(|s| live.iter().any(|h| h.seat_id == s.id)) {
            warn!(event_id = %req.event_id, seat_code = %seat.seat_code, "Seat conflict on reserve");
            return Err(SeatingError::SeatConflict(seat.seat_code.clone()));
        }

        let group_token = Uuid::new_v4();
        let expires_at = now + self.policy.hold_ttl;
        let holds: Vec<Hold> = resolved.iter()
            .map(|seat| Hold {
                id: Uuid::new_v4(),
                seat_id: seat.id,
                event_id: seat.event_id.clone(),
                seat_code: seat.seat_code.clone(),
                user_id: req.user_id.clone(),
                group_token,
                status: HoldStatus::Hold,
                created_at: now,
                expires_at,
                allocated_at: None,
                order_id: None,
                idempotency_key: idempotency_key.clone(),
            })
            .collect();

        tx.insert_holds(&holds).await?;
        tx.commit().await?;

        info!(
            event_id = %req.event_id,
            user_id = %req.user_id,
            group_token = %group_token,
            seats = holds.len(),
            "Seats reserved"
        );

        Reservation::from_group(&holds, false)
            .ok_or_else(|| SeatingError::InvalidInput("No seats requested".to_string()))
    }

    /// Confirm a hold group against an order.
    pub async fn allocate(&self, group_token: Uuid, order_id: &str) -> SeatingResult<Allocation> {
        if order_id.trim().is_empty() {
            return Err(SeatingError::InvalidInput("Order id is required".to_string()));
        }

        let mut tx = self.store.begin().await?;
        let holds = tx.lock_group(group_token).await?;
        if holds.is_empty() {
            return Err(SeatingError::GroupNotFound(group_token));
        }

        if holds.iter().all(|h| h.status == HoldStatus::Allocated) {
            let stored = holds.iter()
                .find_map(|h| h.order_id.clone())
                .unwrap_or_else(|| order_id.to_string());
            if stored != order_id {
                warn!(group_token = %group_token, order_id, stored_order_id = %stored, "Repeat allocate with a different order id");
            } else {
                debug!(group_token = %group_token, "Group already allocated");
            }
            return Ok(Allocation { outcome: AllocationOutcome::AlreadyAllocated, order_id: stored });
        }

        if holds.iter().any(|h| h.status == HoldStatus::Released) {
            return Err(SeatingError::GroupAlreadyReleased(group_token));
        }

        let now = self.clock.now();
        if holds.iter().any(|h| h.is_expired(now)) {
            let released = ledger::release_expired(&mut *tx, &holds, now).await?;
            tx.commit().await?;
            info!(group_token = %group_token, released = released.len(), "Late allocation, hold expired");
            return Err(SeatingError::HoldExpired(group_token));
        }

        let ids: Vec<Uuid> = holds.iter().map(|h| h.id).collect();
        let updated = tx.mark_allocated(&ids, now, order_id).await?;
        tx.commit().await?;

        info!(group_token = %group_token, order_id, seats = updated, "Hold group allocated");
        Ok(Allocation { outcome: AllocationOutcome::Allocated, order_id: order_id.to_string() })
    }

    /// Give a hold group back. Returns how many rows moved to RELEASED.
    pub async fn release(&self, group_token: Uuid) -> SeatingResult<usize> {
        let mut tx = self.store.begin().await?;
        let holds = tx.lock_group(group_token).await?;
        if holds.is_empty() {
            return Err(SeatingError::GroupNotFound(group_token));
        }

        if holds.iter().any(|h| h.status == HoldStatus::Allocated) {
            return Err(SeatingError::CannotReleaseAllocated(group_token));
        }

        let mut released = 0;
        for hold in &holds {
            if ledger::release_hold(&mut *tx, hold).await?.is_some() {
                released += 1;
            }
        }
        tx.commit().await?;

        info!(group_token = %group_token, released, "Hold group released");
        Ok(released)
    }

    pub async fn hold_details(&self, group_token: Uuid) -> SeatingResult<Vec<Hold>> {
        let mut tx = self.store.begin().await?;
        let holds = tx.holds_for_group(group_token).await?;
        if holds.is_empty() {
            return Err(SeatingError::GroupNotFound(group_token));
        }
        Ok(holds)
    }
}

fn validate_reserve(req: &ReserveRequest) -> SeatingResult<()> {
    if req.event_id.trim().is_empty() {
        return Err(SeatingError::InvalidInput("Event id is required".to_string()));
    }
    if req.user_id.trim().is_empty() {
        return Err(SeatingError::InvalidInput("User id is required".to_string()));
    }
    if req.seat_codes.is_empty() {
        return Err(SeatingError::InvalidInput("At least one seat code is required".to_string()));
    }
    let mut seen = HashSet::new();
    for code in &req.seat_codes {
        if code.trim().is_empty() {
            return Err(SeatingError::InvalidInput("Seat code must not be blank".to_string()));
        }
        if !seen.insert(code.as_str()) {
            return Err(SeatingError::InvalidInput(format!("Duplicate seat code: {}", code)));
        }
    }
    Ok(())
}
