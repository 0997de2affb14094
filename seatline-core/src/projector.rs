use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use crate::clock::Clock;
use crate::models::{Hold, HoldStatus, Seat, SeatState, SeatStatusView};
use crate::repository::SeatingStore;
use crate::SeatingResult;

/// Read-only view of per-seat status. Never writes to the ledger.
pub struct StatusProjector {
    store: Arc<dyn SeatingStore>,
    clock: Arc<dyn Clock>,
}

impl StatusProjector {
    pub fn new(store: Arc<dyn SeatingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn status_for_event(&self, event_id: &str) -> SeatingResult<Vec<SeatStatusView>> {
        let mut tx = self.store.begin().await?;
        let seats = tx.seats_for_event(event_id).await?;
        if seats.is_empty() {
            return Ok(Vec::new());
        }
        let seat_ids: Vec<Uuid> = seats.iter().map(|s| s.id).collect();
        let holds = tx.holds_for_seats(&seat_ids).await?;
        drop(tx);

        Ok(project(&seats, &holds, self.clock.now()))
    }
}

/// ALLOCATED outranks HOLD; among equals the newest row wins.
fn outranks(candidate: &Hold, current: &Hold) -> bool {
    let rank = |h: &Hold| match h.status {
        HoldStatus::Allocated => 2,
        HoldStatus::Hold => 1,
        HoldStatus::Released => 0,
    };
    (rank(candidate), candidate.created_at) > (rank(current), current.created_at)
}

/// Effective status of each seat at `now`.
///
/// Applies the expiry test itself, so a HOLD past its expiry reads as
/// AVAILABLE whether or not the sweeper has released it yet.
pub fn project(seats: &[Seat], holds: &[Hold], now: DateTime<Utc>) -> Vec<SeatStatusView> {
    let mut chosen: HashMap<Uuid, &Hold> = HashMap::new();
    for hold in holds.iter().filter(|h| h.status != HoldStatus::Released) {
        let replace = chosen.get(&hold.seat_id).map_or(true, |current| outranks(hold, current));
        if replace {
            chosen.insert(hold.seat_id, hold);
        }
    }

    seats.iter()
        .map(|seat| {
            let live = chosen.get(&seat.id).copied().filter(|h| h.is_live(now));
            let status = match live.map(|h| h.status) {
                Some(HoldStatus::Allocated) => SeatState::Allocated,
                Some(HoldStatus::Hold) => SeatState::Hold,
                _ => SeatState::Available,
            };
            SeatStatusView {
                seat_id: seat.id,
                seat_code: seat.seat_code.clone(),
                section: seat.section.clone(),
                row_label: seat.row_label.clone(),
                seat_number: seat.seat_number,
                price_cents: seat.price_cents,
                status,
                group_token: live.map(|h| h.group_token),
                user_id: live.map(|h| h.user_id.clone()),
                expires_at: live.map(|h| h.expires_at),
                order_id: live.and_then(|h| h.order_id.clone()),
                allocated_at: live.and_then(|h| h.allocated_at),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seat(code: &str, number: i32) -> Seat {
        Seat {
            id: Uuid::new_v4(),
            event_id: "evt-1".to_string(),
            seat_code: code.to_string(),
            section: Some("Floor".to_string()),
            row_label: Some("A".to_string()),
            seat_number: number,
            price_cents: 25_000,
        }
    }

    fn hold(seat: &Seat, status: HoldStatus, created_at: DateTime<Utc>, ttl: i64) -> Hold {
        Hold {
            id: Uuid::new_v4(),
            seat_id: seat.id,
            event_id: seat.event_id.clone(),
            seat_code: seat.seat_code.clone(),
            user_id: "user-1".to_string(),
            group_token: Uuid::new_v4(),
            status,
            created_at,
            expires_at: created_at + Duration::seconds(ttl),
            allocated_at: None,
            order_id: None,
            idempotency_key: None,
        }
    }

    #[test]
    fn test_no_holds_is_available() {
        let seats = vec![seat("A1", 1)];
        let view = project(&seats, &[], Utc::now());
        assert_eq!(view[0].status, SeatState::Available);
        assert!(view[0].group_token.is_none());
    }

    #[test]
    fn test_expired_hold_reads_available_before_sweep() {
        let now = Utc::now();
        let seats = vec![seat("A1", 1)];
        let holds = vec![hold(&seats[0], HoldStatus::Hold, now - Duration::seconds(120), 90)];

        let view = project(&seats, &holds, now);
        assert_eq!(view[0].status, SeatState::Available);
        assert!(view[0].user_id.is_none());
    }

    #[test]
    fn test_allocated_outranks_newer_hold() {
        let now = Utc::now();
        let seats = vec![seat("A1", 1)];
        let mut allocated = hold(&seats[0], HoldStatus::Allocated, now - Duration::seconds(600), 90);
        allocated.order_id = Some("O1".to_string());
        let newer = hold(&seats[0], HoldStatus::Hold, now - Duration::seconds(5), 90);

        let view = project(&seats, &[newer, allocated.clone()], now);
        assert_eq!(view[0].status, SeatState::Allocated);
        assert_eq!(view[0].group_token, Some(allocated.group_token));
        assert_eq!(view[0].order_id.as_deref(), Some("O1"));
    }

    #[test]
    fn test_newest_live_hold_wins_and_released_ignored() {
        let now = Utc::now();
        let seats = vec![seat("A1", 1), seat("A2", 2)];
        let old = hold(&seats[0], HoldStatus::Hold, now - Duration::seconds(300), 90);
        let fresh = hold(&seats[0], HoldStatus::Hold, now - Duration::seconds(10), 90);
        let released = hold(&seats[1], HoldStatus::Released, now, 90);

        let view = project(&seats, &[fresh.clone(), old, released], now);
        assert_eq!(view[0].status, SeatState::Hold);
        assert_eq!(view[0].group_token, Some(fresh.group_token));
        assert_eq!(view[0].expires_at, Some(fresh.expires_at));
        assert_eq!(view[1].status, SeatState::Available);
    }
}
