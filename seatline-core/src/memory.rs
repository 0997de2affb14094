use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;
use crate::models::{EventRecord, Hold, HoldStatus, Seat};
use crate::repository::{SeatingStore, SeatingTx, StoreError, StoreResult};

#[derive(Debug, Clone, Default)]
struct Tables {
    events: BTreeMap<String, EventRecord>,
    seats: Vec<Seat>,
    holds: Vec<Hold>,
}

/// Reference store kept entirely in process memory.
///
/// A transaction holds the single table lock from `begin` until it is committed
/// or dropped, so transactions are fully serialized. Writes go to a staged copy
/// of the tables that replaces the committed state on `commit`.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every committed hold row, in insertion order.
    pub async fn all_holds(&self) -> Vec<Hold> {
        self.tables.lock().await.holds.clone()
    }
}

#[async_trait]
impl SeatingStore for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn SeatingTx>> {
        let committed = self.tables.clone().lock_owned().await;
        let working = committed.clone();
        Ok(Box::new(InMemoryTx { committed, working }))
    }
}

struct InMemoryTx {
    committed: OwnedMutexGuard<Tables>,
    working: Tables,
}

fn backend(msg: String) -> StoreError {
    StoreError::Backend(msg.into())
}

#[async_trait]
impl SeatingTx for InMemoryTx {
    async fn find_event(&mut self, event_id: &str) -> StoreResult<Option<EventRecord>> {
        Ok(self.working.events.get(event_id).cloned())
    }

    async fn insert_event(&mut self, event: &EventRecord) -> StoreResult<()> {
        if self.working.events.contains_key(&event.event_id) {
            return Err(backend(format!("duplicate event id {}", event.event_id)));
        }
        self.working.events.insert(event.event_id.clone(), event.clone());
        Ok(())
    }

    async fn list_events(&mut self) -> StoreResult<Vec<EventRecord>> {
        Ok(self.working.events.values().cloned().collect())
    }

    async fn seats_for_event(&mut self, event_id: &str) -> StoreResult<Vec<Seat>> {
        let mut seats: Vec<Seat> = self.working.seats.iter()
            .filter(|s| s.event_id == event_id)
            .cloned()
            .collect();
        seats.sort_by(|a, b| a.seat_number.cmp(&b.seat_number).then_with(|| a.seat_code.cmp(&b.seat_code)));
        Ok(seats)
    }

    async fn insert_seats(&mut self, seats: &[Seat]) -> StoreResult<()> {
        for seat in seats {
            let taken = self.working.seats.iter()
                .any(|s| s.event_id == seat.event_id && s.seat_code == seat.seat_code);
            if taken {
                return Err(backend(format!("duplicate seat {}/{}", seat.event_id, seat.seat_code)));
            }
            self.working.seats.push(seat.clone());
        }
        Ok(())
    }

    async fn lock_seats(&mut self, event_id: &str, seat_codes: &[String]) -> StoreResult<Vec<Seat>> {
        Ok(self.working.seats.iter()
            .filter(|s| s.event_id == event_id && seat_codes.contains(&s.seat_code))
            .cloned()
            .collect())
    }

    async fn lock_idempotency_key(&mut self, _key: &str) -> StoreResult<()> {
        // The table lock already serializes every transaction.
        Ok(())
    }

    async fn holds_by_idempotency_key(&mut self, key: &str) -> StoreResult<Vec<Hold>> {
        Ok(self.working.holds.iter()
            .filter(|h| h.idempotency_key.as_deref() == Some(key))
            .cloned()
            .collect())
    }

    async fn lock_holds_for_seats(&mut self, seat_ids: &[Uuid]) -> StoreResult<Vec<Hold>> {
        Ok(self.working.holds.iter()
            .filter(|h| seat_ids.contains(&h.seat_id) && h.status != HoldStatus::Released)
            .cloned()
            .collect())
    }

    async fn holds_for_seats(&mut self, seat_ids: &[Uuid]) -> StoreResult<Vec<Hold>> {
        Ok(self.working.holds.iter()
            .filter(|h| seat_ids.contains(&h.seat_id))
            .cloned()
            .collect())
    }

    async fn holds_for_group(&mut self, group_token: Uuid) -> StoreResult<Vec<Hold>> {
        Ok(self.working.holds.iter()
            .filter(|h| h.group_token == group_token)
            .cloned()
            .collect())
    }

    async fn lock_group(&mut self, group_token: Uuid) -> StoreResult<Vec<Hold>> {
        self.holds_for_group(group_token).await
    }

    async fn insert_holds(&mut self, holds: &[Hold]) -> StoreResult<()> {
        for hold in holds {
            if let Some(key) = hold.idempotency_key.as_deref() {
                let clash = self.working.holds.iter()
                    .any(|h| h.idempotency_key.as_deref() == Some(key) && h.group_token != hold.group_token);
                if clash {
                    return Err(backend(format!("idempotency key {} already used", key)));
                }
            }
        }
        self.working.holds.extend_from_slice(holds);
        Ok(())
    }

    async fn mark_allocated(&mut self, hold_ids: &[Uuid], allocated_at: DateTime<Utc>, order_id: &str) -> StoreResult<u64> {
        let mut updated = 0;
        for hold in self.working.holds.iter_mut()
            .filter(|h| hold_ids.contains(&h.id) && h.status == HoldStatus::Hold)
        {
            hold.status = HoldStatus::Allocated;
            hold.allocated_at = Some(allocated_at);
            hold.order_id = Some(order_id.to_string());
            updated += 1;
        }
        Ok(updated)
    }

    async fn release_hold(&mut self, hold_id: Uuid) -> StoreResult<Option<Hold>> {
        let hold = self.working.holds.iter_mut()
            .find(|h| h.id == hold_id)
            .ok_or(StoreError::MissingHold(hold_id))?;
        if hold.status != HoldStatus::Hold {
            return Ok(None);
        }
        hold.status = HoldStatus::Released;
        Ok(Some(hold.clone()))
    }

    async fn lock_expired_holds(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<Hold>> {
        Ok(self.working.holds.iter()
            .filter(|h| h.is_expired(now))
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTx { mut committed, working } = *self;
        *committed = working;
        Ok(())
    }
}
