use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use crate::clock::Clock;
use crate::models::{EventRecord, NewSeat, Seat, DEFAULT_PRICE_CENTS};
use crate::repository::SeatingStore;
use crate::{SeatingError, SeatingResult};

/// Event registry and seat definitions: the identity data holds point at.
pub struct SeatCatalog {
    store: Arc<dyn SeatingStore>,
    clock: Arc<dyn Clock>,
}

impl SeatCatalog {
    pub fn new(store: Arc<dyn SeatingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create_event(&self, event_id: &str, name: &str) -> SeatingResult<EventRecord> {
        let event_id = event_id.trim();
        if event_id.is_empty() {
            return Err(SeatingError::InvalidInput("Event id is required".to_string()));
        }

        let mut tx = self.store.begin().await?;
        if tx.find_event(event_id).await?.is_some() {
            return Err(SeatingError::InvalidInput(format!("Event already exists: {}", event_id)));
        }

        let event = EventRecord {
            event_id: event_id.to_string(),
            name: name.trim().to_string(),
            created_at: self.clock.now(),
        };
        tx.insert_event(&event).await?;
        tx.commit().await?;

        info!(event_id = %event.event_id, "Event created");
        Ok(event)
    }

    pub async fn list_events(&self) -> SeatingResult<Vec<EventRecord>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_events().await?)
    }

    /// Add seats to an event, skipping codes that already exist.
    ///
    /// A blank seat code fails the whole call. Seats without a number get the
    /// next number after the current highest one; seats without a price get
    /// the default price.
    pub async fn add_seats(&self, event_id: &str, defs: Vec<NewSeat>) -> SeatingResult<Vec<Seat>> {
        if defs.iter().any(|d| d.seat_code.trim().is_empty()) {
            return Err(SeatingError::InvalidInput("Seat code is required".to_string()));
        }

        let mut tx = self.store.begin().await?;
        if tx.find_event(event_id).await?.is_none() {
            return Err(SeatingError::EventNotFound(event_id.to_string()));
        }

        let existing = tx.seats_for_event(event_id).await?;
        let mut codes: HashSet<String> = existing.iter().map(|s| s.seat_code.clone()).collect();
        let mut next_number = existing.iter().map(|s| s.seat_number).max().unwrap_or(0) + 1;

        let mut created = Vec::new();
        for def in defs {
            let seat_code = def.seat_code.trim().to_string();
            if !codes.insert(seat_code.clone()) {
                continue;
            }

            let seat_number = match def.seat_number {
                Some(n) => n,
                None => {
                    let n = next_number;
                    next_number += 1;
                    n
                }
            };

            created.push(Seat {
                id: Uuid::new_v4(),
                event_id: event_id.to_string(),
                seat_code,
                section: def.section,
                row_label: def.row_label,
                seat_number,
                price_cents: def.price_cents.unwrap_or(DEFAULT_PRICE_CENTS),
            });
        }

        if !created.is_empty() {
            tx.insert_seats(&created).await?;
            tx.commit().await?;
            info!(event_id, added = created.len(), "Seats added");
        }

        Ok(created)
    }
}
