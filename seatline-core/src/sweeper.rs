use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use crate::clock::Clock;
use crate::events::{HoldReleasedEvent, ReleaseNotifier};
use crate::ledger;
use crate::repository::SeatingStore;
use crate::SeatingResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub released: usize,
    pub failed: usize,
}

/// Background safety net that releases holds nobody allocated in time.
///
/// One pass is one transaction. A row that fails to transition is logged and
/// skipped; the rest of the pass still commits and the row is picked up again
/// on the next pass.
pub struct ExpirySweeper {
    store: Arc<dyn SeatingStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn ReleaseNotifier>,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn SeatingStore>, clock: Arc<dyn Clock>, notifier: Arc<dyn ReleaseNotifier>) -> Self {
        Self { store, clock, notifier }
    }

    pub async fn sweep_once(&self) -> SeatingResult<SweepReport> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let expired = tx.lock_expired_holds(now).await?;

        let mut report = SweepReport {
            examined: expired.len(),
            ..Default::default()
        };
        let mut released = Vec::new();

        for hold in &expired {
            match ledger::release_hold(&mut *tx, hold).await {
                Ok(Some(row)) => released.push(row),
                // Another path got there first
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(hold_id = %hold.id, group_token = %hold.group_token, error = %e, "Failed to release expired hold, skipping");
                }
            }
        }
        tx.commit().await?;
        report.released = released.len();

        if released.is_empty() {
            debug!(examined = report.examined, "Sweep found nothing to release");
            return Ok(report);
        }

        info!(released = report.released, failed = report.failed, "Expired holds released");
        let events: Vec<HoldReleasedEvent> = released.iter()
            .map(|h| HoldReleasedEvent::from_hold(h, now.timestamp()))
            .collect();
        self.notifier.holds_released(&events).await;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SeatCatalog;
    use crate::clock::ManualClock;
    use crate::engine::{HoldPolicy, ReservationEngine, ReserveRequest};
    use crate::memory::InMemoryStore;
    use crate::models::{EventRecord, Hold, HoldStatus, NewSeat, Seat};
    use crate::repository::{SeatingTx, StoreError, StoreResult};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<HoldReleasedEvent>>,
    }

    #[async_trait]
    impl ReleaseNotifier for RecordingNotifier {
        async fn holds_released(&self, events: &[HoldReleasedEvent]) {
            self.seen.lock().unwrap().extend_from_slice(events);
        }
    }

    struct Fixture {
        store: InMemoryStore,
        clock: Arc<ManualClock>,
        engine: ReservationEngine,
        notifier: Arc<RecordingNotifier>,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 18, 0, 0).unwrap()));
        let catalog = SeatCatalog::new(Arc::new(store.clone()), clock.clone());
        catalog.create_event("evt-1", "Concert").await.unwrap();
        let seats = ["A1", "A2", "A3"].iter()
            .map(|c| NewSeat { seat_code: c.to_string(), ..Default::default() })
            .collect();
        catalog.add_seats("evt-1", seats).await.unwrap();

        let engine = ReservationEngine::new(Arc::new(store.clone()), clock.clone(), HoldPolicy::from_seconds(90));
        Fixture { store, clock, engine, notifier: Arc::new(RecordingNotifier::default()) }
    }

    fn reserve(codes: &[&str]) -> ReserveRequest {
        ReserveRequest {
            event_id: "evt-1".to_string(),
            user_id: "user-1".to_string(),
            seat_codes: codes.iter().map(|c| c.to_string()).collect(),
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn test_sweep_releases_only_expired_holds() {
        let f = fixture().await;
        let old = f.engine.reserve(reserve(&["A1", "A2"])).await.unwrap();
        f.clock.advance(Duration::seconds(60));
        let young = f.engine.reserve(reserve(&["A3"])).await.unwrap();
        f.clock.advance(Duration::seconds(31));

        let sweeper = ExpirySweeper::new(Arc::new(f.store.clone()), f.clock.clone(), f.notifier.clone());
        let report = sweeper.sweep_once().await.unwrap();

        assert_eq!(report, SweepReport { examined: 2, released: 2, failed: 0 });
        for hold in f.store.all_holds().await {
            let expected = if hold.group_token == old.group_token { HoldStatus::Released } else { HoldStatus::Hold };
            assert_eq!(hold.status, expected);
        }
        let seen = f.notifier.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|e| e.group_token == old.group_token));
        assert_ne!(old.group_token, young.group_token);
    }

    #[tokio::test]
    async fn test_second_sweep_is_noop() {
        let f = fixture().await;
        f.engine.reserve(reserve(&["A1"])).await.unwrap();
        f.clock.advance(Duration::seconds(120));

        let sweeper = ExpirySweeper::new(Arc::new(f.store.clone()), f.clock.clone(), f.notifier.clone());
        assert_eq!(sweeper.sweep_once().await.unwrap().released, 1);
        assert_eq!(sweeper.sweep_once().await.unwrap(), SweepReport::default());
        assert_eq!(f.notifier.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_skips_allocated_and_inline_expired() {
        let f = fixture().await;
        let allocated = f.engine.reserve(reserve(&["A1"])).await.unwrap();
        f.engine.allocate(allocated.group_token, "O1").await.unwrap();
        let late = f.engine.reserve(reserve(&["A2"])).await.unwrap();
        f.clock.advance(Duration::seconds(200));
        // Inline expiry on allocate gets there before the sweeper
        assert!(f.engine.allocate(late.group_token, "O2").await.is_err());

        let sweeper = ExpirySweeper::new(Arc::new(f.store.clone()), f.clock.clone(), f.notifier.clone());
        let report = sweeper.sweep_once().await.unwrap();

        assert_eq!(report.released, 0);
        let holds = f.store.all_holds().await;
        assert_eq!(holds.iter().filter(|h| h.status == HoldStatus::Allocated).count(), 1);
        assert_eq!(holds.iter().filter(|h| h.status == HoldStatus::Released).count(), 1);
    }

    /// Store wrapper whose release of one particular row always fails.
    struct FlakyStore {
        inner: InMemoryStore,
        poisoned: Arc<Mutex<Option<Uuid>>>,
    }

    struct FlakyTx {
        inner: Box<dyn SeatingTx>,
        poisoned: Option<Uuid>,
    }

    #[async_trait]
    impl SeatingStore for FlakyStore {
        async fn begin(&self) -> StoreResult<Box<dyn SeatingTx>> {
            let poisoned = *self.poisoned.lock().unwrap();
            Ok(Box::new(FlakyTx { inner: self.inner.begin().await?, poisoned }))
        }
    }

    #[async_trait]
    impl SeatingTx for FlakyTx {
        async fn find_event(&mut self, event_id: &str) -> StoreResult<Option<EventRecord>> {
            self.inner.find_event(event_id).await
        }
        async fn insert_event(&mut self, event: &EventRecord) -> StoreResult<()> {
            self.inner.insert_event(event).await
        }
        async fn list_events(&mut self) -> StoreResult<Vec<EventRecord>> {
            self.inner.list_events().await
        }
        async fn seats_for_event(&mut self, event_id: &str) -> StoreResult<Vec<Seat>> {
            self.inner.seats_for_event(event_id).await
        }
        async fn insert_seats(&mut self, seats: &[Seat]) -> StoreResult<()> {
            self.inner.insert_seats(seats).await
        }
        async fn lock_seats(&mut self, event_id: &str, seat_codes: &[String]) -> StoreResult<Vec<Seat>> {
            self.inner.lock_seats(event_id, seat_codes).await
        }
        async fn lock_idempotency_key(&mut self, key: &str) -> StoreResult<()> {
            self.inner.lock_idempotency_key(key).await
        }
        async fn holds_by_idempotency_key(&mut self, key: &str) -> StoreResult<Vec<Hold>> {
            self.inner.holds_by_idempotency_key(key).await
        }
        async fn lock_holds_for_seats(&mut self, seat_ids: &[Uuid]) -> StoreResult<Vec<Hold>> {
            self.inner.lock_holds_for_seats(seat_ids).await
        }
        async fn holds_for_seats(&mut self, seat_ids: &[Uuid]) -> StoreResult<Vec<Hold>> {
            self.inner.holds_for_seats(seat_ids).await
        }
        async fn holds_for_group(&mut self, group_token: Uuid) -> StoreResult<Vec<Hold>> {
            self.inner.holds_for_group(group_token).await
        }
        async fn lock_group(&mut self, group_token: Uuid) -> StoreResult<Vec<Hold>> {
            self.inner.lock_group(group_token).await
        }
        async fn insert_holds(&mut self, holds: &[Hold]) -> StoreResult<()> {
            self.inner.insert_holds(holds).await
        }
        async fn mark_allocated(&mut self, hold_ids: &[Uuid], allocated_at: DateTime<Utc>, order_id: &str) -> StoreResult<u64> {
            self.inner.mark_allocated(hold_ids, allocated_at, order_id).await
        }
        async fn release_hold(&mut self, hold_id: Uuid) -> StoreResult<Option<Hold>> {
            if self.poisoned == Some(hold_id) {
                return Err(StoreError::Backend("simulated write failure".into()));
            }
            self.inner.release_hold(hold_id).await
        }
        async fn lock_expired_holds(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<Hold>> {
            self.inner.lock_expired_holds(now).await
        }
        async fn commit(self: Box<Self>) -> StoreResult<()> {
            self.inner.commit().await
        }
    }

    #[tokio::test]
    async fn test_failing_row_does_not_block_sweep() {
        let f = fixture().await;
        f.engine.reserve(reserve(&["A1", "A2", "A3"])).await.unwrap();
        f.clock.advance(Duration::seconds(91));
        let bad = f.store.all_holds().await[1].id;

        let poisoned = Arc::new(Mutex::new(Some(bad)));
        let flaky = FlakyStore { inner: f.store.clone(), poisoned: poisoned.clone() };
        let sweeper = ExpirySweeper::new(Arc::new(flaky), f.clock.clone(), f.notifier.clone());

        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report, SweepReport { examined: 3, released: 2, failed: 1 });
        let stuck: Vec<Hold> = f.store.all_holds().await.into_iter()
            .filter(|h| h.status == HoldStatus::Hold)
            .collect();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].id, bad);

        // Next pass retries the row once the fault clears
        *poisoned.lock().unwrap() = None;
        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report, SweepReport { examined: 1, released: 1, failed: 0 });
    }
}
