use std::sync::Arc;
use std::time::Duration;
use seatline_core::ExpirySweeper;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, error};

/// Runs the expiry sweeper on a fixed interval until the task is aborted.
///
/// A failed pass is logged and the next tick tries again. Ticks missed while a
/// slow pass runs are skipped, not replayed.
pub fn start_expiry_worker(sweeper: Arc<ExpirySweeper>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Expiry worker started, sweeping every {:?}", every);

        loop {
            ticker.tick().await;
            if let Err(e) = sweeper.sweep_once().await {
                error!("Expiry sweep failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use seatline_core::events::LoggingNotifier;
    use seatline_core::{HoldPolicy, HoldStatus, InMemoryStore, ManualClock, NewSeat, ReservationEngine, ReserveRequest, SeatCatalog};

    #[tokio::test]
    async fn test_worker_releases_expired_holds() {
        let store = InMemoryStore::new();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 18, 0, 0).unwrap()));
        let catalog = SeatCatalog::new(Arc::new(store.clone()), clock.clone());
        catalog.create_event("evt-1", "Concert").await.unwrap();
        catalog.add_seats("evt-1", vec![NewSeat { seat_code: "A1".into(), ..Default::default() }]).await.unwrap();

        let engine = ReservationEngine::new(Arc::new(store.clone()), clock.clone(), HoldPolicy::from_seconds(90));
        engine.reserve(ReserveRequest {
            event_id: "evt-1".into(),
            user_id: "user-1".into(),
            seat_codes: vec!["A1".into()],
            idempotency_key: None,
        }).await.unwrap();
        clock.advance(chrono::Duration::seconds(91));

        let sweeper = Arc::new(ExpirySweeper::new(Arc::new(store.clone()), clock.clone(), Arc::new(LoggingNotifier)));
        let handle = start_expiry_worker(sweeper, Duration::from_secs(60));

        // First tick fires immediately
        let mut released = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if store.all_holds().await.iter().all(|h| h.status == HoldStatus::Released) {
                released = true;
                break;
            }
        }
        handle.abort();
        assert!(released);
    }
}
