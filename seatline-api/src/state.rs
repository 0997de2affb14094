use std::sync::Arc;
use seatline_core::{Clock, HoldPolicy, ReservationEngine, SeatCatalog, SeatingStore, StatusProjector};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReservationEngine>,
    pub projector: Arc<StatusProjector>,
    pub catalog: Arc<SeatCatalog>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wires every component against the same store and clock.
    pub fn new(store: Arc<dyn SeatingStore>, clock: Arc<dyn Clock>, policy: HoldPolicy) -> Self {
        Self {
            engine: Arc::new(ReservationEngine::new(store.clone(), clock.clone(), policy)),
            projector: Arc::new(StatusProjector::new(store.clone(), clock.clone())),
            catalog: Arc::new(SeatCatalog::new(store, clock.clone())),
            clock,
        }
    }
}
