use axum::{
    extract::{rejection::{JsonRejection, PathRejection}, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, FixedOffset, Utc};
use seatline_core::{
    AllocationOutcome, Clock, EventRecord, Hold, HoldStatus, NewSeat, Reservation, ReserveRequest, Seat,
    SeatState, SeatStatusView,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ReserveResponse {
    pub group_token: Uuid,
    pub expires_at: DateTime<FixedOffset>,
    pub seat_codes: Vec<String>,
    pub replayed: bool,
}

#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    pub group_token: Uuid,
    pub order_id: String,
}

#[derive(Debug, Serialize)]
pub struct AllocateResponse {
    pub group_token: Uuid,
    pub order_id: String,
    pub outcome: AllocationOutcome,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub group_token: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub group_token: Uuid,
    pub released: usize,
}

#[derive(Debug, Serialize)]
pub struct HoldResponse {
    pub hold_id: Uuid,
    pub event_id: String,
    pub seat_code: String,
    pub user_id: String,
    pub status: HoldStatus,
    pub created_at: DateTime<FixedOffset>,
    pub expires_at: DateTime<FixedOffset>,
    pub allocated_at: Option<DateTime<FixedOffset>>,
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HoldGroupResponse {
    pub group_token: Uuid,
    pub holds: Vec<HoldResponse>,
}

#[derive(Debug, Serialize)]
pub struct SeatStatusResponse {
    pub seat_id: Uuid,
    pub seat_code: String,
    pub section: Option<String>,
    pub row_label: Option<String>,
    pub seat_number: i32,
    pub price_cents: i64,
    pub status: SeatState,
    pub group_token: Option<Uuid>,
    pub user_id: Option<String>,
    pub expires_at: Option<DateTime<FixedOffset>>,
    pub order_id: Option<String>,
    pub allocated_at: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Serialize)]
pub struct SeatMapResponse {
    pub event_id: String,
    pub seats: Vec<SeatStatusResponse>,
}

#[derive(Debug, Deserialize)]
pub struct AddSeatsRequest {
    pub seats: Vec<NewSeat>,
}

#[derive(Debug, Serialize)]
pub struct AddSeatsResponse {
    pub event_id: String,
    pub created: Vec<Seat>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub event_id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub event_id: String,
    pub name: String,
    pub created_at: DateTime<FixedOffset>,
}

// ============================================================================
// Conversions
// ============================================================================

impl ReserveResponse {
    fn from_reservation(r: Reservation, clock: &dyn Clock) -> Self {
        Self {
            group_token: r.group_token,
            expires_at: clock.localize(r.expires_at),
            seat_codes: r.seat_codes,
            replayed: r.replayed,
        }
    }
}

impl HoldResponse {
    fn from_hold(h: Hold, clock: &dyn Clock) -> Self {
        Self {
            hold_id: h.id,
            event_id: h.event_id,
            seat_code: h.seat_code,
            user_id: h.user_id,
            status: h.status,
            created_at: clock.localize(h.created_at),
            expires_at: clock.localize(h.expires_at),
            allocated_at: localize_opt(clock, h.allocated_at),
            order_id: h.order_id,
        }
    }
}

impl SeatStatusResponse {
    fn from_view(v: SeatStatusView, clock: &dyn Clock) -> Self {
        Self {
            seat_id: v.seat_id,
            seat_code: v.seat_code,
            section: v.section,
            row_label: v.row_label,
            seat_number: v.seat_number,
            price_cents: v.price_cents,
            status: v.status,
            group_token: v.group_token,
            user_id: v.user_id,
            expires_at: localize_opt(clock, v.expires_at),
            order_id: v.order_id,
            allocated_at: localize_opt(clock, v.allocated_at),
        }
    }
}

impl EventResponse {
    fn from_record(e: EventRecord, clock: &dyn Clock) -> Self {
        Self {
            event_id: e.event_id,
            name: e.name,
            created_at: clock.localize(e.created_at),
        }
    }
}

fn localize_opt(clock: &dyn Clock, at: Option<DateTime<Utc>>) -> Option<DateTime<FixedOffset>> {
    at.map(|t| clock.localize(t))
}

// ============================================================================
// Handlers
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/seating/reserve", post(reserve))
        .route("/v1/seating/allocate", post(allocate))
        .route("/v1/seating/release", post(release))
        .route("/v1/seating/holds/{group_token}", get(hold_details))
        .route("/v1/seating/events", get(list_events).post(create_event))
        .route("/v1/seating/events/{event_id}/seats", get(seat_status).post(add_seats))
}

pub async fn reserve(
    State(state): State<AppState>,
    payload: Result<Json<ReserveRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ReserveResponse>), AppError> {
    let Json(req) = payload?;
    let reservation = state.engine.reserve(req).await?;

    // A replayed key returns the original group rather than creating one
    let status = if reservation.replayed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(ReserveResponse::from_reservation(reservation, state.clock.as_ref()))))
}

pub async fn allocate(
    State(state): State<AppState>,
    payload: Result<Json<AllocateRequest>, JsonRejection>,
) -> Result<Json<AllocateResponse>, AppError> {
    let Json(req) = payload?;
    let allocation = state.engine.allocate(req.group_token, &req.order_id).await?;

    Ok(Json(AllocateResponse {
        group_token: req.group_token,
        order_id: allocation.order_id,
        outcome: allocation.outcome,
    }))
}

pub async fn release(
    State(state): State<AppState>,
    payload: Result<Json<ReleaseRequest>, JsonRejection>,
) -> Result<Json<ReleaseResponse>, AppError> {
    let Json(req) = payload?;
    let released = state.engine.release(req.group_token).await?;

    Ok(Json(ReleaseResponse { group_token: req.group_token, released }))
}

pub async fn hold_details(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<HoldGroupResponse>, AppError> {
    let Path(group_token) = path?;
    let holds = state.engine.hold_details(group_token).await?;

    let holds = holds.into_iter()
        .map(|h| HoldResponse::from_hold(h, state.clock.as_ref()))
        .collect();
    Ok(Json(HoldGroupResponse { group_token, holds }))
}

pub async fn seat_status(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<SeatMapResponse>, AppError> {
    let views = state.projector.status_for_event(&event_id).await?;

    let seats = views.into_iter()
        .map(|v| SeatStatusResponse::from_view(v, state.clock.as_ref()))
        .collect();
    Ok(Json(SeatMapResponse { event_id, seats }))
}

pub async fn add_seats(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    payload: Result<Json<AddSeatsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AddSeatsResponse>), AppError> {
    let Json(req) = payload?;
    let created = state.catalog.add_seats(&event_id, req.seats).await?;

    Ok((StatusCode::CREATED, Json(AddSeatsResponse { event_id, created })))
}

pub async fn create_event(
    State(state): State<AppState>,
    payload: Result<Json<CreateEventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let Json(req) = payload?;
    let event = state.catalog.create_event(&req.event_id, &req.name).await?;

    Ok((StatusCode::CREATED, Json(EventResponse::from_record(event, state.clock.as_ref()))))
}

pub async fn list_events(
    State(state): State<AppState>,
) -> Result<Json<Vec<EventResponse>>, AppError> {
    let events = state.catalog.list_events().await?;

    Ok(Json(events.into_iter().map(|e| EventResponse::from_record(e, state.clock.as_ref())).collect()))
}
