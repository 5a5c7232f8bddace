use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{AppealReason, Booking, ChargeAppeal, NewBooking, PaymentRelease, ReleaseType};
use crate::services::arrival::{self, Coordinates};
use crate::services::lifecycle::{self, load_booking, Actor};
use crate::services::{appeals, escrow, time_tracking};
use crate::state::AppState;

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewBooking>,
) -> Result<Json<Booking>, AppError> {
    let booking = lifecycle::create_booking(&state, body, Utc::now().naive_utc()).await?;
    Ok(Json(booking))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(load_booking(&state, &id)?))
}

// POST /api/bookings/:id/accept
#[derive(Deserialize)]
pub struct AcceptRequest {
    pub provider_id: String,
    pub provider_account: Option<String>,
}

pub async fn accept_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AcceptRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = lifecycle::accept_booking(
        &state,
        &id,
        &body.provider_id,
        body.provider_account,
        Utc::now().naive_utc(),
    )
    .await?;
    Ok(Json(booking))
}

// POST /api/bookings/:id/decline
#[derive(Deserialize)]
pub struct DeclineRequest {
    pub provider_id: String,
    #[serde(default)]
    pub reason: String,
}

pub async fn decline_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<DeclineRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = lifecycle::decline_booking(
        &state,
        &id,
        &body.provider_id,
        &body.reason,
        Utc::now().naive_utc(),
    )
    .await?;
    Ok(Json(booking))
}

// POST /api/bookings/:id/cancel
#[derive(Deserialize)]
pub struct CancelRequest {
    pub customer_id: String,
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<CancelRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking =
        lifecycle::cancel_booking(&state, &id, &body.customer_id, Utc::now().naive_utc()).await?;
    Ok(Json(booking))
}

// POST /api/bookings/:id/payment-intent
#[derive(Deserialize, Default)]
pub struct PaymentIntentRequest {
    pub payment_method: Option<String>,
}

pub async fn create_payment_intent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<PaymentIntentRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking =
        lifecycle::create_payment_intent(&state, &id, body.payment_method, Utc::now().naive_utc())
            .await?;
    Ok(Json(booking))
}

// POST /api/bookings/:id/payment-confirm
pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let booking = lifecycle::confirm_payment(&state, &id, Utc::now().naive_utc()).await?;
    Ok(Json(booking))
}

// POST /api/bookings/:id/arrival
#[derive(Deserialize)]
pub struct ArrivalRequest {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(default)]
    pub customer_confirmed: bool,
}

pub async fn record_arrival(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ArrivalRequest>,
) -> Result<Json<Booking>, AppError> {
    let coordinates = match (body.lat, body.lng) {
        (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
        (None, None) => None,
        _ => {
            return Err(AppError::Validation(
                "lat and lng must be provided together".to_string(),
            ))
        }
    };
    let booking = arrival::record_arrival(
        &state,
        &id,
        coordinates,
        body.customer_confirmed,
        Utc::now().naive_utc(),
    )
    .await?;
    Ok(Json(booking))
}

// POST /api/bookings/:id/confirm-access
pub async fn confirm_access(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let booking = arrival::confirm_customer_access(&state, &id, Utc::now().naive_utc()).await?;
    Ok(Json(booking))
}

// POST /api/bookings/:id/start
pub async fn start_work(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let booking = time_tracking::start_work(&state, &id, Utc::now().naive_utc()).await?;
    Ok(Json(booking))
}

// POST /api/bookings/:id/end
pub async fn end_work(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let booking = time_tracking::end_work(&state, &id, Utc::now().naive_utc()).await?;
    Ok(Json(booking))
}

// POST /api/bookings/:id/release
#[derive(Deserialize)]
pub struct ReleaseRequest {
    pub customer_id: String,
}

pub async fn release_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReleaseRequest>,
) -> Result<Json<PaymentRelease>, AppError> {
    let actor = Actor::user(body.customer_id);
    let release =
        escrow::release(&state, &id, &actor, ReleaseType::Full, Utc::now().naive_utc()).await?;
    Ok(Json(release))
}

// GET /api/bookings/:id/releases
pub async fn get_releases(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PaymentRelease>>, AppError> {
    Ok(Json(escrow::get_releases(&state, &id)?))
}

// POST /api/bookings/:id/appeals
#[derive(Deserialize)]
pub struct AppealRequest {
    pub customer_id: String,
    pub reason: AppealReason,
    #[serde(default)]
    pub description: String,
}

pub async fn submit_appeal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AppealRequest>,
) -> Result<Json<ChargeAppeal>, AppError> {
    let appeal = appeals::submit_appeal(
        &state,
        &id,
        &body.customer_id,
        body.reason,
        &body.description,
        Utc::now().naive_utc(),
    )
    .await?;
    Ok(Json(appeal))
}

// GET /api/bookings/:id/appeals
pub async fn get_appeals(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ChargeAppeal>>, AppError> {
    Ok(Json(appeals::list_booking_appeals(&state, &id)?))
}
