use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    AppealDecision, AppealStatus, Booking, BookingStatus, ChargeAppeal, PaymentRelease,
    PlatformSettings, ReleaseType,
};
use crate::services::lifecycle::{self, Actor};
use crate::services::{appeals, escrow, no_show};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if expected_token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

fn admin_actor(admin_id: Option<String>) -> Actor {
    Actor::admin(admin_id.filter(|id| !id.trim().is_empty()).unwrap_or_else(|| "admin".to_string()))
}

// GET /api/admin/status
#[derive(Serialize)]
pub struct StatusCount {
    status: String,
    count: i64,
}

#[derive(Serialize)]
pub struct StatusResponse {
    bookings_by_status: Vec<StatusCount>,
    total_captured: f64,
    total_commission: f64,
    total_released: f64,
    no_show_charges: i64,
    pending_appeals: i64,
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let stats = {
        let db = state.db();
        queries::get_oversight_stats(&db)?
    };

    Ok(Json(StatusResponse {
        bookings_by_status: stats
            .bookings_by_status
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect(),
        total_captured: stats.total_captured,
        total_commission: stats.total_commission,
        total_released: stats.total_released,
        no_show_charges: stats.no_show_charges,
        pending_appeals: stats.pending_appeals,
    }))
}

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let limit = query.limit.unwrap_or(50);
    let status_filter = match query.status.as_deref() {
        Some(s) => Some(
            BookingStatus::parse(s)
                .ok_or_else(|| AppError::Validation(format!("unknown booking status: {s}")))?,
        ),
        None => None,
    };

    let bookings = {
        let db = state.db();
        queries::get_all_bookings(&db, status_filter.map(|s| s.as_str()), limit)?
    };
    Ok(Json(bookings))
}

// POST /api/admin/bookings/:id/cancel
#[derive(Deserialize)]
pub struct AdminCancelRequest {
    pub admin_id: Option<String>,
    #[serde(default)]
    pub reason: String,
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AdminCancelRequest>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let actor = admin_actor(body.admin_id);
    let booking =
        lifecycle::admin_cancel(&state, &id, &actor, &body.reason, Utc::now().naive_utc()).await?;
    Ok(Json(booking))
}

// POST /api/admin/bookings/:id/release
#[derive(Deserialize, Default)]
pub struct AdminReleaseRequest {
    pub admin_id: Option<String>,
}

pub async fn release_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AdminReleaseRequest>,
) -> Result<Json<PaymentRelease>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let actor = admin_actor(body.admin_id);
    let release = escrow::release(
        &state,
        &id,
        &actor,
        ReleaseType::AdminOverride,
        Utc::now().naive_utc(),
    )
    .await?;
    Ok(Json(release))
}

// POST /api/admin/bookings/:id/no-show-retry
pub async fn retry_no_show_capture(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let booking = no_show::retry_capture(&state, &id, Utc::now().naive_utc()).await?;
    Ok(Json(booking))
}

// GET /api/admin/appeals
#[derive(Deserialize)]
pub struct AppealsQuery {
    pub status: Option<AppealStatus>,
    pub limit: Option<i64>,
}

pub async fn get_appeals(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AppealsQuery>,
) -> Result<Json<Vec<ChargeAppeal>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let appeals = appeals::list_appeals(&state, query.status, query.limit.unwrap_or(50))?;
    Ok(Json(appeals))
}

// POST /api/admin/appeals/:id/resolve
#[derive(Deserialize)]
pub struct ResolveAppealRequest {
    pub reviewer_id: String,
    pub decision: AppealDecision,
    #[serde(default)]
    pub notes: String,
}

pub async fn resolve_appeal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ResolveAppealRequest>,
) -> Result<Json<ChargeAppeal>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let appeal = appeals::resolve_appeal(
        &state,
        &id,
        &body.reviewer_id,
        body.decision,
        &body.notes,
        Utc::now().naive_utc(),
    )
    .await?;
    Ok(Json(appeal))
}

// GET /api/admin/settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<PlatformSettings>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let settings = {
        let db = state.db();
        state.settings.current(&db)?
    };
    Ok(Json(settings))
}

// POST /api/admin/settings
#[derive(Deserialize)]
pub struct UpdateSettingsRequest {
    pub commission_rate: Option<f64>,
    pub auto_release_hours: Option<i64>,
    pub no_show_grace_minutes: Option<i64>,
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UpdateSettingsRequest>,
) -> Result<Json<PlatformSettings>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db();
    let mut settings = state.settings.current(&db)?;
    if let Some(rate) = body.commission_rate {
        settings.commission_rate = rate;
    }
    if let Some(hours) = body.auto_release_hours {
        settings.auto_release_hours = hours;
    }
    if let Some(minutes) = body.no_show_grace_minutes {
        settings.no_show_grace_minutes = minutes;
    }
    settings.validate().map_err(AppError::Validation)?;

    state.settings.update(&db, &settings)?;
    Ok(Json(settings))
}
