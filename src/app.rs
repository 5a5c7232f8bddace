use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::handlers::{admin, bookings, health, users};
use crate::state::AppState;

/// Build the router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(health::health))
        .route("/api/bookings", post(bookings::create_booking))
        .route("/api/bookings/:id", get(bookings::get_booking))
        .route("/api/bookings/:id/accept", post(bookings::accept_booking))
        .route("/api/bookings/:id/decline", post(bookings::decline_booking))
        .route("/api/bookings/:id/cancel", post(bookings::cancel_booking))
        .route(
            "/api/bookings/:id/payment-intent",
            post(bookings::create_payment_intent),
        )
        .route(
            "/api/bookings/:id/payment-confirm",
            post(bookings::confirm_payment),
        )
        .route("/api/bookings/:id/arrival", post(bookings::record_arrival))
        .route(
            "/api/bookings/:id/confirm-access",
            post(bookings::confirm_access),
        )
        .route("/api/bookings/:id/start", post(bookings::start_work))
        .route("/api/bookings/:id/end", post(bookings::end_work))
        .route("/api/bookings/:id/release", post(bookings::release_payment))
        .route("/api/bookings/:id/releases", get(bookings::get_releases))
        .route(
            "/api/bookings/:id/appeals",
            get(bookings::get_appeals).post(bookings::submit_appeal),
        )
        .route("/api/admin/status", get(admin::get_status))
        .route("/api/admin/bookings", get(admin::get_bookings))
        .route(
            "/api/admin/bookings/:id/cancel",
            post(admin::cancel_booking),
        )
        .route(
            "/api/admin/bookings/:id/release",
            post(admin::release_payment),
        )
        .route(
            "/api/admin/bookings/:id/no-show-retry",
            post(admin::retry_no_show_capture),
        )
        .route("/api/admin/appeals", get(admin::get_appeals))
        .route(
            "/api/admin/appeals/:id/resolve",
            post(admin::resolve_appeal),
        )
        .route(
            "/api/admin/settings",
            get(admin::get_settings).post(admin::update_settings),
        )
        .route(
            "/api/users/:id/notifications",
            get(users::get_notifications),
        )
        .route(
            "/api/users/:id/notifications/read",
            post(users::mark_read),
        )
        .route(
            "/api/users/:id/notification-preferences",
            get(users::get_preferences).put(users::update_preferences),
        )
        .layer(trace_layer)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
