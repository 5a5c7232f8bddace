use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{NotificationPreferences, StoredNotification};
use crate::state::AppState;

// GET /api/users/:id/notifications
#[derive(Deserialize)]
pub struct NotificationsQuery {
    pub limit: Option<i64>,
}

pub async fn get_notifications(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<Vec<StoredNotification>>, AppError> {
    let db = state.db();
    let notifications = queries::get_notifications(&db, &user_id, query.limit.unwrap_or(50))?;
    Ok(Json(notifications))
}

// POST /api/users/:id/notifications/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let db = state.db();
    let marked = queries::mark_notifications_read(&db, &user_id)?;
    Ok(Json(serde_json::json!({ "marked_read": marked })))
}

// GET /api/users/:id/notification-preferences
pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<NotificationPreferences>, AppError> {
    let db = state.db();
    let prefs = queries::get_preferences(&db, &user_id)?
        .unwrap_or_else(|| NotificationPreferences::defaults_for(&user_id));
    Ok(Json(prefs))
}

// PUT /api/users/:id/notification-preferences
pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(mut prefs): Json<NotificationPreferences>,
) -> Result<Json<NotificationPreferences>, AppError> {
    prefs.user_id = user_id;
    let db = state.db();
    queries::save_preferences(&db, &prefs)?;
    Ok(Json(prefs))
}
