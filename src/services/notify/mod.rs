pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::db::queries;
use crate::models::{Channels, Notification, NotificationPreferences};
use crate::state::AppState;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification, channels: Channels) -> anyhow::Result<()>;
}

/// Record a notification and hand it to the delivery channels the user allows
/// at this time. Never fails the calling operation: problems are logged.
pub async fn notify_user(state: &Arc<AppState>, notification: Notification, now: NaiveDateTime) {
    let prefs = {
        let db = state.db();
        let stored = queries::insert_notification(
            &db,
            &notification.user_id,
            &notification.title,
            &notification.message,
            notification.category.as_str(),
            &notification.metadata,
        );
        if let Err(e) = stored {
            tracing::error!(error = %e, user_id = %notification.user_id, "failed to store notification");
        }
        queries::get_preferences(&db, &notification.user_id)
    };

    let prefs = match prefs {
        Ok(Some(p)) => p,
        Ok(None) => NotificationPreferences::defaults_for(&notification.user_id),
        Err(e) => {
            tracing::warn!(error = %e, user_id = %notification.user_id, "failed to load notification preferences, using defaults");
            NotificationPreferences::defaults_for(&notification.user_id)
        }
    };

    let channels = prefs.channels_for(notification.category, now.time());
    if !channels.any() {
        tracing::debug!(
            user_id = %notification.user_id,
            category = notification.category.as_str(),
            "notification suppressed by preferences"
        );
        return;
    }

    if let Err(e) = state.notifier.deliver(&notification, channels).await {
        tracing::warn!(
            error = %e,
            user_id = %notification.user_id,
            category = notification.category.as_str(),
            "notification delivery failed"
        );
    }
}
