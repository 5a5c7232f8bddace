use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::Notifier;
use crate::models::{Channels, Notification};

/// Hands notifications to an external push/email relay.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, notification: &Notification, channels: Channels) -> anyhow::Result<()> {
        let body = json!({
            "user_id": notification.user_id,
            "title": notification.title,
            "message": notification.message,
            "type": notification.category.as_str(),
            "data": notification.metadata,
            "send_push": channels.push,
            "send_email": channels.email,
        });

        self.client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("failed to reach notification relay")?
            .error_for_status()
            .context("notification relay returned error")?;

        Ok(())
    }
}

/// Development notifier: writes deliveries to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: &Notification, channels: Channels) -> anyhow::Result<()> {
        tracing::info!(
            user_id = %notification.user_id,
            category = notification.category.as_str(),
            push = channels.push,
            email = channels.email,
            title = %notification.title,
            "notification"
        );
        Ok(())
    }
}
