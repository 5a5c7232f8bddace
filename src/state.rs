use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::locks::BookingLocks;
use crate::services::notify::Notifier;
use crate::services::payments::PaymentGateway;
use crate::services::settings::SettingsService;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub payments: Box<dyn PaymentGateway>,
    pub notifier: Box<dyn Notifier>,
    pub settings: SettingsService,
    pub locks: BookingLocks,
}

impl AppState {
    pub fn new(
        conn: Connection,
        config: AppConfig,
        payments: Box<dyn PaymentGateway>,
        notifier: Box<dyn Notifier>,
    ) -> Arc<Self> {
        let settings = SettingsService::new(config.settings_ttl());
        Arc::new(Self {
            db: Arc::new(Mutex::new(conn)),
            config,
            payments,
            notifier,
            settings,
            locks: BookingLocks::default(),
        })
    }

    /// Short-lived access to the connection. Never hold across an await.
    pub fn db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
