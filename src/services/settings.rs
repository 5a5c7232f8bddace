use std::sync::Mutex;
use std::time::{Duration, Instant};

use rusqlite::Connection;

use crate::db::queries;
use crate::models::PlatformSettings;

/// Single read path for platform settings. Values may be up to `ttl` stale;
/// a zero ttl reads through on every call.
pub struct SettingsService {
    ttl: Duration,
    cached: Mutex<Option<(Instant, PlatformSettings)>>,
}

impl SettingsService {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: Mutex::new(None),
        }
    }

    pub fn current(&self, conn: &Connection) -> anyhow::Result<PlatformSettings> {
        let mut cached = self.cached.lock().unwrap_or_else(|p| p.into_inner());
        if let Some((loaded_at, settings)) = *cached {
            if loaded_at.elapsed() < self.ttl {
                return Ok(settings);
            }
        }

        let settings = PlatformSettings::from_rows(&queries::get_setting_rows(conn)?);
        *cached = Some((Instant::now(), settings));
        Ok(settings)
    }

    pub fn update(&self, conn: &Connection, settings: &PlatformSettings) -> anyhow::Result<()> {
        for (key, value) in settings.to_rows() {
            queries::upsert_setting(conn, key, &value)?;
        }
        self.invalidate();
        tracing::info!(
            commission_rate = settings.commission_rate,
            auto_release_hours = settings.auto_release_hours,
            no_show_grace_minutes = settings.no_show_grace_minutes,
            "platform settings updated"
        );
        Ok(())
    }

    pub fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}
