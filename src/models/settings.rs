use serde::{Deserialize, Serialize};

pub const COMMISSION_RATE_KEY: &str = "commission_rate";
pub const AUTO_RELEASE_HOURS_KEY: &str = "auto_release_hours";
pub const NO_SHOW_GRACE_MINUTES_KEY: &str = "no_show_grace_minutes";

/// One year.
pub const MAX_AUTO_RELEASE_HOURS: i64 = 8760;
/// One day.
pub const MAX_NO_SHOW_GRACE_MINUTES: i64 = 1440;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlatformSettings {
    /// Percentage of the booking total kept by the platform.
    pub commission_rate: f64,
    pub auto_release_hours: i64,
    pub no_show_grace_minutes: i64,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            commission_rate: 5.0,
            auto_release_hours: 24,
            no_show_grace_minutes: 15,
        }
    }
}

impl PlatformSettings {
    /// Build settings from stored key/value rows. Unknown keys are ignored,
    /// missing or unparseable values keep their defaults.
    pub fn from_rows(rows: &[(String, String)]) -> Self {
        let mut settings = Self::default();
        for (key, value) in rows {
            match key.as_str() {
                COMMISSION_RATE_KEY => {
                    if let Ok(v) = value.trim().parse() {
                        settings.commission_rate = v;
                    }
                }
                AUTO_RELEASE_HOURS_KEY => {
                    if let Ok(v) = value.trim().parse() {
                        settings.auto_release_hours = v;
                    }
                }
                NO_SHOW_GRACE_MINUTES_KEY => {
                    if let Ok(v) = value.trim().parse() {
                        settings.no_show_grace_minutes = v;
                    }
                }
                _ => {}
            }
        }
        settings
    }

    pub fn to_rows(&self) -> Vec<(&'static str, String)> {
        vec![
            (COMMISSION_RATE_KEY, self.commission_rate.to_string()),
            (AUTO_RELEASE_HOURS_KEY, self.auto_release_hours.to_string()),
            (NO_SHOW_GRACE_MINUTES_KEY, self.no_show_grace_minutes.to_string()),
        ]
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=100.0).contains(&self.commission_rate) {
            return Err("commission_rate must be between 0 and 100".to_string());
        }
        if !(0..=MAX_AUTO_RELEASE_HOURS).contains(&self.auto_release_hours) {
            return Err(format!(
                "auto_release_hours must be between 0 and {MAX_AUTO_RELEASE_HOURS}"
            ));
        }
        if !(1..=MAX_NO_SHOW_GRACE_MINUTES).contains(&self.no_show_grace_minutes) {
            return Err(format!(
                "no_show_grace_minutes must be between 1 and {MAX_NO_SHOW_GRACE_MINUTES}"
            ));
        }
        Ok(())
    }
}
