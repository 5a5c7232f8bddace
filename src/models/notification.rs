use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub category: NotificationCategory,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    BookingRequested,
    BookingAccepted,
    BookingDeclined,
    BookingCancelled,
    CleanerArrived,
    NoShowDetected,
    AppealSubmitted,
    AppealResolved,
    PaymentFailed,
    PaymentReleased,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::BookingRequested => "booking_requested",
            NotificationCategory::BookingAccepted => "booking_accepted",
            NotificationCategory::BookingDeclined => "booking_declined",
            NotificationCategory::BookingCancelled => "booking_cancelled",
            NotificationCategory::CleanerArrived => "cleaner_arrived",
            NotificationCategory::NoShowDetected => "no_show_detected",
            NotificationCategory::AppealSubmitted => "appeal_submitted",
            NotificationCategory::AppealResolved => "appeal_resolved",
            NotificationCategory::PaymentFailed => "payment_failed",
            NotificationCategory::PaymentReleased => "payment_released",
        }
    }

    fn is_payment(&self) -> bool {
        matches!(
            self,
            NotificationCategory::NoShowDetected
                | NotificationCategory::AppealResolved
                | NotificationCategory::PaymentFailed
                | NotificationCategory::PaymentReleased
        )
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channels {
    pub push: bool,
    pub email: bool,
}

impl Channels {
    pub fn any(&self) -> bool {
        self.push || self.email
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationPreferences {
    #[serde(default)]
    pub user_id: String,
    pub booking_updates: bool,
    pub payment_notifications: bool,
    pub push_enabled: bool,
    pub email_enabled: bool,
    #[serde(with = "hhmm")]
    pub quiet_hours_start: NaiveTime,
    #[serde(with = "hhmm")]
    pub quiet_hours_end: NaiveTime,
}

impl NotificationPreferences {
    pub fn defaults_for(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            booking_updates: true,
            payment_notifications: true,
            push_enabled: true,
            email_enabled: true,
            quiet_hours_start: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
            quiet_hours_end: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }

    /// Quiet hours may wrap midnight (22:00 to 08:00). Equal bounds disable them.
    pub fn in_quiet_hours(&self, at: NaiveTime) -> bool {
        let (start, end) = (self.quiet_hours_start, self.quiet_hours_end);
        if start == end {
            false
        } else if start < end {
            at >= start && at < end
        } else {
            at >= start || at < end
        }
    }

    /// Channels a message of this category may go out on at the given time.
    /// Quiet hours hold back push only; email still goes out.
    pub fn channels_for(&self, category: NotificationCategory, at: NaiveTime) -> Channels {
        let wanted = if category.is_payment() {
            self.payment_notifications
        } else {
            self.booking_updates
        };
        if !wanted {
            return Channels::default();
        }
        Channels {
            push: self.push_enabled && !self.in_quiet_hours(at),
            email: self.email_enabled,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredNotification {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub category: String,
    pub metadata: serde_json::Value,
    pub is_read: bool,
    pub created_at: String,
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}
