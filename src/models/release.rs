use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRelease {
    pub id: String,
    pub booking_id: String,
    pub released_by: String,
    pub release_type: ReleaseType,
    pub amount_released: f64,
    pub transfer_ref: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseType {
    /// Customer-initiated once the job is completed.
    Full,
    AdminOverride,
    /// System-initiated after the auto-release delay.
    Auto,
}

impl ReleaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseType::Full => "full",
            ReleaseType::AdminOverride => "admin_override",
            ReleaseType::Auto => "auto",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(ReleaseType::Full),
            "admin_override" => Some(ReleaseType::AdminOverride),
            "auto" => Some(ReleaseType::Auto),
            _ => None,
        }
    }
}
