use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub customer_id: String,
    pub provider_id: Option<String>,
    pub provider_account: Option<String>,
    pub service_date: NaiveDate,
    pub service_time: NaiveTime,
    pub estimated_hours: f64,
    pub hourly_rate: f64,
    pub total_price: f64,
    /// Percentage captured when the booking was created.
    pub commission_rate: f64,
    pub platform_commission: f64,
    pub provider_earnings: f64,
    pub status: BookingStatus,
    pub accepted_at: Option<NaiveDateTime>,
    pub declined_at: Option<NaiveDateTime>,
    pub declined_reason: Option<String>,
    pub arrived_at: Option<NaiveDateTime>,
    pub arrival_lat: Option<f64>,
    pub arrival_lng: Option<f64>,
    pub customer_confirmed_access: bool,
    pub no_show_fires_at: Option<NaiveDateTime>,
    pub no_show_detected: bool,
    pub no_show_charge_amount: Option<f64>,
    pub no_show_charged_at: Option<NaiveDateTime>,
    pub no_show_capture_status: CaptureStatus,
    pub no_show_payment_ref: Option<String>,
    pub no_show_capture_attempts: i64,
    pub actual_start_time: Option<NaiveDateTime>,
    pub actual_end_time: Option<NaiveDateTime>,
    pub actual_hours_worked: Option<f64>,
    pub final_amount: Option<f64>,
    pub payment_method: Option<String>,
    pub payment_ref: Option<String>,
    pub payment_status: PaymentStatus,
    pub authorized_amount: Option<f64>,
    pub captured_amount: Option<f64>,
    pub version: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    /// Amount the escrow release is computed from: the pro-rated final amount
    /// once work has ended, never more than what was actually captured.
    pub fn billable_amount(&self) -> f64 {
        let base = self.final_amount.unwrap_or(self.total_price);
        match self.captured_amount.or(self.authorized_amount) {
            Some(held) => base.min(held),
            None => base,
        }
    }

    /// Provider share of the billable amount at the commission rate fixed at creation.
    pub fn release_amount(&self) -> f64 {
        let billable = self.billable_amount();
        billable - billable * self.commission_rate / 100.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    PaymentPending,
    PaymentProcessing,
    PaymentFailed,
    Completed,
    AutoReleasePending,
    PaymentReleased,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::PaymentPending => "payment_pending",
            BookingStatus::PaymentProcessing => "payment_processing",
            BookingStatus::PaymentFailed => "payment_failed",
            BookingStatus::Completed => "completed",
            BookingStatus::AutoReleasePending => "auto_release_pending",
            BookingStatus::PaymentReleased => "payment_released",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "in_progress" => Some(BookingStatus::InProgress),
            "payment_pending" => Some(BookingStatus::PaymentPending),
            "payment_processing" => Some(BookingStatus::PaymentProcessing),
            "payment_failed" => Some(BookingStatus::PaymentFailed),
            "completed" => Some(BookingStatus::Completed),
            "auto_release_pending" => Some(BookingStatus::AutoReleasePending),
            "payment_released" => Some(BookingStatus::PaymentReleased),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::PaymentReleased | BookingStatus::Cancelled)
    }

    /// Transitions driven by the regular booking flow.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (*self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, PaymentPending)
                | (PaymentFailed, PaymentPending)
                | (PaymentPending, PaymentProcessing)
                | (PaymentPending, PaymentFailed)
                | (PaymentPending, Confirmed)
                | (PaymentProcessing, PaymentFailed)
                | (PaymentProcessing, Confirmed)
                | (Confirmed, InProgress)
                | (InProgress, Completed)
                | (Completed, AutoReleasePending)
                | (Completed, PaymentReleased)
                | (AutoReleasePending, PaymentReleased)
        )
    }

    /// Administrative transitions: cancel anything still open, force a release
    /// from anything not yet released.
    pub fn can_admin_transition_to(&self, next: BookingStatus) -> bool {
        match next {
            BookingStatus::Cancelled => !self.is_terminal(),
            BookingStatus::PaymentReleased => *self != BookingStatus::PaymentReleased,
            _ => self.can_transition_to(next),
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Processing,
    Failed,
    Released,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Released => "released",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(PaymentStatus::Unpaid),
            "paid" => Some(PaymentStatus::Paid),
            "processing" => Some(PaymentStatus::Processing),
            "failed" => Some(PaymentStatus::Failed),
            "released" => Some(PaymentStatus::Released),
            _ => None,
        }
    }
}

/// Outcome of collecting a no-show charge, tracked apart from the charge itself.
/// `Pending` means nothing was submitted to the gateway yet; `Processing`
/// means a capture was submitted and has not settled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    None,
    Pending,
    Processing,
    Captured,
    Failed,
    Voided,
    Refunded,
}

impl CaptureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureStatus::None => "none",
            CaptureStatus::Pending => "pending",
            CaptureStatus::Processing => "processing",
            CaptureStatus::Captured => "captured",
            CaptureStatus::Failed => "failed",
            CaptureStatus::Voided => "voided",
            CaptureStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(CaptureStatus::None),
            "pending" => Some(CaptureStatus::Pending),
            "processing" => Some(CaptureStatus::Processing),
            "captured" => Some(CaptureStatus::Captured),
            "failed" => Some(CaptureStatus::Failed),
            "voided" => Some(CaptureStatus::Voided),
            "refunded" => Some(CaptureStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub customer_id: String,
    pub provider_id: Option<String>,
    pub service_date: NaiveDate,
    pub service_time: NaiveTime,
    pub estimated_hours: f64,
    pub hourly_rate: f64,
    pub payment_method: Option<String>,
}
