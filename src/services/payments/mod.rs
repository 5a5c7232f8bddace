pub mod stripe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub booking_id: String,
    pub amount: f64,
    pub payment_method: String,
    /// Provider's linked payout account, if one is on file.
    pub provider_account: Option<String>,
    pub platform_fee: f64,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaptureOutcome {
    Succeeded,
    Processing,
    Failed,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Place a hold on the customer's payment method; returns the payment reference.
    async fn authorize(&self, request: &AuthorizeRequest) -> anyhow::Result<String>;

    async fn capture(&self, payment_ref: &str) -> anyhow::Result<CaptureOutcome>;

    /// Current settlement state of a payment whose capture was already submitted.
    async fn capture_status(&self, payment_ref: &str) -> anyhow::Result<CaptureOutcome>;

    /// Refund part or all of a captured payment; returns the refund reference.
    async fn refund(&self, payment_ref: &str, amount: f64) -> anyhow::Result<String>;
}

/// Gateways take integer minor units.
pub fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_cents_rounds_to_nearest() {
        assert_eq!(to_cents(25.0), 2500);
        assert_eq!(to_cents(37.5), 3750);
        assert_eq!(to_cents(0.1 + 0.2), 30);
        assert_eq!(to_cents(19.999), 2000);
    }
}
