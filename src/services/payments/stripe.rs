use anyhow::Context;
use async_trait::async_trait;

use super::{to_cents, AuthorizeRequest, CaptureOutcome, PaymentGateway};

pub struct StripeGateway {
    secret_key: String,
    api_base: String,
    client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(secret_key: String, api_base: String) -> Self {
        Self {
            secret_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn get_json(&self, path: &str) -> anyhow::Result<serde_json::Value> {
        let resp = self
            .client
            .get(format!("{}{}", self.api_base, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .with_context(|| format!("failed to call Stripe {path}"))?;
        parse_response(resp).await
    }

    async fn post_form(&self, path: &str, form: &[(&str, String)]) -> anyhow::Result<serde_json::Value> {
        let resp = self
            .client
            .post(format!("{}{}", self.api_base, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .with_context(|| format!("failed to call Stripe {path}"))?;
        parse_response(resp).await
    }
}

async fn parse_response(resp: reqwest::Response) -> anyhow::Result<serde_json::Value> {
    let status = resp.status();
    let data: serde_json::Value = resp
        .json()
        .await
        .context("failed to parse Stripe response")?;

    if !status.is_success() {
        let message = data["error"]["message"].as_str().unwrap_or("unknown error");
        anyhow::bail!("Stripe API error ({status}): {message}");
    }

    Ok(data)
}

fn capture_outcome(status: &str) -> CaptureOutcome {
    match status {
        "succeeded" => CaptureOutcome::Succeeded,
        "requires_payment_method" | "canceled" => CaptureOutcome::Failed,
        _ => CaptureOutcome::Processing,
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn authorize(&self, request: &AuthorizeRequest) -> anyhow::Result<String> {
        let mut form = vec![
            ("amount", to_cents(request.amount).to_string()),
            ("currency", "usd".to_string()),
            ("payment_method", request.payment_method.clone()),
            ("capture_method", "manual".to_string()),
            ("confirm", "true".to_string()),
            ("description", request.description.clone()),
            ("metadata[booking_id]", request.booking_id.clone()),
        ];
        if let Some(account) = &request.provider_account {
            form.push(("application_fee_amount", to_cents(request.platform_fee).to_string()));
            form.push(("transfer_data[destination]", account.clone()));
        }

        let data = self.post_form("/v1/payment_intents", &form).await?;
        let id = data["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing id in Stripe payment intent"))?;

        tracing::info!(booking_id = %request.booking_id, payment_ref = %id, "payment authorized");
        Ok(id)
    }

    async fn capture(&self, payment_ref: &str) -> anyhow::Result<CaptureOutcome> {
        let data = self
            .post_form(&format!("/v1/payment_intents/{payment_ref}/capture"), &[])
            .await?;
        let status = data["status"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing status in Stripe capture response"))?;
        Ok(capture_outcome(status))
    }

    async fn capture_status(&self, payment_ref: &str) -> anyhow::Result<CaptureOutcome> {
        let data = self.get_json(&format!("/v1/payment_intents/{payment_ref}")).await?;
        let status = data["status"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing status in Stripe payment intent"))?;
        Ok(capture_outcome(status))
    }

    async fn refund(&self, payment_ref: &str, amount: f64) -> anyhow::Result<String> {
        let form = [
            ("payment_intent", payment_ref.to_string()),
            ("amount", to_cents(amount).to_string()),
        ];
        let data = self.post_form("/v1/refunds", &form).await?;
        data["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing id in Stripe refund"))
    }
}
