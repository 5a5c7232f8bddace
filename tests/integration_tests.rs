use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tower::ServiceExt;

use cleanbook::app::build_router;
use cleanbook::config::AppConfig;
use cleanbook::db::{self, queries};
use cleanbook::errors::AppError;
use cleanbook::models::{
    AppealDecision, AppealReason, AppealStatus, Booking, BookingStatus, CaptureStatus, Channels,
    ChargeAppeal, NewBooking, Notification, NotificationCategory, PaymentStatus, ReleaseType,
};
use cleanbook::services::lifecycle::{self, Actor};
use cleanbook::services::notify::Notifier;
use cleanbook::services::payments::{AuthorizeRequest, CaptureOutcome, PaymentGateway};
use cleanbook::services::{appeals, arrival, escrow, no_show, sweeper, time_tracking};
use cleanbook::state::AppState;

// ── Mock Providers ──

#[derive(Debug, Clone, Copy, PartialEq)]
enum CaptureMode {
    Succeed,
    Process,
    Decline,
    Unreachable,
}

#[derive(Default)]
struct GatewayLog {
    authorized: Vec<AuthorizeRequest>,
    captured: Vec<String>,
    polled: Vec<String>,
    refunded: Vec<(String, f64)>,
}

struct MockGateway {
    log: Arc<Mutex<GatewayLog>>,
    mode: Arc<Mutex<CaptureMode>>,
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn authorize(&self, request: &AuthorizeRequest) -> anyhow::Result<String> {
        let mut log = self.log.lock().unwrap();
        log.authorized.push(request.clone());
        Ok(format!("pi_{}", log.authorized.len()))
    }

    async fn capture(&self, payment_ref: &str) -> anyhow::Result<CaptureOutcome> {
        self.log.lock().unwrap().captured.push(payment_ref.to_string());
        match *self.mode.lock().unwrap() {
            CaptureMode::Succeed => Ok(CaptureOutcome::Succeeded),
            CaptureMode::Process => Ok(CaptureOutcome::Processing),
            CaptureMode::Decline => Ok(CaptureOutcome::Failed),
            CaptureMode::Unreachable => anyhow::bail!("connection reset"),
        }
    }

    /// Reports the settlement the current mode would produce.
    async fn capture_status(&self, payment_ref: &str) -> anyhow::Result<CaptureOutcome> {
        self.log.lock().unwrap().polled.push(payment_ref.to_string());
        match *self.mode.lock().unwrap() {
            CaptureMode::Succeed => Ok(CaptureOutcome::Succeeded),
            CaptureMode::Process => Ok(CaptureOutcome::Processing),
            CaptureMode::Decline => Ok(CaptureOutcome::Failed),
            CaptureMode::Unreachable => anyhow::bail!("connection reset"),
        }
    }

    async fn refund(&self, payment_ref: &str, amount: f64) -> anyhow::Result<String> {
        let mut log = self.log.lock().unwrap();
        log.refunded.push((payment_ref.to_string(), amount));
        Ok(format!("re_{}", log.refunded.len()))
    }
}

struct MockNotifier {
    delivered: Arc<Mutex<Vec<(String, NotificationCategory)>>>,
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn deliver(&self, notification: &Notification, _channels: Channels) -> anyhow::Result<()> {
        self.delivered
            .lock()
            .unwrap()
            .push((notification.user_id.clone(), notification.category));
        Ok(())
    }
}

// ── Helpers ──

struct Harness {
    state: Arc<AppState>,
    gateway: Arc<Mutex<GatewayLog>>,
    mode: Arc<Mutex<CaptureMode>>,
    delivered: Arc<Mutex<Vec<(String, NotificationCategory)>>>,
}

impl Harness {
    fn set_capture_mode(&self, mode: CaptureMode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn booking(&self, id: &str) -> Booking {
        let db = self.state.db();
        queries::get_booking_by_id(&db, id).unwrap().unwrap()
    }

    fn delivered_to(&self, user_id: &str) -> Vec<NotificationCategory> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == user_id)
            .map(|(_, c)| *c)
            .collect()
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        stripe_secret_key: "".to_string(),
        stripe_api_base: "http://localhost:12111".to_string(),
        notify_webhook_url: "".to_string(),
        reviewer_ids: vec!["reviewer-1".to_string()],
        sweep_interval_secs: 30,
        settings_ttl_secs: 0,
        no_show_capture_max_attempts: 3,
    }
}

fn harness_with(config: AppConfig) -> Harness {
    let conn = db::init_db(":memory:").unwrap();
    let gateway = Arc::new(Mutex::new(GatewayLog::default()));
    let mode = Arc::new(Mutex::new(CaptureMode::Succeed));
    let delivered = Arc::new(Mutex::new(vec![]));
    let state = AppState::new(
        conn,
        config,
        Box::new(MockGateway {
            log: Arc::clone(&gateway),
            mode: Arc::clone(&mode),
        }),
        Box::new(MockNotifier {
            delivered: Arc::clone(&delivered),
        }),
    );
    Harness {
        state,
        gateway,
        mode,
        delivered,
    }
}

fn harness() -> Harness {
    harness_with(test_config())
}

/// Midday UTC keeps deliveries out of the default quiet hours.
fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 16)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

fn new_booking() -> NewBooking {
    NewBooking {
        customer_id: "customer-1".to_string(),
        provider_id: Some("cleaner-1".to_string()),
        service_date: NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(),
        service_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        estimated_hours: 2.0,
        hourly_rate: 25.0,
        payment_method: Some("pm_card_visa".to_string()),
    }
}

async fn confirmed_booking(h: &Harness) -> Booking {
    let booking = lifecycle::create_booking(&h.state, new_booking(), at(8, 0)).await.unwrap();
    lifecycle::accept_booking(
        &h.state,
        &booking.id,
        "cleaner-1",
        Some("acct_cleaner".to_string()),
        at(8, 5),
    )
    .await
    .unwrap()
}

async fn paid_booking(h: &Harness) -> Booking {
    let booking = confirmed_booking(h).await;
    lifecycle::create_payment_intent(&h.state, &booking.id, None, at(8, 10))
        .await
        .unwrap();
    lifecycle::confirm_payment(&h.state, &booking.id, at(8, 11)).await.unwrap()
}

async fn completed_booking(h: &Harness) -> Booking {
    let booking = paid_booking(h).await;
    time_tracking::start_work(&h.state, &booking.id, at(10, 0)).await.unwrap();
    time_tracking::end_work(&h.state, &booking.id, at(11, 30)).await.unwrap()
}

/// Arrival without access, then a sweep past the 15 minute grace window.
async fn no_show_charged_booking(h: &Harness) -> Booking {
    let booking = confirmed_booking(h).await;
    arrival::record_arrival(&h.state, &booking.id, None, false, at(10, 0))
        .await
        .unwrap();
    sweeper::run_sweep(&h.state, at(10, 16)).await;
    h.booking(&booking.id)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let res = app.oneshot(request).await.unwrap();
    let status = res.status();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ── Booking Lifecycle ──

#[tokio::test]
async fn test_create_booking_computes_pricing_from_settings() {
    let h = harness();
    let booking = lifecycle::create_booking(&h.state, new_booking(), at(8, 0)).await.unwrap();

    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.payment_status, PaymentStatus::Unpaid);
    assert_eq!(booking.total_price, 50.0);
    assert_eq!(booking.commission_rate, 5.0);
    assert_eq!(booking.platform_commission, 2.5);
    assert_eq!(booking.provider_earnings, 47.5);
    assert_eq!(h.delivered_to("cleaner-1"), vec![NotificationCategory::BookingRequested]);
}

#[tokio::test]
async fn test_decline_requires_reason() {
    let h = harness();
    let booking = lifecycle::create_booking(&h.state, new_booking(), at(8, 0)).await.unwrap();

    let err = lifecycle::decline_booking(&h.state, &booking.id, "cleaner-1", "  ", at(8, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let declined = lifecycle::decline_booking(&h.state, &booking.id, "cleaner-1", "Fully booked", at(8, 2))
        .await
        .unwrap();
    assert_eq!(declined.status, BookingStatus::Cancelled);
    assert_eq!(declined.declined_reason.as_deref(), Some("Fully booked"));
}

#[tokio::test]
async fn test_accept_from_wrong_state_is_invalid() {
    let h = harness();
    let booking = confirmed_booking(&h).await;

    let err = lifecycle::accept_booking(&h.state, &booking.id, "cleaner-1", None, at(8, 30))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn test_payment_capture_outcomes_drive_status() {
    let h = harness();
    let booking = confirmed_booking(&h).await;

    let pending = lifecycle::create_payment_intent(&h.state, &booking.id, None, at(8, 10))
        .await
        .unwrap();
    assert_eq!(pending.status, BookingStatus::PaymentPending);
    assert_eq!(pending.authorized_amount, Some(50.0));
    {
        let log = h.gateway.lock().unwrap();
        assert_eq!(log.authorized[0].platform_fee, 2.5);
        assert_eq!(log.authorized[0].provider_account.as_deref(), Some("acct_cleaner"));
    }

    h.set_capture_mode(CaptureMode::Process);
    let processing = lifecycle::confirm_payment(&h.state, &booking.id, at(8, 11)).await.unwrap();
    assert_eq!(processing.status, BookingStatus::PaymentProcessing);
    assert_eq!(processing.payment_status, PaymentStatus::Processing);

    h.set_capture_mode(CaptureMode::Succeed);
    let paid = lifecycle::confirm_payment(&h.state, &booking.id, at(8, 12)).await.unwrap();
    assert_eq!(paid.status, BookingStatus::Confirmed);
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.captured_amount, Some(50.0));
}

#[tokio::test]
async fn test_failed_payment_can_be_retried() {
    let h = harness();
    let booking = confirmed_booking(&h).await;
    lifecycle::create_payment_intent(&h.state, &booking.id, None, at(8, 10))
        .await
        .unwrap();

    h.set_capture_mode(CaptureMode::Decline);
    let failed = lifecycle::confirm_payment(&h.state, &booking.id, at(8, 11)).await.unwrap();
    assert_eq!(failed.status, BookingStatus::PaymentFailed);
    assert!(h.delivered_to("customer-1").contains(&NotificationCategory::PaymentFailed));

    let retried = lifecycle::create_payment_intent(
        &h.state,
        &booking.id,
        Some("pm_card_mastercard".to_string()),
        at(8, 20),
    )
    .await
    .unwrap();
    assert_eq!(retried.status, BookingStatus::PaymentPending);
    assert_eq!(retried.payment_ref.as_deref(), Some("pi_2"));
}

#[tokio::test]
async fn test_admin_cancel_rejects_released_booking() {
    let h = harness();
    let booking = completed_booking(&h).await;
    escrow::release(&h.state, &booking.id, &Actor::user("customer-1"), ReleaseType::Full, at(12, 0))
        .await
        .unwrap();

    let err = lifecycle::admin_cancel(&h.state, &booking.id, &Actor::admin("ops"), "duplicate", at(12, 5))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

// ── No-Show Handling ──

#[tokio::test]
async fn test_no_show_charge_then_approved_appeal_refunds() {
    let h = harness();
    let booking = no_show_charged_booking(&h).await;

    assert!(booking.no_show_detected);
    assert_eq!(booking.no_show_charge_amount, Some(25.0));
    assert_eq!(booking.no_show_charged_at, Some(at(10, 16)));
    assert_eq!(booking.no_show_capture_status, CaptureStatus::Captured);
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.payment_status, PaymentStatus::Unpaid);
    assert!(booking.no_show_fires_at.is_none());
    assert!(h.delivered_to("customer-1").contains(&NotificationCategory::NoShowDetected));

    let appeal = appeals::submit_appeal(
        &h.state,
        &booking.id,
        "customer-1",
        AppealReason::ProviderLate,
        "The cleaner arrived 40 minutes late",
        at(11, 0),
    )
    .await
    .unwrap();
    assert_eq!(appeal.status, AppealStatus::Pending);
    assert_eq!(h.delivered_to("reviewer-1"), vec![NotificationCategory::AppealSubmitted]);

    let resolved = appeals::resolve_appeal(
        &h.state,
        &appeal.id,
        "reviewer-1",
        AppealDecision::Approved,
        "GPS shows late arrival",
        at(12, 0),
    )
    .await
    .unwrap();
    assert_eq!(resolved.status, AppealStatus::Approved);
    assert_eq!(resolved.reviewer_id.as_deref(), Some("reviewer-1"));
    assert_eq!(resolved.resolved_at, Some(at(12, 0)));
    assert_eq!(resolved.refund_ref.as_deref(), Some("re_1"));

    {
        let log = h.gateway.lock().unwrap();
        assert_eq!(log.refunded, vec![("pi_1".to_string(), 25.0)]);
    }

    let after = h.booking(&booking.id);
    assert!(after.no_show_detected);
    assert_eq!(after.no_show_charge_amount, Some(25.0));
    assert_eq!(after.no_show_charged_at, Some(at(10, 16)));
    assert_eq!(after.no_show_capture_status, CaptureStatus::Refunded);
    assert!(h.delivered_to("customer-1").contains(&NotificationCategory::AppealResolved));
}

#[tokio::test]
async fn test_timer_does_not_fire_before_grace_elapses() {
    let h = harness();
    let booking = confirmed_booking(&h).await;
    let arrived = arrival::record_arrival(&h.state, &booking.id, None, false, at(10, 0))
        .await
        .unwrap();
    assert_eq!(arrived.no_show_fires_at, Some(at(10, 15)));

    let report = sweeper::run_sweep(&h.state, at(10, 14)).await;
    assert_eq!(report.no_shows_charged, 0);
    assert!(!h.booking(&booking.id).no_show_detected);
}

#[tokio::test]
async fn test_access_confirmed_in_time_cancels_timer() {
    let h = harness();
    let booking = confirmed_booking(&h).await;
    arrival::record_arrival(&h.state, &booking.id, None, false, at(10, 0))
        .await
        .unwrap();
    arrival::confirm_customer_access(&h.state, &booking.id, at(10, 5))
        .await
        .unwrap();

    sweeper::run_sweep(&h.state, at(10, 30)).await;

    let after = h.booking(&booking.id);
    assert!(!after.no_show_detected);
    assert!(after.customer_confirmed_access);
    assert!(h.gateway.lock().unwrap().authorized.is_empty());
}

#[tokio::test]
async fn test_charge_no_show_is_idempotent() {
    let h = harness();
    let booking = confirmed_booking(&h).await;

    let first = no_show::charge_no_show(&h.state, &booking.id, at(10, 20)).await.unwrap();
    let second = no_show::charge_no_show(&h.state, &booking.id, at(10, 40)).await.unwrap();

    assert_eq!(first.no_show_charge_amount, Some(25.0));
    assert_eq!(second.no_show_charged_at, Some(at(10, 20)));
    let log = h.gateway.lock().unwrap();
    assert_eq!(log.authorized.len(), 1);
    assert_eq!(log.captured.len(), 1);
}

#[tokio::test]
async fn test_confirm_access_after_charge_does_not_uncharge() {
    let h = harness();
    let booking = no_show_charged_booking(&h).await;

    let confirmed = arrival::confirm_customer_access(&h.state, &booking.id, at(10, 30))
        .await
        .unwrap();

    assert!(confirmed.customer_confirmed_access);
    assert!(confirmed.no_show_detected);
    assert_eq!(confirmed.no_show_charge_amount, Some(25.0));
    assert!(h.gateway.lock().unwrap().refunded.is_empty());
}

#[tokio::test]
async fn test_capture_failure_keeps_charge_and_retry_recovers() {
    let h = harness();
    let booking = confirmed_booking(&h).await;

    h.set_capture_mode(CaptureMode::Unreachable);
    let err = no_show::charge_no_show(&h.state, &booking.id, at(10, 20)).await.unwrap_err();
    assert!(matches!(err, AppError::Gateway(_)));

    let charged = h.booking(&booking.id);
    assert!(charged.no_show_detected);
    assert_eq!(charged.no_show_charge_amount, Some(25.0));
    assert_eq!(charged.no_show_capture_status, CaptureStatus::Failed);
    assert_eq!(charged.no_show_payment_ref.as_deref(), Some("pi_1"));
    assert_eq!(charged.no_show_capture_attempts, 1);

    h.set_capture_mode(CaptureMode::Succeed);
    let report = sweeper::run_sweep(&h.state, at(10, 50)).await;
    assert_eq!(report.captures_recovered, 1);

    let recovered = h.booking(&booking.id);
    assert_eq!(recovered.no_show_capture_status, CaptureStatus::Captured);
    assert_eq!(recovered.no_show_capture_attempts, 2);
    let log = h.gateway.lock().unwrap();
    assert_eq!(log.authorized.len(), 1);
    assert_eq!(log.captured, vec!["pi_1".to_string(), "pi_1".to_string()]);
}

#[tokio::test]
async fn test_capture_retries_stop_at_attempt_limit() {
    let h = harness();
    let booking = confirmed_booking(&h).await;
    h.set_capture_mode(CaptureMode::Decline);
    let _ = no_show::charge_no_show(&h.state, &booking.id, at(10, 20)).await;

    for minute in [30, 40, 50, 55] {
        sweeper::run_sweep(&h.state, at(10, minute)).await;
    }

    let after = h.booking(&booking.id);
    assert_eq!(after.no_show_capture_status, CaptureStatus::Failed);
    assert_eq!(after.no_show_capture_attempts, 3);

    let err = no_show::retry_capture(&h.state, &booking.id, at(11, 0)).await.unwrap_err();
    assert!(matches!(err, AppError::Gateway(_)));
}

#[tokio::test]
async fn test_processing_capture_is_polled_not_resubmitted() {
    let h = harness();
    let booking = confirmed_booking(&h).await;

    h.set_capture_mode(CaptureMode::Process);
    let charged = no_show::charge_no_show(&h.state, &booking.id, at(10, 20)).await.unwrap();
    assert_eq!(charged.no_show_capture_status, CaptureStatus::Processing);
    assert_eq!(charged.no_show_payment_ref.as_deref(), Some("pi_1"));
    assert_eq!(charged.no_show_capture_attempts, 1);

    h.set_capture_mode(CaptureMode::Unreachable);
    let report = sweeper::run_sweep(&h.state, at(10, 30)).await;
    assert_eq!(report.captures_recovered, 0);
    assert_eq!(h.booking(&booking.id).no_show_capture_status, CaptureStatus::Processing);

    h.set_capture_mode(CaptureMode::Process);
    sweeper::run_sweep(&h.state, at(10, 40)).await;
    assert_eq!(h.booking(&booking.id).no_show_capture_status, CaptureStatus::Processing);

    h.set_capture_mode(CaptureMode::Succeed);
    let report = sweeper::run_sweep(&h.state, at(10, 50)).await;
    assert_eq!(report.captures_recovered, 1);

    let settled = h.booking(&booking.id);
    assert_eq!(settled.no_show_capture_status, CaptureStatus::Captured);
    assert_eq!(settled.no_show_capture_attempts, 1);
    let log = h.gateway.lock().unwrap();
    assert_eq!(log.captured, vec!["pi_1".to_string()]);
    assert_eq!(log.polled.len(), 3);
}

// ── Appeals ──

#[tokio::test]
async fn test_appeal_requires_charge() {
    let h = harness();
    let booking = confirmed_booking(&h).await;

    let err = appeals::submit_appeal(
        &h.state,
        &booking.id,
        "customer-1",
        AppealReason::PresenceClaimed,
        "I was home all morning",
        at(11, 0),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn test_second_pending_appeal_rejected() {
    let h = harness();
    let booking = no_show_charged_booking(&h).await;

    appeals::submit_appeal(&h.state, &booking.id, "customer-1", AppealReason::Emergency, "Family emergency", at(11, 0))
        .await
        .unwrap();
    let err = appeals::submit_appeal(&h.state, &booking.id, "customer-1", AppealReason::Other, "Again", at(11, 5))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyProcessed(_)));
}

#[tokio::test]
async fn test_resolve_requires_notes_and_happens_once() {
    let h = harness();
    let booking = no_show_charged_booking(&h).await;
    let appeal = appeals::submit_appeal(
        &h.state,
        &booking.id,
        "customer-1",
        AppealReason::Miscommunication,
        "Wrong day in the confirmation",
        at(11, 0),
    )
    .await
    .unwrap();

    let err = appeals::resolve_appeal(&h.state, &appeal.id, "reviewer-1", AppealDecision::Rejected, "", at(12, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let rejected = appeals::resolve_appeal(
        &h.state,
        &appeal.id,
        "reviewer-1",
        AppealDecision::Rejected,
        "Confirmation showed the right day",
        at(12, 0),
    )
    .await
    .unwrap();
    assert_eq!(rejected.status, AppealStatus::Rejected);
    assert!(h.gateway.lock().unwrap().refunded.is_empty());

    let err = appeals::resolve_appeal(&h.state, &appeal.id, "reviewer-2", AppealDecision::Approved, "Overturn", at(12, 5))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyProcessed(_)));
}

#[tokio::test]
async fn test_approving_uncollected_charge_voids_it() {
    let h = harness();
    let booking = confirmed_booking(&h).await;
    h.set_capture_mode(CaptureMode::Decline);
    let _ = no_show::charge_no_show(&h.state, &booking.id, at(10, 20)).await;

    let appeal = appeals::submit_appeal(&h.state, &booking.id, "customer-1", AppealReason::TechnicalIssue, "The door code failed", at(11, 0))
        .await
        .unwrap();
    let resolved = appeals::resolve_appeal(&h.state, &appeal.id, "reviewer-1", AppealDecision::Approved, "Lock vendor outage", at(12, 0))
        .await
        .unwrap();

    assert_eq!(resolved.status, AppealStatus::Approved);
    assert!(resolved.refund_ref.is_none());
    let after = h.booking(&booking.id);
    assert_eq!(after.no_show_capture_status, CaptureStatus::Voided);
    assert!(after.no_show_detected);
    assert!(h.gateway.lock().unwrap().refunded.is_empty());

    let report = sweeper::run_sweep(&h.state, at(12, 30)).await;
    assert_eq!(report.captures_recovered, 0);
}

#[tokio::test]
async fn test_waived_charge_is_refunded_only_once() {
    let h = harness();
    let booking = no_show_charged_booking(&h).await;

    let appeal = appeals::submit_appeal(&h.state, &booking.id, "customer-1", AppealReason::ProviderLate, "Cleaner never knocked", at(11, 0))
        .await
        .unwrap();
    appeals::resolve_appeal(&h.state, &appeal.id, "reviewer-1", AppealDecision::Approved, "Doorbell camera agrees", at(12, 0))
        .await
        .unwrap();

    let err = appeals::submit_appeal(&h.state, &booking.id, "customer-1", AppealReason::Other, "Refund me again", at(12, 30))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyProcessed(_)));

    // An appeal row written behind the submit guard still cannot refund twice.
    let stray = ChargeAppeal {
        id: "appeal-stray".to_string(),
        booking_id: booking.id.clone(),
        customer_id: "customer-1".to_string(),
        reason: AppealReason::Other,
        description: "Duplicate".to_string(),
        status: AppealStatus::Pending,
        reviewer_id: None,
        reviewer_notes: None,
        refund_ref: None,
        resolved_at: None,
        created_at: at(11, 30),
    };
    queries::insert_appeal(&h.state.db(), &stray).unwrap();
    let err = appeals::resolve_appeal(&h.state, &stray.id, "reviewer-1", AppealDecision::Approved, "Approve again", at(13, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyProcessed(_)));

    assert_eq!(h.gateway.lock().unwrap().refunded, vec![("pi_1".to_string(), 25.0)]);
    assert_eq!(h.booking(&booking.id).no_show_capture_status, CaptureStatus::Refunded);
}

#[tokio::test]
async fn test_approval_waits_for_processing_capture_then_refunds() {
    let h = harness();
    let booking = confirmed_booking(&h).await;
    h.set_capture_mode(CaptureMode::Process);
    no_show::charge_no_show(&h.state, &booking.id, at(10, 20)).await.unwrap();

    let appeal = appeals::submit_appeal(&h.state, &booking.id, "customer-1", AppealReason::PresenceClaimed, "I was home", at(11, 0))
        .await
        .unwrap();

    let err = appeals::resolve_appeal(&h.state, &appeal.id, "reviewer-1", AppealDecision::Approved, "Customer was home", at(12, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    let open = appeals::list_booking_appeals(&h.state, &booking.id).unwrap();
    assert_eq!(open[0].status, AppealStatus::Pending);
    assert_eq!(h.booking(&booking.id).no_show_capture_status, CaptureStatus::Processing);
    assert!(h.gateway.lock().unwrap().refunded.is_empty());

    h.set_capture_mode(CaptureMode::Succeed);
    let resolved = appeals::resolve_appeal(&h.state, &appeal.id, "reviewer-1", AppealDecision::Approved, "Customer was home", at(12, 30))
        .await
        .unwrap();
    assert_eq!(resolved.refund_ref.as_deref(), Some("re_1"));

    let after = h.booking(&booking.id);
    assert_eq!(after.no_show_capture_status, CaptureStatus::Refunded);
    let log = h.gateway.lock().unwrap();
    assert_eq!(log.refunded, vec![("pi_1".to_string(), 25.0)]);
    assert_eq!(log.captured.len(), 1);
}

// ── Time Tracking & Escrow ──

#[tokio::test]
async fn test_prorated_billing_and_full_release() {
    let h = harness();
    let booking = completed_booking(&h).await;

    assert_eq!(booking.status, BookingStatus::Completed);
    assert_eq!(booking.actual_hours_worked, Some(1.5));
    assert_eq!(booking.final_amount, Some(37.5));
    assert_eq!(booking.total_price, 50.0);

    let release = escrow::release(
        &h.state,
        &booking.id,
        &Actor::user("customer-1"),
        ReleaseType::Full,
        at(12, 0),
    )
    .await
    .unwrap();
    assert_eq!(release.release_type, ReleaseType::Full);
    assert_eq!(release.amount_released, 35.625);
    assert_eq!(release.transfer_ref, "auto_pi_1");

    let after = h.booking(&booking.id);
    assert_eq!(after.status, BookingStatus::PaymentReleased);
    assert_eq!(after.payment_status, PaymentStatus::Released);
    assert_eq!(escrow::get_releases(&h.state, &booking.id).unwrap().len(), 1);
    assert_eq!(h.delivered_to("cleaner-1").last(), Some(&NotificationCategory::PaymentReleased));
}

#[tokio::test]
async fn test_full_release_requires_completed() {
    let h = harness();
    let booking = paid_booking(&h).await;
    time_tracking::start_work(&h.state, &booking.id, at(10, 0)).await.unwrap();

    let err = escrow::release(&h.state, &booking.id, &Actor::user("customer-1"), ReleaseType::Full, at(10, 30))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    assert!(escrow::get_releases(&h.state, &booking.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_full_release_by_other_user_is_unauthorized() {
    let h = harness();
    let booking = completed_booking(&h).await;

    let err = escrow::release(&h.state, &booking.id, &Actor::user("someone-else"), ReleaseType::Full, at(12, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized));
}

#[tokio::test]
async fn test_admin_override_from_any_unreleased_state() {
    let h = harness();
    let booking = paid_booking(&h).await;

    let err = escrow::release(&h.state, &booking.id, &Actor::user("customer-1"), ReleaseType::AdminOverride, at(9, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized));

    let release = escrow::release(&h.state, &booking.id, &Actor::admin("ops-1"), ReleaseType::AdminOverride, at(9, 0))
        .await
        .unwrap();
    assert_eq!(release.released_by, "ops-1");
    assert_eq!(release.amount_released, 47.5);
    assert_eq!(h.booking(&booking.id).status, BookingStatus::PaymentReleased);

    let err = escrow::release(&h.state, &booking.id, &Actor::admin("ops-1"), ReleaseType::AdminOverride, at(9, 5))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyProcessed(_)));
}

#[tokio::test]
async fn test_concurrent_releases_record_one_entry() {
    let h = harness();
    let booking = completed_booking(&h).await;
    let customer = Actor::user("customer-1");
    let admin = Actor::admin("ops-1");

    let (a, b) = tokio::join!(
        escrow::release(&h.state, &booking.id, &customer, ReleaseType::Full, at(12, 0)),
        escrow::release(&h.state, &booking.id, &admin, ReleaseType::AdminOverride, at(12, 0)),
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(escrow::get_releases(&h.state, &booking.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_auto_release_after_delay() {
    let h = harness();
    let booking = completed_booking(&h).await;
    let next_day = |hour, minute| at(hour, minute) + chrono::Duration::days(1);

    let report = sweeper::run_sweep(&h.state, next_day(11, 29)).await;
    assert_eq!(report.auto_released, 0);
    assert_eq!(h.booking(&booking.id).status, BookingStatus::Completed);

    let report = sweeper::run_sweep(&h.state, next_day(11, 30)).await;
    assert_eq!(report.auto_released, 1);

    let after = h.booking(&booking.id);
    assert_eq!(after.status, BookingStatus::PaymentReleased);
    assert_eq!(after.payment_status, PaymentStatus::Released);
    let releases = escrow::get_releases(&h.state, &booking.id).unwrap();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].release_type, ReleaseType::Auto);
    assert_eq!(releases[0].released_by, "system");

    let report = sweeper::run_sweep(&h.state, next_day(13, 0)).await;
    assert_eq!(report.auto_released, 0);
}

#[tokio::test]
async fn test_stale_booking_write_is_rejected() {
    let h = harness();
    let booking = confirmed_booking(&h).await;
    let db = h.state.db();

    let mut fresh = booking.clone();
    fresh.customer_confirmed_access = true;
    assert!(queries::update_booking(&db, &fresh).unwrap());

    let mut stale = booking;
    stale.status = BookingStatus::Cancelled;
    assert!(!queries::update_booking(&db, &stale).unwrap());

    let stored = queries::get_booking_by_id(&db, &fresh.id).unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Confirmed);
    assert_eq!(stored.version, fresh.version + 1);
}

// ── HTTP API ──

#[tokio::test]
async fn test_health() {
    let h = harness();
    let (status, json) = send(
        build_router(h.state),
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_admin_requires_auth() {
    let h = harness();
    let app = build_router(h.state);

    let (status, json) = send(
        app.clone(),
        Request::builder().uri("/api/admin/status").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");

    let (status, _) = send(
        app,
        Request::builder()
            .uri("/api/admin/status")
            .header("Authorization", "Bearer wrong-token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_status_reports_payments() {
    let h = harness();
    let booking = completed_booking(&h).await;
    escrow::release(&h.state, &booking.id, &Actor::user("customer-1"), ReleaseType::Full, at(12, 0))
        .await
        .unwrap();

    let (status, json) = send(
        build_router(h.state),
        Request::builder()
            .uri("/api/admin/status")
            .header("Authorization", "Bearer test-token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_captured"], 50.0);
    assert_eq!(json["total_released"], 35.625);
    assert_eq!(json["pending_appeals"], 0);
    assert_eq!(json["bookings_by_status"][0]["status"], "payment_released");
}

#[tokio::test]
async fn test_http_booking_flow_and_error_codes() {
    let h = harness();
    let app = build_router(h.state.clone());

    let (status, created) = send(
        app.clone(),
        json_request(
            "POST",
            "/api/bookings",
            serde_json::json!({
                "customer_id": "customer-1",
                "provider_id": "cleaner-1",
                "service_date": "2025-06-16",
                "service_time": "10:00:00",
                "estimated_hours": 3.0,
                "hourly_rate": 30.0,
                "payment_method": "pm_card_visa"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["status"], "pending");
    assert_eq!(created["total_price"], 90.0);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, json) = send(
        app.clone(),
        Request::builder()
            .method("POST")
            .uri(format!("/api/bookings/{id}/start"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "INVALID_STATE");

    let (status, json) = send(
        app.clone(),
        json_request(
            "POST",
            &format!("/api/bookings/{id}/decline"),
            serde_json::json!({ "provider_id": "cleaner-1", "reason": "" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let (status, accepted) = send(
        app.clone(),
        json_request(
            "POST",
            &format!("/api/bookings/{id}/accept"),
            serde_json::json!({ "provider_id": "cleaner-1", "provider_account": "acct_cleaner" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["status"], "confirmed");

    let (status, _) = send(
        app,
        Request::builder()
            .uri("/api/bookings/does-not-exist")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_settings_update_applies_to_next_booking() {
    let mut config = test_config();
    config.settings_ttl_secs = 3600;
    let h = harness_with(config);
    let app = build_router(h.state.clone());

    let (status, json) = send(
        app.clone(),
        Request::builder()
            .uri("/api/admin/settings")
            .header("Authorization", "Bearer test-token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["commission_rate"], 5.0);

    let mut request = json_request("POST", "/api/admin/settings", serde_json::json!({ "commission_rate": 10.0 }));
    request
        .headers_mut()
        .insert("Authorization", "Bearer test-token".parse().unwrap());
    let (status, json) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["commission_rate"], 10.0);
    assert_eq!(json["auto_release_hours"], 24);

    let booking = lifecycle::create_booking(&h.state, new_booking(), at(8, 0)).await.unwrap();
    assert_eq!(booking.commission_rate, 10.0);
    assert_eq!(booking.platform_commission, 5.0);

    let mut request = json_request("POST", "/api/admin/settings", serde_json::json!({ "commission_rate": 150.0 }));
    request
        .headers_mut()
        .insert("Authorization", "Bearer test-token".parse().unwrap());
    let (status, _) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    for body in [
        serde_json::json!({ "auto_release_hours": i64::MAX / 2 }),
        serde_json::json!({ "no_show_grace_minutes": 100_000 }),
    ] {
        let mut request = json_request("POST", "/api/admin/settings", body);
        request
            .headers_mut()
            .insert("Authorization", "Bearer test-token".parse().unwrap());
        let (status, _) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}

#[tokio::test]
async fn test_out_of_range_stored_delays_do_not_break_sweep() {
    let h = harness();
    let completed = completed_booking(&h).await;
    let confirmed = confirmed_booking(&h).await;
    {
        let db = h.state.db();
        queries::upsert_setting(&db, "auto_release_hours", &(i64::MAX / 2).to_string()).unwrap();
        queries::upsert_setting(&db, "no_show_grace_minutes", &i64::MAX.to_string()).unwrap();
    }

    let report = sweeper::run_sweep(&h.state, at(23, 0)).await;
    assert_eq!(report.auto_released, 0);
    assert_eq!(h.booking(&completed.id).status, BookingStatus::Completed);

    let err = arrival::record_arrival(&h.state, &confirmed.id, None, false, at(10, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(h.booking(&confirmed.id).no_show_fires_at.is_none());
}

#[tokio::test]
async fn test_admin_resolves_appeal_over_http() {
    let h = harness();
    let booking = no_show_charged_booking(&h).await;
    let app = build_router(h.state.clone());

    let (status, appeal) = send(
        app.clone(),
        json_request(
            "POST",
            &format!("/api/bookings/{}/appeals", booking.id),
            serde_json::json!({
                "customer_id": "customer-1",
                "reason": "was_present",
                "description": "I was home and the doorbell never rang"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(appeal["status"], "pending");
    let appeal_id = appeal["id"].as_str().unwrap().to_string();

    let (status, listed) = send(
        app.clone(),
        Request::builder()
            .uri("/api/admin/appeals?status=pending")
            .header("Authorization", "Bearer test-token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let mut request = json_request(
        "POST",
        &format!("/api/admin/appeals/{appeal_id}/resolve"),
        serde_json::json!({ "reviewer_id": "reviewer-1", "decision": "approved", "notes": "Doorbell camera confirms" }),
    );
    request
        .headers_mut()
        .insert("Authorization", "Bearer test-token".parse().unwrap());
    let (status, resolved) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["status"], "approved");
    assert_eq!(h.gateway.lock().unwrap().refunded.len(), 1);
}

#[tokio::test]
async fn test_notifications_and_preferences() {
    let h = harness();
    confirmed_booking(&h).await;
    let app = build_router(h.state.clone());

    let (status, json) = send(
        app.clone(),
        Request::builder()
            .uri("/api/users/customer-1/notifications")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["category"], "booking_accepted");
    assert_eq!(json[0]["is_read"], false);

    let (status, json) = send(
        app.clone(),
        json_request(
            "PUT",
            "/api/users/customer-1/notification-preferences",
            serde_json::json!({
                "booking_updates": false,
                "payment_notifications": true,
                "push_enabled": true,
                "email_enabled": false,
                "quiet_hours_start": "23:00",
                "quiet_hours_end": "07:00"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user_id"], "customer-1");

    let (_, json) = send(
        app,
        Request::builder()
            .uri("/api/users/customer-1/notification-preferences")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(json["booking_updates"], false);
    assert_eq!(json["quiet_hours_start"], "23:00");

    // Booking updates are now opted out: stored, but not delivered.
    let before = h.delivered_to("customer-1").len();
    let booking = lifecycle::create_booking(&h.state, new_booking(), at(8, 0)).await.unwrap();
    lifecycle::accept_booking(&h.state, &booking.id, "cleaner-1", None, at(8, 5))
        .await
        .unwrap();
    assert_eq!(h.delivered_to("customer-1").len(), before);
}
