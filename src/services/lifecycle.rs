//! Booking state machine: creation, provider accept/decline, cancellation and
//! the payment authorization round-trip. Shared helpers here are used by the
//! arrival, no-show, time tracking, escrow and appeal services.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::json;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    Booking, BookingStatus, CaptureStatus, NewBooking, Notification, NotificationCategory,
    PaymentStatus,
};
use crate::services::notify::notify_user;
use crate::services::payments::{AuthorizeRequest, CaptureOutcome};
use crate::state::AppState;

/// Who is acting on a booking. Admin privilege comes from the admin token.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub is_admin: bool,
}

impl Actor {
    pub fn user(id: impl Into<String>) -> Self {
        Self { id: id.into(), is_admin: false }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self { id: id.into(), is_admin: true }
    }

    pub fn system() -> Self {
        Self { id: "system".to_string(), is_admin: false }
    }
}

pub(crate) fn load_booking(state: &Arc<AppState>, booking_id: &str) -> Result<Booking, AppError> {
    let db = state.db();
    queries::get_booking_by_id(&db, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))
}

/// Version-guarded write. A concurrent writer bumping the version first turns
/// this into a `StateConflict` instead of overwriting its result.
pub(crate) fn persist_booking(
    state: &Arc<AppState>,
    booking: &mut Booking,
    now: NaiveDateTime,
) -> Result<(), AppError> {
    booking.updated_at = now;
    let written = {
        let db = state.db();
        queries::update_booking(&db, booking)?
    };
    if !written {
        return Err(AppError::StateConflict(format!(
            "booking {} was modified concurrently",
            booking.id
        )));
    }
    booking.version += 1;
    Ok(())
}

pub(crate) fn transition(booking: &mut Booking, to: BookingStatus) -> Result<(), AppError> {
    if !booking.status.can_transition_to(to) {
        return Err(AppError::InvalidState(format!(
            "booking {} cannot move from {} to {}",
            booking.id, booking.status, to
        )));
    }
    tracing::info!(booking_id = %booking.id, from = %booking.status, to = %to, "booking transition");
    booking.status = to;
    Ok(())
}

pub(crate) fn admin_transition(booking: &mut Booking, to: BookingStatus) -> Result<(), AppError> {
    if !booking.status.can_admin_transition_to(to) {
        return Err(AppError::InvalidState(format!(
            "booking {} cannot move from {} to {}",
            booking.id, booking.status, to
        )));
    }
    tracing::info!(booking_id = %booking.id, from = %booking.status, to = %to, "admin booking transition");
    booking.status = to;
    Ok(())
}

pub(crate) fn require_status(booking: &Booking, allowed: &[BookingStatus], action: &str) -> Result<(), AppError> {
    if allowed.contains(&booking.status) {
        Ok(())
    } else {
        Err(AppError::InvalidState(format!(
            "cannot {action} booking {} while it is {}",
            booking.id, booking.status
        )))
    }
}

fn require_text(value: &str, field: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

pub async fn create_booking(
    state: &Arc<AppState>,
    request: NewBooking,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let customer_id = require_text(&request.customer_id, "customer_id")?;
    if !(request.estimated_hours.is_finite() && request.estimated_hours > 0.0) {
        return Err(AppError::Validation("estimated_hours must be positive".to_string()));
    }
    if !(request.hourly_rate.is_finite() && request.hourly_rate > 0.0) {
        return Err(AppError::Validation("hourly_rate must be positive".to_string()));
    }

    let settings = {
        let db = state.db();
        state.settings.current(&db)?
    };

    let total_price = request.hourly_rate * request.estimated_hours;
    let platform_commission = total_price * settings.commission_rate / 100.0;

    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        customer_id,
        provider_id: request.provider_id.filter(|p| !p.trim().is_empty()),
        provider_account: None,
        service_date: request.service_date,
        service_time: request.service_time,
        estimated_hours: request.estimated_hours,
        hourly_rate: request.hourly_rate,
        total_price,
        commission_rate: settings.commission_rate,
        platform_commission,
        provider_earnings: total_price - platform_commission,
        status: BookingStatus::Pending,
        accepted_at: None,
        declined_at: None,
        declined_reason: None,
        arrived_at: None,
        arrival_lat: None,
        arrival_lng: None,
        customer_confirmed_access: false,
        no_show_fires_at: None,
        no_show_detected: false,
        no_show_charge_amount: None,
        no_show_charged_at: None,
        no_show_capture_status: CaptureStatus::None,
        no_show_payment_ref: None,
        no_show_capture_attempts: 0,
        actual_start_time: None,
        actual_end_time: None,
        actual_hours_worked: None,
        final_amount: None,
        payment_method: request.payment_method.filter(|p| !p.trim().is_empty()),
        payment_ref: None,
        payment_status: PaymentStatus::Unpaid,
        authorized_amount: None,
        captured_amount: None,
        version: 0,
        created_at: now,
        updated_at: now,
    };

    {
        let db = state.db();
        queries::create_booking(&db, &booking)?;
    }

    tracing::info!(
        booking_id = %booking.id,
        customer_id = %booking.customer_id,
        total_price = booking.total_price,
        commission_rate = booking.commission_rate,
        "booking created"
    );

    if let Some(provider_id) = &booking.provider_id {
        notify_user(
            state,
            Notification {
                user_id: provider_id.clone(),
                title: "New Booking Request".to_string(),
                message: format!(
                    "You have a new cleaning request for {} at {}.",
                    booking.service_date,
                    booking.service_time.format("%H:%M")
                ),
                category: NotificationCategory::BookingRequested,
                metadata: json!({ "booking_id": booking.id }),
            },
            now,
        )
        .await;
    }

    Ok(booking)
}

pub async fn accept_booking(
    state: &Arc<AppState>,
    booking_id: &str,
    provider_id: &str,
    provider_account: Option<String>,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let provider_id = require_text(provider_id, "provider_id")?;
    let _guard = state.locks.acquire(booking_id).await;
    let mut booking = load_booking(state, booking_id)?;

    if let Some(assigned) = &booking.provider_id {
        if assigned != &provider_id {
            return Err(AppError::InvalidState(format!(
                "booking {booking_id} is assigned to another provider"
            )));
        }
    }

    transition(&mut booking, BookingStatus::Confirmed)?;
    booking.provider_id = Some(provider_id);
    booking.accepted_at = Some(now);
    if let Some(account) = provider_account.filter(|a| !a.trim().is_empty()) {
        booking.provider_account = Some(account);
    }
    persist_booking(state, &mut booking, now)?;

    notify_user(
        state,
        Notification {
            user_id: booking.customer_id.clone(),
            title: "Booking Confirmed!".to_string(),
            message: "Your cleaning service has been confirmed by the cleaner.".to_string(),
            category: NotificationCategory::BookingAccepted,
            metadata: json!({ "booking_id": booking.id }),
        },
        now,
    )
    .await;

    Ok(booking)
}

pub async fn decline_booking(
    state: &Arc<AppState>,
    booking_id: &str,
    provider_id: &str,
    reason: &str,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let reason = require_text(reason, "declined reason")?;
    let _guard = state.locks.acquire(booking_id).await;
    let mut booking = load_booking(state, booking_id)?;

    if let Some(assigned) = &booking.provider_id {
        if assigned != provider_id {
            return Err(AppError::InvalidState(format!(
                "booking {booking_id} is assigned to another provider"
            )));
        }
    }

    require_status(&booking, &[BookingStatus::Pending], "decline")?;
    transition(&mut booking, BookingStatus::Cancelled)?;
    booking.declined_at = Some(now);
    booking.declined_reason = Some(reason.clone());
    persist_booking(state, &mut booking, now)?;

    notify_user(
        state,
        Notification {
            user_id: booking.customer_id.clone(),
            title: "Booking Declined".to_string(),
            message: format!("Your booking request has been declined. Reason: {reason}"),
            category: NotificationCategory::BookingDeclined,
            metadata: json!({ "booking_id": booking.id }),
        },
        now,
    )
    .await;

    Ok(booking)
}

/// Customer withdraws a request the provider has not accepted yet.
pub async fn cancel_booking(
    state: &Arc<AppState>,
    booking_id: &str,
    customer_id: &str,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let _guard = state.locks.acquire(booking_id).await;
    let mut booking = load_booking(state, booking_id)?;

    if booking.customer_id != customer_id {
        return Err(AppError::Validation(format!(
            "booking {booking_id} does not belong to customer {customer_id}"
        )));
    }

    require_status(&booking, &[BookingStatus::Pending], "cancel")?;
    transition(&mut booking, BookingStatus::Cancelled)?;
    persist_booking(state, &mut booking, now)?;

    if let Some(provider_id) = &booking.provider_id {
        notify_user(
            state,
            Notification {
                user_id: provider_id.clone(),
                title: "Booking Cancelled".to_string(),
                message: "The customer cancelled their booking request.".to_string(),
                category: NotificationCategory::BookingCancelled,
                metadata: json!({ "booking_id": booking.id }),
            },
            now,
        )
        .await;
    }

    Ok(booking)
}

/// Administrative cancellation from any open state. Released bookings are final.
pub async fn admin_cancel(
    state: &Arc<AppState>,
    booking_id: &str,
    actor: &Actor,
    reason: &str,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    if !actor.is_admin {
        return Err(AppError::Unauthorized);
    }
    let reason = require_text(reason, "cancellation reason")?;
    let _guard = state.locks.acquire(booking_id).await;
    let mut booking = load_booking(state, booking_id)?;

    admin_transition(&mut booking, BookingStatus::Cancelled)?;
    booking.no_show_fires_at = None;
    persist_booking(state, &mut booking, now)?;

    tracing::info!(booking_id = %booking.id, actor = %actor.id, reason = %reason, "booking cancelled by admin");

    notify_user(
        state,
        Notification {
            user_id: booking.customer_id.clone(),
            title: "Booking Cancelled".to_string(),
            message: format!("Your booking was cancelled by support. Reason: {reason}"),
            category: NotificationCategory::BookingCancelled,
            metadata: json!({ "booking_id": booking.id }),
        },
        now,
    )
    .await;

    Ok(booking)
}

/// Authorize the booking total against the customer's payment method, with
/// the platform commission as the application fee.
pub async fn create_payment_intent(
    state: &Arc<AppState>,
    booking_id: &str,
    payment_method: Option<String>,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let _guard = state.locks.acquire(booking_id).await;
    let mut booking = load_booking(state, booking_id)?;

    if booking.payment_status == PaymentStatus::Paid {
        return Err(AppError::AlreadyProcessed(format!("booking {booking_id} is already paid")));
    }
    require_status(
        &booking,
        &[BookingStatus::Confirmed, BookingStatus::PaymentFailed],
        "create a payment for",
    )?;

    let payment_method = payment_method
        .filter(|p| !p.trim().is_empty())
        .or_else(|| booking.payment_method.clone())
        .ok_or_else(|| AppError::Validation("payment_method is required".to_string()))?;
    let provider_account = booking.provider_account.clone().ok_or_else(|| {
        AppError::InvalidState("provider has not set up a payout account".to_string())
    })?;

    let request = AuthorizeRequest {
        booking_id: booking.id.clone(),
        amount: booking.total_price,
        payment_method: payment_method.clone(),
        provider_account: Some(provider_account),
        platform_fee: booking.platform_commission,
        description: format!("Cleaning booking {}", booking.id),
    };
    let payment_ref = state
        .payments
        .authorize(&request)
        .await
        .map_err(|e| AppError::Gateway(e.to_string()))?;

    transition(&mut booking, BookingStatus::PaymentPending)?;
    booking.payment_method = Some(payment_method);
    booking.payment_ref = Some(payment_ref);
    booking.authorized_amount = Some(booking.total_price);
    booking.payment_status = PaymentStatus::Unpaid;
    persist_booking(state, &mut booking, now)?;

    Ok(booking)
}

/// Settle the authorized payment and move the booking according to the
/// gateway's answer.
pub async fn confirm_payment(
    state: &Arc<AppState>,
    booking_id: &str,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let _guard = state.locks.acquire(booking_id).await;
    let mut booking = load_booking(state, booking_id)?;

    require_status(
        &booking,
        &[BookingStatus::PaymentPending, BookingStatus::PaymentProcessing],
        "confirm payment for",
    )?;
    let payment_ref = booking
        .payment_ref
        .clone()
        .ok_or_else(|| AppError::InvalidState(format!("booking {booking_id} has no payment")))?;

    let outcome = state
        .payments
        .capture(&payment_ref)
        .await
        .map_err(|e| AppError::Gateway(e.to_string()))?;

    match outcome {
        CaptureOutcome::Succeeded => {
            transition(&mut booking, BookingStatus::Confirmed)?;
            booking.payment_status = PaymentStatus::Paid;
            booking.captured_amount = booking.authorized_amount;
        }
        CaptureOutcome::Processing => {
            if booking.status != BookingStatus::PaymentProcessing {
                transition(&mut booking, BookingStatus::PaymentProcessing)?;
            }
            booking.payment_status = PaymentStatus::Processing;
        }
        CaptureOutcome::Failed => {
            transition(&mut booking, BookingStatus::PaymentFailed)?;
            booking.payment_status = PaymentStatus::Failed;
        }
    }
    persist_booking(state, &mut booking, now)?;

    tracing::info!(
        booking_id = %booking.id,
        outcome = ?outcome,
        payment_status = booking.payment_status.as_str(),
        "payment confirmation processed"
    );

    if outcome == CaptureOutcome::Failed {
        notify_user(
            state,
            Notification {
                user_id: booking.customer_id.clone(),
                title: "Payment Failed".to_string(),
                message: "We couldn't process your payment. Please update your payment method.".to_string(),
                category: NotificationCategory::PaymentFailed,
                metadata: json!({ "booking_id": booking.id }),
            },
            now,
        )
        .await;
    }

    Ok(booking)
}
