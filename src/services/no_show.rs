//! No-show handling. The deadline set at arrival is persisted on the booking
//! and fired by the sweep, so it survives restarts. Firing re-reads the
//! booking under its lock and the charge itself is idempotent, which makes a
//! late or duplicate fire harmless.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::json;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, CaptureStatus, Notification, NotificationCategory};
use crate::services::lifecycle::{load_booking, persist_booking};
use crate::services::notify::notify_user;
use crate::services::payments::{AuthorizeRequest, CaptureOutcome};
use crate::state::AppState;

/// Fire every due deadline. Returns how many bookings were charged.
pub async fn fire_due_timers(state: &Arc<AppState>, now: NaiveDateTime) -> anyhow::Result<usize> {
    let due = {
        let db = state.db();
        queries::get_due_no_show_timers(&db, &now)?
    };

    let mut charged = 0;
    for booking_id in due {
        match fire_timer(state, &booking_id, now).await {
            Ok(Some(_)) => charged += 1,
            Ok(None) => {}
            Err(e) => {
                tracing::error!(booking_id = %booking_id, error = %e, "no-show timer failed");
            }
        }
    }
    Ok(charged)
}

/// Re-check and fire one deadline. `Ok(None)` when the booking no longer
/// qualifies: access was confirmed, it was already charged, work started or
/// it left the confirmed state.
pub async fn fire_timer(
    state: &Arc<AppState>,
    booking_id: &str,
    now: NaiveDateTime,
) -> Result<Option<Booking>, AppError> {
    let _guard = state.locks.acquire(booking_id).await;
    let mut booking = load_booking(state, booking_id)?;

    let Some(fires_at) = booking.no_show_fires_at else {
        return Ok(None);
    };
    if fires_at > now {
        return Ok(None);
    }

    if booking.customer_confirmed_access
        || booking.no_show_detected
        || booking.status != BookingStatus::Confirmed
    {
        tracing::debug!(booking_id = %booking.id, "no-show timer no longer applies");
        booking.no_show_fires_at = None;
        persist_booking(state, &mut booking, now)?;
        return Ok(None);
    }

    charge_locked(state, booking, now).await.map(Some)
}

/// Apply the no-show charge. Re-applying to a charged booking returns it
/// unchanged.
pub async fn charge_no_show(
    state: &Arc<AppState>,
    booking_id: &str,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let _guard = state.locks.acquire(booking_id).await;
    let booking = load_booking(state, booking_id)?;
    charge_locked(state, booking, now).await
}

/// The penalty is one hour at the booking's rate, whatever the booked duration.
pub fn no_show_charge_amount(booking: &Booking) -> f64 {
    booking.hourly_rate
}

async fn charge_locked(
    state: &Arc<AppState>,
    mut booking: Booking,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    if booking.no_show_detected {
        return Ok(booking);
    }

    let amount = no_show_charge_amount(&booking);
    booking.no_show_detected = true;
    booking.no_show_charge_amount = Some(amount);
    booking.no_show_charged_at = Some(now);
    booking.no_show_fires_at = None;
    booking.no_show_capture_status = CaptureStatus::Pending;
    persist_booking(state, &mut booking, now)?;

    tracing::info!(booking_id = %booking.id, amount, "no-show charge applied");

    notify_user(
        state,
        Notification {
            user_id: booking.customer_id.clone(),
            title: "No-Show Charge Applied".to_string(),
            message: format!(
                "A ${amount:.2} no-show charge has been applied to your booking. You can appeal this charge if you believe it was applied in error."
            ),
            category: NotificationCategory::NoShowDetected,
            metadata: json!({ "booking_id": booking.id, "charge_amount": amount }),
        },
        now,
    )
    .await;

    attempt_capture(state, &mut booking, now).await?;
    Ok(booking)
}

/// Try to collect a recorded charge. The charge record is never rolled back:
/// a gateway failure marks the capture failed for a later retry and is
/// returned to the caller. A capture already submitted and still processing
/// is polled rather than submitted again.
async fn attempt_capture(
    state: &Arc<AppState>,
    booking: &mut Booking,
    now: NaiveDateTime,
) -> Result<(), AppError> {
    let in_flight = match (booking.no_show_capture_status, &booking.no_show_payment_ref) {
        (CaptureStatus::Processing, Some(payment_ref)) => Some(payment_ref.clone()),
        _ => None,
    };

    let result = match &in_flight {
        Some(payment_ref) => poll_capture(state, payment_ref).await,
        None => {
            let amount = booking.no_show_charge_amount.unwrap_or_else(|| no_show_charge_amount(booking));
            booking.no_show_capture_attempts += 1;
            collect(state, booking, amount).await
        }
    };
    booking.no_show_capture_status = match &result {
        Ok(CaptureOutcome::Succeeded) => CaptureStatus::Captured,
        Ok(CaptureOutcome::Processing) => CaptureStatus::Processing,
        Ok(CaptureOutcome::Failed) => CaptureStatus::Failed,
        // An unanswered poll says nothing about the funds already in flight.
        Err(_) if in_flight.is_some() => CaptureStatus::Processing,
        Err(_) => CaptureStatus::Failed,
    };
    persist_booking(state, booking, now)?;

    match result {
        Ok(CaptureOutcome::Failed) => {
            tracing::warn!(booking_id = %booking.id, attempts = booking.no_show_capture_attempts, "no-show capture declined");
            Err(AppError::Gateway("no-show charge was declined".to_string()))
        }
        Ok(outcome) => {
            tracing::info!(
                booking_id = %booking.id,
                payment_ref = ?booking.no_show_payment_ref,
                outcome = ?outcome,
                polled = in_flight.is_some(),
                "no-show capture processed"
            );
            Ok(())
        }
        Err(e) => {
            tracing::warn!(booking_id = %booking.id, attempts = booking.no_show_capture_attempts, error = %e, "no-show capture failed");
            Err(e)
        }
    }
}

async fn poll_capture(state: &Arc<AppState>, payment_ref: &str) -> Result<CaptureOutcome, AppError> {
    state
        .payments
        .capture_status(payment_ref)
        .await
        .map_err(|e| AppError::Gateway(e.to_string()))
}

/// Authorize once (the reference is kept on the booking so retries reuse the
/// hold), then capture.
async fn collect(
    state: &Arc<AppState>,
    booking: &mut Booking,
    amount: f64,
) -> Result<CaptureOutcome, AppError> {
    let payment_ref = match &booking.no_show_payment_ref {
        Some(existing) => existing.clone(),
        None => {
            let payment_method = booking.payment_method.clone().ok_or_else(|| {
                AppError::Gateway("customer has no payment method on file".to_string())
            })?;
            let request = AuthorizeRequest {
                booking_id: booking.id.clone(),
                amount,
                payment_method,
                provider_account: booking.provider_account.clone(),
                platform_fee: amount * booking.commission_rate / 100.0,
                description: format!("No-show charge for booking {}", booking.id),
            };
            let payment_ref = state
                .payments
                .authorize(&request)
                .await
                .map_err(|e| AppError::Gateway(e.to_string()))?;
            booking.no_show_payment_ref = Some(payment_ref.clone());
            payment_ref
        }
    };

    state
        .payments
        .capture(&payment_ref)
        .await
        .map_err(|e| AppError::Gateway(e.to_string()))
}

/// Retry collecting a charge whose capture failed or never settled.
pub async fn retry_capture(
    state: &Arc<AppState>,
    booking_id: &str,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let _guard = state.locks.acquire(booking_id).await;
    let mut booking = load_booking(state, booking_id)?;

    if !booking.no_show_detected {
        return Err(AppError::InvalidState(format!("booking {booking_id} has no no-show charge")));
    }
    if !matches!(
        booking.no_show_capture_status,
        CaptureStatus::Failed | CaptureStatus::Pending | CaptureStatus::Processing
    ) {
        return Err(AppError::AlreadyProcessed(format!(
            "no-show capture for booking {booking_id} is {}",
            booking.no_show_capture_status.as_str()
        )));
    }

    attempt_capture(state, &mut booking, now).await?;
    Ok(booking)
}

/// Sweep step: retry captures below the attempt limit and poll the ones still
/// processing. Returns how many settled as captured.
pub async fn retry_failed_captures(state: &Arc<AppState>, now: NaiveDateTime) -> anyhow::Result<usize> {
    let ids = {
        let db = state.db();
        queries::get_retryable_no_show_captures(&db, state.config.no_show_capture_max_attempts)?
    };

    let mut recovered = 0;
    for booking_id in ids {
        match retry_capture(state, &booking_id, now).await {
            Ok(b) if b.no_show_capture_status == CaptureStatus::Captured => recovered += 1,
            Ok(_) => {}
            Err(e) => tracing::warn!(booking_id = %booking_id, error = %e, "no-show capture retry failed"),
        }
    }
    Ok(recovered)
}
