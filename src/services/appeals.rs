//! Disputes against no-show charges. An approved appeal refunds the charge
//! through the gateway; the booking keeps its charge fields as the record of
//! what happened.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::json;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    AppealDecision, AppealReason, AppealStatus, Booking, CaptureStatus, ChargeAppeal, Notification,
    NotificationCategory,
};
use crate::services::lifecycle::{load_booking, persist_booking};
use crate::services::notify::notify_user;
use crate::services::payments::CaptureOutcome;
use crate::state::AppState;

pub async fn submit_appeal(
    state: &Arc<AppState>,
    booking_id: &str,
    customer_id: &str,
    reason: AppealReason,
    description: &str,
    now: NaiveDateTime,
) -> Result<ChargeAppeal, AppError> {
    let description = description.trim();
    if description.is_empty() {
        return Err(AppError::Validation("appeal description is required".to_string()));
    }

    let _guard = state.locks.acquire(booking_id).await;
    let booking = load_booking(state, booking_id)?;

    if booking.customer_id != customer_id {
        return Err(AppError::Validation(format!(
            "booking {booking_id} does not belong to customer {customer_id}"
        )));
    }
    let Some(charge_amount) = booking.no_show_charge_amount.filter(|_| booking.no_show_detected) else {
        return Err(AppError::InvalidState(format!(
            "booking {booking_id} has no no-show charge to appeal"
        )));
    };

    let appeal = ChargeAppeal {
        id: uuid::Uuid::new_v4().to_string(),
        booking_id: booking.id.clone(),
        customer_id: customer_id.to_string(),
        reason,
        description: description.to_string(),
        status: AppealStatus::Pending,
        reviewer_id: None,
        reviewer_notes: None,
        refund_ref: None,
        resolved_at: None,
        created_at: now,
    };

    {
        let db = state.db();
        if queries::has_pending_appeal(&db, &booking.id)? {
            return Err(AppError::AlreadyProcessed(format!(
                "booking {booking_id} already has a pending appeal"
            )));
        }
        if queries::has_approved_appeal(&db, &booking.id)? {
            return Err(AppError::AlreadyProcessed(format!(
                "the no-show charge on booking {booking_id} was already waived on appeal"
            )));
        }
        queries::insert_appeal(&db, &appeal)?;
    }

    tracing::info!(
        appeal_id = %appeal.id,
        booking_id = %booking.id,
        reason = reason.as_str(),
        charge_amount,
        "appeal submitted"
    );

    for reviewer_id in &state.config.reviewer_ids {
        notify_user(
            state,
            Notification {
                user_id: reviewer_id.clone(),
                title: "New Charge Appeal".to_string(),
                message: format!(
                    "A customer appealed a ${charge_amount:.2} no-show charge: {}",
                    reason.label()
                ),
                category: NotificationCategory::AppealSubmitted,
                metadata: json!({ "booking_id": booking.id, "appeal_id": appeal.id }),
            },
            now,
        )
        .await;
    }

    Ok(appeal)
}

/// Record a reviewer's verdict. Approval refunds a collected charge, or voids
/// one that was never collected. A failed refund, or a capture that has not
/// settled yet, leaves the appeal pending.
pub async fn resolve_appeal(
    state: &Arc<AppState>,
    appeal_id: &str,
    reviewer_id: &str,
    decision: AppealDecision,
    notes: &str,
    now: NaiveDateTime,
) -> Result<ChargeAppeal, AppError> {
    let notes = notes.trim();
    if notes.is_empty() {
        return Err(AppError::Validation("reviewer notes are required".to_string()));
    }

    let booking_id = {
        let db = state.db();
        queries::get_appeal(&db, appeal_id)?
            .ok_or_else(|| AppError::NotFound(format!("appeal {appeal_id}")))?
            .booking_id
    };

    let _guard = state.locks.acquire(&booking_id).await;
    let mut appeal = {
        let db = state.db();
        queries::get_appeal(&db, appeal_id)?
            .ok_or_else(|| AppError::NotFound(format!("appeal {appeal_id}")))?
    };
    if appeal.status != AppealStatus::Pending {
        return Err(AppError::AlreadyProcessed(format!(
            "appeal {appeal_id} was already {}",
            appeal.status.as_str()
        )));
    }
    let mut booking = load_booking(state, &booking_id)?;
    let charge_amount = booking.no_show_charge_amount.unwrap_or(0.0);

    if decision == AppealDecision::Approved {
        waive_charge(state, &mut booking, &mut appeal, charge_amount, now).await?;
    }

    appeal.status = decision.into();
    appeal.reviewer_id = Some(reviewer_id.to_string());
    appeal.reviewer_notes = Some(notes.to_string());
    appeal.resolved_at = Some(now);

    let written = {
        let db = state.db();
        queries::resolve_appeal(&db, &appeal)?
    };
    if !written {
        return Err(AppError::AlreadyProcessed(format!("appeal {appeal_id} was already resolved")));
    }

    tracing::info!(
        appeal_id = %appeal.id,
        booking_id = %booking.id,
        reviewer_id = %reviewer_id,
        decision = appeal.status.as_str(),
        refund_ref = ?appeal.refund_ref,
        "appeal resolved"
    );

    let (title, message) = match decision {
        AppealDecision::Approved => (
            "Appeal Approved".to_string(),
            format!("Your appeal was approved and the ${charge_amount:.2} no-show charge will be refunded."),
        ),
        AppealDecision::Rejected => (
            "Appeal Rejected".to_string(),
            format!("Your appeal was not approved. Reviewer notes: {notes}"),
        ),
    };
    notify_user(
        state,
        Notification {
            user_id: appeal.customer_id.clone(),
            title,
            message,
            category: NotificationCategory::AppealResolved,
            metadata: json!({
                "booking_id": booking.id,
                "appeal_id": appeal.id,
                "decision": appeal.status.as_str(),
            }),
        },
        now,
    )
    .await;

    Ok(appeal)
}

/// Undo the no-show charge for an approved appeal. Money that reached the
/// gateway is refunded exactly once; a charge never collected is voided.
async fn waive_charge(
    state: &Arc<AppState>,
    booking: &mut Booking,
    appeal: &mut ChargeAppeal,
    charge_amount: f64,
    now: NaiveDateTime,
) -> Result<(), AppError> {
    let mut capture_status = booking.no_show_capture_status;
    if let (CaptureStatus::Processing, Some(payment_ref)) = (capture_status, &booking.no_show_payment_ref) {
        capture_status = match state.payments.capture_status(payment_ref).await {
            Ok(CaptureOutcome::Succeeded) => CaptureStatus::Captured,
            Ok(CaptureOutcome::Failed) => CaptureStatus::Failed,
            Ok(CaptureOutcome::Processing) => {
                return Err(AppError::InvalidState(format!(
                    "no-show capture for booking {} is still processing",
                    booking.id
                )));
            }
            Err(e) => return Err(AppError::Gateway(e.to_string())),
        };
    }

    match (capture_status, booking.no_show_payment_ref.clone()) {
        (CaptureStatus::Captured, Some(payment_ref)) => {
            let refund_ref = state
                .payments
                .refund(&payment_ref, charge_amount)
                .await
                .map_err(|e| {
                    tracing::warn!(appeal_id = %appeal.id, error = %e, "appeal refund failed");
                    AppError::Gateway(e.to_string())
                })?;
            appeal.refund_ref = Some(refund_ref);
            booking.no_show_capture_status = CaptureStatus::Refunded;
        }
        (CaptureStatus::Refunded, _) => {
            return Err(AppError::AlreadyProcessed(format!(
                "no-show charge on booking {} was already refunded",
                booking.id
            )));
        }
        (CaptureStatus::Pending | CaptureStatus::Failed, _) => {
            booking.no_show_capture_status = CaptureStatus::Voided;
        }
        _ => return Ok(()),
    }
    persist_booking(state, booking, now)?;
    Ok(())
}

pub fn list_appeals(
    state: &Arc<AppState>,
    status: Option<AppealStatus>,
    limit: i64,
) -> Result<Vec<ChargeAppeal>, AppError> {
    let db = state.db();
    Ok(queries::get_appeals(&db, status.map(|s| s.as_str()), limit)?)
}

pub fn list_booking_appeals(state: &Arc<AppState>, booking_id: &str) -> Result<Vec<ChargeAppeal>, AppError> {
    let db = state.db();
    Ok(queries::get_appeals_for_booking(&db, booking_id)?)
}
