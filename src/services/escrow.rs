//! Escrow release. Funds are held on the platform account from capture until
//! one of the release paths hands the provider share over.

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use serde_json::json;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    Booking, BookingStatus, Notification, NotificationCategory, PaymentRelease, PaymentStatus,
    ReleaseType,
};
use crate::services::lifecycle::{admin_transition, load_booking, persist_booking, transition, Actor};
use crate::services::notify::notify_user;
use crate::state::AppState;

/// Cent-level slack for float sums in the ledger guard.
const LEDGER_EPSILON: f64 = 0.005;

pub async fn release(
    state: &Arc<AppState>,
    booking_id: &str,
    actor: &Actor,
    release_type: ReleaseType,
    now: NaiveDateTime,
) -> Result<PaymentRelease, AppError> {
    let _guard = state.locks.acquire(booking_id).await;
    let booking = load_booking(state, booking_id)?;
    release_locked(state, booking, actor, release_type, now).await
}

/// Caller holds the booking lock.
async fn release_locked(
    state: &Arc<AppState>,
    mut booking: Booking,
    actor: &Actor,
    release_type: ReleaseType,
    now: NaiveDateTime,
) -> Result<PaymentRelease, AppError> {
    if booking.payment_status == PaymentStatus::Released
        || booking.status == BookingStatus::PaymentReleased
    {
        return Err(AppError::AlreadyProcessed(format!(
            "payment for booking {} was already released",
            booking.id
        )));
    }

    match release_type {
        ReleaseType::Full => {
            if actor.id != booking.customer_id && !actor.is_admin {
                return Err(AppError::Unauthorized);
            }
            if booking.status != BookingStatus::Completed {
                return Err(AppError::InvalidState(format!(
                    "full release requires a completed booking, {} is {}",
                    booking.id, booking.status
                )));
            }
            transition(&mut booking, BookingStatus::PaymentReleased)?;
        }
        ReleaseType::AdminOverride => {
            if !actor.is_admin {
                return Err(AppError::Unauthorized);
            }
            admin_transition(&mut booking, BookingStatus::PaymentReleased)?;
        }
        ReleaseType::Auto => {
            if booking.status != BookingStatus::AutoReleasePending {
                return Err(AppError::InvalidState(format!(
                    "booking {} is not staged for auto-release",
                    booking.id
                )));
            }
            transition(&mut booking, BookingStatus::PaymentReleased)?;
        }
    }

    let payment_ref = booking.payment_ref.clone().ok_or_else(|| {
        AppError::InvalidState(format!("booking {} has no captured payment", booking.id))
    })?;
    let held = booking
        .captured_amount
        .or(booking.authorized_amount)
        .unwrap_or(booking.total_price);
    let amount = booking.release_amount();

    booking.payment_status = PaymentStatus::Released;
    booking.no_show_fires_at = None;
    booking.updated_at = now;

    let entry = PaymentRelease {
        id: uuid::Uuid::new_v4().to_string(),
        booking_id: booking.id.clone(),
        released_by: actor.id.clone(),
        release_type,
        amount_released: amount,
        // Connect routes the provider share at capture; the ledger points at it.
        transfer_ref: format!("auto_{payment_ref}"),
        created_at: now,
    };

    {
        let mut db = state.db();
        let tx = db.transaction()?;

        let already = queries::total_released(&tx, &booking.id)?;
        if already + amount > held + LEDGER_EPSILON {
            return Err(AppError::InvalidState(format!(
                "release of {amount:.2} would exceed the {held:.2} held for booking {}",
                booking.id
            )));
        }
        if !queries::update_booking(&tx, &booking)? {
            return Err(AppError::StateConflict(format!(
                "booking {} was modified concurrently",
                booking.id
            )));
        }
        queries::insert_release(&tx, &entry)?;
        tx.commit()?;
    }
    booking.version += 1;

    tracing::info!(
        booking_id = %booking.id,
        release_type = release_type.as_str(),
        released_by = %actor.id,
        amount,
        "payment released"
    );

    if let Some(provider_id) = &booking.provider_id {
        notify_user(
            state,
            Notification {
                user_id: provider_id.clone(),
                title: "Payment Released".to_string(),
                message: format!("${amount:.2} has been released to your account."),
                category: NotificationCategory::PaymentReleased,
                metadata: json!({
                    "booking_id": booking.id,
                    "amount": amount,
                    "release_type": release_type.as_str(),
                }),
            },
            now,
        )
        .await;
    }

    Ok(entry)
}

pub fn get_releases(state: &Arc<AppState>, booking_id: &str) -> Result<Vec<PaymentRelease>, AppError> {
    let db = state.db();
    if queries::get_booking_by_id(&db, booking_id)?.is_none() {
        return Err(AppError::NotFound(format!("booking {booking_id}")));
    }
    Ok(queries::get_releases_for_booking(&db, booking_id)?)
}

/// Sweep step: stage and release every completed booking whose delay has
/// elapsed. The delay is read from settings on every run. Returns how many
/// bookings were released.
pub async fn run_auto_releases(state: &Arc<AppState>, now: NaiveDateTime) -> anyhow::Result<usize> {
    let (candidates, delay) = {
        let db = state.db();
        let hours = state.settings.current(&db)?.auto_release_hours;
        let delay = Duration::try_hours(hours)
            .ok_or_else(|| anyhow::anyhow!("auto_release_hours {hours} is out of range"))?;
        let cutoff = now
            .checked_sub_signed(delay)
            .ok_or_else(|| anyhow::anyhow!("auto_release_hours {hours} is out of range"))?;
        (queries::get_auto_release_candidates(&db, &cutoff)?, delay)
    };

    let mut released = 0;
    for booking_id in candidates {
        match auto_release(state, &booking_id, delay, now).await {
            Ok(Some(_)) => released += 1,
            Ok(None) => {}
            Err(e) => tracing::warn!(booking_id = %booking_id, error = %e, "auto-release failed"),
        }
    }
    Ok(released)
}

async fn auto_release(
    state: &Arc<AppState>,
    booking_id: &str,
    delay: Duration,
    now: NaiveDateTime,
) -> Result<Option<PaymentRelease>, AppError> {
    let _guard = state.locks.acquire(booking_id).await;
    let mut booking = load_booking(state, booking_id)?;

    match booking.status {
        BookingStatus::AutoReleasePending => {}
        BookingStatus::Completed => {
            // Re-check under the lock: a manual release may have won the race.
            let Some(ended) = booking.actual_end_time else {
                return Ok(None);
            };
            match ended.checked_add_signed(delay) {
                Some(due) if due <= now => {}
                _ => return Ok(None),
            }
            transition(&mut booking, BookingStatus::AutoReleasePending)?;
            persist_booking(state, &mut booking, now)?;
        }
        _ => return Ok(None),
    }

    release_locked(state, booking, &Actor::system(), ReleaseType::Auto, now)
        .await
        .map(Some)
}
