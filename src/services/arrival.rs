use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, Notification, NotificationCategory};
use crate::services::lifecycle::{load_booking, persist_booking, require_status};
use crate::services::notify::notify_user;
use crate::state::AppState;

/// GPS fix reported by the provider's device. Kept as dispute evidence only;
/// there is no geofence check against the service address.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lng) {
            return Err(AppError::Validation(format!(
                "coordinates out of range: {}, {}",
                self.lat, self.lng
            )));
        }
        Ok(())
    }
}

/// Record the provider on site. The first call fixes the arrival time and
/// coordinates; later calls can only upgrade access to confirmed. Without
/// access, a no-show deadline is persisted and the customer is told someone
/// is waiting at the door.
pub async fn record_arrival(
    state: &Arc<AppState>,
    booking_id: &str,
    coordinates: Option<Coordinates>,
    customer_confirmed: bool,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    if let Some(c) = &coordinates {
        c.validate()?;
    }

    let grace = {
        let db = state.db();
        let minutes = state.settings.current(&db)?.no_show_grace_minutes;
        Duration::try_minutes(minutes).ok_or_else(|| {
            AppError::Validation(format!("no_show_grace_minutes {minutes} is out of range"))
        })?
    };

    let _guard = state.locks.acquire(booking_id).await;
    let mut booking = load_booking(state, booking_id)?;
    require_status(&booking, &[BookingStatus::Confirmed], "record arrival for")?;

    if booking.arrived_at.is_none() {
        booking.arrived_at = Some(now);
    }
    if booking.arrival_lat.is_none() && booking.arrival_lng.is_none() {
        if let Some(c) = coordinates {
            booking.arrival_lat = Some(c.lat);
            booking.arrival_lng = Some(c.lng);
        }
    }

    let mut timer_scheduled = false;
    if customer_confirmed {
        booking.customer_confirmed_access = true;
        booking.no_show_fires_at = None;
    } else if !booking.customer_confirmed_access
        && !booking.no_show_detected
        && booking.no_show_fires_at.is_none()
    {
        let fires_at = now.checked_add_signed(grace).ok_or_else(|| {
            AppError::Validation("no-show deadline is out of range".to_string())
        })?;
        booking.no_show_fires_at = Some(fires_at);
        timer_scheduled = true;
    }

    persist_booking(state, &mut booking, now)?;

    tracing::info!(
        booking_id = %booking.id,
        customer_confirmed = booking.customer_confirmed_access,
        no_show_fires_at = ?booking.no_show_fires_at,
        "provider arrival recorded"
    );

    if timer_scheduled {
        notify_user(
            state,
            Notification {
                user_id: booking.customer_id.clone(),
                title: "Cleaner Has Arrived".to_string(),
                message: "Your cleaner has arrived and is waiting for access. Please confirm their arrival or contact them directly.".to_string(),
                category: NotificationCategory::CleanerArrived,
                metadata: json!({ "booking_id": booking.id, "grace_minutes": grace.num_minutes() }),
            },
            now,
        )
        .await;
    }

    Ok(booking)
}

/// Customer lets the provider in. Clears any pending no-show deadline; an
/// already applied charge stays in place.
pub async fn confirm_customer_access(
    state: &Arc<AppState>,
    booking_id: &str,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let _guard = state.locks.acquire(booking_id).await;
    let mut booking = load_booking(state, booking_id)?;

    if booking.customer_confirmed_access {
        return Ok(booking);
    }
    require_status(
        &booking,
        &[BookingStatus::Confirmed, BookingStatus::InProgress],
        "confirm access for",
    )?;

    booking.customer_confirmed_access = true;
    booking.no_show_fires_at = None;
    persist_booking(state, &mut booking, now)?;

    if booking.no_show_detected {
        tracing::info!(booking_id = %booking.id, "access confirmed after no-show charge was applied");
    } else {
        tracing::info!(booking_id = %booking.id, "customer confirmed access");
    }

    Ok(booking)
}
