use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::errors::AppError;
use crate::models::{Booking, BookingStatus};
use crate::services::lifecycle::{load_booking, persist_booking, transition};
use crate::state::AppState;

/// Fractional hours between two instants, unrounded.
pub fn hours_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    (end - start).num_milliseconds() as f64 / 3_600_000.0
}

pub async fn start_work(
    state: &Arc<AppState>,
    booking_id: &str,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let _guard = state.locks.acquire(booking_id).await;
    let mut booking = load_booking(state, booking_id)?;

    transition(&mut booking, BookingStatus::InProgress)?;
    booking.actual_start_time = Some(now);
    // The provider is inside; a pending no-show deadline no longer applies.
    booking.no_show_fires_at = None;
    persist_booking(state, &mut booking, now)?;

    tracing::info!(booking_id = %booking.id, started_at = %now, "work started");
    Ok(booking)
}

/// Close the job and bill for the time actually worked. The estimated total
/// is kept alongside for comparison.
pub async fn end_work(
    state: &Arc<AppState>,
    booking_id: &str,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let _guard = state.locks.acquire(booking_id).await;
    let mut booking = load_booking(state, booking_id)?;

    let start = match (booking.status, booking.actual_start_time) {
        (BookingStatus::InProgress, Some(start)) => start,
        (BookingStatus::InProgress, None) => {
            return Err(AppError::InvalidState(format!(
                "booking {booking_id} is in progress without a start time"
            )));
        }
        (status, _) => {
            return Err(AppError::InvalidState(format!(
                "cannot end work on booking {booking_id} while it is {status}"
            )));
        }
    };
    if now < start {
        return Err(AppError::Validation("end time precedes start time".to_string()));
    }

    let hours = hours_between(start, now);
    transition(&mut booking, BookingStatus::Completed)?;
    booking.actual_end_time = Some(now);
    booking.actual_hours_worked = Some(hours);
    booking.final_amount = Some(booking.hourly_rate * hours);
    persist_booking(state, &mut booking, now)?;

    tracing::info!(
        booking_id = %booking.id,
        hours_worked = hours,
        final_amount = booking.final_amount,
        estimated_total = booking.total_price,
        "work completed"
    );
    Ok(booking)
}
