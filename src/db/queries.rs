use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    AppealReason, AppealStatus, Booking, BookingStatus, CaptureStatus, ChargeAppeal,
    NotificationPreferences, PaymentRelease, PaymentStatus, ReleaseType, StoredNotification,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn fmt_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn fmt_ts_opt(ts: &Option<NaiveDateTime>) -> Option<String> {
    ts.as_ref().map(fmt_ts)
}

fn parse_ts(raw: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .with_context(|| format!("invalid timestamp in database: {raw}"))
}

fn parse_ts_opt(raw: Option<String>) -> anyhow::Result<Option<NaiveDateTime>> {
    raw.as_deref().map(parse_ts).transpose()
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, customer_id, provider_id, provider_account, service_date, service_time, \
     estimated_hours, hourly_rate, total_price, commission_rate, platform_commission, provider_earnings, \
     status, accepted_at, declined_at, declined_reason, arrived_at, arrival_lat, arrival_lng, \
     customer_confirmed_access, no_show_fires_at, no_show_detected, no_show_charge_amount, \
     no_show_charged_at, no_show_capture_status, no_show_payment_ref, no_show_capture_attempts, \
     actual_start_time, actual_end_time, actual_hours_worked, final_amount, payment_method, \
     payment_ref, payment_status, authorized_amount, captured_amount, version, created_at, updated_at";

pub fn create_booking(conn: &Connection, b: &Booking) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS}) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19,
                ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34, ?35, ?36,
                ?37, ?38, ?39)"
        ),
        params![
            b.id,
            b.customer_id,
            b.provider_id,
            b.provider_account,
            b.service_date.format("%Y-%m-%d").to_string(),
            b.service_time.format("%H:%M").to_string(),
            b.estimated_hours,
            b.hourly_rate,
            b.total_price,
            b.commission_rate,
            b.platform_commission,
            b.provider_earnings,
            b.status.as_str(),
            fmt_ts_opt(&b.accepted_at),
            fmt_ts_opt(&b.declined_at),
            b.declined_reason,
            fmt_ts_opt(&b.arrived_at),
            b.arrival_lat,
            b.arrival_lng,
            b.customer_confirmed_access,
            fmt_ts_opt(&b.no_show_fires_at),
            b.no_show_detected,
            b.no_show_charge_amount,
            fmt_ts_opt(&b.no_show_charged_at),
            b.no_show_capture_status.as_str(),
            b.no_show_payment_ref,
            b.no_show_capture_attempts,
            fmt_ts_opt(&b.actual_start_time),
            fmt_ts_opt(&b.actual_end_time),
            b.actual_hours_worked,
            b.final_amount,
            b.payment_method,
            b.payment_ref,
            b.payment_status.as_str(),
            b.authorized_amount,
            b.captured_amount,
            b.version,
            fmt_ts(&b.created_at),
            fmt_ts(&b.updated_at),
        ],
    )?;
    Ok(())
}

/// Write back every mutable field, guarded by the version the caller read.
/// Returns false when another writer got there first. Pricing and commission
/// columns are never part of the update.
pub fn update_booking(conn: &Connection, b: &Booking) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
            provider_id = ?1, provider_account = ?2, status = ?3, accepted_at = ?4,
            declined_at = ?5, declined_reason = ?6, arrived_at = ?7, arrival_lat = ?8,
            arrival_lng = ?9, customer_confirmed_access = ?10, no_show_fires_at = ?11,
            no_show_detected = ?12, no_show_charge_amount = ?13, no_show_charged_at = ?14,
            no_show_capture_status = ?15, no_show_payment_ref = ?16, no_show_capture_attempts = ?17,
            actual_start_time = ?18, actual_end_time = ?19, actual_hours_worked = ?20,
            final_amount = ?21, payment_method = ?22, payment_ref = ?23, payment_status = ?24,
            authorized_amount = ?25, captured_amount = ?26, updated_at = ?27,
            version = version + 1
         WHERE id = ?28 AND version = ?29",
        params![
            b.provider_id,
            b.provider_account,
            b.status.as_str(),
            fmt_ts_opt(&b.accepted_at),
            fmt_ts_opt(&b.declined_at),
            b.declined_reason,
            fmt_ts_opt(&b.arrived_at),
            b.arrival_lat,
            b.arrival_lng,
            b.customer_confirmed_access,
            fmt_ts_opt(&b.no_show_fires_at),
            b.no_show_detected,
            b.no_show_charge_amount,
            fmt_ts_opt(&b.no_show_charged_at),
            b.no_show_capture_status.as_str(),
            b.no_show_payment_ref,
            b.no_show_capture_attempts,
            fmt_ts_opt(&b.actual_start_time),
            fmt_ts_opt(&b.actual_end_time),
            b.actual_hours_worked,
            b.final_amount,
            b.payment_method,
            b.payment_ref,
            b.payment_status.as_str(),
            b.authorized_amount,
            b.captured_amount,
            fmt_ts(&b.updated_at),
            b.id,
            b.version,
        ],
    )?;
    Ok(count > 0)
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_all_bookings(
    conn: &Connection,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status_filter {
        Some(status) => (
            format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = ?1 \
                 ORDER BY service_date DESC, service_time DESC LIMIT ?2"
            ),
            vec![
                Box::new(status.to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings \
                 ORDER BY service_date DESC, service_time DESC LIMIT ?1"
            ),
            vec![Box::new(limit) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Arrivals whose grace window has elapsed with access still unconfirmed.
pub fn get_due_no_show_timers(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM bookings
         WHERE no_show_fires_at IS NOT NULL AND no_show_fires_at <= ?1
           AND customer_confirmed_access = 0 AND no_show_detected = 0
         ORDER BY no_show_fires_at ASC",
    )?;
    let rows = stmt.query_map(params![fmt_ts(now)], |row| row.get::<_, String>(0))?;

    let mut ids = vec![];
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

/// Completed, paid-for jobs, not yet released, that finished at or before `ended_before`.
pub fn get_auto_release_candidates(
    conn: &Connection,
    ended_before: &NaiveDateTime,
) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM bookings
         WHERE status IN ('completed', 'auto_release_pending')
           AND payment_status != 'released'
           AND payment_ref IS NOT NULL
           AND actual_end_time IS NOT NULL AND actual_end_time <= ?1
         ORDER BY actual_end_time ASC",
    )?;
    let rows = stmt.query_map(params![fmt_ts(ended_before)], |row| row.get::<_, String>(0))?;

    let mut ids = vec![];
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

pub fn get_retryable_no_show_captures(conn: &Connection, max_attempts: i64) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM bookings
         WHERE no_show_capture_status = 'processing'
            OR (no_show_capture_status IN ('pending', 'failed') AND no_show_capture_attempts < ?1)
         ORDER BY no_show_charged_at ASC",
    )?;
    let rows = stmt.query_map(params![max_attempts], |row| row.get::<_, String>(0))?;

    let mut ids = vec![];
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let service_date_str: String = row.get(4)?;
    let service_time_str: String = row.get(5)?;
    let status_str: String = row.get(12)?;
    let capture_str: String = row.get(24)?;
    let payment_status_str: String = row.get(33)?;
    let created_at_str: String = row.get(37)?;
    let updated_at_str: String = row.get(38)?;

    Ok(Booking {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        provider_id: row.get(2)?,
        provider_account: row.get(3)?,
        service_date: NaiveDate::parse_from_str(&service_date_str, "%Y-%m-%d")
            .with_context(|| format!("invalid service date: {service_date_str}"))?,
        service_time: NaiveTime::parse_from_str(&service_time_str, "%H:%M")
            .with_context(|| format!("invalid service time: {service_time_str}"))?,
        estimated_hours: row.get(6)?,
        hourly_rate: row.get(7)?,
        total_price: row.get(8)?,
        commission_rate: row.get(9)?,
        platform_commission: row.get(10)?,
        provider_earnings: row.get(11)?,
        status: BookingStatus::parse(&status_str)
            .with_context(|| format!("unknown booking status: {status_str}"))?,
        accepted_at: parse_ts_opt(row.get(13)?)?,
        declined_at: parse_ts_opt(row.get(14)?)?,
        declined_reason: row.get(15)?,
        arrived_at: parse_ts_opt(row.get(16)?)?,
        arrival_lat: row.get(17)?,
        arrival_lng: row.get(18)?,
        customer_confirmed_access: row.get(19)?,
        no_show_fires_at: parse_ts_opt(row.get(20)?)?,
        no_show_detected: row.get(21)?,
        no_show_charge_amount: row.get(22)?,
        no_show_charged_at: parse_ts_opt(row.get(23)?)?,
        no_show_capture_status: CaptureStatus::parse(&capture_str)
            .with_context(|| format!("unknown capture status: {capture_str}"))?,
        no_show_payment_ref: row.get(25)?,
        no_show_capture_attempts: row.get(26)?,
        actual_start_time: parse_ts_opt(row.get(27)?)?,
        actual_end_time: parse_ts_opt(row.get(28)?)?,
        actual_hours_worked: row.get(29)?,
        final_amount: row.get(30)?,
        payment_method: row.get(31)?,
        payment_ref: row.get(32)?,
        payment_status: PaymentStatus::parse(&payment_status_str)
            .with_context(|| format!("unknown payment status: {payment_status_str}"))?,
        authorized_amount: row.get(34)?,
        captured_amount: row.get(35)?,
        version: row.get(36)?,
        created_at: parse_ts(&created_at_str)?,
        updated_at: parse_ts(&updated_at_str)?,
    })
}

// ── Payment Releases ──

pub fn insert_release(conn: &Connection, release: &PaymentRelease) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO payment_releases (id, booking_id, released_by, release_type, amount_released, transfer_ref, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            release.id,
            release.booking_id,
            release.released_by,
            release.release_type.as_str(),
            release.amount_released,
            release.transfer_ref,
            fmt_ts(&release.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_releases_for_booking(conn: &Connection, booking_id: &str) -> anyhow::Result<Vec<PaymentRelease>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, released_by, release_type, amount_released, transfer_ref, created_at
         FROM payment_releases WHERE booking_id = ?1 ORDER BY created_at ASC",
    )?;

    let rows = stmt.query_map(params![booking_id], |row| Ok(parse_release_row(row)))?;

    let mut releases = vec![];
    for row in rows {
        releases.push(row??);
    }
    Ok(releases)
}

fn parse_release_row(row: &rusqlite::Row) -> anyhow::Result<PaymentRelease> {
    let release_type: String = row.get(3)?;
    let created_at: String = row.get(6)?;

    Ok(PaymentRelease {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        released_by: row.get(2)?,
        release_type: ReleaseType::parse(&release_type)
            .with_context(|| format!("unknown release type: {release_type}"))?,
        amount_released: row.get(4)?,
        transfer_ref: row.get(5)?,
        created_at: parse_ts(&created_at)?,
    })
}

pub fn total_released(conn: &Connection, booking_id: &str) -> anyhow::Result<f64> {
    let total: f64 = conn.query_row(
        "SELECT COALESCE(SUM(amount_released), 0.0) FROM payment_releases WHERE booking_id = ?1",
        params![booking_id],
        |row| row.get(0),
    )?;
    Ok(total)
}

// ── Charge Appeals ──

pub fn insert_appeal(conn: &Connection, appeal: &ChargeAppeal) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO charge_appeals (id, booking_id, customer_id, reason, description, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            appeal.id,
            appeal.booking_id,
            appeal.customer_id,
            appeal.reason.as_str(),
            appeal.description,
            appeal.status.as_str(),
            fmt_ts(&appeal.created_at),
        ],
    )?;
    Ok(())
}

const APPEAL_COLUMNS: &str = "id, booking_id, customer_id, reason, description, status, \
     reviewer_id, reviewer_notes, refund_ref, resolved_at, created_at";

pub fn get_appeal(conn: &Connection, id: &str) -> anyhow::Result<Option<ChargeAppeal>> {
    let result = conn.query_row(
        &format!("SELECT {APPEAL_COLUMNS} FROM charge_appeals WHERE id = ?1"),
        params![id],
        |row| Ok(parse_appeal_row(row)),
    );

    match result {
        Ok(appeal) => Ok(Some(appeal?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn has_pending_appeal(conn: &Connection, booking_id: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM charge_appeals WHERE booking_id = ?1 AND status = 'pending'",
        params![booking_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn has_approved_appeal(conn: &Connection, booking_id: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM charge_appeals WHERE booking_id = ?1 AND status = 'approved'",
        params![booking_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn get_appeals(
    conn: &Connection,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<ChargeAppeal>> {
    let sql = match status_filter {
        Some(_) => format!(
            "SELECT {APPEAL_COLUMNS} FROM charge_appeals WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2"
        ),
        None => format!(
            "SELECT {APPEAL_COLUMNS} FROM charge_appeals WHERE ?1 IS NULL ORDER BY created_at DESC LIMIT ?2"
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![status_filter, limit], |row| Ok(parse_appeal_row(row)))?;

    let mut appeals = vec![];
    for row in rows {
        appeals.push(row??);
    }
    Ok(appeals)
}

pub fn get_appeals_for_booking(conn: &Connection, booking_id: &str) -> anyhow::Result<Vec<ChargeAppeal>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPEAL_COLUMNS} FROM charge_appeals WHERE booking_id = ?1 ORDER BY created_at ASC"
    ))?;
    let rows = stmt.query_map(params![booking_id], |row| Ok(parse_appeal_row(row)))?;

    let mut appeals = vec![];
    for row in rows {
        appeals.push(row??);
    }
    Ok(appeals)
}

/// Record the verdict only if the appeal is still open. Returns false if it
/// was resolved in the meantime.
pub fn resolve_appeal(conn: &Connection, appeal: &ChargeAppeal) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE charge_appeals
         SET status = ?1, reviewer_id = ?2, reviewer_notes = ?3, refund_ref = ?4, resolved_at = ?5
         WHERE id = ?6 AND status = 'pending'",
        params![
            appeal.status.as_str(),
            appeal.reviewer_id,
            appeal.reviewer_notes,
            appeal.refund_ref,
            fmt_ts_opt(&appeal.resolved_at),
            appeal.id,
        ],
    )?;
    Ok(count > 0)
}

fn parse_appeal_row(row: &rusqlite::Row) -> anyhow::Result<ChargeAppeal> {
    let reason_str: String = row.get(3)?;
    let status_str: String = row.get(5)?;
    let created_at_str: String = row.get(10)?;

    Ok(ChargeAppeal {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        customer_id: row.get(2)?,
        reason: AppealReason::parse(&reason_str)
            .with_context(|| format!("unknown appeal reason: {reason_str}"))?,
        description: row.get(4)?,
        status: AppealStatus::parse(&status_str)
            .with_context(|| format!("unknown appeal status: {status_str}"))?,
        reviewer_id: row.get(6)?,
        reviewer_notes: row.get(7)?,
        refund_ref: row.get(8)?,
        resolved_at: parse_ts_opt(row.get(9)?)?,
        created_at: parse_ts(&created_at_str)?,
    })
}

// ── Platform Settings ──

pub fn get_setting_rows(conn: &Connection) -> anyhow::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT setting_key, setting_value FROM admin_settings")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

    let mut settings = vec![];
    for row in rows {
        settings.push(row?);
    }
    Ok(settings)
}

pub fn upsert_setting(conn: &Connection, key: &str, value: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO admin_settings (setting_key, setting_value) VALUES (?1, ?2)
         ON CONFLICT(setting_key) DO UPDATE SET
           setting_value = excluded.setting_value,
           updated_at = datetime('now')",
        params![key, value],
    )?;
    Ok(())
}

// ── Notifications ──

pub fn insert_notification(
    conn: &Connection,
    user_id: &str,
    title: &str,
    message: &str,
    category: &str,
    metadata: &serde_json::Value,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO notifications (user_id, title, message, category, metadata) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, title, message, category, metadata.to_string()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_notifications(conn: &Connection, user_id: &str, limit: i64) -> anyhow::Result<Vec<StoredNotification>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, title, message, category, metadata, is_read, created_at
         FROM notifications WHERE user_id = ?1
         ORDER BY id DESC LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![user_id, limit], |row| {
        let metadata: String = row.get(5)?;
        Ok(StoredNotification {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            message: row.get(3)?,
            category: row.get(4)?,
            metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::json!({})),
            is_read: row.get::<_, i32>(6)? != 0,
            created_at: row.get(7)?,
        })
    })?;

    let mut notifications = vec![];
    for row in rows {
        notifications.push(row?);
    }
    Ok(notifications)
}

pub fn mark_notifications_read(conn: &Connection, user_id: &str) -> anyhow::Result<usize> {
    let count = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
        params![user_id],
    )?;
    Ok(count)
}

pub fn get_preferences(conn: &Connection, user_id: &str) -> anyhow::Result<Option<NotificationPreferences>> {
    let row = conn
        .query_row(
            "SELECT booking_updates, payment_notifications, push_enabled, email_enabled,
                    quiet_hours_start, quiet_hours_end
             FROM notification_preferences WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok((
                    row.get::<_, bool>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((booking_updates, payment_notifications, push_enabled, email_enabled, start, end)) = row
    else {
        return Ok(None);
    };

    Ok(Some(NotificationPreferences {
        user_id: user_id.to_string(),
        booking_updates,
        payment_notifications,
        push_enabled,
        email_enabled,
        quiet_hours_start: NaiveTime::parse_from_str(&start, "%H:%M")
            .with_context(|| format!("invalid quiet hours start: {start}"))?,
        quiet_hours_end: NaiveTime::parse_from_str(&end, "%H:%M")
            .with_context(|| format!("invalid quiet hours end: {end}"))?,
    }))
}

pub fn save_preferences(conn: &Connection, prefs: &NotificationPreferences) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO notification_preferences
            (user_id, booking_updates, payment_notifications, push_enabled, email_enabled, quiet_hours_start, quiet_hours_end)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(user_id) DO UPDATE SET
           booking_updates = excluded.booking_updates,
           payment_notifications = excluded.payment_notifications,
           push_enabled = excluded.push_enabled,
           email_enabled = excluded.email_enabled,
           quiet_hours_start = excluded.quiet_hours_start,
           quiet_hours_end = excluded.quiet_hours_end",
        params![
            prefs.user_id,
            prefs.booking_updates,
            prefs.payment_notifications,
            prefs.push_enabled,
            prefs.email_enabled,
            prefs.quiet_hours_start.format("%H:%M").to_string(),
            prefs.quiet_hours_end.format("%H:%M").to_string(),
        ],
    )?;
    Ok(())
}

// ── Payment Oversight ──

pub struct OversightStats {
    pub bookings_by_status: Vec<(String, i64)>,
    pub total_captured: f64,
    pub total_commission: f64,
    pub total_released: f64,
    pub no_show_charges: i64,
    pub pending_appeals: i64,
}

pub fn get_oversight_stats(conn: &Connection) -> anyhow::Result<OversightStats> {
    let mut stmt =
        conn.prepare("SELECT status, COUNT(*) FROM bookings GROUP BY status ORDER BY status")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut bookings_by_status = vec![];
    for row in rows {
        bookings_by_status.push(row?);
    }

    let (total_captured, total_commission): (f64, f64) = conn.query_row(
        "SELECT COALESCE(SUM(captured_amount), 0.0),
                COALESCE(SUM(CASE WHEN captured_amount IS NOT NULL THEN platform_commission ELSE 0 END), 0.0)
         FROM bookings",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let total_released: f64 = conn.query_row(
        "SELECT COALESCE(SUM(amount_released), 0.0) FROM payment_releases",
        [],
        |row| row.get(0),
    )?;

    let no_show_charges: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE no_show_detected = 1",
        [],
        |row| row.get(0),
    )?;

    let pending_appeals: i64 = conn.query_row(
        "SELECT COUNT(*) FROM charge_appeals WHERE status = 'pending'",
        [],
        |row| row.get(0),
    )?;

    Ok(OversightStats {
        bookings_by_status,
        total_captured,
        total_commission,
        total_released,
        no_show_charges,
        pending_appeals,
    })
}
