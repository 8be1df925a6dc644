use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Booking, BookingSource, BookingStatus, Cancellation, CancelledBy, Interval, NoticePeriod,
    Payment, RecurringDescriptor, RecurringSchedule, SessionLocation, TransactionStatus,
};

/// Fixed-width UTC with nanoseconds, so stored values round-trip exactly
/// and still sort lexically.
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Accepts any fractional precision, including none.
const TS_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, TS_PARSE_FORMAT)
        .with_context(|| format!("invalid stored timestamp: {s}"))?;
    Ok(naive.and_utc())
}

fn parse_opt_ts(s: Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, client_name, client_email, event_start_time, event_end_time, source, status, location, \
     recurring_schedule_id, recurring_interval, recurring_day_of_week, recurring_time_of_day, \
     cancellation_reason, cancelled_at, cancelled_by, calendly_event_uri, created_at, updated_at";

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    let recurring = booking.recurring.as_ref();
    let cancellation = booking.cancellation.as_ref();

    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        ),
        params![
            booking.id,
            booking.client_name,
            booking.client_email,
            format_ts(&booking.event_start_time),
            format_ts(&booking.event_end_time),
            booking.source.as_str(),
            booking.status.as_str(),
            booking.location.as_str(),
            recurring.map(|r| r.schedule_id.as_str()),
            recurring.map(|r| r.interval.as_str()),
            recurring.map(|r| r.day_of_week),
            recurring.map(|r| r.time_of_day.as_str()),
            cancellation.and_then(|c| c.reason.as_deref()),
            cancellation.map(|c| format_ts(&c.date)),
            cancellation.map(|c| c.cancelled_by.as_str()),
            booking.calendly_event_uri,
            format_ts(&booking.created_at),
            format_ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
            params![id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn get_booking_by_calendly_uri(conn: &Connection, uri: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE calendly_event_uri = ?1"),
            params![uri],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn list_bookings(
    conn: &Connection,
    status_filter: Option<BookingStatus>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status_filter {
        Some(status) => (
            format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = ?1 ORDER BY event_start_time DESC LIMIT ?2"
            ),
            vec![
                Box::new(status.as_str()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            format!("SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY event_start_time DESC LIMIT ?1"),
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

/// Active bookings whose session ended at or before `now`.
pub fn get_elapsed_active_bookings(conn: &Connection, now: &DateTime<Utc>) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE status = 'Active' AND event_end_time <= ?1 ORDER BY event_start_time ASC"
    ))?;
    let rows = stmt.query_map(params![format_ts(now)], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_upcoming_bookings_for_schedule(
    conn: &Connection,
    schedule_id: &str,
    now: &DateTime<Utc>,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE recurring_schedule_id = ?1 AND status = 'Active' AND event_start_time > ?2
         ORDER BY event_start_time ASC"
    ))?;
    let rows = stmt.query_map(params![schedule_id, format_ts(now)], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    status: BookingStatus,
    now: &DateTime<Utc>,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), format_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn mark_booking_cancelled(
    conn: &Connection,
    id: &str,
    cancellation: &Cancellation,
) -> anyhow::Result<bool> {
    let date = format_ts(&cancellation.date);
    let count = conn.execute(
        "UPDATE bookings
         SET status = 'Cancelled', cancellation_reason = ?1, cancelled_at = ?2, cancelled_by = ?3, updated_at = ?2
         WHERE id = ?4 AND status = 'Active'",
        params![
            cancellation.reason,
            date,
            cancellation.cancelled_by.as_str(),
            id
        ],
    )?;
    Ok(count > 0)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let id: String = row.get(0)?;
    let client_name: String = row.get(1)?;
    let client_email: String = row.get(2)?;
    let start_str: String = row.get(3)?;
    let end_str: String = row.get(4)?;
    let source_str: String = row.get(5)?;
    let status_str: String = row.get(6)?;
    let location_str: String = row.get(7)?;
    let schedule_id: Option<String> = row.get(8)?;
    let interval_str: Option<String> = row.get(9)?;
    let day_of_week: Option<u8> = row.get(10)?;
    let time_of_day: Option<String> = row.get(11)?;
    let cancellation_reason: Option<String> = row.get(12)?;
    let cancelled_at: Option<String> = row.get(13)?;
    let cancelled_by_str: Option<String> = row.get(14)?;
    let calendly_event_uri: Option<String> = row.get(15)?;
    let created_at_str: String = row.get(16)?;
    let updated_at_str: String = row.get(17)?;

    let recurring = match (schedule_id, interval_str, day_of_week, time_of_day) {
        (Some(schedule_id), Some(interval), Some(day_of_week), Some(time_of_day)) => {
            Some(RecurringDescriptor {
                schedule_id,
                interval: Interval::parse(&interval)
                    .with_context(|| format!("unknown interval: {interval}"))?,
                day_of_week,
                time_of_day,
            })
        }
        _ => None,
    };

    let cancellation = match (parse_opt_ts(cancelled_at)?, cancelled_by_str) {
        (Some(date), Some(by)) => Some(Cancellation {
            reason: cancellation_reason,
            date,
            cancelled_by: CancelledBy::parse(&by)
                .with_context(|| format!("unknown cancelled_by: {by}"))?,
        }),
        _ => None,
    };

    Ok(Booking {
        id,
        client_name,
        client_email,
        event_start_time: parse_ts(&start_str)?,
        event_end_time: parse_ts(&end_str)?,
        source: BookingSource::parse(&source_str)
            .with_context(|| format!("unknown booking source: {source_str}"))?,
        status: BookingStatus::parse(&status_str)
            .with_context(|| format!("unknown booking status: {status_str}"))?,
        location: SessionLocation::parse(&location_str)
            .with_context(|| format!("unknown location: {location_str}"))?,
        recurring,
        cancellation,
        calendly_event_uri,
        created_at: parse_ts(&created_at_str)?,
        updated_at: parse_ts(&updated_at_str)?,
    })
}

// ── Payments ──

pub fn insert_payment(conn: &Connection, payment: &Payment) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO payments (id, booking_id, transaction_status, amount, currency, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            payment.id,
            payment.booking_id,
            payment.transaction_status.as_str(),
            payment.amount,
            payment.currency,
            format_ts(&payment.created_at),
            format_ts(&payment.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_payment_for_booking(conn: &Connection, booking_id: &str) -> anyhow::Result<Option<Payment>> {
    let result = conn
        .query_row(
            "SELECT id, booking_id, transaction_status, amount, currency, created_at, updated_at
             FROM payments WHERE booking_id = ?1",
            params![booking_id],
            |row| Ok(parse_payment_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn update_payment_status(
    conn: &Connection,
    id: &str,
    status: TransactionStatus,
    now: &DateTime<Utc>,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE payments SET transaction_status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), format_ts(now), id],
    )?;
    Ok(count > 0)
}

fn parse_payment_row(row: &rusqlite::Row) -> anyhow::Result<Payment> {
    let status_str: String = row.get(2)?;
    let created_at_str: String = row.get(5)?;
    let updated_at_str: String = row.get(6)?;

    Ok(Payment {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        transaction_status: TransactionStatus::parse(&status_str)
            .with_context(|| format!("unknown transaction status: {status_str}"))?,
        amount: row.get(3)?,
        currency: row.get(4)?,
        created_at: parse_ts(&created_at_str)?,
        updated_at: parse_ts(&updated_at_str)?,
    })
}

// ── Recurring Schedules ──

const SCHEDULE_COLUMNS: &str = "id, client_name, client_email, interval, day_of_week, time_of_day, location, \
     duration_minutes, amount, currency, starts_on, last_generated_at, created_at";

pub fn insert_schedule(conn: &Connection, schedule: &RecurringSchedule) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO recurring_schedules ({SCHEDULE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ),
        params![
            schedule.id,
            schedule.client_name,
            schedule.client_email,
            schedule.interval.as_str(),
            schedule.day_of_week,
            schedule.time_of_day,
            schedule.location.as_str(),
            schedule.duration_minutes,
            schedule.amount,
            schedule.currency,
            schedule.starts_on.format("%Y-%m-%d").to_string(),
            schedule.last_generated_at.as_ref().map(format_ts),
            format_ts(&schedule.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_schedule(conn: &Connection, id: &str) -> anyhow::Result<Option<RecurringSchedule>> {
    let result = conn
        .query_row(
            &format!("SELECT {SCHEDULE_COLUMNS} FROM recurring_schedules WHERE id = ?1"),
            params![id],
            |row| Ok(parse_schedule_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn list_schedules(conn: &Connection) -> anyhow::Result<Vec<RecurringSchedule>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM recurring_schedules ORDER BY created_at ASC"
    ))?;
    let rows = stmt.query_map([], |row| Ok(parse_schedule_row(row)))?;

    let mut schedules = vec![];
    for row in rows {
        schedules.push(row??);
    }
    Ok(schedules)
}

pub fn set_schedule_last_generated(
    conn: &Connection,
    id: &str,
    last_generated_at: &DateTime<Utc>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE recurring_schedules SET last_generated_at = ?1 WHERE id = ?2",
        params![format_ts(last_generated_at), id],
    )?;
    Ok(())
}

pub fn delete_schedule(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM recurring_schedules WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

fn parse_schedule_row(row: &rusqlite::Row) -> anyhow::Result<RecurringSchedule> {
    let interval_str: String = row.get(3)?;
    let location_str: String = row.get(6)?;
    let starts_on_str: String = row.get(10)?;
    let last_generated_at: Option<String> = row.get(11)?;
    let created_at_str: String = row.get(12)?;

    Ok(RecurringSchedule {
        id: row.get(0)?,
        client_name: row.get(1)?,
        client_email: row.get(2)?,
        interval: Interval::parse(&interval_str)
            .with_context(|| format!("unknown interval: {interval_str}"))?,
        day_of_week: row.get(4)?,
        time_of_day: row.get(5)?,
        location: SessionLocation::parse(&location_str)
            .with_context(|| format!("unknown location: {location_str}"))?,
        duration_minutes: row.get(7)?,
        amount: row.get(8)?,
        currency: row.get(9)?,
        starts_on: NaiveDate::parse_from_str(&starts_on_str, "%Y-%m-%d")
            .with_context(|| format!("invalid start date: {starts_on_str}"))?,
        last_generated_at: parse_opt_ts(last_generated_at)?,
        created_at: parse_ts(&created_at_str)?,
    })
}

// ── Settings ──

const NOTICE_PERIOD_KEY: &str = "notice_period_days";

/// The stored notice period, or `default` when none has been saved yet.
pub fn get_notice_period(conn: &Connection, default: NoticePeriod) -> anyhow::Result<NoticePeriod> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![NOTICE_PERIOD_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        Some(value) => {
            let days: i64 = value
                .parse()
                .with_context(|| format!("invalid stored notice period: {value}"))?;
            NoticePeriod::from_days(days)
        }
        None => Ok(default),
    }
}

pub fn set_notice_period(conn: &Connection, notice_period: NoticePeriod) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![NOTICE_PERIOD_KEY, notice_period.days().to_string()],
    )?;
    Ok(())
}
