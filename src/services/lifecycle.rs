//! Booking and payment state changes.
//!
//! Every operation takes the connection and the current time explicitly and
//! performs its read, validate and write steps inside one SQLite
//! transaction. Callers hold the connection lock for the whole call.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::queries;
use crate::models::{
    Booking, BookingSource, BookingStatus, Cancellation, CancelledBy, Interval, NoticePeriod,
    Payment, RecurringDescriptor, RecurringSchedule, SessionLocation, TransactionStatus,
};
use crate::services::recurrence;
use crate::services::refund::is_refund_eligible;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Invalid(String),

    #[error("cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for LifecycleError {
    fn from(err: rusqlite::Error) -> Self {
        LifecycleError::Database(err.into())
    }
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

#[derive(Debug, Clone, Deserialize)]
pub struct NewPayment {
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub client_name: String,
    pub client_email: String,
    pub event_start_time: DateTime<Utc>,
    pub event_end_time: DateTime<Utc>,
    pub source: BookingSource,
    pub location: SessionLocation,
    pub recurring: Option<RecurringDescriptor>,
    pub calendly_event_uri: Option<String>,
    pub payment: Option<NewPayment>,
}

#[derive(Debug, Clone)]
pub struct CancelRequest {
    pub reason: Option<String>,
    pub cancelled_by: CancelledBy,
}

/// What a cancellation did to the booking's payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEffect {
    NoPayment,
    RefundRequested,
    /// Paid, but inside the notice period.
    NotRefundable,
    /// An unpaid payment was cancelled along with the booking.
    Voided,
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub booking: Booking,
    pub payment: Option<Payment>,
    pub refund_eligible: bool,
    pub payment_effect: PaymentEffect,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSchedule {
    pub client_name: String,
    pub client_email: String,
    pub interval: Interval,
    pub day_of_week: u8,
    pub time_of_day: String,
    pub location: SessionLocation,
    pub duration_minutes: i32,
    pub amount: i64,
    pub currency: String,
    pub starts_on: NaiveDate,
}

fn booking_not_found(id: &str) -> LifecycleError {
    LifecycleError::NotFound(format!("booking {id}"))
}

fn load_booking(conn: &Connection, id: &str) -> Result<Booking> {
    queries::get_booking_by_id(conn, id)?.ok_or_else(|| booking_not_found(id))
}

fn load_payment(conn: &Connection, booking_id: &str) -> Result<Payment> {
    queries::get_payment_for_booking(conn, booking_id)?
        .ok_or_else(|| LifecycleError::NotFound(format!("payment for booking {booking_id}")))
}

// ── Bookings ──

pub fn create_booking(
    conn: &Connection,
    new: NewBooking,
    now: DateTime<Utc>,
) -> Result<(Booking, Option<Payment>)> {
    let tx = conn.unchecked_transaction()?;
    let created = insert_new_booking(&tx, new, now)?;
    tx.commit()?;
    Ok(created)
}

fn insert_new_booking(
    conn: &Connection,
    new: NewBooking,
    now: DateTime<Utc>,
) -> Result<(Booking, Option<Payment>)> {
    if new.event_end_time <= new.event_start_time {
        return Err(LifecycleError::Invalid(
            "session must end after it starts".to_string(),
        ));
    }
    if new.client_email.trim().is_empty() {
        return Err(LifecycleError::Invalid("client email is required".to_string()));
    }
    if let Some(p) = &new.payment {
        if p.amount < 0 {
            return Err(LifecycleError::Invalid("payment amount cannot be negative".to_string()));
        }
    }

    let booking = Booking {
        id: Uuid::new_v4().to_string(),
        client_name: new.client_name,
        client_email: new.client_email,
        event_start_time: new.event_start_time,
        event_end_time: new.event_end_time,
        source: new.source,
        status: BookingStatus::Active,
        location: new.location,
        recurring: new.recurring,
        cancellation: None,
        calendly_event_uri: new.calendly_event_uri,
        created_at: now,
        updated_at: now,
    };
    let payment = new.payment.map(|p| Payment {
        id: Uuid::new_v4().to_string(),
        booking_id: booking.id.clone(),
        transaction_status: TransactionStatus::NotInitiated,
        amount: p.amount,
        currency: p.currency,
        created_at: now,
        updated_at: now,
    });

    queries::insert_booking(conn, &booking)?;
    if let Some(p) = &payment {
        queries::insert_payment(conn, p)?;
    }

    tracing::info!(booking_id = %booking.id, source = booking.source.as_str(), "booking created");
    Ok((booking, payment))
}

pub fn complete_booking(conn: &Connection, id: &str, now: DateTime<Utc>) -> Result<Booking> {
    let booking = load_booking(conn, id)?;
    if !booking.status.can_transition_to(BookingStatus::Completed) {
        return Err(LifecycleError::InvalidTransition {
            entity: "booking",
            from: booking.status.as_str().to_string(),
            to: BookingStatus::Completed.as_str().to_string(),
        });
    }
    queries::update_booking_status(conn, id, BookingStatus::Completed, &now)?;
    load_booking(conn, id)
}

/// Marks every active session that has already ended as completed.
pub fn complete_past_bookings(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    let elapsed = queries::get_elapsed_active_bookings(conn, &now)?;
    let tx = conn.unchecked_transaction()?;
    for booking in &elapsed {
        queries::update_booking_status(&tx, &booking.id, BookingStatus::Completed, &now)?;
    }
    tx.commit()?;

    if !elapsed.is_empty() {
        tracing::info!(count = elapsed.len(), "completed elapsed bookings");
    }
    Ok(elapsed.len())
}

/// Cancels an active booking. Refund eligibility is decided before anything
/// is written; a late cancellation still cancels the booking but leaves a
/// completed payment alone.
pub fn cancel_booking(
    conn: &Connection,
    id: &str,
    request: CancelRequest,
    notice_period: NoticePeriod,
    now: DateTime<Utc>,
) -> Result<CancellationOutcome> {
    let booking = load_booking(conn, id)?;
    if !booking.status.can_transition_to(BookingStatus::Cancelled) {
        return Err(LifecycleError::InvalidTransition {
            entity: "booking",
            from: booking.status.as_str().to_string(),
            to: BookingStatus::Cancelled.as_str().to_string(),
        });
    }

    let refund_eligible = is_refund_eligible(booking.event_start_time, notice_period, now);
    let payment = queries::get_payment_for_booking(conn, id)?;

    let (payment_effect, payment_target) = match payment.as_ref().map(|p| p.transaction_status) {
        None => (PaymentEffect::NoPayment, None),
        Some(TransactionStatus::Completed) if refund_eligible => (
            PaymentEffect::RefundRequested,
            Some(TransactionStatus::RefundRequested),
        ),
        Some(TransactionStatus::Completed) => (PaymentEffect::NotRefundable, None),
        Some(TransactionStatus::NotInitiated) | Some(TransactionStatus::Pending) => {
            (PaymentEffect::Voided, Some(TransactionStatus::Cancelled))
        }
        Some(_) => (PaymentEffect::Unchanged, None),
    };

    let cancellation = Cancellation {
        reason: request.reason,
        date: now,
        cancelled_by: request.cancelled_by,
    };

    let tx = conn.unchecked_transaction()?;
    if !queries::mark_booking_cancelled(&tx, id, &cancellation)? {
        return Err(booking_not_found(id));
    }
    if let (Some(p), Some(target)) = (payment.as_ref(), payment_target) {
        queries::update_payment_status(&tx, &p.id, target, &now)?;
    }
    tx.commit()?;

    tracing::info!(
        booking_id = %id,
        cancelled_by = cancellation.cancelled_by.as_str(),
        refund_eligible,
        ?payment_effect,
        "booking cancelled"
    );

    Ok(CancellationOutcome {
        booking: load_booking(conn, id)?,
        payment: queries::get_payment_for_booking(conn, id)?,
        refund_eligible,
        payment_effect,
    })
}

// ── Payments ──

fn transition_payment(
    conn: &Connection,
    payment: &Payment,
    target: TransactionStatus,
    now: DateTime<Utc>,
) -> Result<Payment> {
    if !payment.transaction_status.can_transition_to(target) {
        return Err(LifecycleError::InvalidTransition {
            entity: "payment",
            from: payment.transaction_status.as_str().to_string(),
            to: target.as_str().to_string(),
        });
    }
    queries::update_payment_status(conn, &payment.id, target, &now)?;
    tracing::info!(
        payment_id = %payment.id,
        from = payment.transaction_status.as_str(),
        to = target.as_str(),
        "payment status changed"
    );
    load_payment(conn, &payment.booking_id)
}

/// Records a settlement outcome reported by the payment provider or the
/// admin. Refund states are only entered through cancellation and
/// [`approve_refund`]; payments of cancelled bookings are frozen.
pub fn record_payment_status(
    conn: &Connection,
    booking_id: &str,
    target: TransactionStatus,
    now: DateTime<Utc>,
) -> Result<Payment> {
    let booking = load_booking(conn, booking_id)?;
    let payment = load_payment(conn, booking_id)?;
    if booking.status == BookingStatus::Cancelled {
        return Err(LifecycleError::InvalidTransition {
            entity: "payment of a cancelled booking",
            from: payment.transaction_status.as_str().to_string(),
            to: target.as_str().to_string(),
        });
    }
    if matches!(
        target,
        TransactionStatus::RefundRequested | TransactionStatus::Refunded
    ) {
        return Err(LifecycleError::InvalidTransition {
            entity: "payment",
            from: payment.transaction_status.as_str().to_string(),
            to: target.as_str().to_string(),
        });
    }
    transition_payment(conn, &payment, target, now)
}

pub fn approve_refund(conn: &Connection, booking_id: &str, now: DateTime<Utc>) -> Result<Payment> {
    let payment = load_payment(conn, booking_id)?;
    transition_payment(conn, &payment, TransactionStatus::Refunded, now)
}

// ── Recurring Schedules ──

pub fn create_recurring_schedule(
    conn: &Connection,
    new: NewSchedule,
    now: DateTime<Utc>,
) -> Result<RecurringSchedule> {
    if new.client_email.trim().is_empty() {
        return Err(LifecycleError::Invalid("client email is required".to_string()));
    }
    if new.amount < 0 {
        return Err(LifecycleError::Invalid("payment amount cannot be negative".to_string()));
    }
    let schedule = RecurringSchedule {
        id: Uuid::new_v4().to_string(),
        client_name: new.client_name,
        client_email: new.client_email,
        interval: new.interval,
        day_of_week: new.day_of_week,
        time_of_day: new.time_of_day,
        location: new.location,
        duration_minutes: new.duration_minutes,
        amount: new.amount,
        currency: new.currency,
        starts_on: new.starts_on,
        last_generated_at: None,
        created_at: now,
    };
    schedule
        .rule()
        .map_err(|e| LifecycleError::Invalid(e.to_string()))?;

    queries::insert_schedule(conn, &schedule)?;
    tracing::info!(schedule_id = %schedule.id, interval = schedule.interval.as_str(), "recurring schedule created");
    Ok(schedule)
}

/// Deletes the schedule and cancels its sessions that have not started yet.
pub fn stop_recurring_schedule(
    conn: &Connection,
    schedule_id: &str,
    notice_period: NoticePeriod,
    now: DateTime<Utc>,
) -> Result<Vec<CancellationOutcome>> {
    if queries::get_schedule(conn, schedule_id)?.is_none() {
        return Err(LifecycleError::NotFound(format!("recurring schedule {schedule_id}")));
    }

    let upcoming = queries::get_upcoming_bookings_for_schedule(conn, schedule_id, &now)?;
    let mut outcomes = Vec::with_capacity(upcoming.len());
    for booking in upcoming {
        let request = CancelRequest {
            reason: Some("Recurring schedule stopped".to_string()),
            cancelled_by: CancelledBy::System,
        };
        outcomes.push(cancel_booking(conn, &booking.id, request, notice_period, now)?);
    }

    queries::delete_schedule(conn, schedule_id)?;
    tracing::info!(schedule_id, cancelled = outcomes.len(), "recurring schedule stopped");
    Ok(outcomes)
}

/// Creates the sessions every schedule produces between its last generated
/// occurrence (or `now`) and `now + horizon_days`. Running it again with the
/// same `now` creates nothing. A schedule that fails is logged and skipped.
pub fn generate_recurring_bookings(
    conn: &Connection,
    now: DateTime<Utc>,
    horizon_days: i64,
) -> Result<Vec<Booking>> {
    let until = now + Duration::days(horizon_days);
    let mut created = Vec::new();

    for schedule in queries::list_schedules(conn)? {
        let rule = match schedule.rule() {
            Ok(rule) => rule,
            Err(e) => {
                tracing::warn!(schedule_id = %schedule.id, error = %e, "skipping invalid schedule");
                continue;
            }
        };

        let after = schedule.last_generated_at.map_or(now, |last| last.max(now));
        let occurrences = recurrence::occurrences_between(&rule, after, until);
        match generate_for_schedule(conn, &schedule, &occurrences, now) {
            Ok(bookings) => created.extend(bookings),
            Err(e) => {
                tracing::error!(schedule_id = %schedule.id, error = %e, "recurring generation failed");
            }
        }
    }

    if !created.is_empty() {
        tracing::info!(count = created.len(), "generated recurring bookings");
    }
    Ok(created)
}

/// Inserts one schedule's sessions and advances its marker, all or nothing.
fn generate_for_schedule(
    conn: &Connection,
    schedule: &RecurringSchedule,
    occurrences: &[DateTime<Utc>],
    now: DateTime<Utc>,
) -> Result<Vec<Booking>> {
    let Some(last) = occurrences.last() else {
        return Ok(Vec::new());
    };

    let tx = conn.unchecked_transaction()?;
    let mut created = Vec::with_capacity(occurrences.len());
    for &start in occurrences {
        let (booking, _) = insert_new_booking(
            &tx,
            NewBooking {
                client_name: schedule.client_name.clone(),
                client_email: schedule.client_email.clone(),
                event_start_time: start,
                event_end_time: start + Duration::minutes(schedule.duration_minutes as i64),
                source: BookingSource::System,
                location: schedule.location,
                recurring: Some(RecurringDescriptor {
                    schedule_id: schedule.id.clone(),
                    interval: schedule.interval,
                    day_of_week: schedule.day_of_week,
                    time_of_day: schedule.time_of_day.clone(),
                }),
                calendly_event_uri: None,
                payment: Some(NewPayment {
                    amount: schedule.amount,
                    currency: schedule.currency.clone(),
                }),
            },
            now,
        )?;
        created.push(booking);
    }
    queries::set_schedule_last_generated(&tx, &schedule.id, last)?;
    tx.commit()?;
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::NaiveDateTime;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
            .unwrap()
            .and_utc()
    }

    fn notice(days: i64) -> NoticePeriod {
        NoticePeriod::from_days(days).unwrap()
    }

    fn new_booking(start: &str, end: &str, payment: Option<i64>) -> NewBooking {
        NewBooking {
            client_name: "Sam".to_string(),
            client_email: "sam@example.com".to_string(),
            event_start_time: at(start),
            event_end_time: at(end),
            source: BookingSource::Admin,
            location: SessionLocation::Online,
            recurring: None,
            calendly_event_uri: None,
            payment: payment.map(|amount| NewPayment {
                amount,
                currency: "USD".to_string(),
            }),
        }
    }

    fn paid_booking(conn: &Connection, start: &str, end: &str) -> Booking {
        let (booking, _) =
            create_booking(conn, new_booking(start, end, Some(9000)), at("2025-06-01 09:00")).unwrap();
        record_payment_status(conn, &booking.id, TransactionStatus::Completed, at("2025-06-01 09:05"))
            .unwrap();
        booking
    }

    fn user_cancel() -> CancelRequest {
        CancelRequest {
            reason: Some("Schedule clash".to_string()),
            cancelled_by: CancelledBy::User,
        }
    }

    #[test]
    fn test_create_rejects_end_before_start() {
        let conn = setup_db();
        let err = create_booking(
            &conn,
            new_booking("2025-06-16 10:00", "2025-06-16 10:00", None),
            at("2025-06-01 09:00"),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::Invalid(_)));
    }

    #[test]
    fn test_create_with_payment_starts_not_initiated() {
        let conn = setup_db();
        let (booking, payment) = create_booking(
            &conn,
            new_booking("2025-06-16 10:00", "2025-06-16 11:00", Some(5000)),
            at("2025-06-01 09:00"),
        )
        .unwrap();
        assert_eq!(booking.status, BookingStatus::Active);
        assert_eq!(payment.unwrap().transaction_status, TransactionStatus::NotInitiated);
    }

    #[test]
    fn test_early_cancel_of_paid_booking_requests_refund() {
        let conn = setup_db();
        let booking = paid_booking(&conn, "2025-06-16 10:00", "2025-06-16 11:00");

        let outcome =
            cancel_booking(&conn, &booking.id, user_cancel(), notice(3), at("2025-06-10 10:00")).unwrap();

        assert!(outcome.refund_eligible);
        assert_eq!(outcome.payment_effect, PaymentEffect::RefundRequested);
        assert_eq!(outcome.booking.status, BookingStatus::Cancelled);
        let cancellation = outcome.booking.cancellation.unwrap();
        assert_eq!(cancellation.cancelled_by, CancelledBy::User);
        assert_eq!(cancellation.reason.as_deref(), Some("Schedule clash"));
        assert_eq!(
            outcome.payment.unwrap().transaction_status,
            TransactionStatus::RefundRequested
        );
    }

    #[test]
    fn test_late_cancel_keeps_payment_completed() {
        let conn = setup_db();
        let booking = paid_booking(&conn, "2025-06-16 10:00", "2025-06-16 11:00");

        // Exactly three days out is inside a three day notice period.
        let outcome =
            cancel_booking(&conn, &booking.id, user_cancel(), notice(3), at("2025-06-13 10:00")).unwrap();

        assert!(!outcome.refund_eligible);
        assert_eq!(outcome.payment_effect, PaymentEffect::NotRefundable);
        assert_eq!(outcome.booking.status, BookingStatus::Cancelled);
        assert_eq!(outcome.payment.unwrap().transaction_status, TransactionStatus::Completed);
    }

    #[test]
    fn test_cancel_unpaid_voids_payment() {
        let conn = setup_db();
        let (booking, _) = create_booking(
            &conn,
            new_booking("2025-06-16 10:00", "2025-06-16 11:00", Some(5000)),
            at("2025-06-01 09:00"),
        )
        .unwrap();

        let outcome =
            cancel_booking(&conn, &booking.id, user_cancel(), notice(1), at("2025-06-15 23:00")).unwrap();
        assert_eq!(outcome.payment_effect, PaymentEffect::Voided);
        assert_eq!(outcome.payment.unwrap().transaction_status, TransactionStatus::Cancelled);
    }

    #[test]
    fn test_cancel_twice_is_invalid_transition() {
        let conn = setup_db();
        let (booking, _) = create_booking(
            &conn,
            new_booking("2025-06-16 10:00", "2025-06-16 11:00", None),
            at("2025-06-01 09:00"),
        )
        .unwrap();

        let first =
            cancel_booking(&conn, &booking.id, user_cancel(), notice(1), at("2025-06-02 09:00")).unwrap();
        assert_eq!(first.payment_effect, PaymentEffect::NoPayment);

        let err = cancel_booking(&conn, &booking.id, user_cancel(), notice(1), at("2025-06-02 09:01"))
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[test]
    fn test_cancel_missing_booking() {
        let conn = setup_db();
        let err = cancel_booking(&conn, "missing", user_cancel(), notice(1), at("2025-06-02 09:00"))
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
    }

    #[test]
    fn test_completed_booking_cannot_be_cancelled() {
        let conn = setup_db();
        let (booking, _) = create_booking(
            &conn,
            new_booking("2025-06-16 10:00", "2025-06-16 11:00", None),
            at("2025-06-01 09:00"),
        )
        .unwrap();
        complete_booking(&conn, &booking.id, at("2025-06-16 11:00")).unwrap();

        assert!(matches!(
            cancel_booking(&conn, &booking.id, user_cancel(), notice(1), at("2025-06-16 12:00")),
            Err(LifecycleError::InvalidTransition { .. })
        ));
        assert!(matches!(
            complete_booking(&conn, &booking.id, at("2025-06-16 12:00")),
            Err(LifecycleError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_refund_cannot_be_set_directly() {
        let conn = setup_db();
        let booking = paid_booking(&conn, "2025-06-16 10:00", "2025-06-16 11:00");

        let err = record_payment_status(&conn, &booking.id, TransactionStatus::RefundRequested, at("2025-06-02 09:00"))
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
        assert!(approve_refund(&conn, &booking.id, at("2025-06-02 09:00")).is_err());
    }

    #[test]
    fn test_refund_approval_after_cancellation() {
        let conn = setup_db();
        let booking = paid_booking(&conn, "2025-06-16 10:00", "2025-06-16 11:00");
        cancel_booking(&conn, &booking.id, user_cancel(), notice(3), at("2025-06-02 09:00")).unwrap();

        let payment = approve_refund(&conn, &booking.id, at("2025-06-03 09:00")).unwrap();
        assert_eq!(payment.transaction_status, TransactionStatus::Refunded);
        assert!(approve_refund(&conn, &booking.id, at("2025-06-03 09:01")).is_err());
    }

    #[test]
    fn test_complete_past_bookings() {
        let conn = setup_db();
        create_booking(&conn, new_booking("2025-06-16 10:00", "2025-06-16 11:00", None), at("2025-06-01 09:00"))
            .unwrap();
        create_booking(&conn, new_booking("2025-06-18 10:00", "2025-06-18 11:00", None), at("2025-06-01 09:00"))
            .unwrap();

        assert_eq!(complete_past_bookings(&conn, at("2025-06-17 00:00")).unwrap(), 1);
        assert_eq!(complete_past_bookings(&conn, at("2025-06-17 00:00")).unwrap(), 0);
    }

    fn weekly_schedule(conn: &Connection) -> RecurringSchedule {
        create_recurring_schedule(
            conn,
            NewSchedule {
                client_name: "Robin".to_string(),
                client_email: "robin@example.com".to_string(),
                interval: Interval::Weekly,
                day_of_week: 1,
                time_of_day: "10:00".to_string(),
                location: SessionLocation::InPerson,
                duration_minutes: 50,
                amount: 8000,
                currency: "USD".to_string(),
                starts_on: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            },
            at("2025-06-01 09:00"),
        )
        .unwrap()
    }

    #[test]
    fn test_generation_is_idempotent() {
        let conn = setup_db();
        let schedule = weekly_schedule(&conn);
        let now = at("2025-06-15 12:00");

        let created = generate_recurring_bookings(&conn, now, 14).unwrap();
        let starts: Vec<_> = created.iter().map(|b| b.event_start_time).collect();
        assert_eq!(starts, vec![at("2025-06-16 10:00"), at("2025-06-23 10:00")]);
        assert!(created.iter().all(|b| b.source == BookingSource::System));
        assert_eq!(
            created[0].recurring.as_ref().map(|r| r.schedule_id.as_str()),
            Some(schedule.id.as_str())
        );
        assert_eq!(created[0].event_end_time, at("2025-06-16 10:50"));

        assert!(generate_recurring_bookings(&conn, now, 14).unwrap().is_empty());

        let later = generate_recurring_bookings(&conn, at("2025-06-22 12:00"), 14).unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].event_start_time, at("2025-06-30 10:00"));
    }

    #[test]
    fn test_stop_recurring_cancels_future_sessions() {
        let conn = setup_db();
        let schedule = weekly_schedule(&conn);
        generate_recurring_bookings(&conn, at("2025-06-15 12:00"), 14).unwrap();

        let outcomes =
            stop_recurring_schedule(&conn, &schedule.id, notice(1), at("2025-06-17 09:00")).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].booking.event_start_time, at("2025-06-23 10:00"));
        assert_eq!(outcomes[0].payment_effect, PaymentEffect::Voided);
        assert_eq!(
            outcomes[0].booking.cancellation.as_ref().map(|c| c.cancelled_by),
            Some(CancelledBy::System)
        );
        assert!(queries::get_schedule(&conn, &schedule.id).unwrap().is_none());
        assert!(matches!(
            stop_recurring_schedule(&conn, &schedule.id, notice(1), at("2025-06-17 09:00")),
            Err(LifecycleError::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let conn = setup_db();
        let err = create_recurring_schedule(
            &conn,
            NewSchedule {
                client_name: "Robin".to_string(),
                client_email: "robin@example.com".to_string(),
                interval: Interval::Monthly,
                day_of_week: 3,
                time_of_day: "7pm".to_string(),
                location: SessionLocation::Online,
                duration_minutes: 50,
                amount: 8000,
                currency: "USD".to_string(),
                starts_on: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            },
            at("2025-06-01 09:00"),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::Invalid(_)));
    }

    #[test]
    fn test_sub_second_margin_still_refundable() {
        let conn = setup_db();
        let now = at("2025-06-01 09:00");
        let start = now + Duration::days(3) + Duration::milliseconds(500);
        let mut new = new_booking("2025-06-04 09:00", "2025-06-04 10:00", Some(9000));
        new.event_start_time = start;
        new.event_end_time = start + Duration::minutes(50);
        let (booking, _) = create_booking(&conn, new, now).unwrap();
        record_payment_status(&conn, &booking.id, TransactionStatus::Completed, now).unwrap();

        let outcome = cancel_booking(&conn, &booking.id, user_cancel(), notice(3), now).unwrap();
        assert_eq!(outcome.booking.event_start_time, start);
        assert!(outcome.refund_eligible);
        assert_eq!(outcome.payment_effect, PaymentEffect::RefundRequested);
    }

    #[test]
    fn test_half_second_session_is_accepted() {
        let conn = setup_db();
        let start = at("2025-06-16 10:00");
        let mut new = new_booking("2025-06-16 10:00", "2025-06-16 10:00", None);
        new.event_end_time = start + Duration::milliseconds(500);

        let (booking, _) = create_booking(&conn, new, at("2025-06-01 09:00")).unwrap();
        let loaded = queries::get_booking_by_id(&conn, &booking.id).unwrap().unwrap();
        assert_eq!(loaded.event_end_time - loaded.event_start_time, Duration::milliseconds(500));
    }

    #[test]
    fn test_payment_of_cancelled_booking_is_frozen() {
        let conn = setup_db();
        let (booking, _) = create_booking(
            &conn,
            new_booking("2025-06-16 10:00", "2025-06-16 11:00", Some(5000)),
            at("2025-06-01 09:00"),
        )
        .unwrap();
        record_payment_status(&conn, &booking.id, TransactionStatus::Pending, at("2025-06-01 09:01")).unwrap();
        record_payment_status(&conn, &booking.id, TransactionStatus::Failed, at("2025-06-01 09:02")).unwrap();

        let outcome =
            cancel_booking(&conn, &booking.id, user_cancel(), notice(1), at("2025-06-02 09:00")).unwrap();
        assert_eq!(outcome.payment_effect, PaymentEffect::Unchanged);

        let err = record_payment_status(&conn, &booking.id, TransactionStatus::Completed, at("2025-06-02 10:00"))
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
        let payment = queries::get_payment_for_booking(&conn, &booking.id).unwrap().unwrap();
        assert_eq!(payment.transaction_status, TransactionStatus::Failed);
    }

    #[test]
    fn test_negative_schedule_amount_rejected() {
        let conn = setup_db();
        let err = create_recurring_schedule(
            &conn,
            NewSchedule {
                client_name: "Robin".to_string(),
                client_email: "robin@example.com".to_string(),
                interval: Interval::Weekly,
                day_of_week: 1,
                time_of_day: "10:00".to_string(),
                location: SessionLocation::Online,
                duration_minutes: 50,
                amount: -5,
                currency: "USD".to_string(),
                starts_on: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            },
            at("2025-06-01 09:00"),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::Invalid(_)));
    }

    #[test]
    fn test_broken_schedule_does_not_block_others() {
        let conn = setup_db();
        queries::insert_schedule(
            &conn,
            &RecurringSchedule {
                id: "broken".to_string(),
                client_name: "Kit".to_string(),
                client_email: "kit@example.com".to_string(),
                interval: Interval::Weekly,
                day_of_week: 2,
                time_of_day: "09:00".to_string(),
                location: SessionLocation::Online,
                duration_minutes: 50,
                amount: -5,
                currency: "USD".to_string(),
                starts_on: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                last_generated_at: None,
                created_at: at("2025-06-01 09:00"),
            },
        )
        .unwrap();
        let healthy = weekly_schedule(&conn);

        let created = generate_recurring_bookings(&conn, at("2025-06-15 12:00"), 14).unwrap();
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|b| {
            b.recurring.as_ref().map(|r| r.schedule_id.as_str()) == Some(healthy.id.as_str())
        }));
        let broken = queries::get_schedule(&conn, "broken").unwrap().unwrap();
        assert!(broken.last_generated_at.is_none());
    }
}
