use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::check_auth;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    Booking, BookingSource, BookingStatus, CancelledBy, NoticePeriod, Payment, SessionLocation,
    TransactionStatus,
};
use crate::services::lifecycle::{self, CancelRequest, CancellationOutcome, NewBooking, NewPayment};
use crate::services::notify::{self, Notification};
use crate::services::refund::is_refund_eligible;
use crate::services::status_display::{status_display, StatusDisplay};
use crate::services::time_format::{day_name, format_time_12_hour, interval_display};
use crate::state::AppState;

#[derive(Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub payment: Option<Payment>,
    pub payment_status: StatusDisplay,
    /// Whether cancelling right now would qualify for a refund.
    pub refund_eligible: bool,
    pub recurring_summary: Option<String>,
}

impl BookingView {
    fn build(
        booking: Booking,
        payment: Option<Payment>,
        notice_period: NoticePeriod,
        now: DateTime<Utc>,
    ) -> Self {
        let payment_status =
            status_display(payment.as_ref().map(|p| p.transaction_status.as_str()));
        let refund_eligible = booking.status == BookingStatus::Active
            && payment
                .as_ref()
                .is_some_and(|p| p.transaction_status == TransactionStatus::Completed)
            && is_refund_eligible(booking.event_start_time, notice_period, now);
        let recurring_summary = booking.recurring.as_ref().map(|r| {
            format!(
                "{}, {} at {}",
                interval_display(r.interval.as_str()),
                day_name(r.day_of_week as i64),
                format_time_12_hour(&r.time_of_day)
            )
        });

        Self {
            booking,
            payment,
            payment_status,
            refund_eligible,
            recurring_summary,
        }
    }
}

fn load_view(
    conn: &Connection,
    booking: Booking,
    notice_period: NoticePeriod,
    now: DateTime<Utc>,
) -> Result<BookingView, AppError> {
    let payment = queries::get_payment_for_booking(conn, &booking.id)?;
    Ok(BookingView::build(booking, payment, notice_period, now))
}

// GET /api/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<BookingView>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let status_filter = match query.status.as_deref() {
        Some(s) => Some(
            BookingStatus::parse(s).ok_or_else(|| AppError::BadRequest(format!("unknown status: {s}")))?,
        ),
        None => None,
    };
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let now = Utc::now();

    let db = state.conn()?;
    let notice_period = queries::get_notice_period(&db, state.default_notice_period())?;
    let views = queries::list_bookings(&db, status_filter, limit)?
        .into_iter()
        .map(|b| load_view(&db, b, notice_period, now))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(views))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingView>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.conn()?;
    let booking = queries::get_booking_by_id(&db, &id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
    let notice_period = queries::get_notice_period(&db, state.default_notice_period())?;
    Ok(Json(load_view(&db, booking, notice_period, Utc::now())?))
}

// POST /api/bookings
#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub client_name: String,
    pub client_email: String,
    pub event_start_time: DateTime<Utc>,
    pub event_end_time: DateTime<Utc>,
    pub location: Option<SessionLocation>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingView>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let now = Utc::now();
    let payment = body.amount.map(|amount| NewPayment {
        amount,
        currency: body.currency.clone().unwrap_or_else(|| "USD".to_string()),
    });

    let view = {
        let db = state.conn()?;
        let (booking, payment) = lifecycle::create_booking(
            &db,
            NewBooking {
                client_name: body.client_name,
                client_email: body.client_email,
                event_start_time: body.event_start_time,
                event_end_time: body.event_end_time,
                source: BookingSource::Admin,
                location: body.location.unwrap_or(SessionLocation::Online),
                recurring: None,
                calendly_event_uri: None,
                payment,
            },
            now,
        )?;
        let notice_period = queries::get_notice_period(&db, state.default_notice_period())?;
        BookingView::build(booking, payment, notice_period, now)
    };

    notify::dispatch(
        state.notifier.as_ref(),
        Notification::BookingCreated {
            booking: view.booking.clone(),
        },
    )
    .await;

    Ok((StatusCode::CREATED, Json(view)))
}

// POST /api/bookings/:id/cancel
#[derive(Deserialize)]
pub struct CancelBookingRequest {
    pub reason: Option<String>,
    pub cancelled_by: Option<CancelledBy>,
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<CancelBookingRequest>,
) -> Result<Json<CancellationOutcome>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let outcome = {
        let db = state.conn()?;
        let notice_period = queries::get_notice_period(&db, state.default_notice_period())?;
        lifecycle::cancel_booking(
            &db,
            &id,
            CancelRequest {
                reason: body.reason,
                cancelled_by: body.cancelled_by.unwrap_or(CancelledBy::Admin),
            },
            notice_period,
            Utc::now(),
        )?
    };

    notify::dispatch(
        state.notifier.as_ref(),
        Notification::BookingCancelled {
            booking: outcome.booking.clone(),
            payment_effect: outcome.payment_effect,
        },
    )
    .await;

    Ok(Json(outcome))
}

// POST /api/bookings/:id/complete
pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingView>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let now = Utc::now();
    let db = state.conn()?;
    let booking = lifecycle::complete_booking(&db, &id, now)?;
    let notice_period = queries::get_notice_period(&db, state.default_notice_period())?;
    Ok(Json(load_view(&db, booking, notice_period, now)?))
}

// POST /api/bookings/:id/payment
#[derive(Deserialize)]
pub struct PaymentStatusRequest {
    pub status: String,
}

pub async fn update_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<PaymentStatusRequest>,
) -> Result<Json<Payment>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let target = TransactionStatus::parse(&body.status)
        .ok_or_else(|| AppError::BadRequest(format!("unknown transaction status: {}", body.status)))?;

    let db = state.conn()?;
    let payment = lifecycle::record_payment_status(&db, &id, target, Utc::now())?;
    Ok(Json(payment))
}

// POST /api/bookings/:id/refund/approve
pub async fn approve_refund(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Payment>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let payment = {
        let db = state.conn()?;
        lifecycle::approve_refund(&db, &id, Utc::now())?
    };

    notify::dispatch(
        state.notifier.as_ref(),
        Notification::RefundApproved { booking_id: id },
    )
    .await;

    Ok(Json(payment))
}
