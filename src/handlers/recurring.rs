use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use super::check_auth;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, RecurringSchedule};
use crate::services::lifecycle::{self, CancellationOutcome, NewSchedule};
use crate::services::notify::{self, Notification};
use crate::services::time_format::{day_name, format_time_12_hour, interval_display};
use crate::state::AppState;

#[derive(Serialize)]
pub struct ScheduleView {
    #[serde(flatten)]
    pub schedule: RecurringSchedule,
    pub interval_label: String,
    pub day_label: &'static str,
    pub time_label: String,
}

impl From<RecurringSchedule> for ScheduleView {
    fn from(schedule: RecurringSchedule) -> Self {
        Self {
            interval_label: interval_display(schedule.interval.as_str()),
            day_label: day_name(schedule.day_of_week as i64),
            time_label: format_time_12_hour(&schedule.time_of_day),
            schedule,
        }
    }
}

// GET /api/recurring
pub async fn list_schedules(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ScheduleView>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let schedules = {
        let db = state.conn()?;
        queries::list_schedules(&db)?
    };
    Ok(Json(schedules.into_iter().map(ScheduleView::from).collect()))
}

// POST /api/recurring
pub async fn create_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewSchedule>,
) -> Result<(StatusCode, Json<ScheduleView>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let schedule = {
        let db = state.conn()?;
        lifecycle::create_recurring_schedule(&db, body, Utc::now())?
    };
    Ok((StatusCode::CREATED, Json(schedule.into())))
}

// DELETE /api/recurring/:id
pub async fn stop_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<CancellationOutcome>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let outcomes = {
        let db = state.conn()?;
        let notice_period = queries::get_notice_period(&db, state.default_notice_period())?;
        lifecycle::stop_recurring_schedule(&db, &id, notice_period, Utc::now())?
    };

    for outcome in &outcomes {
        notify::dispatch(
            state.notifier.as_ref(),
            Notification::BookingCancelled {
                booking: outcome.booking.clone(),
                payment_effect: outcome.payment_effect,
            },
        )
        .await;
    }

    Ok(Json(outcomes))
}

// POST /api/recurring/generate
pub async fn generate_now(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let created = {
        let db = state.conn()?;
        lifecycle::generate_recurring_bookings(&db, Utc::now(), state.config.recurring_horizon_days)?
    };
    Ok(Json(created))
}
