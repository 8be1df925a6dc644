pub mod bookings;
pub mod calendar;
pub mod health;
pub mod recurring;
pub mod settings;
pub mod webhook;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/bookings",
            get(bookings::list_bookings).post(bookings::create_booking),
        )
        .route("/api/bookings/:id", get(bookings::get_booking))
        .route("/api/bookings/:id/cancel", post(bookings::cancel_booking))
        .route("/api/bookings/:id/complete", post(bookings::complete_booking))
        .route("/api/bookings/:id/payment", post(bookings::update_payment))
        .route(
            "/api/bookings/:id/refund/approve",
            post(bookings::approve_refund),
        )
        .route(
            "/api/recurring",
            get(recurring::list_schedules).post(recurring::create_schedule),
        )
        .route("/api/recurring/generate", post(recurring::generate_now))
        .route("/api/recurring/:id", delete(recurring::stop_schedule))
        .route(
            "/api/settings",
            get(settings::get_settings).post(settings::update_settings),
        )
        .route("/webhook/calendly", post(webhook::calendly_webhook))
        .route("/calendar/:booking_id", get(calendar::download_ics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub(crate) fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}
