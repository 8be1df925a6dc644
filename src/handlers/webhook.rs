use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::BookingSource;
use crate::services::calendly::{CalendlyError, CalendlyEvent, CalendlyWebhook};
use crate::services::lifecycle::{self, CancelRequest, LifecycleError, NewBooking};
use crate::services::notify::{self, Notification};
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "calendly-webhook-signature";

// POST /webhook/calendly
pub async fn calendly_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let now = Utc::now();

    let event = CalendlyWebhook::new(state.config.calendly_signing_key.as_str())
        .verify_and_parse(&body, signature, now)
        .map_err(|e| {
            tracing::warn!(error = %e, "rejected Calendly webhook");
            match e {
                CalendlyError::Signature(_) => AppError::Webhook(e.to_string()),
                CalendlyError::Payload(_) => AppError::BadRequest(e.to_string()),
            }
        })?;

    let (action, notification) = match event {
        CalendlyEvent::InviteeCreated(invitee) => {
            let db = state.conn()?;
            if queries::get_booking_by_calendly_uri(&db, &invitee.event_uri)?.is_some() {
                tracing::info!(event_uri = %invitee.event_uri, "duplicate Calendly booking ignored");
                ("duplicate", None)
            } else {
                let (booking, _) = lifecycle::create_booking(
                    &db,
                    NewBooking {
                        client_name: invitee.name,
                        client_email: invitee.email,
                        event_start_time: invitee.start_time,
                        event_end_time: invitee.end_time,
                        source: BookingSource::Calendly,
                        location: invitee.location,
                        recurring: None,
                        calendly_event_uri: Some(invitee.event_uri),
                        payment: None,
                    },
                    now,
                )?;
                ("created", Some(Notification::BookingCreated { booking }))
            }
        }
        CalendlyEvent::InviteeCanceled {
            event_uri,
            reason,
            cancelled_by,
        } => {
            let db = state.conn()?;
            match queries::get_booking_by_calendly_uri(&db, &event_uri)? {
                None => {
                    tracing::warn!(event_uri = %event_uri, "cancellation for unknown Calendly booking");
                    ("unknown", None)
                }
                Some(booking) => {
                    let notice_period =
                        queries::get_notice_period(&db, state.default_notice_period())?;
                    let request = CancelRequest {
                        reason,
                        cancelled_by,
                    };
                    match lifecycle::cancel_booking(&db, &booking.id, request, notice_period, now) {
                        Ok(outcome) => (
                            "cancelled",
                            Some(Notification::BookingCancelled {
                                booking: outcome.booking,
                                payment_effect: outcome.payment_effect,
                            }),
                        ),
                        Err(LifecycleError::InvalidTransition { .. }) => ("already_closed", None),
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
        CalendlyEvent::Other(kind) => {
            tracing::debug!(event = %kind, "ignoring Calendly event");
            ("ignored", None)
        }
    };

    if let Some(notification) = notification {
        notify::dispatch(state.notifier.as_ref(), notification).await;
    }

    Ok(Json(serde_json::json!({ "ok": true, "action": action })))
}
