//! Calendly webhook verification and parsing.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::models::{CancelledBy, SessionLocation};

/// Maximum age of a signed webhook, in seconds.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum CalendlyError {
    #[error("signature rejected: {0}")]
    Signature(String),

    #[error("malformed payload: {0}")]
    Payload(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledInvitee {
    pub event_uri: String,
    pub name: String,
    pub email: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: SessionLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalendlyEvent {
    InviteeCreated(ScheduledInvitee),
    InviteeCanceled {
        event_uri: String,
        reason: Option<String>,
        cancelled_by: CancelledBy,
    },
    Other(String),
}

pub struct CalendlyWebhook {
    signing_key: String,
}

impl CalendlyWebhook {
    pub fn new(signing_key: impl Into<String>) -> Self {
        Self {
            signing_key: signing_key.into(),
        }
    }

    /// Verifies the `Calendly-Webhook-Signature` header (skipped when no
    /// signing key is configured) and parses the body.
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CalendlyEvent, CalendlyError> {
        if !self.signing_key.is_empty() {
            let signature =
                signature.ok_or_else(|| CalendlyError::Signature("missing header".to_string()))?;
            self.verify_signature(payload, signature, now)?;
        }

        let raw: RawWebhook =
            serde_json::from_slice(payload).map_err(|e| CalendlyError::Payload(e.to_string()))?;
        tracing::debug!(event = %raw.event, "parsed Calendly webhook");

        match raw.event.as_str() {
            "invitee.created" => {
                let p = raw.payload;
                let event = p.scheduled_event.ok_or_else(|| {
                    CalendlyError::Payload("missing scheduled_event".to_string())
                })?;
                let location = match event.location.as_ref().map(|l| l.kind.as_str()) {
                    Some("physical") => SessionLocation::InPerson,
                    _ => SessionLocation::Online,
                };
                Ok(CalendlyEvent::InviteeCreated(ScheduledInvitee {
                    event_uri: event.uri,
                    name: p.name.unwrap_or_default(),
                    email: p
                        .email
                        .ok_or_else(|| CalendlyError::Payload("missing invitee email".to_string()))?,
                    start_time: event.start_time,
                    end_time: event.end_time,
                    location,
                }))
            }
            "invitee.canceled" => {
                let p = raw.payload;
                let event = p.scheduled_event.ok_or_else(|| {
                    CalendlyError::Payload("missing scheduled_event".to_string())
                })?;
                let cancellation = p.cancellation.unwrap_or_default();
                let cancelled_by = match cancellation.canceler_type.as_deref() {
                    Some("host") => CancelledBy::Admin,
                    _ => CancelledBy::User,
                };
                Ok(CalendlyEvent::InviteeCanceled {
                    event_uri: event.uri,
                    reason: cancellation.reason.filter(|r| !r.trim().is_empty()),
                    cancelled_by,
                })
            }
            other => Ok(CalendlyEvent::Other(other.to_string())),
        }
    }

    fn verify_signature(
        &self,
        payload: &[u8],
        header: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CalendlyError> {
        // t=<unix seconds>,v1=<hex hmac>
        let mut timestamp: Option<&str> = None;
        let mut sig_v1: Option<&str> = None;
        for part in header.split(',') {
            if let Some((key, value)) = part.trim().split_once('=') {
                match key {
                    "t" => timestamp = Some(value),
                    "v1" => sig_v1 = Some(value),
                    _ => {}
                }
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| CalendlyError::Signature("missing timestamp".to_string()))?;
        let sig_v1 =
            sig_v1.ok_or_else(|| CalendlyError::Signature("missing signature".to_string()))?;

        let body = std::str::from_utf8(payload)
            .map_err(|_| CalendlyError::Payload("body is not UTF-8".to_string()))?;
        let expected = sign(&self.signing_key, timestamp, body)?;

        if !constant_time_eq(sig_v1.as_bytes(), expected.as_bytes()) {
            tracing::warn!("Calendly webhook signature mismatch");
            return Err(CalendlyError::Signature("mismatch".to_string()));
        }

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| CalendlyError::Signature("invalid timestamp".to_string()))?;
        if (now.timestamp() - ts).abs() > SIGNATURE_TOLERANCE_SECS {
            tracing::warn!(timestamp = ts, now = now.timestamp(), "Calendly webhook timestamp outside tolerance");
            return Err(CalendlyError::Signature("stale timestamp".to_string()));
        }

        Ok(())
    }
}

/// Hex HMAC-SHA256 of `"<timestamp>.<body>"`.
pub fn sign(signing_key: &str, timestamp: &str, body: &str) -> Result<String, CalendlyError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(signing_key.as_bytes())
        .map_err(|_| CalendlyError::Signature("invalid signing key".to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Deserialize)]
struct RawWebhook {
    event: String,
    payload: RawPayload,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    email: Option<String>,
    name: Option<String>,
    scheduled_event: Option<RawScheduledEvent>,
    cancellation: Option<RawCancellation>,
}

#[derive(Debug, Deserialize)]
struct RawScheduledEvent {
    uri: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    location: Option<RawLocation>,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawCancellation {
    reason: Option<String>,
    canceler_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREATED: &str = r#"{
        "event": "invitee.created",
        "payload": {
            "email": "jo@example.com",
            "name": "Jo",
            "scheduled_event": {
                "uri": "https://api.calendly.com/scheduled_events/EV1",
                "start_time": "2025-06-16T10:00:00.000000Z",
                "end_time": "2025-06-16T10:50:00.000000Z",
                "location": { "type": "zoom", "join_url": "https://zoom.us/j/1" }
            }
        }
    }"#;

    const CANCELED: &str = r#"{
        "event": "invitee.canceled",
        "payload": {
            "email": "jo@example.com",
            "scheduled_event": {
                "uri": "https://api.calendly.com/scheduled_events/EV1",
                "start_time": "2025-06-16T10:00:00Z",
                "end_time": "2025-06-16T10:50:00Z",
                "location": { "type": "physical", "location": "Room 2" }
            },
            "cancellation": { "canceled_by": "Practitioner", "reason": "Ill", "canceler_type": "host" }
        }
    }"#;

    fn header(key: &str, ts: i64, body: &str) -> String {
        format!("t={ts},v1={}", sign(key, &ts.to_string(), body).unwrap())
    }

    #[test]
    fn test_parse_created_without_key() {
        let hook = CalendlyWebhook::new("");
        let event = hook.verify_and_parse(CREATED.as_bytes(), None, Utc::now()).unwrap();
        match event {
            CalendlyEvent::InviteeCreated(invitee) => {
                assert_eq!(invitee.email, "jo@example.com");
                assert_eq!(invitee.location, SessionLocation::Online);
                assert_eq!(invitee.end_time - invitee.start_time, chrono::Duration::minutes(50));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_host_cancellation() {
        let hook = CalendlyWebhook::new("");
        let event = hook.verify_and_parse(CANCELED.as_bytes(), None, Utc::now()).unwrap();
        assert_eq!(
            event,
            CalendlyEvent::InviteeCanceled {
                event_uri: "https://api.calendly.com/scheduled_events/EV1".to_string(),
                reason: Some("Ill".to_string()),
                cancelled_by: CancelledBy::Admin,
            }
        );
    }

    #[test]
    fn test_valid_signature_accepted() {
        let hook = CalendlyWebhook::new("secret");
        let now = Utc::now();
        let sig = header("secret", now.timestamp(), CREATED);
        assert!(hook.verify_and_parse(CREATED.as_bytes(), Some(&sig), now).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let hook = CalendlyWebhook::new("secret");
        let now = Utc::now();
        let sig = header("secret", now.timestamp(), CREATED);
        let tampered = CREATED.replace("jo@example.com", "mallory@example.com");
        assert!(matches!(
            hook.verify_and_parse(tampered.as_bytes(), Some(&sig), now),
            Err(CalendlyError::Signature(_))
        ));
    }

    #[test]
    fn test_missing_or_stale_signature_rejected() {
        let hook = CalendlyWebhook::new("secret");
        let now = Utc::now();
        assert!(hook.verify_and_parse(CREATED.as_bytes(), None, now).is_err());

        let stale = header("secret", now.timestamp() - 3600, CREATED);
        assert!(hook.verify_and_parse(CREATED.as_bytes(), Some(&stale), now).is_err());
    }

    #[test]
    fn test_unknown_event_passes_through() {
        let hook = CalendlyWebhook::new("");
        let body = r#"{"event":"routing_form_submission.created","payload":{}}"#;
        assert_eq!(
            hook.verify_and_parse(body.as_bytes(), None, Utc::now()).unwrap(),
            CalendlyEvent::Other("routing_form_submission.created".to_string())
        );
    }
}
