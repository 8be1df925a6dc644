use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::recurring::{Interval, SessionLocation};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub client_name: String,
    pub client_email: String,
    pub event_start_time: DateTime<Utc>,
    pub event_end_time: DateTime<Utc>,
    pub source: BookingSource,
    pub status: BookingStatus,
    pub location: SessionLocation,
    pub recurring: Option<RecurringDescriptor>,
    pub cancellation: Option<Cancellation>,
    pub calendly_event_uri: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where a booking came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingSource {
    Calendly,
    Admin,
    /// Generated from a recurring schedule.
    System,
}

impl BookingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingSource::Calendly => "calendly",
            BookingSource::Admin => "admin",
            BookingSource::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "calendly" => Some(BookingSource::Calendly),
            "admin" => Some(BookingSource::Admin),
            "system" => Some(BookingSource::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BookingStatus {
    Active,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "Active",
            BookingStatus::Completed => "Completed",
            BookingStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Active" => Some(BookingStatus::Active),
            "Completed" => Some(BookingStatus::Completed),
            "Cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    /// Completed and Cancelled are terminal; only Active moves.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Active, BookingStatus::Completed)
                | (BookingStatus::Active, BookingStatus::Cancelled)
        )
    }
}

/// Snapshot of the schedule a generated booking belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecurringDescriptor {
    pub schedule_id: String,
    pub interval: Interval,
    pub day_of_week: u8,
    pub time_of_day: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cancellation {
    pub reason: Option<String>,
    pub date: DateTime<Utc>,
    pub cancelled_by: CancelledBy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CancelledBy {
    User,
    Admin,
    System,
}

impl CancelledBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelledBy::User => "user",
            CancelledBy::Admin => "admin",
            CancelledBy::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(CancelledBy::User),
            "admin" => Some(CancelledBy::Admin),
            "system" => Some(CancelledBy::System),
            _ => None,
        }
    }
}
