use crate::models::{Booking, BookingStatus, SessionLocation};

const ICS_FORMAT: &str = "%Y%m%dT%H%M%SZ";

pub fn generate_ics(booking: &Booking, practice_name: &str) -> String {
    let dtstart = booking.event_start_time.format(ICS_FORMAT).to_string();
    let dtend = booking.event_end_time.format(ICS_FORMAT).to_string();
    let dtstamp = booking.updated_at.format(ICS_FORMAT).to_string();
    let uid = format!("{}@therapybook", booking.id);

    let summary = format!("Session with {practice_name}");
    let location = match booking.location {
        SessionLocation::Online => "Online",
        SessionLocation::InPerson => "In person",
    };
    let status = match booking.status {
        BookingStatus::Cancelled => "CANCELLED",
        BookingStatus::Active | BookingStatus::Completed => "CONFIRMED",
    };

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Therapybook//Sessions//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         LOCATION:{location}\r\n\
         STATUS:{status}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingSource;
    use chrono::{DateTime, NaiveDateTime, Utc};

    fn at(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .and_utc()
    }

    fn booking(status: BookingStatus, location: SessionLocation) -> Booking {
        Booking {
            id: "test-123".to_string(),
            client_name: "Alice".to_string(),
            client_email: "alice@example.com".to_string(),
            event_start_time: at("2025-03-15 14:00:00"),
            event_end_time: at("2025-03-15 14:50:00"),
            source: BookingSource::Calendly,
            status,
            location,
            recurring: None,
            cancellation: None,
            calendly_event_uri: None,
            created_at: at("2025-03-10 10:00:00"),
            updated_at: at("2025-03-10 10:00:00"),
        }
    }

    #[test]
    fn test_generate_ics() {
        let ics = generate_ics(
            &booking(BookingStatus::Active, SessionLocation::InPerson),
            "Calm Minds Therapy",
        );
        assert!(ics.contains("BEGIN:VCALENDAR"));
        assert!(ics.contains("BEGIN:VEVENT"));
        assert!(ics.contains("DTSTART:20250315T140000Z"));
        assert!(ics.contains("DTEND:20250315T145000Z"));
        assert!(ics.contains("SUMMARY:Session with Calm Minds Therapy"));
        assert!(ics.contains("LOCATION:In person"));
        assert!(ics.contains("STATUS:CONFIRMED"));
        assert!(ics.contains("UID:test-123@therapybook"));
        assert!(ics.contains("END:VCALENDAR"));
    }

    #[test]
    fn test_generate_ics_cancelled() {
        let ics = generate_ics(
            &booking(BookingStatus::Cancelled, SessionLocation::Online),
            "Test Practice",
        );
        assert!(ics.contains("STATUS:CANCELLED"));
        assert!(ics.contains("LOCATION:Online"));
    }
}
