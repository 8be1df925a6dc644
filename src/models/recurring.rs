use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Weekly,
    Biweekly,
    Monthly,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Weekly => "weekly",
            Interval::Biweekly => "biweekly",
            Interval::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "weekly" => Some(Interval::Weekly),
            "biweekly" => Some(Interval::Biweekly),
            "monthly" => Some(Interval::Monthly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionLocation {
    #[serde(rename = "online")]
    Online,
    #[serde(rename = "in-person")]
    InPerson,
}

impl SessionLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionLocation::Online => "online",
            SessionLocation::InPerson => "in-person",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(SessionLocation::Online),
            "in-person" => Some(SessionLocation::InPerson),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringSchedule {
    pub id: String,
    pub client_name: String,
    pub client_email: String,
    pub interval: Interval,
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: u8,
    /// `HH:MM`, 24-hour, UTC
    pub time_of_day: String,
    pub location: SessionLocation,
    pub duration_minutes: i32,
    pub amount: i64,
    pub currency: String,
    pub starts_on: NaiveDate,
    pub last_generated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The parts of a schedule needed to project occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub interval: Interval,
    pub day_of_week: u8,
    pub time_of_day: NaiveTime,
    pub starts_on: NaiveDate,
}

impl RecurringSchedule {
    pub fn rule(&self) -> anyhow::Result<RecurrenceRule> {
        if self.day_of_week > 6 {
            return Err(anyhow::anyhow!("day of week out of range: {}", self.day_of_week));
        }
        if self.duration_minutes <= 0 {
            return Err(anyhow::anyhow!(
                "session duration must be positive: {}",
                self.duration_minutes
            ));
        }
        Ok(RecurrenceRule {
            interval: self.interval,
            day_of_week: self.day_of_week,
            time_of_day: parse_time_of_day(&self.time_of_day)?,
            starts_on: self.starts_on,
        })
    }
}

pub fn parse_time_of_day(s: &str) -> anyhow::Result<NaiveTime> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!("invalid time format: {s}"));
    }
    let hour: u32 = parts[0]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid hour in: {s}"))?;
    let minute: u32 = parts[1]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid minute in: {s}"))?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| anyhow::anyhow!("time out of range: {s}"))
}
