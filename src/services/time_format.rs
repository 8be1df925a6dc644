//! Display helpers for session times and recurrence labels.
//!
//! All functions are total: malformed input yields a fallback value instead
//! of an error.

const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// `"13:05"` -> `"1:05 PM"`. Returns an empty string when the input has no
/// parseable hour or no minute part.
pub fn format_time_12_hour(time24: &str) -> String {
    let Some((hours, minutes)) = time24.split_once(':') else {
        return String::new();
    };
    let Ok(hour) = hours.trim().parse::<u32>() else {
        return String::new();
    };

    let period = if hour >= 12 { "PM" } else { "AM" };
    let display_hour = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{display_hour}:{minutes} {period}")
}

/// 0 = Sunday .. 6 = Saturday, `"Unknown"` otherwise.
pub fn day_name(day: i64) -> &'static str {
    usize::try_from(day)
        .ok()
        .and_then(|idx| DAY_NAMES.get(idx))
        .copied()
        .unwrap_or("Unknown")
}

pub fn interval_display(interval: &str) -> String {
    match interval {
        "weekly" => "Every week".to_string(),
        "biweekly" => "Every 2 weeks".to_string(),
        "monthly" => "Every month".to_string(),
        other => other.to_string(),
    }
}
