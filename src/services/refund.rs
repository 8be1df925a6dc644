use chrono::{DateTime, Utc};

use crate::models::NoticePeriod;

/// A cancellation qualifies for a refund only when the session starts
/// strictly more than `notice_period` from `now`.
pub fn is_refund_eligible(
    event_start_time: DateTime<Utc>,
    notice_period: NoticePeriod,
    now: DateTime<Utc>,
) -> bool {
    let diff_ms = (event_start_time - now).num_milliseconds();
    diff_ms > notice_period.as_millis()
}
