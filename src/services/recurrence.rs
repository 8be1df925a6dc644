//! Projection of recurring schedules onto concrete session start times.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};

use crate::models::{Interval, RecurrenceRule};

/// First instant strictly after `after` on which the rule produces a session.
pub fn next_occurrence(rule: &RecurrenceRule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let anchor = first_matching_day(rule.starts_on, rule.day_of_week)?;
    let anchor_at = anchor.and_time(rule.time_of_day).and_utc();
    if anchor_at > after {
        return Some(anchor_at);
    }

    match rule.interval {
        Interval::Weekly => next_in_step(rule, anchor, 7, after),
        Interval::Biweekly => next_in_step(rule, anchor, 14, after),
        Interval::Monthly => next_monthly(rule, anchor, after),
    }
}

/// All occurrences in `(after, until]`, ascending.
pub fn occurrences_between(
    rule: &RecurrenceRule,
    after: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let mut out = Vec::new();
    let mut cursor = after;
    while let Some(next) = next_occurrence(rule, cursor) {
        if next > until {
            break;
        }
        out.push(next);
        cursor = next;
    }
    out
}

fn first_matching_day(from: NaiveDate, day_of_week: u8) -> Option<NaiveDate> {
    if day_of_week > 6 {
        return None;
    }
    let current = from.weekday().num_days_from_sunday() as i64;
    let offset = (day_of_week as i64 - current).rem_euclid(7);
    from.checked_add_signed(Duration::days(offset))
}

fn next_in_step(
    rule: &RecurrenceRule,
    anchor: NaiveDate,
    step_days: i64,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let elapsed = (after.date_naive() - anchor).num_days().max(0);
    let first_k = elapsed / step_days;
    // Candidate k lands on or before `after`'s date; k + 1 is always later.
    (first_k..=first_k + 1)
        .filter_map(|k| anchor.checked_add_signed(Duration::days(k * step_days)))
        .map(|date| date.and_time(rule.time_of_day).and_utc())
        .find(|at| *at > after)
}

fn next_monthly(
    rule: &RecurrenceRule,
    anchor: NaiveDate,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let ordinal = (anchor.day0() / 7) + 1;
    let month_start = after.date_naive().with_day(1)?;
    (0..=2)
        .filter_map(|i| month_start.checked_add_months(Months::new(i)))
        .filter_map(|first| nth_weekday_of_month(first, rule.day_of_week, ordinal))
        .map(|date| date.and_time(rule.time_of_day).and_utc())
        .find(|at| *at > after)
}

/// The `ordinal`-th matching weekday of the month starting at `first`,
/// clamped to the last one when the month has fewer.
fn nth_weekday_of_month(first: NaiveDate, day_of_week: u8, ordinal: u32) -> Option<NaiveDate> {
    let first_match = first_matching_day(first, day_of_week)?;
    let wanted = first_match.checked_add_signed(Duration::weeks(ordinal as i64 - 1))?;
    if wanted.month() == first.month() {
        Some(wanted)
    } else {
        wanted.checked_sub_signed(Duration::weeks(1))
    }
}
