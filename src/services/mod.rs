pub mod calendar;
pub mod calendly;
pub mod lifecycle;
pub mod notify;
pub mod recurrence;
pub mod refund;
pub mod status_display;
pub mod time_format;
