pub mod booking;
pub mod payment;
pub mod recurring;
pub mod settings;

pub use booking::{Booking, BookingSource, BookingStatus, Cancellation, CancelledBy, RecurringDescriptor};
pub use payment::{Payment, TransactionStatus};
pub use recurring::{Interval, RecurrenceRule, RecurringSchedule, SessionLocation};
pub use settings::{NoticePeriod, Settings};
