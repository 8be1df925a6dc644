use async_trait::async_trait;

use crate::models::Booking;
use crate::services::lifecycle::PaymentEffect;

#[derive(Debug, Clone)]
pub enum Notification {
    BookingCreated { booking: Booking },
    BookingCancelled {
        booking: Booking,
        payment_effect: PaymentEffect,
    },
    RefundApproved { booking_id: String },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::BookingCreated { .. } => "booking_created",
            Notification::BookingCancelled { .. } => "booking_cancelled",
            Notification::RefundApproved { .. } => "refund_approved",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Writes notifications to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        match notification {
            Notification::BookingCreated { booking } => {
                tracing::info!(
                    kind = notification.kind(),
                    booking_id = %booking.id,
                    client = %booking.client_email,
                    start = %booking.event_start_time,
                    "notification"
                );
            }
            Notification::BookingCancelled {
                booking,
                payment_effect,
            } => {
                tracing::info!(
                    kind = notification.kind(),
                    booking_id = %booking.id,
                    client = %booking.client_email,
                    ?payment_effect,
                    "notification"
                );
            }
            Notification::RefundApproved { booking_id } => {
                tracing::info!(kind = notification.kind(), booking_id = %booking_id, "notification");
            }
        }
        Ok(())
    }
}

/// Delivery failures are logged and never fail the request that caused them.
pub async fn dispatch(notifier: &dyn Notifier, notification: Notification) {
    if let Err(e) = notifier.notify(&notification).await {
        tracing::error!(error = %e, kind = notification.kind(), "failed to deliver notification");
    }
}
