use serde::Serialize;

use crate::models::TransactionStatus;

/// How a payment state is rendered on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusDisplay {
    pub icon: &'static str,
    pub text: &'static str,
    pub color: &'static str,
}

const NOT_AVAILABLE: StatusDisplay = StatusDisplay {
    icon: "help-circle",
    text: "N/A",
    color: "gray",
};

/// Total over any input: unknown or missing statuses render as `N/A`.
pub fn status_display(transaction_status: Option<&str>) -> StatusDisplay {
    transaction_status
        .and_then(TransactionStatus::parse)
        .map(|s| s.display())
        .unwrap_or(NOT_AVAILABLE)
}

impl TransactionStatus {
    pub fn display(&self) -> StatusDisplay {
        let (icon, color) = match self {
            TransactionStatus::NotInitiated => ("circle", "gray"),
            TransactionStatus::Pending => ("clock", "orange"),
            TransactionStatus::Completed => ("check-circle", "green"),
            TransactionStatus::Failed => ("x-circle", "red"),
            TransactionStatus::Refunded => ("rotate-ccw", "blue"),
            TransactionStatus::RefundRequested => ("hourglass", "purple"),
            TransactionStatus::Cancelled => ("slash", "gray"),
        };
        StatusDisplay {
            icon,
            text: self.as_str(),
            color,
        }
    }
}
