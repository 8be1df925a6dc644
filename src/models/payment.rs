use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub booking_id: String,
    pub transaction_status: TransactionStatus,
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionStatus {
    #[serde(rename = "Not Initiated")]
    NotInitiated,
    Pending,
    Completed,
    Failed,
    Refunded,
    #[serde(rename = "Refund Requested")]
    RefundRequested,
    Cancelled,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 7] = [
        TransactionStatus::NotInitiated,
        TransactionStatus::Pending,
        TransactionStatus::Completed,
        TransactionStatus::Failed,
        TransactionStatus::Refunded,
        TransactionStatus::RefundRequested,
        TransactionStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::NotInitiated => "Not Initiated",
            TransactionStatus::Pending => "Pending",
            TransactionStatus::Completed => "Completed",
            TransactionStatus::Failed => "Failed",
            TransactionStatus::Refunded => "Refunded",
            TransactionStatus::RefundRequested => "Refund Requested",
            TransactionStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Refunded | TransactionStatus::Cancelled)
    }

    /// Refund states are only reachable through a completed payment.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (NotInitiated, Pending)
                | (NotInitiated, Completed)
                | (NotInitiated, Cancelled)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Failed, Pending)
                | (Failed, Completed)
                | (Completed, RefundRequested)
                | (RefundRequested, Refunded)
        )
    }
}
