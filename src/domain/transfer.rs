use super::money::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a transfer attempt.
///
/// A log is created PENDING and becomes COMPLETED or FAILED exactly once;
/// neither final state ever reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferStatus {
    Pending,
    Completed,
    Failed,
}

/// One row per transfer attempt, keyed by the caller-supplied idempotency key.
///
/// The key uniquely determines at most one transfer outcome. A FAILED log
/// permanently consumes its key; retrying requires a fresh key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLog {
    pub id: Uuid,
    pub idempotency_key: String,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub amount: Amount,
    pub status: TransferStatus,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

/// What a successful (or replayed) transfer hands back to the caller.
/// Amounts are canonical 4-decimal strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReceipt {
    pub transaction_id: Uuid,
    pub reference: String,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub amount: String,
    pub sender_new_balance: String,
    pub status: TransferStatus,
}

/// Envelope around a receipt with a human-readable message, distinguishing a
/// fresh transfer from an idempotent replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferOutcome {
    pub message: &'static str,
    pub transaction: TransferReceipt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&TransferStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(
            serde_json::to_string(&TransferStatus::Completed).unwrap(),
            "\"COMPLETED\""
        );
        assert_eq!(
            serde_json::to_string(&TransferStatus::Failed).unwrap(),
            "\"FAILED\""
        );
    }
}
