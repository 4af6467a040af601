use super::money::Amount;
use super::{RefundId, TransactionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Completed,
    Failed,
}

/// A full or partial reversal of a completed transaction.
///
/// Failed refunds are retained as records, never dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: RefundId,
    pub transaction_id: TransactionId,
    /// Caller-supplied idempotency key for this refund request.
    pub reference: String,
    pub amount: Amount,
    pub reason: Option<String>,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Refund {
    pub fn new(
        transaction_id: TransactionId,
        reference: String,
        amount: Amount,
        reason: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RefundId::new(),
            transaction_id,
            reference,
            amount,
            reason,
            status: RefundStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn complete(&mut self) {
        self.status = RefundStatus::Completed;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self) {
        self.status = RefundStatus::Failed;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_refund_is_pending() {
        let refund = Refund::new(
            TransactionId::new(),
            "refund-1".to_string(),
            Amount::new(dec!(100)).unwrap(),
            Some("customer request".to_string()),
        );
        assert_eq!(refund.status, RefundStatus::Pending);
    }

    #[test]
    fn settle_updates_status() {
        let mut refund = Refund::new(
            TransactionId::new(),
            "refund-1".to_string(),
            Amount::new(dec!(100)).unwrap(),
            None,
        );
        refund.complete();
        assert_eq!(refund.status, RefundStatus::Completed);
        refund.fail();
        assert_eq!(refund.status, RefundStatus::Failed);
    }
}
