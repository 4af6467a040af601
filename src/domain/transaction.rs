use super::money::{Amount, Currency};
use super::{CustomerId, TransactionId};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed transaction state machine.
///
/// `pending -> processing -> completed | failed`. A confirmation may also
/// arrive while the transaction is still `pending` (the provider callback
/// beat the `mark_processing` call), which is treated as passing through
/// `processing`. "Refunded" is a query-level view over associated refunds,
/// never a stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Completed)
                | (Self::Pending, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Payment,
    Transfer,
    Topup,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Transfer => "transfer",
            Self::Topup => "topup",
        }
    }
}

/// Provider-reported result of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// A payment intent. Amount and reference are fixed at creation; only the
/// status-related fields mutate, and only through the methods below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub reference: String,
    pub amount: Amount,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub kind: TransactionKind,
    pub customer_id: CustomerId,
    pub payment_method: Option<String>,
    pub provider: Option<String>,
    pub provider_reference: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reference: String,
        amount: Amount,
        currency: Currency,
        kind: TransactionKind,
        customer_id: CustomerId,
        payment_method: Option<String>,
        provider: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            reference,
            amount,
            currency,
            status: TransactionStatus::Pending,
            kind,
            customer_id,
            payment_method,
            provider,
            provider_reference: None,
            metadata,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    fn transition(&mut self, next: TransactionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `pending -> processing`.
    pub fn begin_processing(&mut self) -> Result<()> {
        if self.status != TransactionStatus::Pending {
            return Err(LedgerError::InvalidStateTransition {
                from: self.status,
                to: TransactionStatus::Processing,
            });
        }
        self.transition(TransactionStatus::Processing)
    }

    /// Drive the transaction to its terminal status, recording the
    /// provider's reference. `completed_at` is set exactly when the outcome
    /// is a success.
    pub fn conclude(&mut self, provider_reference: &str, outcome: Outcome) -> Result<()> {
        let next = match outcome {
            Outcome::Success => TransactionStatus::Completed,
            Outcome::Failure => TransactionStatus::Failed,
        };
        self.transition(next)?;
        self.provider_reference = Some(provider_reference.to_string());
        if next == TransactionStatus::Completed {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Whether an already-terminal transaction matches a redelivered outcome.
    pub fn matches_outcome(&self, outcome: Outcome) -> bool {
        match outcome {
            Outcome::Success => self.status == TransactionStatus::Completed,
            Outcome::Failure => self.status == TransactionStatus::Failed,
        }
    }
}
