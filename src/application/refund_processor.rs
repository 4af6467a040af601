//! Refund processor: full and partial reversals of completed transactions,
//! capped at the original amount across all completed refunds.

use super::idempotency::{self, Admitted, Fingerprint};
use super::MAX_CAS_RETRIES;
use crate::domain::money::{Amount, Balance, SignedAmount};
use crate::domain::ports::{LedgerStoreRef, Posting, SettleCommit};
use crate::domain::refund::{Refund, RefundStatus};
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::domain::wallet::EntryKind;
use crate::domain::{RefundId, TransactionId};
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Parameters of a refund request.
#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub transaction_id: TransactionId,
    /// Caller-supplied idempotency key, unique per logical refund.
    pub reference: String,
    pub amount: Decimal,
    pub reason: Option<String>,
}

/// Query-level refund position of a transaction. "Fully refunded" is always
/// derived here, never stored on the transaction.
#[derive(Debug, Clone, Serialize)]
pub struct RefundSummary {
    pub transaction_id: TransactionId,
    pub original: Balance,
    pub refunded: Balance,
    pub fully_refunded: bool,
}

pub struct RefundProcessor {
    store: LedgerStoreRef,
}

impl RefundProcessor {
    pub fn new(store: LedgerStoreRef) -> Self {
        Self { store }
    }

    pub async fn refund_record(&self, id: RefundId) -> Result<Refund> {
        self.store
            .refund(id)
            .await?
            .ok_or(LedgerError::RefundNotFound(id))
    }

    pub async fn refunds_for_transaction(&self, tx: TransactionId) -> Result<Vec<Refund>> {
        self.store.refunds_for_transaction(tx).await
    }

    /// Issue a refund against a completed transaction.
    ///
    /// The refund debits the customer's wallet and counts against the
    /// transaction's refundable balance; the cap is re-checked inside the
    /// store's atomic settle so concurrent over-limit refunds cannot both
    /// win. A failed settlement leaves a `failed` refund record behind.
    pub async fn refund(&self, req: RefundRequest) -> Result<Refund> {
        let amount = Amount::new(req.amount)?;
        let tx = self
            .store
            .transaction(req.transaction_id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(req.transaction_id))?;
        if tx.status != TransactionStatus::Completed {
            return Err(LedgerError::TransactionNotCompleted(tx.id));
        }

        let fingerprint = Fingerprint::compute([
            tx.id.to_string(),
            amount.value().normalize().to_string(),
            req.reason.clone().unwrap_or_default(),
        ]);
        let refund = Refund::new(tx.id, req.reference.clone(), amount, req.reason);
        let admission = self.store.admit_refund(refund, fingerprint.as_str()).await?;
        match idempotency::resolve(&req.reference, &fingerprint, admission)? {
            Admitted::Fresh(refund) => {
                // cheap pre-check; the authoritative one runs inside
                // settle_refund's atomic unit
                let refunded = self.completed_total(tx.id).await?;
                let remaining = Balance::from(tx.amount) - refunded;
                if Balance::from(amount) > remaining {
                    self.persist_failed(&refund, tx.amount).await?;
                    return Err(LedgerError::RefundExceedsBalance {
                        transaction: tx.id,
                        remaining,
                        requested: Balance::from(amount),
                    });
                }
                self.settle(&tx, refund).await
            }
            Admitted::Replayed(refund) => match refund.status {
                // a crash between admission and settlement left it pending;
                // the retry resumes it
                RefundStatus::Pending => {
                    debug!(refund = %refund.id, "resuming pending refund");
                    self.settle(&tx, refund).await
                }
                RefundStatus::Completed | RefundStatus::Failed => Ok(refund),
            },
        }
    }

    pub async fn summary(&self, tx_id: TransactionId) -> Result<RefundSummary> {
        let tx = self
            .store
            .transaction(tx_id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(tx_id))?;
        let refunded = self.completed_total(tx_id).await?;
        let original = Balance::from(tx.amount);
        Ok(RefundSummary {
            transaction_id: tx_id,
            original,
            refunded,
            fully_refunded: refunded >= original,
        })
    }

    async fn completed_total(&self, tx: TransactionId) -> Result<Balance> {
        Ok(self
            .store
            .refunds_for_transaction(tx)
            .await?
            .iter()
            .filter(|r| r.status == RefundStatus::Completed)
            .fold(Balance::ZERO, |sum, r| sum + Balance::from(r.amount)))
    }

    async fn settle(&self, tx: &Transaction, refund: Refund) -> Result<Refund> {
        for attempt in 0..MAX_CAS_RETRIES {
            let wallet = self
                .store
                .wallet_for_customer(tx.customer_id, tx.currency)
                .await?
                .ok_or_else(|| {
                    LedgerError::LedgerCorrupted(format!(
                        "completed transaction {} has no wallet for customer {}",
                        tx.id, tx.customer_id
                    ))
                })?;
            let posting = match Posting::prepare(
                &wallet,
                SignedAmount::debit(refund.amount),
                EntryKind::Refund,
                Some(tx.reference.clone()),
                Some(format!("refund of {}", tx.reference)),
            ) {
                Ok(posting) => posting,
                // wallet cannot absorb the debit (drained or frozen); keep
                // the failed refund on record and surface the cause
                Err(err) => {
                    self.persist_failed(&refund, tx.amount).await?;
                    warn!(
                        refund = %refund.id,
                        transaction = %tx.id,
                        error = %err,
                        "refund settlement failed"
                    );
                    return Err(err);
                }
            };

            let mut settled = refund.clone();
            settled.complete();
            match self
                .store
                .settle_refund(settled.clone(), tx.amount, Some(posting))
                .await?
            {
                SettleCommit::Applied => {
                    info!(
                        refund = %settled.id,
                        transaction = %tx.id,
                        amount = %settled.amount,
                        "refund settled"
                    );
                    return Ok(settled);
                }
                SettleCommit::AlreadySettled(stored) => {
                    debug!(
                        refund = %stored.id,
                        transaction = %tx.id,
                        "concurrent request settled this refund first"
                    );
                    return Ok(stored);
                }
                SettleCommit::CapExceeded(remaining) => {
                    self.persist_failed(&refund, tx.amount).await?;
                    warn!(
                        refund = %refund.id,
                        transaction = %tx.id,
                        %remaining,
                        "refund lost the race for the refundable balance"
                    );
                    return Err(LedgerError::RefundExceedsBalance {
                        transaction: tx.id,
                        remaining,
                        requested: Balance::from(refund.amount),
                    });
                }
                SettleCommit::WalletContended => {
                    debug!(refund = %refund.id, attempt, "refund settle contended, retrying");
                }
            }
        }
        Err(LedgerError::StoreUnavailable(format!(
            "refund {} settlement is too contended",
            refund.id
        )))
    }

    async fn persist_failed(&self, refund: &Refund, cap: Amount) -> Result<()> {
        let mut failed = refund.clone();
        failed.fail();
        self.store.settle_refund(failed, cap, None).await?;
        Ok(())
    }
}
