//! Transaction manager: owns the payment state machine and drives it from
//! caller requests and provider confirmations.

use super::idempotency::{self, Admitted, Fingerprint};
use super::MAX_CAS_RETRIES;
use crate::domain::money::{Amount, Currency, SignedAmount};
use crate::domain::ports::{
    ConfirmCommit, EventEmitterRef, LedgerStoreRef, Posting, ProviderAdapter, TransitionEvent,
    TxCommit,
};
use crate::domain::transaction::{Outcome, Transaction, TransactionKind, TransactionStatus};
use crate::domain::wallet::{EntryKind, Wallet};
use crate::domain::{CustomerId, TransactionId};
use crate::error::{LedgerError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Parameters of a payment initiation.
#[derive(Debug, Clone)]
pub struct InitiatePayment {
    /// Caller-supplied idempotency key, unique per logical operation.
    pub reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub kind: TransactionKind,
    pub customer_id: CustomerId,
    pub payment_method: Option<String>,
    pub provider: Option<String>,
    pub metadata: serde_json::Value,
}

pub struct TransactionManager {
    store: LedgerStoreRef,
    emitter: EventEmitterRef,
}

impl TransactionManager {
    pub fn new(store: LedgerStoreRef, emitter: EventEmitterRef) -> Self {
        Self { store, emitter }
    }

    pub async fn transaction(&self, id: TransactionId) -> Result<Transaction> {
        self.store
            .transaction(id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(id))
    }

    pub async fn find_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        self.store.transaction_by_reference(reference).await
    }

    /// Record a new payment intent in `pending` state. A retry with the
    /// same reference and parameters returns the original transaction
    /// without side effects; the same reference with different parameters
    /// is a caller bug and is rejected.
    pub async fn initiate(&self, req: InitiatePayment) -> Result<Transaction> {
        let amount = Amount::new(req.amount)?;
        let currency: Currency = req.currency.parse()?;
        let fingerprint = Fingerprint::compute([
            amount.value().normalize().to_string(),
            currency.to_string(),
            req.kind.as_str().to_string(),
            req.customer_id.to_string(),
            req.payment_method.clone().unwrap_or_default(),
            req.provider.clone().unwrap_or_default(),
            // serde_json maps keep sorted keys, so this rendering is stable
            req.metadata.to_string(),
        ]);
        let tx = Transaction::new(
            req.reference.clone(),
            amount,
            currency,
            req.kind,
            req.customer_id,
            req.payment_method,
            req.provider,
            req.metadata,
        );
        let admission = self.store.admit_transaction(tx, fingerprint.as_str()).await?;
        match idempotency::resolve(&req.reference, &fingerprint, admission)? {
            Admitted::Fresh(tx) => {
                info!(
                    transaction = %tx.id,
                    reference = %tx.reference,
                    amount = %tx.amount,
                    currency = %tx.currency,
                    "transaction initiated"
                );
                Ok(tx)
            }
            Admitted::Replayed(tx) => Ok(tx),
        }
    }

    /// `pending -> processing`.
    pub async fn mark_processing(&self, id: TransactionId) -> Result<Transaction> {
        let mut tx = self.transaction(id).await?;
        let old = tx.status;
        tx.begin_processing()?;
        match self.store.update_transaction(old, tx.clone()).await? {
            TxCommit::Applied => {
                self.emit(old, &tx).await;
                Ok(tx)
            }
            TxCommit::StatusChanged(current) => Err(LedgerError::InvalidStateTransition {
                from: current.status,
                to: TransactionStatus::Processing,
            }),
        }
    }

    /// Apply a provider confirmation, tolerating duplicate and out-of-order
    /// delivery.
    ///
    /// Redelivery of the outcome already applied is a silent no-op; a
    /// different outcome for a terminal transaction is rejected, never
    /// overwritten. On success the settlement posting commits in the same
    /// atomic unit as the status update.
    pub async fn confirm(
        &self,
        id: TransactionId,
        provider_reference: &str,
        outcome: Outcome,
    ) -> Result<Transaction> {
        for _ in 0..MAX_CAS_RETRIES {
            let tx = self.transaction(id).await?;
            if tx.status.is_terminal() {
                if tx.matches_outcome(outcome) {
                    debug!(transaction = %id, ?outcome, "duplicate confirmation ignored");
                    return Ok(tx);
                }
                warn!(
                    transaction = %id,
                    current = %tx.status,
                    ?outcome,
                    provider_reference,
                    "conflicting confirmation rejected"
                );
                return Err(LedgerError::ConflictingOutcome(id));
            }

            let expected = tx.status;
            let mut updated = tx;
            updated.conclude(provider_reference, outcome)?;
            let posting = match outcome {
                Outcome::Success => Some(self.settlement_posting(&updated).await?),
                Outcome::Failure => None,
            };
            match self
                .store
                .commit_confirmation(expected, updated.clone(), posting)
                .await?
            {
                ConfirmCommit::Applied => {
                    info!(
                        transaction = %id,
                        status = %updated.status,
                        provider_reference,
                        "transaction confirmed"
                    );
                    self.emit(expected, &updated).await;
                    return Ok(updated);
                }
                // someone else moved the transaction or the wallet; re-read
                // and re-evaluate (duplicate rules apply on the next pass)
                ConfirmCommit::StatusChanged(_) | ConfirmCommit::WalletContended => continue,
            }
        }
        Err(LedgerError::StoreUnavailable(format!(
            "confirmation of transaction {id} is too contended"
        )))
    }

    /// Synchronous verification path: ask the provider for the payment's
    /// outcome and apply it. A provider failure leaves the transaction
    /// untouched for a later retry or webhook.
    pub async fn verify(
        &self,
        id: TransactionId,
        adapter: &dyn ProviderAdapter,
    ) -> Result<Transaction> {
        let tx = self.transaction(id).await?;
        if tx.status.is_terminal() {
            return Ok(tx);
        }
        let confirmation = adapter.confirm_payment(&tx.reference).await?;
        self.confirm(id, &confirmation.provider_reference, confirmation.outcome)
            .await
    }

    /// Build the credit posting that settles a completed transaction into
    /// the customer's wallet, creating the wallet on first use.
    async fn settlement_posting(&self, tx: &Transaction) -> Result<Posting> {
        let wallet = match self
            .store
            .wallet_for_customer(tx.customer_id, tx.currency)
            .await?
        {
            Some(wallet) => wallet,
            None => {
                self.store
                    .insert_wallet(Wallet::new(tx.customer_id, tx.currency))
                    .await?
            }
        };
        Posting::prepare(
            &wallet,
            SignedAmount::credit(tx.amount),
            EntryKind::Topup,
            Some(tx.reference.clone()),
            Some(format!("settlement of {}", tx.reference)),
        )
    }

    async fn emit(&self, old: TransactionStatus, tx: &Transaction) {
        self.emitter
            .transition(TransitionEvent {
                transaction_id: tx.id,
                old_status: old,
                new_status: tx.status,
                at: Utc::now(),
            })
            .await;
    }
}
