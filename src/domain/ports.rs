//! Ports the application layer drives: the durable store and the external
//! collaborators (event sink, provider adapter).
//!
//! The store contract exposes whole atomic units rather than bare reads and
//! writes: idempotent admission commits the `(reference, fingerprint)`
//! record together with the caller's insert, and confirmations, postings,
//! transfers and refund settlements each commit in one unit guarded by
//! compare-and-swap preconditions. Contention is reported, never resolved,
//! by the store; callers re-read and retry.

use super::money::{Amount, Balance, Currency, SignedAmount};
use super::refund::Refund;
use super::transaction::{Outcome, Transaction, TransactionStatus};
use super::wallet::{EntryKind, LedgerEntry, Wallet};
use super::{CustomerId, RefundId, TransactionId, WalletId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of an idempotent admission keyed by a caller-supplied reference.
#[derive(Debug)]
pub enum Admission<T> {
    /// First time this reference was seen; the record was inserted.
    Created(T),
    /// The reference was seen before. The stored record and the fingerprint
    /// captured at first admission are returned for replay evaluation.
    Existing { record: T, fingerprint: String },
}

/// A prepared wallet mutation: the wallet's post-state plus the entry to
/// append, committed only if the stored wallet still carries
/// `expected_version`.
#[derive(Debug, Clone)]
pub struct Posting {
    pub expected_version: u64,
    pub wallet: Wallet,
    pub entry: LedgerEntry,
}

impl Posting {
    /// Prepare a posting against the wallet's current state. Fails without
    /// side effects if the wallet cannot absorb the movement.
    pub fn prepare(
        wallet: &Wallet,
        movement: SignedAmount,
        kind: EntryKind,
        reference: Option<String>,
        description: Option<String>,
    ) -> Result<Self> {
        let balance_after = wallet.post(movement)?;
        let entry = LedgerEntry::new(
            wallet.id,
            movement,
            balance_after,
            kind,
            reference,
            description,
        );
        Ok(Self {
            expected_version: wallet.version,
            wallet: wallet.advanced(balance_after),
            entry,
        })
    }
}

/// Outcome of a single-wallet or two-wallet append.
#[derive(Debug)]
pub enum CommitOutcome {
    Applied,
    /// A version precondition failed; nothing was written.
    Contended,
}

/// Outcome of a status-guarded transaction update.
#[derive(Debug)]
pub enum TxCommit {
    Applied,
    /// The stored transaction no longer has the expected status.
    StatusChanged(Transaction),
}

/// Outcome of committing a terminal confirmation with its optional posting.
#[derive(Debug)]
pub enum ConfirmCommit {
    Applied,
    /// The stored transaction no longer has the expected status.
    StatusChanged(Transaction),
    /// The posting's wallet version precondition failed; nothing was written.
    WalletContended,
}

/// Outcome of settling a refund.
#[derive(Debug)]
pub enum SettleCommit {
    Applied,
    /// The stored refund already reached a terminal status (a concurrent
    /// settle of the same record won); nothing was written.
    AlreadySettled(Refund),
    /// Completing this refund would push the completed total past the cap;
    /// the remaining refundable balance at commit time is returned.
    CapExceeded(Balance),
    /// The posting's wallet version precondition failed; nothing was written.
    WalletContended,
}

/// Durable, transactional persistence for transactions, wallets, ledger
/// entries, refunds and idempotency admissions.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a transaction and its `(reference, fingerprint)` admission
    /// record in one atomic unit, or return the previously admitted record.
    async fn admit_transaction(
        &self,
        tx: Transaction,
        fingerprint: &str,
    ) -> Result<Admission<Transaction>>;

    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>>;

    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>>;

    /// Replace the stored transaction iff its status still equals `expected`.
    async fn update_transaction(
        &self,
        expected: TransactionStatus,
        tx: Transaction,
    ) -> Result<TxCommit>;

    /// Commit a terminal status update together with its ledger effect. A
    /// transaction must never be visibly completed without its posting, or
    /// vice versa.
    async fn commit_confirmation(
        &self,
        expected: TransactionStatus,
        tx: Transaction,
        posting: Option<Posting>,
    ) -> Result<ConfirmCommit>;

    /// Insert `wallet` unless one already exists for the same
    /// customer+currency pair; the stored wallet is returned either way.
    async fn insert_wallet(&self, wallet: Wallet) -> Result<Wallet>;

    async fn wallet(&self, id: WalletId) -> Result<Option<Wallet>>;

    async fn wallet_for_customer(
        &self,
        customer: CustomerId,
        currency: Currency,
    ) -> Result<Option<Wallet>>;

    /// All entries of a wallet in creation order.
    async fn entries(&self, wallet: WalletId) -> Result<Vec<LedgerEntry>>;

    /// Append one entry and update the wallet's cached balance in the same
    /// atomic unit.
    async fn append_entry(&self, posting: Posting) -> Result<CommitOutcome>;

    /// Two-wallet atomic append: both postings commit or neither does.
    async fn append_transfer(&self, debit: Posting, credit: Posting) -> Result<CommitOutcome>;

    /// Replace the stored wallet iff it still carries `expected_version`.
    /// Used for status changes (freeze/close), not for balance movements.
    async fn update_wallet(&self, expected_version: u64, wallet: Wallet) -> Result<CommitOutcome>;

    /// Insert a refund and its admission record in one atomic unit, or
    /// return the previously admitted record.
    async fn admit_refund(&self, refund: Refund, fingerprint: &str) -> Result<Admission<Refund>>;

    async fn refund(&self, id: RefundId) -> Result<Option<Refund>>;

    async fn refunds_for_transaction(&self, tx: TransactionId) -> Result<Vec<Refund>>;

    /// Settle a pending refund: persist its new status and, for completions,
    /// the compensating posting. The sum of completed refunds for the
    /// transaction is re-checked against `cap` inside the same atomic unit
    /// so that concurrent over-limit refunds cannot both win. A stored
    /// refund that is already terminal is returned untouched; settlement is
    /// a one-shot pending-to-terminal edge.
    async fn settle_refund(
        &self,
        refund: Refund,
        cap: Amount,
        posting: Option<Posting>,
    ) -> Result<SettleCommit>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;

/// A transaction status transition, published after commit.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionEvent {
    pub transaction_id: TransactionId,
    pub old_status: TransactionStatus,
    pub new_status: TransactionStatus,
    pub at: DateTime<Utc>,
}

/// Downstream notification sink (webhooks out, audit stream). Delivery is
/// at-least-once and fired after commit; consumers dedup on
/// `(transaction_id, new_status)`.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn transition(&self, event: TransitionEvent);
}

pub type EventEmitterRef = Arc<dyn EventEmitter>;

/// Emitter used when no downstream consumer is wired; transitions are only
/// logged.
#[derive(Debug, Default)]
pub struct NullEmitter;

#[async_trait]
impl EventEmitter for NullEmitter {
    async fn transition(&self, event: TransitionEvent) {
        tracing::debug!(
            transaction = %event.transaction_id,
            from = %event.old_status,
            to = %event.new_status,
            "transition event (no emitter configured)"
        );
    }
}

/// What a provider reports back for a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfirmation {
    pub provider_reference: String,
    pub outcome: Outcome,
    pub raw_payload: serde_json::Value,
}

/// External payment provider, consumed by the synchronous verification
/// path. Adapter failures surface as `ProviderError` and never guess an
/// outcome.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn confirm_payment(&self, reference: &str) -> Result<ProviderConfirmation>;
}
