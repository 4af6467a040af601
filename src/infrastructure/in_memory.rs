//! In-memory store. The default backend for tests, the replay CLI and
//! embedding without persistence.
//!
//! All state lives behind one `RwLock`; every mutating method runs its
//! read-check-write sequence inside a single synchronous critical section,
//! which gives each port method its required atomicity for free.

use crate::domain::money::{Amount, Balance, Currency};
use crate::domain::ports::{
    Admission, CommitOutcome, ConfirmCommit, LedgerStore, Posting, SettleCommit, TxCommit,
};
use crate::domain::refund::{Refund, RefundStatus};
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::domain::wallet::{LedgerEntry, Wallet};
use crate::domain::{CustomerId, RefundId, TransactionId, WalletId};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    transactions: HashMap<TransactionId, Transaction>,
    /// reference -> (transaction, admission fingerprint)
    tx_refs: HashMap<String, (TransactionId, String)>,
    wallets: HashMap<WalletId, Wallet>,
    wallet_index: HashMap<(CustomerId, Currency), WalletId>,
    entries: HashMap<WalletId, Vec<LedgerEntry>>,
    refunds: HashMap<RefundId, Refund>,
    /// reference -> (refund, admission fingerprint)
    refund_refs: HashMap<String, (RefundId, String)>,
    refunds_by_tx: HashMap<TransactionId, Vec<RefundId>>,
}

impl State {
    fn wallet_matches(&self, posting: &Posting) -> bool {
        self.wallets
            .get(&posting.wallet.id)
            .is_some_and(|w| w.version == posting.expected_version)
    }

    fn apply_posting(&mut self, posting: Posting) {
        self.wallets.insert(posting.wallet.id, posting.wallet);
        self.entries
            .entry(posting.entry.wallet_id)
            .or_default()
            .push(posting.entry);
    }

    fn completed_refund_total(&self, tx: TransactionId, excluding: RefundId) -> Balance {
        self.refunds_by_tx
            .get(&tx)
            .into_iter()
            .flatten()
            .filter(|id| **id != excluding)
            .filter_map(|id| self.refunds.get(id))
            .filter(|r| r.status == RefundStatus::Completed)
            .fold(Balance::ZERO, |sum, r| sum + Balance::from(r.amount))
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    inner: Arc<RwLock<State>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn admit_transaction(
        &self,
        tx: Transaction,
        fingerprint: &str,
    ) -> Result<Admission<Transaction>> {
        let mut state = self.inner.write().await;
        if let Some((id, stored_fp)) = state.tx_refs.get(&tx.reference) {
            let record = state.transactions[id].clone();
            return Ok(Admission::Existing {
                record,
                fingerprint: stored_fp.clone(),
            });
        }
        state
            .tx_refs
            .insert(tx.reference.clone(), (tx.id, fingerprint.to_string()));
        state.transactions.insert(tx.id, tx.clone());
        Ok(Admission::Created(tx))
    }

    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        Ok(self.inner.read().await.transactions.get(&id).cloned())
    }

    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let state = self.inner.read().await;
        Ok(state
            .tx_refs
            .get(reference)
            .and_then(|(id, _)| state.transactions.get(id))
            .cloned())
    }

    async fn update_transaction(
        &self,
        expected: TransactionStatus,
        tx: Transaction,
    ) -> Result<TxCommit> {
        let mut state = self.inner.write().await;
        match state.transactions.get(&tx.id) {
            Some(stored) if stored.status == expected => {
                state.transactions.insert(tx.id, tx);
                Ok(TxCommit::Applied)
            }
            Some(stored) => Ok(TxCommit::StatusChanged(stored.clone())),
            None => Ok(TxCommit::StatusChanged(tx)),
        }
    }

    async fn commit_confirmation(
        &self,
        expected: TransactionStatus,
        tx: Transaction,
        posting: Option<Posting>,
    ) -> Result<ConfirmCommit> {
        let mut state = self.inner.write().await;
        match state.transactions.get(&tx.id) {
            Some(stored) if stored.status == expected => {}
            Some(stored) => return Ok(ConfirmCommit::StatusChanged(stored.clone())),
            None => return Ok(ConfirmCommit::StatusChanged(tx)),
        }
        if let Some(posting) = posting {
            if !state.wallet_matches(&posting) {
                return Ok(ConfirmCommit::WalletContended);
            }
            state.apply_posting(posting);
        }
        state.transactions.insert(tx.id, tx);
        Ok(ConfirmCommit::Applied)
    }

    async fn insert_wallet(&self, wallet: Wallet) -> Result<Wallet> {
        let mut state = self.inner.write().await;
        let key = (wallet.customer_id, wallet.currency);
        if let Some(id) = state.wallet_index.get(&key) {
            return Ok(state.wallets[id].clone());
        }
        state.wallet_index.insert(key, wallet.id);
        state.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        Ok(self.inner.read().await.wallets.get(&id).cloned())
    }

    async fn wallet_for_customer(
        &self,
        customer: CustomerId,
        currency: Currency,
    ) -> Result<Option<Wallet>> {
        let state = self.inner.read().await;
        Ok(state
            .wallet_index
            .get(&(customer, currency))
            .and_then(|id| state.wallets.get(id))
            .cloned())
    }

    async fn entries(&self, wallet: WalletId) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .inner
            .read()
            .await
            .entries
            .get(&wallet)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_entry(&self, posting: Posting) -> Result<CommitOutcome> {
        let mut state = self.inner.write().await;
        if !state.wallet_matches(&posting) {
            return Ok(CommitOutcome::Contended);
        }
        state.apply_posting(posting);
        Ok(CommitOutcome::Applied)
    }

    async fn append_transfer(&self, debit: Posting, credit: Posting) -> Result<CommitOutcome> {
        let mut state = self.inner.write().await;
        if !state.wallet_matches(&debit) || !state.wallet_matches(&credit) {
            return Ok(CommitOutcome::Contended);
        }
        state.apply_posting(debit);
        state.apply_posting(credit);
        Ok(CommitOutcome::Applied)
    }

    async fn update_wallet(&self, expected_version: u64, wallet: Wallet) -> Result<CommitOutcome> {
        let mut state = self.inner.write().await;
        match state.wallets.get(&wallet.id) {
            Some(stored) if stored.version == expected_version => {
                state.wallets.insert(wallet.id, wallet);
                Ok(CommitOutcome::Applied)
            }
            _ => Ok(CommitOutcome::Contended),
        }
    }

    async fn admit_refund(&self, refund: Refund, fingerprint: &str) -> Result<Admission<Refund>> {
        let mut state = self.inner.write().await;
        if let Some((id, stored_fp)) = state.refund_refs.get(&refund.reference) {
            let record = state.refunds[id].clone();
            return Ok(Admission::Existing {
                record,
                fingerprint: stored_fp.clone(),
            });
        }
        state
            .refund_refs
            .insert(refund.reference.clone(), (refund.id, fingerprint.to_string()));
        state
            .refunds_by_tx
            .entry(refund.transaction_id)
            .or_default()
            .push(refund.id);
        state.refunds.insert(refund.id, refund.clone());
        Ok(Admission::Created(refund))
    }

    async fn refund(&self, id: RefundId) -> Result<Option<Refund>> {
        Ok(self.inner.read().await.refunds.get(&id).cloned())
    }

    async fn refunds_for_transaction(&self, tx: TransactionId) -> Result<Vec<Refund>> {
        let state = self.inner.read().await;
        Ok(state
            .refunds_by_tx
            .get(&tx)
            .into_iter()
            .flatten()
            .filter_map(|id| state.refunds.get(id))
            .cloned()
            .collect())
    }

    async fn settle_refund(
        &self,
        refund: Refund,
        cap: Amount,
        posting: Option<Posting>,
    ) -> Result<SettleCommit> {
        let mut state = self.inner.write().await;
        // pending-to-terminal is a one-shot edge; a replayed settle of the
        // same record must not post twice or flip the stored outcome
        if let Some(stored) = state.refunds.get(&refund.id) {
            if stored.status != RefundStatus::Pending {
                return Ok(SettleCommit::AlreadySettled(stored.clone()));
            }
        }
        if refund.status == RefundStatus::Completed {
            let already = state.completed_refund_total(refund.transaction_id, refund.id);
            let remaining = Balance::from(cap) - already;
            if Balance::from(refund.amount) > remaining {
                return Ok(SettleCommit::CapExceeded(remaining));
            }
        }
        if let Some(posting) = posting {
            if !state.wallet_matches(&posting) {
                return Ok(SettleCommit::WalletContended);
            }
            state.apply_posting(posting);
        }
        state.refunds.insert(refund.id, refund);
        Ok(SettleCommit::Applied)
    }
}
