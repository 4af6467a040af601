//! Wallet ledger: atomic credit/debit posting with per-wallet
//! linearization via optimistic compare-and-swap.

use super::MAX_CAS_RETRIES;
use crate::domain::money::{Amount, Balance, Currency, SignedAmount};
use crate::domain::ports::{CommitOutcome, LedgerStoreRef, Posting};
use crate::domain::wallet::{verify_chain, EntryKind, LedgerEntry, Wallet, WalletStatus};
use crate::domain::{CustomerId, WalletId};
use crate::error::{LedgerError, Result};
use tracing::{debug, info, warn};

pub struct WalletLedger {
    store: LedgerStoreRef,
}

impl WalletLedger {
    pub fn new(store: LedgerStoreRef) -> Self {
        Self { store }
    }

    /// Create the wallet for a customer+currency pair, or return the
    /// existing one. Wallets are created once and never deleted.
    pub async fn open_wallet(&self, customer: CustomerId, currency: Currency) -> Result<Wallet> {
        let wallet = self.store.insert_wallet(Wallet::new(customer, currency)).await?;
        debug!(wallet = %wallet.id, %customer, %currency, "wallet opened");
        Ok(wallet)
    }

    pub async fn wallet(&self, id: WalletId) -> Result<Wallet> {
        self.store
            .wallet(id)
            .await?
            .ok_or(LedgerError::WalletNotFound(id))
    }

    pub async fn find_wallet(
        &self,
        customer: CustomerId,
        currency: Currency,
    ) -> Result<Option<Wallet>> {
        self.store.wallet_for_customer(customer, currency).await
    }

    pub async fn balance(&self, id: WalletId) -> Result<Balance> {
        Ok(self.wallet(id).await?.balance)
    }

    pub async fn entries(&self, id: WalletId) -> Result<Vec<LedgerEntry>> {
        // surface a not-found instead of an empty list for unknown wallets
        self.wallet(id).await?;
        self.store.entries(id).await
    }

    /// Append one movement to a wallet's ledger.
    ///
    /// Read-validate-append runs under a version compare-and-swap: if the
    /// wallet changed underneath us the loop re-reads and re-validates, so
    /// `balance_after` chains never fork or skip.
    pub async fn post(
        &self,
        wallet_id: WalletId,
        movement: SignedAmount,
        kind: EntryKind,
        reference: Option<String>,
        description: Option<String>,
    ) -> Result<LedgerEntry> {
        for attempt in 0..MAX_CAS_RETRIES {
            let wallet = self.wallet(wallet_id).await?;
            let posting = Posting::prepare(
                &wallet,
                movement,
                kind,
                reference.clone(),
                description.clone(),
            )?;
            let entry = posting.entry.clone();
            match self.store.append_entry(posting).await? {
                CommitOutcome::Applied => {
                    info!(
                        wallet = %wallet_id,
                        amount = %movement,
                        kind = ?kind,
                        balance_after = %entry.balance_after,
                        "ledger entry appended"
                    );
                    return Ok(entry);
                }
                CommitOutcome::Contended => {
                    debug!(wallet = %wallet_id, attempt, "post contended, retrying");
                }
            }
        }
        warn!(wallet = %wallet_id, "post abandoned after {MAX_CAS_RETRIES} contended attempts");
        Err(LedgerError::StoreUnavailable(format!(
            "wallet {wallet_id} is too contended"
        )))
    }

    /// Move `amount` between two wallets as a single atomic unit. Either
    /// both entries commit or neither does.
    pub async fn transfer(
        &self,
        from: WalletId,
        to: WalletId,
        amount: Amount,
        reference: &str,
    ) -> Result<(LedgerEntry, LedgerEntry)> {
        if from == to {
            return Err(LedgerError::SelfTransfer(from));
        }
        for attempt in 0..MAX_CAS_RETRIES {
            let src = self.wallet(from).await?;
            let dst = self.wallet(to).await?;
            if src.currency != dst.currency {
                return Err(LedgerError::CurrencyMismatch {
                    expected: src.currency,
                    actual: dst.currency,
                });
            }
            let debit = Posting::prepare(
                &src,
                SignedAmount::debit(amount),
                EntryKind::TransferOut,
                Some(reference.to_string()),
                Some(format!("transfer to {to}")),
            )?;
            let credit = Posting::prepare(
                &dst,
                SignedAmount::credit(amount),
                EntryKind::TransferIn,
                Some(reference.to_string()),
                Some(format!("transfer from {from}")),
            )?;
            let (out_entry, in_entry) = (debit.entry.clone(), credit.entry.clone());
            match self.store.append_transfer(debit, credit).await? {
                CommitOutcome::Applied => {
                    info!(%from, %to, %amount, reference, "transfer committed");
                    return Ok((out_entry, in_entry));
                }
                CommitOutcome::Contended => {
                    debug!(%from, %to, attempt, "transfer contended, retrying");
                }
            }
        }
        warn!(%from, %to, "transfer abandoned after {MAX_CAS_RETRIES} contended attempts");
        Err(LedgerError::StoreUnavailable(
            "transfer wallets are too contended".to_string(),
        ))
    }

    /// Change a wallet's status (freeze/close). Balance movements only go
    /// through [`WalletLedger::post`].
    pub async fn set_status(&self, id: WalletId, status: WalletStatus) -> Result<Wallet> {
        for _ in 0..MAX_CAS_RETRIES {
            let wallet = self.wallet(id).await?;
            let updated = Wallet {
                status,
                version: wallet.version + 1,
                updated_at: chrono::Utc::now(),
                ..wallet.clone()
            };
            match self
                .store
                .update_wallet(wallet.version, updated.clone())
                .await?
            {
                CommitOutcome::Applied => {
                    info!(wallet = %id, ?status, "wallet status changed");
                    return Ok(updated);
                }
                CommitOutcome::Contended => continue,
            }
        }
        Err(LedgerError::StoreUnavailable(format!(
            "wallet {id} is too contended"
        )))
    }

    /// Independently verify a wallet: replay the entry chain and cross-check
    /// the cached balance. Returns the replayed balance.
    pub async fn audit(&self, id: WalletId) -> Result<Balance> {
        let wallet = self.wallet(id).await?;
        let entries = self.store.entries(id).await?;
        let replayed = verify_chain(&entries)?;
        if replayed != wallet.balance {
            return Err(LedgerError::LedgerCorrupted(format!(
                "wallet {id} caches balance {}, replay gives {replayed}",
                wallet.balance
            )));
        }
        Ok(replayed)
    }
}
