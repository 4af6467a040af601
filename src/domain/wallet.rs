use super::money::{Balance, Currency, SignedAmount};
use super::{CustomerId, EntryId, WalletId};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    Active,
    Frozen,
    Closed,
}

/// A customer's stored-value balance.
///
/// The cached `balance` is a materialized convenience: the source of truth
/// is the entry chain, and [`verify_chain`] reconstructs it. The `version`
/// counter backs the per-wallet compare-and-swap that linearizes posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub customer_id: CustomerId,
    pub balance: Balance,
    pub currency: Currency,
    pub status: WalletStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(customer_id: CustomerId, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            id: WalletId::new(),
            customer_id,
            balance: Balance::ZERO,
            currency,
            status: WalletStatus::Active,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate a movement against the wallet's current state and return the
    /// resulting balance. No overdraft: a debit that would go below zero is
    /// rejected and nothing is recorded.
    pub fn post(&self, movement: SignedAmount) -> Result<Balance> {
        if self.status != WalletStatus::Active {
            return Err(LedgerError::WalletInactive(self.id));
        }
        let after = self.balance.apply(movement);
        if after.is_negative() {
            return Err(LedgerError::InsufficientFunds {
                wallet: self.id,
                balance: self.balance,
                requested: Balance::new(movement.value().abs()),
            });
        }
        Ok(after)
    }

    /// The wallet's next state once a movement with the given resulting
    /// balance commits.
    pub fn advanced(&self, balance_after: Balance) -> Self {
        Self {
            balance: balance_after,
            version: self.version + 1,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Topup,
    TransferIn,
    TransferOut,
    Refund,
    Adjustment,
}

/// One append-only, immutable balance movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub wallet_id: WalletId,
    pub amount: SignedAmount,
    pub balance_after: Balance,
    pub kind: EntryKind,
    /// Correlating reference to the transaction or refund that caused this
    /// entry. Lookup only, not ownership.
    pub reference: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        wallet_id: WalletId,
        amount: SignedAmount,
        balance_after: Balance,
        kind: EntryKind,
        reference: Option<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            wallet_id,
            amount,
            balance_after,
            kind,
            reference,
            description,
            created_at: Utc::now(),
        }
    }
}

/// Replay a wallet's entries in creation order, verifying that every
/// `balance_after` equals the previous one plus the entry's movement.
/// Returns the final balance.
pub fn verify_chain(entries: &[LedgerEntry]) -> Result<Balance> {
    let mut running = Balance::ZERO;
    for entry in entries {
        running = running.apply(entry.amount);
        if entry.balance_after != running {
            return Err(LedgerError::LedgerCorrupted(format!(
                "entry {} of wallet {} records balance_after {}, replay gives {}",
                entry.id, entry.wallet_id, entry.balance_after, running
            )));
        }
    }
    Ok(running)
}
