//! RocksDB-backed store, behind the `storage-rocksdb` feature.
//!
//! Values are JSON encoded. RocksDB has no multi-key transactions in the
//! mode used here, so every mutating method serializes behind one async
//! mutex and commits its keys in a single `WriteBatch`; readers go straight
//! to the DB.

use crate::domain::money::{Amount, Balance, Currency};
use crate::domain::ports::{
    Admission, CommitOutcome, ConfirmCommit, LedgerStore, Posting, SettleCommit, TxCommit,
};
use crate::domain::refund::{Refund, RefundStatus};
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::domain::wallet::{LedgerEntry, Wallet};
use crate::domain::{CustomerId, RefundId, TransactionId, WalletId};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

const CF_TRANSACTIONS: &str = "transactions";
const CF_TX_REFS: &str = "tx_refs";
const CF_WALLETS: &str = "wallets";
const CF_WALLET_INDEX: &str = "wallet_index";
const CF_ENTRIES: &str = "entries";
const CF_REFUNDS: &str = "refunds";
const CF_REFUND_REFS: &str = "refund_refs";

const COLUMN_FAMILIES: [&str; 7] = [
    CF_TRANSACTIONS,
    CF_TX_REFS,
    CF_WALLETS,
    CF_WALLET_INDEX,
    CF_ENTRIES,
    CF_REFUNDS,
    CF_REFUND_REFS,
];

fn db_err(err: rocksdb::Error) -> LedgerError {
    LedgerError::StoreUnavailable(err.to_string())
}

fn codec_err(err: serde_json::Error) -> LedgerError {
    LedgerError::LedgerCorrupted(format!("stored record does not decode: {err}"))
}

/// Entry keys sort by wallet then by the wallet version that produced them,
/// so a prefix scan yields the chain in creation order.
fn entry_key(wallet: WalletId, seq: u64) -> Vec<u8> {
    let mut key = wallet.as_uuid().as_bytes().to_vec();
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn wallet_index_key(customer: CustomerId, currency: Currency) -> Vec<u8> {
    let mut key = customer.as_uuid().as_bytes().to_vec();
    key.extend_from_slice(currency.to_string().as_bytes());
    key
}

#[derive(Clone)]
pub struct RocksDbLedgerStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbLedgerStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        let cfs = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, cfs).map_err(db_err)?;
        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            LedgerError::StoreUnavailable(format!("column family '{name}' not found"))
        })
    }

    fn get<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key).map_err(db_err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(codec_err)?)),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, batch: &mut WriteBatch, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|err| LedgerError::StoreUnavailable(err.to_string()))?;
        batch.put_cf(self.cf(cf)?, key, bytes);
        Ok(())
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.db.write(batch).map_err(db_err)
    }

    fn load_wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        self.get(CF_WALLETS, id.as_uuid().as_bytes())
    }

    fn wallet_matches(&self, posting: &Posting) -> Result<bool> {
        Ok(self
            .load_wallet(posting.wallet.id)?
            .is_some_and(|w| w.version == posting.expected_version))
    }

    fn stage_posting(&self, batch: &mut WriteBatch, posting: &Posting) -> Result<()> {
        self.put(
            batch,
            CF_WALLETS,
            posting.wallet.id.as_uuid().as_bytes(),
            &posting.wallet,
        )?;
        self.put(
            batch,
            CF_ENTRIES,
            &entry_key(posting.wallet.id, posting.wallet.version),
            &posting.entry,
        )
    }

    fn all_refunds(&self) -> Result<Vec<Refund>> {
        let mut refunds = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_REFUNDS)?, IteratorMode::Start) {
            let (_, value) = item.map_err(db_err)?;
            refunds.push(serde_json::from_slice(&value).map_err(codec_err)?);
        }
        Ok(refunds)
    }

    fn completed_refund_total(&self, tx: TransactionId, excluding: RefundId) -> Result<Balance> {
        Ok(self
            .all_refunds()?
            .into_iter()
            .filter(|r| {
                r.transaction_id == tx && r.id != excluding && r.status == RefundStatus::Completed
            })
            .fold(Balance::ZERO, |sum, r| sum + Balance::from(r.amount)))
    }
}

#[async_trait]
impl LedgerStore for RocksDbLedgerStore {
    async fn admit_transaction(
        &self,
        tx: Transaction,
        fingerprint: &str,
    ) -> Result<Admission<Transaction>> {
        let _guard = self.write_lock.lock().await;
        if let Some((id, stored_fp)) =
            self.get::<(TransactionId, String)>(CF_TX_REFS, tx.reference.as_bytes())?
        {
            let record = self
                .get(CF_TRANSACTIONS, id.as_uuid().as_bytes())?
                .ok_or_else(|| {
                    LedgerError::LedgerCorrupted(format!(
                        "admission record for {} points at a missing transaction",
                        tx.reference
                    ))
                })?;
            return Ok(Admission::Existing {
                record,
                fingerprint: stored_fp,
            });
        }
        let mut batch = WriteBatch::default();
        self.put(
            &mut batch,
            CF_TX_REFS,
            tx.reference.as_bytes(),
            &(tx.id, fingerprint.to_string()),
        )?;
        self.put(&mut batch, CF_TRANSACTIONS, tx.id.as_uuid().as_bytes(), &tx)?;
        self.commit(batch)?;
        Ok(Admission::Created(tx))
    }

    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.get(CF_TRANSACTIONS, id.as_uuid().as_bytes())
    }

    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        match self.get::<(TransactionId, String)>(CF_TX_REFS, reference.as_bytes())? {
            Some((id, _)) => self.get(CF_TRANSACTIONS, id.as_uuid().as_bytes()),
            None => Ok(None),
        }
    }

    async fn update_transaction(
        &self,
        expected: TransactionStatus,
        tx: Transaction,
    ) -> Result<TxCommit> {
        let _guard = self.write_lock.lock().await;
        match self.get::<Transaction>(CF_TRANSACTIONS, tx.id.as_uuid().as_bytes())? {
            Some(stored) if stored.status == expected => {
                let mut batch = WriteBatch::default();
                self.put(&mut batch, CF_TRANSACTIONS, tx.id.as_uuid().as_bytes(), &tx)?;
                self.commit(batch)?;
                Ok(TxCommit::Applied)
            }
            Some(stored) => Ok(TxCommit::StatusChanged(stored)),
            None => Ok(TxCommit::StatusChanged(tx)),
        }
    }

    async fn commit_confirmation(
        &self,
        expected: TransactionStatus,
        tx: Transaction,
        posting: Option<Posting>,
    ) -> Result<ConfirmCommit> {
        let _guard = self.write_lock.lock().await;
        match self.get::<Transaction>(CF_TRANSACTIONS, tx.id.as_uuid().as_bytes())? {
            Some(stored) if stored.status == expected => {}
            Some(stored) => return Ok(ConfirmCommit::StatusChanged(stored)),
            None => return Ok(ConfirmCommit::StatusChanged(tx)),
        }
        let mut batch = WriteBatch::default();
        if let Some(posting) = posting {
            if !self.wallet_matches(&posting)? {
                return Ok(ConfirmCommit::WalletContended);
            }
            self.stage_posting(&mut batch, &posting)?;
        }
        self.put(&mut batch, CF_TRANSACTIONS, tx.id.as_uuid().as_bytes(), &tx)?;
        self.commit(batch)?;
        Ok(ConfirmCommit::Applied)
    }

    async fn insert_wallet(&self, wallet: Wallet) -> Result<Wallet> {
        let _guard = self.write_lock.lock().await;
        let index_key = wallet_index_key(wallet.customer_id, wallet.currency);
        if let Some(existing) = self.get::<WalletId>(CF_WALLET_INDEX, &index_key)? {
            return self.load_wallet(existing)?.ok_or_else(|| {
                LedgerError::LedgerCorrupted(format!(
                    "wallet index points at missing wallet {existing}"
                ))
            });
        }
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_WALLET_INDEX, &index_key, &wallet.id)?;
        self.put(&mut batch, CF_WALLETS, wallet.id.as_uuid().as_bytes(), &wallet)?;
        self.commit(batch)?;
        Ok(wallet)
    }

    async fn wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        self.load_wallet(id)
    }

    async fn wallet_for_customer(
        &self,
        customer: CustomerId,
        currency: Currency,
    ) -> Result<Option<Wallet>> {
        match self.get::<WalletId>(CF_WALLET_INDEX, &wallet_index_key(customer, currency))? {
            Some(id) => self.load_wallet(id),
            None => Ok(None),
        }
    }

    async fn entries(&self, wallet: WalletId) -> Result<Vec<LedgerEntry>> {
        let prefix = wallet.as_uuid().as_bytes().to_vec();
        let mut entries = Vec::new();
        let iter = self.db.iterator_cf(
            self.cf(CF_ENTRIES)?,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );
        for item in iter {
            let (key, value) = item.map_err(db_err)?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(serde_json::from_slice(&value).map_err(codec_err)?);
        }
        Ok(entries)
    }

    async fn append_entry(&self, posting: Posting) -> Result<CommitOutcome> {
        let _guard = self.write_lock.lock().await;
        if !self.wallet_matches(&posting)? {
            return Ok(CommitOutcome::Contended);
        }
        let mut batch = WriteBatch::default();
        self.stage_posting(&mut batch, &posting)?;
        self.commit(batch)?;
        Ok(CommitOutcome::Applied)
    }

    async fn append_transfer(&self, debit: Posting, credit: Posting) -> Result<CommitOutcome> {
        let _guard = self.write_lock.lock().await;
        if !self.wallet_matches(&debit)? || !self.wallet_matches(&credit)? {
            return Ok(CommitOutcome::Contended);
        }
        let mut batch = WriteBatch::default();
        self.stage_posting(&mut batch, &debit)?;
        self.stage_posting(&mut batch, &credit)?;
        self.commit(batch)?;
        Ok(CommitOutcome::Applied)
    }

    async fn update_wallet(&self, expected_version: u64, wallet: Wallet) -> Result<CommitOutcome> {
        let _guard = self.write_lock.lock().await;
        match self.load_wallet(wallet.id)? {
            Some(stored) if stored.version == expected_version => {
                let mut batch = WriteBatch::default();
                self.put(&mut batch, CF_WALLETS, wallet.id.as_uuid().as_bytes(), &wallet)?;
                self.commit(batch)?;
                Ok(CommitOutcome::Applied)
            }
            _ => Ok(CommitOutcome::Contended),
        }
    }

    async fn admit_refund(&self, refund: Refund, fingerprint: &str) -> Result<Admission<Refund>> {
        let _guard = self.write_lock.lock().await;
        if let Some((id, stored_fp)) =
            self.get::<(RefundId, String)>(CF_REFUND_REFS, refund.reference.as_bytes())?
        {
            let record = self
                .get(CF_REFUNDS, id.as_uuid().as_bytes())?
                .ok_or_else(|| {
                    LedgerError::LedgerCorrupted(format!(
                        "admission record for {} points at a missing refund",
                        refund.reference
                    ))
                })?;
            return Ok(Admission::Existing {
                record,
                fingerprint: stored_fp,
            });
        }
        let mut batch = WriteBatch::default();
        self.put(
            &mut batch,
            CF_REFUND_REFS,
            refund.reference.as_bytes(),
            &(refund.id, fingerprint.to_string()),
        )?;
        self.put(&mut batch, CF_REFUNDS, refund.id.as_uuid().as_bytes(), &refund)?;
        self.commit(batch)?;
        Ok(Admission::Created(refund))
    }

    async fn refund(&self, id: RefundId) -> Result<Option<Refund>> {
        self.get(CF_REFUNDS, id.as_uuid().as_bytes())
    }

    async fn refunds_for_transaction(&self, tx: TransactionId) -> Result<Vec<Refund>> {
        Ok(self
            .all_refunds()?
            .into_iter()
            .filter(|r| r.transaction_id == tx)
            .collect())
    }

    async fn settle_refund(
        &self,
        refund: Refund,
        cap: Amount,
        posting: Option<Posting>,
    ) -> Result<SettleCommit> {
        let _guard = self.write_lock.lock().await;
        // pending-to-terminal is a one-shot edge; a replayed settle of the
        // same record must not post twice or flip the stored outcome
        if let Some(stored) = self.get::<Refund>(CF_REFUNDS, refund.id.as_uuid().as_bytes())? {
            if stored.status != RefundStatus::Pending {
                return Ok(SettleCommit::AlreadySettled(stored));
            }
        }
        if refund.status == RefundStatus::Completed {
            let already = self.completed_refund_total(refund.transaction_id, refund.id)?;
            let remaining = Balance::from(cap) - already;
            if Balance::from(refund.amount) > remaining {
                return Ok(SettleCommit::CapExceeded(remaining));
            }
        }
        let mut batch = WriteBatch::default();
        if let Some(posting) = posting {
            if !self.wallet_matches(&posting)? {
                return Ok(SettleCommit::WalletContended);
            }
            self.stage_posting(&mut batch, &posting)?;
        }
        self.put(&mut batch, CF_REFUNDS, refund.id.as_uuid().as_bytes(), &refund)?;
        self.commit(batch)?;
        Ok(SettleCommit::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::SignedAmount;
    use crate::domain::wallet::{verify_chain, EntryKind};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn store() -> (TempDir, RocksDbLedgerStore) {
        let dir = TempDir::new().unwrap();
        let store = RocksDbLedgerStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn wallet_round_trip_and_index() {
        let (_dir, store) = store();
        let customer = CustomerId::new();
        let wallet = store
            .insert_wallet(Wallet::new(customer, Currency::Usd))
            .await
            .unwrap();
        let again = store
            .insert_wallet(Wallet::new(customer, Currency::Usd))
            .await
            .unwrap();
        assert_eq!(wallet.id, again.id);
        let found = store
            .wallet_for_customer(customer, Currency::Usd)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, wallet.id);
        assert!(store
            .wallet_for_customer(customer, Currency::Eur)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn entries_come_back_in_order() {
        let (_dir, store) = store();
        let mut wallet = store
            .insert_wallet(Wallet::new(CustomerId::new(), Currency::Usd))
            .await
            .unwrap();
        for value in [dec!(100), dec!(40), dec!(7.25)] {
            let movement = SignedAmount::credit(Amount::new(value).unwrap());
            let posting =
                Posting::prepare(&wallet, movement, EntryKind::Topup, None, None).unwrap();
            wallet = posting.wallet.clone();
            assert!(matches!(
                store.append_entry(posting).await.unwrap(),
                CommitOutcome::Applied
            ));
        }
        let entries = store.entries(wallet.id).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            verify_chain(&entries).unwrap(),
            Balance::new(dec!(147.25))
        );
    }

    #[tokio::test]
    async fn stale_append_is_contended() {
        let (_dir, store) = store();
        let wallet = store
            .insert_wallet(Wallet::new(CustomerId::new(), Currency::Usd))
            .await
            .unwrap();
        let movement = SignedAmount::credit(Amount::new(dec!(10)).unwrap());
        let posting =
            Posting::prepare(&wallet, movement, EntryKind::Topup, None, None).unwrap();
        let stale = posting.clone();
        store.append_entry(posting).await.unwrap();
        assert!(matches!(
            store.append_entry(stale).await.unwrap(),
            CommitOutcome::Contended
        ));
    }
}
