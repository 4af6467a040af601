//! Engine facade wiring the application components onto a shared store.

use super::refund_processor::RefundProcessor;
use super::transaction_manager::TransactionManager;
use super::wallet_ledger::WalletLedger;
use crate::domain::ports::{EventEmitterRef, LedgerStoreRef};

/// One handle over the whole engine. Components share the store, so any mix
/// of concurrent calls observes a single consistent ledger.
pub struct LedgerEngine {
    transactions: TransactionManager,
    wallets: WalletLedger,
    refunds: RefundProcessor,
}

impl LedgerEngine {
    pub fn new(store: LedgerStoreRef, emitter: EventEmitterRef) -> Self {
        Self {
            transactions: TransactionManager::new(store.clone(), emitter),
            wallets: WalletLedger::new(store.clone()),
            refunds: RefundProcessor::new(store),
        }
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn wallets(&self) -> &WalletLedger {
        &self.wallets
    }

    pub fn refunds(&self) -> &RefundProcessor {
        &self.refunds
    }
}
