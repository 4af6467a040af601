use crate::domain::money::{Balance, Currency};
use crate::domain::transaction::TransactionStatus;
use crate::domain::{RefundId, TransactionId, WalletId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },
    #[error("transaction {0} already concluded with a different outcome")]
    ConflictingOutcome(TransactionId),
    #[error("reference {0} was already used for a different operation")]
    ReferenceConflict(String),
    #[error("insufficient funds in wallet {wallet}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        wallet: WalletId,
        balance: Balance,
        requested: Balance,
    },
    #[error(
        "refund exceeds refundable amount on transaction {transaction}: \
         remaining {remaining}, requested {requested}"
    )]
    RefundExceedsBalance {
        transaction: TransactionId,
        remaining: Balance,
        requested: Balance,
    },
    #[error("transaction {0} is not completed")]
    TransactionNotCompleted(TransactionId),
    #[error("provider error: {0}")]
    ProviderError(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),
    #[error("wallet {0} not found")]
    WalletNotFound(WalletId),
    #[error("refund {0} not found")]
    RefundNotFound(RefundId),
    #[error("wallet {0} is not active")]
    WalletInactive(WalletId),
    #[error("currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch {
        expected: Currency,
        actual: Currency,
    },
    #[error("cannot transfer from wallet {0} to itself")]
    SelfTransfer(WalletId),
    #[error("ledger corrupted: {0}")]
    LedgerCorrupted(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
