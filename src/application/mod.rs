//! Application components: the idempotency guard, the transaction state
//! machine, wallet posting and refund settlement, plus the engine facade.

pub mod engine;
pub mod idempotency;
pub mod refund_processor;
pub mod transaction_manager;
pub mod wallet_ledger;

/// Bounded optimistic-concurrency retries before an operation reports the
/// store as unavailable. Retrying the whole operation is always safe thanks
/// to the idempotency keys.
pub(crate) const MAX_CAS_RETRIES: u32 = 64;
