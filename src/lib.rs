//! Transaction and wallet ledger engine.
//!
//! The transactional core of a self-hosted payment backend: records payment
//! intents, maintains wallet balances as an append-only ledger, and settles
//! refunds, all under concurrent access and duplicated provider callbacks.
//!
//! The [`application::engine::LedgerEngine`] facade wires the components
//! over a pluggable [`domain::ports::LedgerStore`].

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
