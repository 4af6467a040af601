//! CSV adapters for the replay CLI: an operation reader on the way in, a
//! wallet snapshot writer on the way out.

pub mod operation_reader;
pub mod wallet_writer;
