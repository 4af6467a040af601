use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of the replay input.
///
/// `op` selects the operation; the remaining columns are optional and
/// validated by the CLI when it dispatches to the engine. `customer` is a
/// free-form label mapped to a customer id on first use.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationRecord {
    pub op: String,
    pub reference: String,
    pub customer: String,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    /// Counterparty label for transfers, original payment reference for
    /// refunds.
    pub target: Option<String>,
}

/// Reads operations from a CSV source.
///
/// Wraps `csv::Reader` and provides an iterator over `Result<OperationRecord>`,
/// trimming whitespace and tolerating short rows so optional trailing columns
/// can be omitted.
pub struct OperationReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OperationReader<R> {
    /// Creates a new `OperationReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes operations,
    /// so large files stream without loading the whole dataset into memory.
    pub fn operations(self) -> impl Iterator<Item = Result<OperationRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}
