use crate::domain::wallet::{Wallet, WalletStatus};
use crate::error::Result;
use std::io::Write;

/// Writes final wallet snapshots as CSV.
pub struct WalletWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> WalletWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Write one row per `(label, wallet)` pair, header first.
    pub fn write_wallets<'a, I>(&mut self, wallets: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a Wallet)>,
    {
        self.writer
            .write_record(["customer", "currency", "balance", "status"])?;
        for (label, wallet) in wallets {
            let status = match wallet.status {
                WalletStatus::Active => "active",
                WalletStatus::Frozen => "frozen",
                WalletStatus::Closed => "closed",
            };
            self.writer.write_record([
                label,
                &wallet.currency.to_string(),
                &wallet.balance.value().normalize().to_string(),
                status,
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
