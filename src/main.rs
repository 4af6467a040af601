use clap::Parser;
use ledgercore::application::engine::LedgerEngine;
use ledgercore::application::refund_processor::RefundRequest;
use ledgercore::application::transaction_manager::InitiatePayment;
use ledgercore::domain::money::{Amount, Currency, SignedAmount};
use ledgercore::domain::ports::{LedgerStoreRef, NullEmitter};
use ledgercore::domain::transaction::{Outcome, TransactionKind};
use ledgercore::domain::wallet::EntryKind;
use ledgercore::domain::CustomerId;
use ledgercore::error::LedgerError;
use ledgercore::infrastructure::in_memory::InMemoryLedgerStore;
use ledgercore::interfaces::csv::operation_reader::{OperationReader, OperationRecord};
use ledgercore::interfaces::csv::wallet_writer::WalletWriter;
use miette::{IntoDiagnostic, Result};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input operations CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn build_store(db_path: Option<PathBuf>) -> Result<LedgerStoreRef> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store =
                ledgercore::infrastructure::rocksdb::RocksDbLedgerStore::open(path)
                    .into_diagnostic()?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => Err(miette::miette!(
            "--db-path requires the storage-rocksdb feature"
        )),
        None => Ok(Arc::new(InMemoryLedgerStore::new())),
    }
}

/// Maps the free-form customer labels of the input file onto engine ids and
/// remembers which wallets the replay touched.
#[derive(Default)]
struct Session {
    customers: HashMap<String, CustomerId>,
    touched: BTreeSet<(String, String)>,
}

impl Session {
    fn customer(&mut self, label: &str) -> CustomerId {
        // deterministic, so replays against a persistent store find the
        // same wallets across runs
        *self.customers.entry(label.to_string()).or_insert_with(|| {
            CustomerId::from(uuid::Uuid::new_v5(
                &uuid::Uuid::NAMESPACE_OID,
                label.as_bytes(),
            ))
        })
    }

    fn touch(&mut self, label: &str, currency: Currency) {
        self.touched
            .insert((label.to_string(), currency.to_string()));
    }
}

fn require<T>(value: Option<T>, column: &str, op: &str) -> ledgercore::error::Result<T> {
    value.ok_or_else(|| {
        LedgerError::InvalidOperation(format!("column '{column}' is required for op '{op}'"))
    })
}

async fn apply(
    engine: &LedgerEngine,
    session: &mut Session,
    record: OperationRecord,
) -> ledgercore::error::Result<()> {
    let customer = session.customer(&record.customer);
    match record.op.as_str() {
        "open" => {
            let currency: Currency = require(record.currency, "currency", "open")?.parse()?;
            engine.wallets().open_wallet(customer, currency).await?;
            session.touch(&record.customer, currency);
        }
        "topup" => {
            let currency: Currency = require(record.currency, "currency", "topup")?.parse()?;
            let amount = Amount::new(require(record.amount, "amount", "topup")?)?;
            let wallet = engine.wallets().open_wallet(customer, currency).await?;
            engine
                .wallets()
                .post(
                    wallet.id,
                    SignedAmount::credit(amount),
                    EntryKind::Topup,
                    Some(record.reference),
                    None,
                )
                .await?;
            session.touch(&record.customer, currency);
        }
        "pay" => {
            let currency = require(record.currency, "currency", "pay")?;
            let amount = require(record.amount, "amount", "pay")?;
            let tx = engine
                .transactions()
                .initiate(InitiatePayment {
                    reference: record.reference.clone(),
                    amount,
                    currency,
                    kind: TransactionKind::Payment,
                    customer_id: customer,
                    payment_method: None,
                    provider: None,
                    metadata: serde_json::json!({}),
                })
                .await?;
            // replay has no real provider; settle immediately
            let confirmed = engine
                .transactions()
                .confirm(tx.id, &format!("prov-{}", record.reference), Outcome::Success)
                .await?;
            session.touch(&record.customer, confirmed.currency);
        }
        "transfer" => {
            let currency: Currency =
                require(record.currency, "currency", "transfer")?.parse()?;
            let amount = Amount::new(require(record.amount, "amount", "transfer")?)?;
            let target = require(record.target, "target", "transfer")?;
            let to_customer = session.customer(&target);
            let from = engine.wallets().open_wallet(customer, currency).await?;
            let to = engine.wallets().open_wallet(to_customer, currency).await?;
            engine
                .wallets()
                .transfer(from.id, to.id, amount, &record.reference)
                .await?;
            session.touch(&record.customer, currency);
            session.touch(&target, currency);
        }
        "refund" => {
            let amount = require(record.amount, "amount", "refund")?;
            let target = require(record.target, "target", "refund")?;
            let tx = engine
                .transactions()
                .find_by_reference(&target)
                .await?
                .ok_or_else(|| {
                    LedgerError::InvalidOperation(format!(
                        "refund target '{target}' matches no transaction"
                    ))
                })?;
            engine
                .refunds()
                .refund(RefundRequest {
                    transaction_id: tx.id,
                    reference: record.reference,
                    amount,
                    reason: None,
                })
                .await?;
            session.touch(&record.customer, tx.currency);
        }
        other => {
            return Err(LedgerError::InvalidOperation(format!(
                "unknown op '{other}'"
            )));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let store = build_store(cli.db_path)?;
    let engine = LedgerEngine::new(store, Arc::new(NullEmitter));

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = OperationReader::new(file);
    let mut session = Session::default();
    for record in reader.operations() {
        match record {
            Ok(record) => {
                if let Err(e) = apply(&engine, &mut session, record).await {
                    eprintln!("Error processing operation: {e}");
                }
            }
            Err(e) => {
                eprintln!("Error reading operation: {e}");
            }
        }
    }

    let mut rows = Vec::new();
    for (label, currency) in &session.touched {
        let Some(customer) = session.customers.get(label).copied() else {
            continue;
        };
        let currency: Currency = currency.parse().into_diagnostic()?;
        if let Some(wallet) = engine
            .wallets()
            .find_wallet(customer, currency)
            .await
            .into_diagnostic()?
        {
            rows.push((label.clone(), wallet));
        }
    }

    let stdout = io::stdout();
    let mut writer = WalletWriter::new(stdout.lock());
    writer
        .write_wallets(rows.iter().map(|(label, wallet)| (label.as_str(), wallet)))
        .into_diagnostic()?;

    Ok(())
}
