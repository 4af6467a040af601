mod common;

use ledgercore::domain::money::{Amount, Balance, Currency, SignedAmount};
use ledgercore::domain::wallet::{EntryKind, WalletStatus};
use ledgercore::domain::{CustomerId, WalletId};
use ledgercore::error::LedgerError;
use rust_decimal_macros::dec;

fn amount(v: rust_decimal::Decimal) -> Amount {
    Amount::new(v).unwrap()
}

#[tokio::test]
async fn overdraft_is_rejected_and_balance_unchanged() {
    let engine = common::engine();
    let wallet = engine
        .wallets()
        .open_wallet(CustomerId::new(), Currency::Usd)
        .await
        .unwrap();

    engine
        .wallets()
        .post(
            wallet.id,
            SignedAmount::credit(amount(dec!(1000))),
            EntryKind::Topup,
            Some("t-1".to_string()),
            None,
        )
        .await
        .unwrap();

    let result = engine
        .wallets()
        .post(
            wallet.id,
            SignedAmount::debit(amount(dec!(1500))),
            EntryKind::Adjustment,
            None,
            None,
        )
        .await;
    assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));

    assert_eq!(
        engine.wallets().balance(wallet.id).await.unwrap(),
        Balance::new(dec!(1000))
    );
    // the rejected debit left no entry behind
    assert_eq!(engine.wallets().entries(wallet.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn entry_chain_links_and_audit_passes() {
    let engine = common::engine();
    let wallet = engine
        .wallets()
        .open_wallet(CustomerId::new(), Currency::Usd)
        .await
        .unwrap();

    for (movement, kind) in [
        (SignedAmount::credit(amount(dec!(1000))), EntryKind::Topup),
        (SignedAmount::debit(amount(dec!(250))), EntryKind::Adjustment),
        (SignedAmount::credit(amount(dec!(10.50))), EntryKind::Topup),
    ] {
        engine
            .wallets()
            .post(wallet.id, movement, kind, None, None)
            .await
            .unwrap();
    }

    let entries = engine.wallets().entries(wallet.id).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].balance_after, Balance::new(dec!(1000)));
    assert_eq!(entries[1].balance_after, Balance::new(dec!(750)));
    assert_eq!(entries[2].balance_after, Balance::new(dec!(760.50)));

    let audited = engine.wallets().audit(wallet.id).await.unwrap();
    assert_eq!(audited, Balance::new(dec!(760.50)));
    assert_eq!(engine.wallets().balance(wallet.id).await.unwrap(), audited);
}

#[tokio::test]
async fn transfer_moves_funds_and_writes_both_entries() {
    let engine = common::engine();
    let from = engine
        .wallets()
        .open_wallet(CustomerId::new(), Currency::Usd)
        .await
        .unwrap();
    let to = engine
        .wallets()
        .open_wallet(CustomerId::new(), Currency::Usd)
        .await
        .unwrap();
    engine
        .wallets()
        .post(
            from.id,
            SignedAmount::credit(amount(dec!(500))),
            EntryKind::Topup,
            None,
            None,
        )
        .await
        .unwrap();

    let (out_entry, in_entry) = engine
        .wallets()
        .transfer(from.id, to.id, amount(dec!(200)), "xfer-1")
        .await
        .unwrap();

    assert_eq!(out_entry.kind, EntryKind::TransferOut);
    assert_eq!(in_entry.kind, EntryKind::TransferIn);
    assert_eq!(out_entry.reference.as_deref(), Some("xfer-1"));
    assert_eq!(
        engine.wallets().balance(from.id).await.unwrap(),
        Balance::new(dec!(300))
    );
    assert_eq!(
        engine.wallets().balance(to.id).await.unwrap(),
        Balance::new(dec!(200))
    );
    assert_eq!(engine.wallets().audit(from.id).await.unwrap(), Balance::new(dec!(300)));
    assert_eq!(engine.wallets().audit(to.id).await.unwrap(), Balance::new(dec!(200)));
}

#[tokio::test]
async fn underfunded_transfer_leaves_both_wallets_untouched() {
    let engine = common::engine();
    let from = engine
        .wallets()
        .open_wallet(CustomerId::new(), Currency::Usd)
        .await
        .unwrap();
    let to = engine
        .wallets()
        .open_wallet(CustomerId::new(), Currency::Usd)
        .await
        .unwrap();

    let result = engine
        .wallets()
        .transfer(from.id, to.id, amount(dec!(10)), "xfer-1")
        .await;
    assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
    assert!(engine.wallets().entries(from.id).await.unwrap().is_empty());
    assert!(engine.wallets().entries(to.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn transfer_rejects_currency_mismatch_and_self() {
    let engine = common::engine();
    let usd = engine
        .wallets()
        .open_wallet(CustomerId::new(), Currency::Usd)
        .await
        .unwrap();
    let eur = engine
        .wallets()
        .open_wallet(CustomerId::new(), Currency::Eur)
        .await
        .unwrap();

    assert!(matches!(
        engine
            .wallets()
            .transfer(usd.id, eur.id, amount(dec!(1)), "xfer-1")
            .await,
        Err(LedgerError::CurrencyMismatch { .. })
    ));
    assert!(matches!(
        engine
            .wallets()
            .transfer(usd.id, usd.id, amount(dec!(1)), "xfer-2")
            .await,
        Err(LedgerError::SelfTransfer(_))
    ));
}

#[tokio::test]
async fn frozen_wallet_rejects_movements() {
    let engine = common::engine();
    let wallet = engine
        .wallets()
        .open_wallet(CustomerId::new(), Currency::Usd)
        .await
        .unwrap();
    engine
        .wallets()
        .post(
            wallet.id,
            SignedAmount::credit(amount(dec!(100))),
            EntryKind::Topup,
            None,
            None,
        )
        .await
        .unwrap();

    let frozen = engine
        .wallets()
        .set_status(wallet.id, WalletStatus::Frozen)
        .await
        .unwrap();
    assert_eq!(frozen.status, WalletStatus::Frozen);

    assert!(matches!(
        engine
            .wallets()
            .post(
                wallet.id,
                SignedAmount::debit(amount(dec!(10))),
                EntryKind::Adjustment,
                None,
                None,
            )
            .await,
        Err(LedgerError::WalletInactive(_))
    ));

    // balance survives the freeze and posts work again after reactivation
    engine
        .wallets()
        .set_status(wallet.id, WalletStatus::Active)
        .await
        .unwrap();
    engine
        .wallets()
        .post(
            wallet.id,
            SignedAmount::debit(amount(dec!(10))),
            EntryKind::Adjustment,
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        engine.wallets().balance(wallet.id).await.unwrap(),
        Balance::new(dec!(90))
    );
}

#[tokio::test]
async fn one_wallet_per_customer_and_currency() {
    let engine = common::engine();
    let customer = CustomerId::new();
    let first = engine
        .wallets()
        .open_wallet(customer, Currency::Usd)
        .await
        .unwrap();
    let second = engine
        .wallets()
        .open_wallet(customer, Currency::Usd)
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    let eur = engine
        .wallets()
        .open_wallet(customer, Currency::Eur)
        .await
        .unwrap();
    assert_ne!(first.id, eur.id);
}

#[tokio::test]
async fn unknown_wallet_is_not_found() {
    let engine = common::engine();
    assert!(matches!(
        engine.wallets().entries(WalletId::new()).await,
        Err(LedgerError::WalletNotFound(_))
    ));
    assert!(matches!(
        engine.wallets().balance(WalletId::new()).await,
        Err(LedgerError::WalletNotFound(_))
    ));
}
