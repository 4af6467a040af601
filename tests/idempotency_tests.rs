mod common;

use ledgercore::application::refund_processor::RefundRequest;
use ledgercore::domain::money::{Balance, Currency};
use ledgercore::domain::transaction::{Outcome, TransactionStatus};
use ledgercore::domain::CustomerId;
use ledgercore::error::LedgerError;
use rust_decimal_macros::dec;

#[tokio::test]
async fn retried_initiation_returns_the_original_transaction() {
    let engine = common::engine();
    let customer = CustomerId::new();
    let first = engine
        .transactions()
        .initiate(common::payment("order-1", customer, dec!(500)))
        .await
        .unwrap();
    let retry = engine
        .transactions()
        .initiate(common::payment("order-1", customer, dec!(500)))
        .await
        .unwrap();

    assert_eq!(first.id, retry.id);
    assert_eq!(retry.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn retry_after_completion_does_not_double_credit() {
    let engine = common::engine();
    let customer = CustomerId::new();
    let tx = engine
        .transactions()
        .initiate(common::payment("order-1", customer, dec!(500)))
        .await
        .unwrap();
    engine
        .transactions()
        .confirm(tx.id, "prov-1", Outcome::Success)
        .await
        .unwrap();

    let retry = engine
        .transactions()
        .initiate(common::payment("order-1", customer, dec!(500)))
        .await
        .unwrap();
    assert_eq!(retry.id, tx.id);
    assert_eq!(retry.status, TransactionStatus::Completed);

    let wallet = engine
        .wallets()
        .find_wallet(customer, Currency::Usd)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(wallet.balance, Balance::new(dec!(500)));
}

#[tokio::test]
async fn reused_reference_with_different_parameters_is_rejected() {
    let engine = common::engine();
    let customer = CustomerId::new();
    engine
        .transactions()
        .initiate(common::payment("order-1", customer, dec!(500)))
        .await
        .unwrap();

    // different amount under the same reference
    assert!(matches!(
        engine
            .transactions()
            .initiate(common::payment("order-1", customer, dec!(501)))
            .await,
        Err(LedgerError::ReferenceConflict(_))
    ));

    // different customer under the same reference
    assert!(matches!(
        engine
            .transactions()
            .initiate(common::payment("order-1", CustomerId::new(), dec!(500)))
            .await,
        Err(LedgerError::ReferenceConflict(_))
    ));
}

#[tokio::test]
async fn reused_reference_with_different_metadata_is_rejected() {
    let engine = common::engine();
    let customer = CustomerId::new();
    let mut first = common::payment("order-1", customer, dec!(500));
    first.metadata = serde_json::json!({ "cart": "c-1" });
    engine.transactions().initiate(first).await.unwrap();

    let mut second = common::payment("order-1", customer, dec!(500));
    second.metadata = serde_json::json!({ "cart": "c-2" });
    assert!(matches!(
        engine.transactions().initiate(second).await,
        Err(LedgerError::ReferenceConflict(_))
    ));
}

#[tokio::test]
async fn refund_replay_settles_once() {
    let engine = common::engine();
    let customer = CustomerId::new();
    let tx = engine
        .transactions()
        .initiate(common::payment("order-1", customer, dec!(500)))
        .await
        .unwrap();
    engine
        .transactions()
        .confirm(tx.id, "prov-1", Outcome::Success)
        .await
        .unwrap();

    let request = RefundRequest {
        transaction_id: tx.id,
        reference: "refund-1".to_string(),
        amount: dec!(200),
        reason: None,
    };
    let first = engine.refunds().refund(request.clone()).await.unwrap();
    let retry = engine.refunds().refund(request).await.unwrap();
    assert_eq!(first.id, retry.id);

    let wallet = engine
        .wallets()
        .find_wallet(customer, Currency::Usd)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(wallet.balance, Balance::new(dec!(300)));
    // settlement credit plus exactly one refund debit
    assert_eq!(engine.wallets().entries(wallet.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn refund_reference_conflict_is_rejected() {
    let engine = common::engine();
    let customer = CustomerId::new();
    let tx = engine
        .transactions()
        .initiate(common::payment("order-1", customer, dec!(500)))
        .await
        .unwrap();
    engine
        .transactions()
        .confirm(tx.id, "prov-1", Outcome::Success)
        .await
        .unwrap();
    engine
        .refunds()
        .refund(RefundRequest {
            transaction_id: tx.id,
            reference: "refund-1".to_string(),
            amount: dec!(100),
            reason: None,
        })
        .await
        .unwrap();

    assert!(matches!(
        engine
            .refunds()
            .refund(RefundRequest {
                transaction_id: tx.id,
                reference: "refund-1".to_string(),
                amount: dec!(150),
                reason: None,
            })
            .await,
        Err(LedgerError::ReferenceConflict(_))
    ));

    // same amount but a different reason is still a different request
    assert!(matches!(
        engine
            .refunds()
            .refund(RefundRequest {
                transaction_id: tx.id,
                reference: "refund-1".to_string(),
                amount: dec!(100),
                reason: Some("damaged item".to_string()),
            })
            .await,
        Err(LedgerError::ReferenceConflict(_))
    ));
}
