#![allow(dead_code)]

use async_trait::async_trait;
use ledgercore::application::engine::LedgerEngine;
use ledgercore::application::transaction_manager::InitiatePayment;
use ledgercore::domain::ports::{EventEmitter, NullEmitter, TransitionEvent};
use ledgercore::domain::transaction::TransactionKind;
use ledgercore::domain::CustomerId;
use ledgercore::infrastructure::in_memory::InMemoryLedgerStore;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};

pub fn engine() -> LedgerEngine {
    LedgerEngine::new(
        Arc::new(InMemoryLedgerStore::new()),
        Arc::new(NullEmitter),
    )
}

pub fn engine_with_emitter() -> (LedgerEngine, Arc<RecordingEmitter>) {
    let emitter = Arc::new(RecordingEmitter::default());
    let engine = LedgerEngine::new(
        Arc::new(InMemoryLedgerStore::new()),
        emitter.clone(),
    );
    (engine, emitter)
}

/// Captures every transition event for assertions.
#[derive(Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<TransitionEvent>>,
}

impl RecordingEmitter {
    pub fn events(&self) -> Vec<TransitionEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventEmitter for RecordingEmitter {
    async fn transition(&self, event: TransitionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn payment(reference: &str, customer: CustomerId, amount: Decimal) -> InitiatePayment {
    InitiatePayment {
        reference: reference.to_string(),
        amount,
        currency: "USD".to_string(),
        kind: TransactionKind::Payment,
        customer_id: customer,
        payment_method: Some("card".to_string()),
        provider: Some("paystack".to_string()),
        metadata: serde_json::json!({}),
    }
}
