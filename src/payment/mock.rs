//! Deterministic in-process gateway used by integration tests and local
//! development runs without provider credentials.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::{
    GatewayError, InitializedPayment, PaymentGateway, PaymentIntent, PaymentOutcome,
    VerifiedPayment,
};

pub struct MockGateway {
    references: Mutex<HashMap<String, i64>>,
    outcome: Mutex<PaymentOutcome>,
    seq: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            references: Mutex::new(HashMap::new()),
            outcome: Mutex::new(PaymentOutcome::Success),
            seq: AtomicU64::new(0),
        }
    }

    /// Outcome reported by subsequent `verify` calls.
    pub fn set_outcome(&self, outcome: PaymentOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn initialize(&self, intent: &PaymentIntent) -> Result<InitializedPayment, GatewayError> {
        let n = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let reference = format!("MOCK-{n:06}");
        self.references
            .lock()
            .unwrap()
            .insert(reference.clone(), intent.amount);
        Ok(InitializedPayment {
            authorization_url: format!("https://pay.example.test/{reference}"),
            reference,
        })
    }

    async fn verify(&self, reference: &str) -> Result<VerifiedPayment, GatewayError> {
        let amount = self
            .references
            .lock()
            .unwrap()
            .get(reference)
            .copied()
            .ok_or_else(|| GatewayError::Rejected(format!("unknown reference {reference}")))?;
        Ok(VerifiedPayment {
            outcome: *self.outcome.lock().unwrap(),
            amount,
            channel: "card".to_string(),
        })
    }
}
