//! Payment provider integration. The rest of the system talks to the
//! [`PaymentGateway`] trait only; provider currency scaling and channel
//! naming live in the adapter implementations.

pub mod mock;
pub mod paystack;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::{domain::status::PaymentMethod, error::AppError};

/// Transient record for an in-flight payment attempt. Only the provider
/// reference survives past initialization (stored on the order).
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub order_id: Uuid,
    /// Amount in major currency units; adapters own any scaling.
    pub amount: i64,
    pub email: String,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone)]
pub struct InitializedPayment {
    pub reference: String,
    pub authorization_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success,
    Failed,
}

#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    pub outcome: PaymentOutcome,
    /// Amount in major currency units, scaled back from the provider.
    pub amount: i64,
    pub channel: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Provider unreachable, timed out, or not configured. Recoverable by
    /// retrying later; never treated as a payment outcome.
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),

    /// Provider reached but it refused the request.
    #[error("payment gateway rejected the request: {0}")]
    Rejected(String),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(msg) => AppError::GatewayUnavailable(msg),
            GatewayError::Rejected(msg) => AppError::BadRequest(msg),
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, intent: &PaymentIntent) -> Result<InitializedPayment, GatewayError>;

    /// Must be safe to call repeatedly for the same reference; applying the
    /// result idempotently is the caller's job.
    async fn verify(&self, reference: &str) -> Result<VerifiedPayment, GatewayError>;
}

/// Stand-in used when no provider credentials are configured at startup.
/// Every call fails fast instead of a nullable client being checked ad hoc
/// deep in the call stack.
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn initialize(
        &self,
        _intent: &PaymentIntent,
    ) -> Result<InitializedPayment, GatewayError> {
        Err(GatewayError::Unavailable(
            "payment gateway is not configured".into(),
        ))
    }

    async fn verify(&self, _reference: &str) -> Result<VerifiedPayment, GatewayError> {
        Err(GatewayError::Unavailable(
            "payment gateway is not configured".into(),
        ))
    }
}
