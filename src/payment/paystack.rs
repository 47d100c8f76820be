//! Paystack integration via REST API (no SDK dependency).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{
    GatewayError, InitializedPayment, PaymentGateway, PaymentIntent, PaymentOutcome,
    VerifiedPayment,
};
use crate::domain::status::PaymentMethod;

const CURRENCY: &str = "GHS";
/// Pesewas per cedi; Paystack amounts are in the smallest currency unit.
const MINOR_UNITS: i64 = 100;

pub struct PaystackGateway {
    client: reqwest::Client,
    secret_key: String,
    base_url: String,
}

impl PaystackGateway {
    pub fn new(secret_key: String, base_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            secret_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn channels(method: PaymentMethod) -> &'static [&'static str] {
        match method {
            PaymentMethod::CreditCard => &["card"],
            PaymentMethod::MtnMobile | PaymentMethod::Telecel => &["mobile_money"],
            PaymentMethod::BankTransfer => &["bank_transfer"],
        }
    }

    fn to_minor_units(amount: i64) -> i64 {
        amount * MINOR_UNITS
    }

    fn from_minor_units(amount: i64) -> i64 {
        amount / MINOR_UNITS
    }
}

#[derive(Debug, Deserialize)]
struct ProviderResponse<T> {
    status: bool,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    amount: i64,
    #[serde(default)]
    channel: Option<String>,
}

fn classify_send_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Unavailable("request to payment provider timed out".into())
    } else {
        GatewayError::Unavailable(format!("payment provider unreachable: {err}"))
    }
}

async fn read_provider_body<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = resp.status();
    if status.is_server_error() {
        return Err(GatewayError::Unavailable(format!(
            "payment provider returned {status}"
        )));
    }
    let body: ProviderResponse<T> = resp
        .json()
        .await
        .map_err(|e| GatewayError::Unavailable(format!("malformed provider response: {e}")))?;
    if !body.status || status.is_client_error() {
        return Err(GatewayError::Rejected(
            body.message
                .unwrap_or_else(|| format!("provider returned {status}")),
        ));
    }
    body.data
        .ok_or_else(|| GatewayError::Unavailable("provider response missing data".into()))
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn initialize(&self, intent: &PaymentIntent) -> Result<InitializedPayment, GatewayError> {
        let payload = json!({
            "email": intent.email,
            "amount": Self::to_minor_units(intent.amount),
            "currency": CURRENCY,
            "channels": Self::channels(intent.method),
            "metadata": { "order_id": intent.order_id },
        });

        let resp = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(classify_send_error)?;

        let data: InitData = read_provider_body(resp).await?;
        Ok(InitializedPayment {
            reference: data.reference,
            authorization_url: data.authorization_url,
        })
    }

    async fn verify(&self, reference: &str) -> Result<VerifiedPayment, GatewayError> {
        let resp = self
            .client
            .get(format!("{}/transaction/verify/{reference}", self.base_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(classify_send_error)?;

        let data: VerifyData = read_provider_body(resp).await?;
        let outcome = match data.status.as_str() {
            "success" => PaymentOutcome::Success,
            // "failed", "abandoned", "reversed" and anything unknown all
            // count as a failed attempt, never silently as success.
            _ => PaymentOutcome::Failed,
        };
        Ok(VerifiedPayment {
            outcome,
            amount: Self::from_minor_units(data.amount),
            channel: data.channel.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_mapping_covers_every_method() {
        assert_eq!(
            PaystackGateway::channels(PaymentMethod::CreditCard),
            &["card"]
        );
        assert_eq!(
            PaystackGateway::channels(PaymentMethod::MtnMobile),
            &["mobile_money"]
        );
        assert_eq!(
            PaystackGateway::channels(PaymentMethod::Telecel),
            &["mobile_money"]
        );
        assert_eq!(
            PaystackGateway::channels(PaymentMethod::BankTransfer),
            &["bank_transfer"]
        );
    }

    #[test]
    fn amount_scaling_round_trips() {
        assert_eq!(PaystackGateway::to_minor_units(250), 25_000);
        assert_eq!(PaystackGateway::from_minor_units(25_000), 250);
    }

    #[test]
    fn verify_payload_parses_and_maps_outcomes() {
        let raw = r#"{
            "status": true,
            "message": "Verification successful",
            "data": { "status": "success", "amount": 25000, "channel": "mobile_money" }
        }"#;
        let parsed: ProviderResponse<VerifyData> = serde_json::from_str(raw).unwrap();
        let data = parsed.data.unwrap();
        assert!(parsed.status);
        assert_eq!(data.status, "success");
        assert_eq!(data.amount, 25000);

        let raw = r#"{
            "status": true,
            "message": "Verification successful",
            "data": { "status": "abandoned", "amount": 25000 }
        }"#;
        let parsed: ProviderResponse<VerifyData> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.data.unwrap().status, "abandoned");
    }
}
