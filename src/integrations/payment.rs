use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use thiserror::Error;
use tracing::{error, info};

use crate::config::GatewayConfig;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct GatewayRefund {
    pub id: String,
    pub payment_id: String,
    pub amount: i64,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Payment signature mismatch")]
    SignatureMismatch,
    #[error("Gateway request failed: {0}")]
    Request(String),
    #[error("Gateway rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// External payment processor. Order creation and refunds are remote calls;
/// signature checking uses the shared secret.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Publishable key handed to the client checkout widget.
    fn key_id(&self) -> &str;

    fn currency(&self) -> &str;

    async fn create_order(
        &self,
        amount_minor: i64,
        receipt: &str,
        notes: serde_json::Value,
    ) -> Result<GatewayOrder, GatewayError>;

    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<(), GatewayError>;

    async fn refund(
        &self,
        payment_id: &str,
        amount_minor: Option<i64>,
    ) -> Result<GatewayRefund, GatewayError>;
}

/// Hex HMAC-SHA256 of `order_id|payment_id`, the signature Razorpay returns to
/// the client after a successful payment.
pub fn payment_signature(secret: &str, order_id: &str, payment_id: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> Result<(), GatewayError> {
    let expected = hex::decode(signature).map_err(|_| GatewayError::SignatureMismatch)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| GatewayError::SignatureMismatch)?;
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| GatewayError::SignatureMismatch)
}

#[derive(Clone, Debug)]
pub struct RazorpayGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl RazorpayGateway {
    /// Every call is bounded by the configured timeout and never retried.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| GatewayError::Request(err.to_string()))?;
        Ok(Self { client, config })
    }

    async fn post<T>(&self, path: &str, body: serde_json::Value) -> Result<T, GatewayError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                error!(url = %url, error = %err, "Gateway request failed");
                GatewayError::Request(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(url = %url, status = %status, body = %body, "Gateway rejected request");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|err| GatewayError::Request(err.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> &str {
        &self.config.key_id
    }

    fn currency(&self) -> &str {
        &self.config.currency
    }

    async fn create_order(
        &self,
        amount_minor: i64,
        receipt: &str,
        notes: serde_json::Value,
    ) -> Result<GatewayOrder, GatewayError> {
        let order: GatewayOrder = self
            .post(
                "orders",
                json!({
                    "amount": amount_minor,
                    "currency": self.config.currency,
                    "receipt": receipt,
                    "payment_capture": 1,
                    "notes": notes,
                }),
            )
            .await?;
        info!(gateway_order_id = %order.id, amount = order.amount, "Gateway order created");
        Ok(order)
    }

    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<(), GatewayError> {
        verify_signature(&self.config.key_secret, order_id, payment_id, signature)
    }

    async fn refund(
        &self,
        payment_id: &str,
        amount_minor: Option<i64>,
    ) -> Result<GatewayRefund, GatewayError> {
        let body = match amount_minor {
            Some(amount) => json!({ "amount": amount }),
            None => json!({}),
        };
        let refund: GatewayRefund = self
            .post(&format!("payments/{payment_id}/refund"), body)
            .await?;
        info!(payment_id = %payment_id, refund_id = %refund.id, "Gateway refund executed");
        Ok(refund)
    }
}
