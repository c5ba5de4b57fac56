//! Razorpay Orders API client and checkout signature verification.

use crate::config::RazorpayConfig;
use anyhow::{anyhow, Result};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::utils::{hmac_sha256_hex, verify_hmac_sha256_hex};

#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    config: RazorpayConfig,
}

/// Request to create a Razorpay order.
#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    /// Amount in smallest currency unit (paise for INR).
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    notes: &'a OrderNotes,
}

/// Metadata tying a gateway order to the purchasing user and plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderNotes {
    pub user_id: String,
    pub plan_id: String,
}

/// Order as returned by Razorpay.
#[derive(Debug, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
    /// Razorpay returns `[]` when no notes were attached.
    #[serde(default, deserialize_with = "notes_or_empty")]
    pub notes: Option<OrderNotes>,
}

fn notes_or_empty<'de, D>(deserializer: D) -> std::result::Result<Option<OrderNotes>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Deserialize)]
struct RazorpayError {
    error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    code: String,
    description: String,
}

/// Checkout callback fields; all caller supplied and untrusted.
#[derive(Debug)]
pub struct PaymentVerification<'a> {
    pub razorpay_order_id: &'a str,
    pub razorpay_payment_id: &'a str,
    pub razorpay_signature: &'a str,
}

impl RazorpayClient {
    pub fn new(client: Client, config: RazorpayConfig) -> Self {
        Self { client, config }
    }

    /// Check if Razorpay is configured (credentials are set).
    pub fn is_configured(&self) -> bool {
        !self.config.key_id.is_empty() && !self.config.key_secret.expose_secret().is_empty()
    }

    /// Public key handed to the browser checkout widget.
    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    pub fn currency(&self) -> &str {
        &self.config.currency
    }

    pub async fn create_order(
        &self,
        amount: i64,
        receipt: &str,
        notes: &OrderNotes,
    ) -> Result<RazorpayOrder> {
        if !self.is_configured() {
            return Err(anyhow!("Razorpay credentials not configured"));
        }

        let request = CreateOrderRequest {
            amount,
            currency: &self.config.currency,
            receipt,
            notes,
        };

        let response = self
            .client
            .post(format!("{}/orders", self.config.api_base_url))
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            let order: RazorpayOrder = serde_json::from_str(&body)?;
            tracing::info!(
                order_id = %order.id,
                amount = order.amount,
                currency = %order.currency,
                "Razorpay order created"
            );
            Ok(order)
        } else {
            Err(Self::api_error("order creation", status, &body))
        }
    }

    /// Fetch an existing order by ID.
    pub async fn get_order(&self, order_id: &str) -> Result<RazorpayOrder> {
        if !self.is_configured() {
            return Err(anyhow!("Razorpay credentials not configured"));
        }

        let response = self
            .client
            .get(format!("{}/orders/{}", self.config.api_base_url, order_id))
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            Ok(serde_json::from_str(&body)?)
        } else {
            Err(Self::api_error("order lookup", status, &body))
        }
    }

    /// `HMAC-SHA256(order_id + "|" + payment_id, key_secret)`, compared in
    /// constant time against the checkout signature.
    pub fn verify_payment_signature(&self, verification: &PaymentVerification<'_>) -> Result<bool> {
        let payload = Self::signature_payload(
            verification.razorpay_order_id,
            verification.razorpay_payment_id,
        );
        let is_valid = verify_hmac_sha256_hex(
            self.config.key_secret.expose_secret(),
            &payload,
            verification.razorpay_signature,
        )?;

        if is_valid {
            tracing::info!(
                order_id = %verification.razorpay_order_id,
                payment_id = %verification.razorpay_payment_id,
                "Payment signature verified successfully"
            );
        } else {
            tracing::warn!(
                order_id = %verification.razorpay_order_id,
                payment_id = %verification.razorpay_payment_id,
                "Payment signature verification failed"
            );
        }

        Ok(is_valid)
    }

    /// Signature Razorpay checkout would produce for this order/payment.
    pub fn sign_payment(&self, order_id: &str, payment_id: &str) -> Result<String> {
        hmac_sha256_hex(
            self.config.key_secret.expose_secret(),
            &Self::signature_payload(order_id, payment_id),
        )
    }

    fn signature_payload(order_id: &str, payment_id: &str) -> String {
        format!("{}|{}", order_id, payment_id)
    }

    fn api_error(action: &str, status: reqwest::StatusCode, body: &str) -> anyhow::Error {
        match serde_json::from_str::<RazorpayError>(body) {
            Ok(err) => {
                tracing::error!(
                    status = %status,
                    code = %err.error.code,
                    description = %err.error.description,
                    "Razorpay {} failed", action
                );
                anyhow!(
                    "Razorpay error: {} - {}",
                    err.error.code,
                    err.error.description
                )
            }
            Err(_) => {
                tracing::error!(status = %status, "Razorpay {} failed", action);
                anyhow!("Razorpay {} failed with status {}", action, status)
            }
        }
    }
}
