// --- File: crates/tunnelgate_payment/src/client.rs ---
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, error, info};
use tunnelgate_common::create_client;
use tunnelgate_common::services::{
    PaymentCreated, PaymentInfo, PaymentIntent, PaymentState, Settlement, METADATA_PLAN, METADATA_USER_REF,
};
use tunnelgate_config::PaymentConfig;
use uuid::Uuid;

use crate::error::PaymentError;
use crate::webhook;

const IDEMPOTENCE_HEADER: &str = "Idempotence-Key";

// --- Gateway wire format ---

#[derive(Serialize, Debug)]
struct CreatePaymentBody<'a> {
    amount: i64,
    currency: &'a str,
    return_url: &'a str,
    metadata: HashMap<&'static str, &'a str>,
}

#[derive(Deserialize, Debug)]
struct GatewayPayment {
    id: String,
    status: PaymentState,
    confirmation_url: Option<String>,
    amount: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Deserialize, Debug)]
struct GatewayErrorBody {
    message: Option<String>,
    description: Option<String>,
}

/// Client for the payment gateway. Built explicitly and handed to whoever needs it.
///
/// No call is ever retried: a repeated creation could charge twice.
pub struct PaymentClient {
    http: Client,
    api_url: String,
    api_key: String,
    api_secret: String,
    webhook_secret: String,
}

impl fmt::Debug for PaymentClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentClient")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

fn required(value: &str, name: &str) -> Result<String, PaymentError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "secret_from_env" {
        return Err(PaymentError::ConfigError(format!("payment.{} is not set", name)));
    }
    Ok(trimmed.to_string())
}

impl PaymentClient {
    /// Builds a client from configuration. A missing endpoint or secret is fatal here.
    pub fn new(config: &PaymentConfig) -> Result<Self, PaymentError> {
        let api_url = required(&config.api_url, "api_url")?.trim_end_matches('/').to_string();
        let http = create_client(config.request_timeout_secs, true).map_err(|source| PaymentError::RequestError {
            operation: "build_client",
            source,
        })?;

        Ok(Self {
            http,
            api_url,
            api_key: required(&config.api_key, "api_key")?,
            api_secret: required(&config.api_secret, "api_secret")?,
            webhook_secret: required(&config.webhook_secret, "webhook_secret")?,
        })
    }

    /// Creates a payment. Sent exactly once, with a fresh idempotence key.
    pub async fn create_payment(&self, intent: &PaymentIntent) -> Result<PaymentCreated, PaymentError> {
        const OPERATION: &str = "create_payment";
        let idempotence_key = Uuid::new_v4().to_string();
        let body = CreatePaymentBody {
            amount: intent.amount,
            currency: &intent.currency,
            return_url: &intent.return_url,
            metadata: HashMap::from([
                (METADATA_USER_REF, intent.user_ref.as_str()),
                (METADATA_PLAN, intent.plan.as_str()),
            ]),
        };

        info!(
            "[Payment] Creating payment of {} {} for user {} (plan {})",
            intent.amount, intent.currency, intent.user_ref, intent.plan
        );
        let response = self
            .http
            .post(format!("{}/payments", self.api_url))
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .header(IDEMPOTENCE_HEADER, &idempotence_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| PaymentError::RequestError { operation: OPERATION, source })?;

        let payment = read_payment(response, OPERATION).await?;
        info!("[Payment] Payment {} created with status {:?}", payment.id, payment.status);
        Ok(PaymentCreated {
            id: payment.id,
            status: payment.status,
            redirect_url: payment.confirmation_url,
        })
    }

    /// Fetches the current state of a payment once.
    pub async fn get_payment_status(&self, payment_id: &str) -> Result<PaymentInfo, PaymentError> {
        const OPERATION: &str = "get_payment_status";
        let url = format!("{}/payments/{}", self.api_url, checked_payment_id(payment_id)?);
        let response = self
            .http
            .get(url)
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .send()
            .await
            .map_err(|source| PaymentError::RequestError { operation: OPERATION, source })?;

        let payment = read_payment(response, OPERATION).await?;
        debug!("[Payment] Payment {} is {:?}", payment.id, payment.status);
        Ok(PaymentInfo {
            id: payment.id,
            status: payment.status,
            amount: payment.amount,
            currency: payment.currency,
            metadata: payment.metadata,
        })
    }

    /// Whether `signature` is the HMAC of `raw_body` under the webhook secret.
    pub fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str) -> bool {
        webhook::verify_signature(raw_body, signature, &self.webhook_secret)
    }

    /// Verifies the signature and decodes the notification. Never decodes an unverified body.
    pub fn parse_webhook(&self, raw_body: &[u8], signature: Option<&str>) -> Result<Settlement, PaymentError> {
        webhook::parse_settlement(raw_body, signature, &self.webhook_secret)
    }
}

/// Payment ids end up in the gateway URL; only `[A-Za-z0-9_-]`, up to 64
/// characters, is let through.
fn checked_payment_id(payment_id: &str) -> Result<&str, PaymentError> {
    let valid = (1..=64).contains(&payment_id.len())
        && payment_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(PaymentError::InvalidPaymentId(payment_id.to_string()));
    }
    Ok(payment_id)
}

async fn read_payment(response: Response, operation: &'static str) -> Result<GatewayPayment, PaymentError> {
    let status = response.status();
    let body_text = response
        .text()
        .await
        .map_err(|source| PaymentError::RequestError { operation, source })?;

    if !status.is_success() {
        let message = match serde_json::from_str::<GatewayErrorBody>(&body_text) {
            Ok(GatewayErrorBody { description: Some(d), .. }) => d,
            Ok(GatewayErrorBody { message: Some(m), .. }) => m,
            _ => body_text,
        };
        error!("[Payment] {} failed with HTTP {}: {}", operation, status, message);
        return Err(PaymentError::ApiError {
            operation,
            status_code: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body_text).map_err(|source| PaymentError::ParseError { operation, source })
}
