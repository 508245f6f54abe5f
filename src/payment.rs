//! Payment provider pass-through.
//!
//! Creates payment intents on Stripe and verifies webhook signatures. No
//! payment state is kept here.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Default tolerance between the signed timestamp and now.
pub const SIGNATURE_TOLERANCE: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment provider not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Payment provider error: {0}")]
    Upstream(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        amount_cents: i64,
        currency: &str,
    ) -> Result<PaymentIntent, PaymentError>;
}

/// Convert a price in major units to cents.
pub fn amount_in_cents(price: f64) -> Result<i64, PaymentError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(PaymentError::InvalidAmount(format!(
            "price must be a positive number, got {price}"
        )));
    }

    let cents = (price * 100.0).round();
    if cents < 1.0 || cents > i64::MAX as f64 {
        return Err(PaymentError::InvalidAmount(format!(
            "price {price} is out of range"
        )));
    }
    Ok(cents as i64)
}

pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: SecretString,
    api_base: String,
}

impl StripeGateway {
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            api_base: STRIPE_API_BASE.to_string(),
        }
    }

    /// Point the gateway at another base URL (e.g. a local mock)
    pub fn api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_payment_intent(
        &self,
        amount_cents: i64,
        currency: &str,
    ) -> Result<PaymentIntent, PaymentError> {
        let amount = amount_cents.to_string();
        let params = [
            ("amount", amount.as_str()),
            ("currency", currency),
            ("payment_method_types[]", "card"),
        ];

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&params)
            .send()
            .await
            .map_err(|err| PaymentError::Upstream(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| status.to_string());
            return Err(PaymentError::Upstream(detail));
        }

        response
            .json::<PaymentIntent>()
            .await
            .map_err(|err| PaymentError::Upstream(err.to_string()))
    }
}

/// Verifies `Stripe-Signature` headers of the form `t=<unix>,v1=<hex>[,v1=..]`.
pub struct WebhookVerifier {
    secret: SecretString,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            tolerance: SIGNATURE_TOLERANCE,
        }
    }

    pub fn tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Check `header` against `payload` as of unix time `now`
    pub fn verify(&self, header: &str, payload: &[u8], now: i64) -> Result<(), PaymentError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".to_string()))?;
        if signatures.is_empty() {
            return Err(PaymentError::InvalidSignature(
                "missing v1 signature".to_string(),
            ));
        }

        let age = now.abs_diff(timestamp);
        if age > self.tolerance.as_secs() {
            return Err(PaymentError::InvalidSignature(format!(
                "timestamp outside tolerance by {age}s"
            )));
        }

        let matched = signatures.iter().any(|signature| {
            let Ok(expected) = hex::decode(signature) else {
                return false;
            };
            self.mac_for(timestamp, payload)
                .is_some_and(|mac| mac.verify_slice(&expected).is_ok())
        });

        if matched {
            Ok(())
        } else {
            Err(PaymentError::InvalidSignature(
                "no signature matched the payload".to_string(),
            ))
        }
    }

    fn mac_for(&self, timestamp: i64, payload: &[u8]) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes()).ok()?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Some(mac)
    }

    /// Header value for `payload`, as the provider would send it
    pub fn sign(&self, timestamp: i64, payload: &[u8]) -> String {
        let signature = self
            .mac_for(timestamp, payload)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default();
        format!("t={timestamp},v1={signature}")
    }
}
