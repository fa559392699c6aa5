use std::time::Duration;

use async_trait::async_trait;
use log::error;
use serde::Deserialize;

use crate::error::{ApiError, Result, StartupError};

pub const CURRENCY: &str = "usd";

/// Creates payment intents with an external gateway.
///
/// Only the client secret comes back; completion is recorded later through an explicit
/// save-payment call.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, amount: i64, currency: &str) -> Result<String>;
}

/// Converts a price in currency units to the smallest unit the gateway charges in.
pub fn amount_in_cents(price: f64) -> Result<i64> {
    if !price.is_finite() || price <= 0.0 {
        return Err(ApiError::InvalidParameter(format!(
            "price must be a positive number, got {}",
            price
        )));
    }

    let cents = (price * 100.0).round();
    if cents < 1.0 || cents > i64::MAX as f64 {
        return Err(ApiError::InvalidParameter(format!(
            "price {} is out of range",
            price
        )));
    }

    Ok(cents as i64)
}

#[derive(Deserialize)]
struct StripeIntent {
    client_secret: String,
}

pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: Option<String>,
}

impl StripeGateway {
    pub fn new(
        api_base: &str,
        secret_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StartupError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(StripeGateway {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.filter(|key| !key.is_empty()),
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(&self, amount: i64, currency: &str) -> Result<String> {
        let secret_key = self.secret_key.as_deref().ok_or_else(|| {
            error!("STRIPE_SECRET_KEY is not configured");
            ApiError::UpstreamUnavailable("payment gateway not configured".to_string())
        })?;

        let amount = amount.to_string();
        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(secret_key)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", currency),
                ("payment_method_types[]", "card"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("payment intent rejected with {}: {}", status, body);
            return Err(ApiError::UpstreamUnavailable(
                "payment gateway rejected the request".to_string(),
            ));
        }

        let intent: StripeIntent = response.json().await?;
        Ok(intent.client_secret)
    }
}
