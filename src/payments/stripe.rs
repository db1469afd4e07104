//! Minimal Stripe REST client covering Checkout Session creation.
//!
//! Requests are form encoded with Stripe's bracketed key syntax
//! (`line_items[0][price_data][currency]=usd`).

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use super::PaymentError;
use crate::config::StripeConfig;
use crate::domain::aggregates::Cart;
use crate::domain::value_objects::money;

/// Flat fee added to every checkout, in cents.
pub const VAT_FEE_CENTS: i64 = 500;
const CURRENCY: &str = "usd";

#[derive(Clone)]
pub struct StripeClient {
    inner: Arc<StripeClientInner>,
}

struct StripeClientInner {
    client: reqwest::Client,
    api_base: Url,
    secret_key: SecretString,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeClient {
    pub fn new(api_base: Url, secret_key: SecretString) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { inner: Arc::new(StripeClientInner { client, api_base, secret_key }) })
    }

    /// `None` when no secret key is configured.
    pub fn from_config(config: &StripeConfig) -> Result<Option<Self>, PaymentError> {
        config.secret_key.clone().map(|key| Self::new(config.api_base.clone(), key)).transpose()
    }

    /// Creates a Checkout Session and returns Stripe's session object unchanged.
    pub async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<serde_json::Value, PaymentError> {
        let url = self.inner.api_base.join("v1/checkout/sessions").map_err(|e| PaymentError::Provider(e.to_string()))?;
        let response = self
            .inner
            .client
            .post(url)
            .bearer_auth(self.inner.secret_key.expose_secret())
            .form(&request.form_fields())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| format!("Stripe returned {status}"));
            tracing::warn!(%status, %message, "Checkout session creation rejected");
            return Err(PaymentError::Provider(message));
        }
        serde_json::from_str(&body).map_err(|e| PaymentError::MalformedPayload(e.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutLine {
    pub name: String,
    pub unit_amount: i64,
    pub quantity: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub customer_email: Option<String>,
    pub cart_code: String,
    pub lines: Vec<CheckoutLine>,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    /// One line per cart item plus the VAT fee line.
    pub fn from_cart(cart: &Cart, customer_email: Option<String>, success_url: &str, cancel_url: &str) -> Self {
        let mut lines: Vec<CheckoutLine> = cart
            .items
            .iter()
            .map(|item| CheckoutLine {
                name: item.product.name.clone(),
                unit_amount: money::to_minor_units(item.product.price),
                quantity: i64::from(item.quantity),
            })
            .collect();
        lines.push(CheckoutLine { name: "VAT Fee".into(), unit_amount: VAT_FEE_CENTS, quantity: 1 });
        Self {
            customer_email,
            cart_code: cart.cart_code.clone(),
            lines,
            success_url: success_url.to_string(),
            cancel_url: cancel_url.to_string(),
        }
    }

    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
            ("metadata[cart_code]".to_string(), self.cart_code.clone()),
        ];
        if let Some(email) = &self.customer_email {
            fields.push(("customer_email".to_string(), email.clone()));
        }
        for (i, line) in self.lines.iter().enumerate() {
            let prefix = format!("line_items[{i}]");
            fields.push((format!("{prefix}[price_data][currency]"), CURRENCY.to_string()));
            fields.push((format!("{prefix}[price_data][product_data][name]"), line.name.clone()));
            fields.push((format!("{prefix}[price_data][unit_amount]"), line.unit_amount.to_string()));
            fields.push((format!("{prefix}[quantity]"), line.quantity.to_string()));
        }
        fields
    }
}
