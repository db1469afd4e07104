//! Stripe Checkout integration: session creation over the REST API and
//! verification of signed webhook deliveries.

mod stripe;
mod webhook;

pub use stripe::{CheckoutLine, CheckoutRequest, StripeClient, VAT_FEE_CENTS};
pub use webhook::{verify_signature, CheckoutSession, WebhookEvent, SIGNATURE_TOLERANCE_SECS};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payments are not configured")]
    NotConfigured,

    /// Error message returned by the provider.
    #[error("{0}")]
    Provider(String),

    #[error("request to payment provider failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}
