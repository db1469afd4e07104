//! Signed webhook deliveries.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::PaymentError;
use crate::domain::aggregates::NewOrder;

/// Maximum age of a signed delivery.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`) against
/// an HMAC-SHA256 of `"{t}.{payload}"`.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, now: i64) -> Result<(), PaymentError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(PaymentError::InvalidSignature("no v1 signature".into()));
    }
    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(PaymentError::InvalidSignature("timestamp outside tolerance".into()));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures
        .iter()
        .filter_map(|sig| hex::decode(sig).ok())
        .any(|sig| mac.clone().verify_slice(&sig).is_ok());
    if matched { Ok(()) } else { Err(PaymentError::InvalidSignature("signature mismatch".into())) }
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CheckoutSession {
    pub id: String,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub customer_email: Option<String>,
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CustomerDetails {
    pub email: Option<String>,
}

impl WebhookEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, PaymentError> {
        serde_json::from_slice(payload).map_err(|e| PaymentError::MalformedPayload(e.to_string()))
    }

    /// Event types that mean a checkout has been paid.
    pub fn is_payment_completed(&self) -> bool {
        matches!(self.kind.as_str(), "checkout.session.completed" | "checkout.session.async_payment_succeeded")
    }

    pub fn checkout_session(&self) -> Result<CheckoutSession, PaymentError> {
        serde_json::from_value(self.data.object.clone()).map_err(|e| PaymentError::MalformedPayload(e.to_string()))
    }
}

impl CheckoutSession {
    pub fn cart_code(&self) -> Option<&str> { self.metadata.get("cart_code").map(String::as_str) }

    pub fn email(&self) -> Option<&str> {
        self.customer_email.as_deref().or_else(|| self.customer_details.as_ref().and_then(|d| d.email.as_deref()))
    }

    pub fn to_order(&self) -> NewOrder {
        NewOrder::paid(
            self.id.clone(),
            self.amount_total.unwrap_or_default(),
            self.currency.clone().unwrap_or_else(|| "usd".into()),
            self.email().unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    const SECRET: &str = "whsec_test";

    fn sign(payload: &[u8], t: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{t}.").as_bytes());
        mac.update(payload);
        format!("t={t},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"type":"ping"}"#;
        assert!(verify_signature(payload, &sign(payload, 1_700_000_000), SECRET, 1_700_000_100).is_ok());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let header = sign(b"original", 1_700_000_000);
        assert!(verify_signature(b"tampered", &header, SECRET, 1_700_000_000).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = b"{}";
        let header = sign(payload, 1_700_000_000);
        let err = verify_signature(payload, &header, SECRET, 1_700_000_000 + SIGNATURE_TOLERANCE_SECS + 1).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature(_)));
    }

    #[test]
    fn test_extreme_timestamps_rejected() {
        let payload = b"{}";
        for t in [i64::MIN, i64::MAX] {
            let err = verify_signature(payload, &sign(payload, t), SECRET, 1_700_000_000).unwrap_err();
            assert!(matches!(err, PaymentError::InvalidSignature(_)));
        }
        assert!(verify_signature(payload, "t=-9223372036854775808,v1=00", SECRET, i64::MAX).is_err());
    }

    #[test]
    fn test_malformed_header_rejected() {
        assert!(verify_signature(b"{}", "garbage", SECRET, 0).is_err());
        assert!(verify_signature(b"{}", "t=1", SECRET, 1).is_err());
    }

    #[test]
    fn test_completed_session_to_order() {
        let payload = br#"{
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_test_1", "amount_total": 125500, "currency": "usd",
                     "customer_email": null, "customer_details": {"email": "buyer@example.com"},
                     "metadata": {"cart_code": "abc123"}}}
        }"#;
        let event = WebhookEvent::parse(payload).unwrap();
        assert!(event.is_payment_completed());
        let session = event.checkout_session().unwrap();
        assert_eq!(session.cart_code(), Some("abc123"));
        let order = session.to_order();
        assert_eq!(order.amount, Decimal::new(125_500, 2));
        assert_eq!(order.customer_email, "buyer@example.com");
    }

    #[test]
    fn test_other_events_are_not_payments() {
        let event = WebhookEvent::parse(br#"{"type":"invoice.paid","data":{"object":{}}}"#).unwrap();
        assert!(!event.is_payment_completed());
    }
}
