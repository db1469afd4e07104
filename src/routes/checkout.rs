//! Stripe Checkout session creation and webhook fulfilment.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{as_text, non_blank, Payload};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::error::ApiError;
use crate::payments::{verify_signature, CheckoutRequest, PaymentError, WebhookEvent};
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    cart_code: Option<Value>,
    email: Option<String>,
}

pub async fn create_checkout_session(State(state): State<AppState>, Payload(body): Payload<CheckoutBody>) -> Result<Json<Value>, ApiError> {
    let code = as_text(body.cart_code.as_ref()).ok_or_else(|| ApiError::bad_request("cart_code is required."))?;
    let cart = state.store.cart_by_code(&code).await?.ok_or_else(|| ApiError::not_found("Cart not found."))?;
    if cart.is_empty() {
        return Err(ApiError::bad_request("Cart is empty."));
    }
    let stripe = state.stripe()?;
    let checkout = &state.config.stripe;
    let request = CheckoutRequest::from_cart(&cart, non_blank(body.email), &checkout.success_url, &checkout.cancel_url);
    let session = stripe.create_checkout_session(&request).await?;
    tracing::info!(cart_code = %cart.cart_code, items = cart.items.len(), "Checkout session created");
    Ok(Json(json!({ "data": session })))
}

/// Verifies a signed delivery and turns completed checkouts into orders.
pub async fn webhook(State(state): State<AppState>, headers: HeaderMap, payload: Bytes) -> Result<StatusCode, ApiError> {
    let secret = state.config.stripe.webhook_secret.as_ref().ok_or(PaymentError::NotConfigured)?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| PaymentError::InvalidSignature("missing header".into()))?;
    if let Err(e) = verify_signature(&payload, signature, secret.expose_secret(), Utc::now().timestamp()) {
        tracing::warn!(error = %e, "Webhook rejected");
        return Err(e.into());
    }

    let event = WebhookEvent::parse(&payload)?;
    if !event.is_payment_completed() {
        tracing::debug!(kind = %event.kind, "Ignoring webhook event");
        return Ok(StatusCode::OK);
    }

    let session = event.checkout_session()?;
    let Some(order) = state.store.fulfill_checkout(session.to_order(), session.cart_code()).await? else {
        tracing::info!(checkout_id = %session.id, "Checkout already fulfilled");
        return Ok(StatusCode::OK);
    };
    tracing::info!(order_id = order.id, checkout_id = %order.stripe_checkout_id, amount = %order.amount, "Order fulfilled");
    state
        .events
        .publish(&DomainEvent::Order(OrderEvent::Paid {
            order_id: order.id,
            stripe_checkout_id: order.stripe_checkout_id.clone(),
            customer_email: order.customer_email.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
        }))
        .await;
    Ok(StatusCode::OK)
}
