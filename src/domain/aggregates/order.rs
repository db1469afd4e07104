//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

use crate::domain::aggregates::ProductSummary;
use crate::domain::value_objects::money;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Order {
    pub id: i64,
    pub stripe_checkout_id: String,
    pub amount: Decimal,
    #[serde(skip)]
    pub currency: String,
    #[serde(skip)]
    pub customer_email: String,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderItem {
    pub id: i64,
    pub quantity: i32,
    pub product: ProductSummary,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum OrderStatus { #[default] Pending, Paid }

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self { Self::Pending => "Pending", Self::Paid => "Paid" }
    }
}

impl FromStr for OrderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s { "Pending" => Ok(Self::Pending), "Paid" => Ok(Self::Paid), other => Err(format!("unknown order status: {other}")) }
    }
}

/// Paid checkout session turned into an order.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOrder {
    pub stripe_checkout_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub customer_email: String,
    pub status: OrderStatus,
}

impl NewOrder {
    /// Builds a paid order from the amount the provider reports in cents.
    pub fn paid(stripe_checkout_id: impl Into<String>, amount_total_cents: i64, currency: impl Into<String>, customer_email: impl Into<String>) -> Self {
        Self {
            stripe_checkout_id: stripe_checkout_id.into(),
            amount: money::from_minor_units(amount_total_cents),
            currency: currency.into(),
            customer_email: customer_email.into(),
            status: OrderStatus::Paid,
        }
    }
}
