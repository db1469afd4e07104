//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::aggregates::ProductSummary;
use crate::domain::value_objects::line_total;

#[derive(Clone, Debug, PartialEq)]
pub struct Cart {
    pub id: i64,
    pub cart_code: String,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CartItem {
    pub id: i64,
    pub product: ProductSummary,
    pub quantity: i32,
}

impl CartItem {
    pub fn sub_total(&self) -> Decimal { line_total(self.product.price, self.quantity) }
}

impl Cart {
    pub fn total(&self) -> Decimal { self.items.iter().map(CartItem::sub_total).sum() }
    pub fn total_quantity(&self) -> i64 { self.items.iter().map(|i| i64::from(i.quantity)).sum() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn contains(&self, product_id: i64) -> bool { self.items.iter().any(|i| i.product.id == product_id) }
}
