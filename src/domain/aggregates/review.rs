//! Product reviews and wishlists

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::aggregates::{ProductSummary, User};
use crate::domain::value_objects::Rating;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Review {
    pub id: i64,
    #[serde(skip)]
    pub product_id: i64,
    pub user: User,
    pub rating: Rating,
    pub review: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Wishlist {
    pub id: i64,
    pub user: User,
    pub product: ProductSummary,
    pub created: DateTime<Utc>,
}

/// Outcome of toggling a product on a user's wishlist.
#[derive(Clone, Debug, PartialEq)]
pub enum WishlistToggle {
    Added(Wishlist),
    Removed,
}
