//! Shop API - E-commerce REST backend
//!
//! Product catalog, anonymous carts, reviews and wishlists with JWT auth and
//! Stripe Checkout, on `PostgreSQL`.
//!
//! ## Features
//! - Product and category CRUD with filtering, search and pagination
//! - Shopping cart keyed by a client-generated cart code
//! - Reviews with a per-product rating aggregate
//! - Stripe checkout sessions and signed webhook fulfilment
//! - Customer addresses and order history
//! - Deployment tool (`shop-deploy`)

pub mod auth;
pub mod config;
pub mod deploy;
pub mod domain;
pub mod error;
pub mod messaging;
pub mod payments;
pub mod routes;
pub mod state;
pub mod store;

use axum::Router;
use tower::Layer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};

pub use config::AppConfig;
pub use error::ApiError;
pub use state::AppState;

/// Router with trailing-slash normalization applied ahead of routing.
pub fn app(state: AppState) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(routes::router(state))
}
