use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{as_int, non_blank, Payload};
use crate::domain::aggregates::{Wishlist, WishlistToggle};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ToggleWishlist {
    email: Option<String>,
    product_id: Option<Value>,
}

/// Adds the product (200 with the row) or removes it when already present (204).
pub async fn toggle(State(state): State<AppState>, Payload(body): Payload<ToggleWishlist>) -> Result<Response, ApiError> {
    let (Some(email), Some(product_id)) = (non_blank(body.email), body.product_id.as_ref().and_then(as_int)) else {
        return Err(ApiError::bad_request("email and product_id are required."));
    };
    let user = state.store.user_by_email(&email).await?.ok_or_else(|| ApiError::not_found("User not found."))?;
    if state.store.product_by_id(product_id).await?.is_none() {
        return Err(ApiError::not_found("Product not found."));
    }
    match state.store.toggle_wishlist(user.id, product_id).await? {
        WishlistToggle::Added(wishlist) => Ok(Json(wishlist).into_response()),
        WishlistToggle::Removed => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

#[derive(Debug, Deserialize)]
pub struct WishlistQuery {
    email: Option<String>,
    product_id: Option<String>,
}

pub async fn my_wishlists(State(state): State<AppState>, Query(q): Query<WishlistQuery>) -> Result<Json<Vec<Wishlist>>, ApiError> {
    let email = non_blank(q.email).ok_or_else(|| ApiError::bad_request("email is required."))?;
    Ok(Json(state.store.wishlists_for_email(&email).await?))
}

pub async fn product_in_wishlist(State(state): State<AppState>, Query(q): Query<WishlistQuery>) -> Result<Json<Value>, ApiError> {
    let (Some(email), Some(product_id)) = (non_blank(q.email), non_blank(q.product_id)) else {
        return Err(ApiError::bad_request("email and product_id are required."));
    };
    let product_id: i64 = product_id.parse().map_err(|_| ApiError::bad_request("product_id must be an integer."))?;
    let present = state.store.product_in_wishlist(&email, product_id).await?;
    Ok(Json(json!({ "product_in_wishlist": present })))
}
