//! Anonymous carts keyed by a client-generated code.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{as_int, as_text, non_blank, Payload};
use crate::domain::aggregates::{Cart, CartItem, ProductSummary};
use crate::domain::value_objects::CartCode;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CartItemView {
    id: i64,
    product: ProductSummary,
    quantity: i32,
    sub_total: Decimal,
}

impl From<CartItem> for CartItemView {
    fn from(item: CartItem) -> Self {
        Self { sub_total: item.sub_total(), id: item.id, product: item.product, quantity: item.quantity }
    }
}

#[derive(Debug, Serialize)]
pub struct CartView {
    id: i64,
    cart_code: String,
    cartitems: Vec<CartItemView>,
    cart_total: Decimal,
}

impl From<Cart> for CartView {
    fn from(cart: Cart) -> Self {
        Self {
            cart_total: cart.total(),
            id: cart.id,
            cart_code: cart.cart_code,
            cartitems: cart.items.into_iter().map(CartItemView::from).collect(),
        }
    }
}

async fn find_cart(state: &AppState, code: &str) -> Result<Cart, ApiError> {
    state.store.cart_by_code(code).await?.ok_or_else(|| ApiError::not_found("Cart not found."))
}

#[derive(Debug, Deserialize)]
pub struct AddToCart {
    cart_code: Option<Value>,
    product_id: Option<Value>,
}

pub async fn add_to_cart(State(state): State<AppState>, Payload(body): Payload<AddToCart>) -> Result<Json<CartView>, ApiError> {
    let (Some(code), Some(product_id)) = (as_text(body.cart_code.as_ref()), body.product_id.as_ref().and_then(as_int)) else {
        return Err(ApiError::bad_request("cart_code and product_id are required."));
    };
    let code = CartCode::parse(code).map_err(|e| ApiError::bad_request(e.to_string()))?;
    if state.store.product_by_id(product_id).await?.is_none() {
        return Err(ApiError::not_found("Product not found."));
    }
    let cart = state.store.add_to_cart(code.as_str(), product_id).await?;
    tracing::debug!(cart_code = %code, product_id, "Product added to cart");
    Ok(Json(cart.into()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantity {
    item_id: Option<Value>,
    quantity: Option<Value>,
}

pub async fn update_quantity(State(state): State<AppState>, Payload(body): Payload<UpdateQuantity>) -> Result<Json<Value>, ApiError> {
    let (Some(item_id), Some(quantity)) = (body.item_id, body.quantity) else {
        return Err(ApiError::bad_request("item_id and quantity are required."));
    };
    let item_id = as_int(&item_id).ok_or_else(|| ApiError::bad_request("item_id must be an integer."))?;
    let quantity = as_int(&quantity)
        .and_then(|q| i32::try_from(q).ok())
        .ok_or_else(|| ApiError::bad_request("Quantity must be an integer."))?;
    if quantity < 1 {
        return Err(ApiError::bad_request("Quantity must be at least 1."));
    }
    let item = state.store.update_cart_item_quantity(item_id, quantity).await?;
    Ok(Json(json!({ "data": CartItemView::from(item), "message": "Cart item updated successfully!" })))
}

pub async fn delete_item(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.store.delete_cart_item(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_cart(State(state): State<AppState>, Path(code): Path<String>) -> Result<Json<CartView>, ApiError> {
    Ok(Json(find_cart(&state, &code).await?.into()))
}

#[derive(Debug, Deserialize)]
pub struct CartQuery {
    cart_code: Option<String>,
    product_id: Option<String>,
}

pub async fn cart_stat(State(state): State<AppState>, Query(q): Query<CartQuery>) -> Result<Json<Value>, ApiError> {
    let code = non_blank(q.cart_code).ok_or_else(|| ApiError::bad_request("cart_code is required."))?;
    let cart = find_cart(&state, &code).await?;
    Ok(Json(json!({ "id": cart.id, "cart_code": cart.cart_code, "total_quantity": cart.total_quantity() })))
}

pub async fn product_in_cart(State(state): State<AppState>, Query(q): Query<CartQuery>) -> Result<Json<Value>, ApiError> {
    let (Some(code), Some(product_id)) = (non_blank(q.cart_code), non_blank(q.product_id)) else {
        return Err(ApiError::bad_request("cart_code and product_id are required."));
    };
    let product_id: i64 = product_id.parse().map_err(|_| ApiError::bad_request("product_id must be an integer."))?;
    let cart = find_cart(&state, &code).await?;
    if state.store.product_by_id(product_id).await?.is_none() {
        return Err(ApiError::not_found("Product not found."));
    }
    Ok(Json(json!({ "product_in_cart": cart.contains(product_id) })))
}
