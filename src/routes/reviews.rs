//! Product reviews. Each write refreshes the product's rating aggregate in the store.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use super::{as_int, Fields, Payload};
use crate::domain::aggregates::Review;
use crate::domain::value_objects::Rating;
use crate::error::ApiError;
use crate::state::AppState;

fn parse_rating(value: &Value) -> Result<Rating, String> {
    let raw = as_int(value).ok_or_else(|| "A valid integer is required.".to_string())?;
    Rating::new(raw).map_err(|e| e.to_string())
}

#[derive(Debug, Deserialize)]
pub struct NewReview {
    product_id: Option<Value>,
    email: Option<String>,
    rating: Option<Value>,
    review: Option<String>,
}

pub async fn add_review(State(state): State<AppState>, Payload(body): Payload<NewReview>) -> Result<(StatusCode, Json<Review>), ApiError> {
    let mut fields = Fields::default();
    let product_id = match &body.product_id {
        Some(value) => as_int(value).or_else(|| {
            fields.add("product_id", "A valid integer is required.");
            None
        }),
        None => {
            fields.add("product_id", "This field is required.");
            None
        }
    };
    let email = fields.required("email", body.email);
    let rating = match &body.rating {
        Some(value) => parse_rating(value).map_err(|msg| fields.add("rating", msg)).ok(),
        None => {
            fields.add("rating", "This field is required.");
            None
        }
    };
    let text = fields.required("review", body.review);
    fields.finish()?;
    let (Some(product_id), Some(email), Some(rating), Some(text)) = (product_id, email, rating, text) else {
        return Err(ApiError::bad_request("Invalid review."));
    };

    if state.store.product_by_id(product_id).await?.is_none() {
        return Err(ApiError::not_found("Product not found."));
    }
    let user = state.store.user_by_email(email.trim()).await?.ok_or_else(|| ApiError::not_found("User not found."))?;
    let review = state.store.create_review(product_id, user.id, rating, text.trim()).await?;
    tracing::info!(review_id = review.id, product_id, rating = rating.value(), "Review added");
    Ok((StatusCode::CREATED, Json(review)))
}

#[derive(Debug, Deserialize)]
pub struct ReviewUpdate {
    rating: Option<Value>,
    review: Option<String>,
}

pub async fn update_review(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Payload(body): Payload<ReviewUpdate>,
) -> Result<Json<Review>, ApiError> {
    let rating = body.rating.ok_or_else(|| ApiError::bad_request("Rating is required."))?;
    let rating = parse_rating(&rating).map_err(|msg| ApiError::field("rating", msg))?;
    let review = state.store.update_review(id, rating, body.review.as_deref()).await?;
    Ok(Json(review))
}

pub async fn delete_review(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.store.delete_review(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
