//! Registration, shipping addresses and order history.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use super::{non_blank, Payload};
use crate::auth::{hash_password, OptionalAuthUser};
use crate::domain::aggregates::{normalize_email, AddressFields, CustomerAddress, Order, User};
use crate::domain::events::{CustomerEvent, DomainEvent};
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::NewUser;

#[derive(Debug, Deserialize, Validate)]
pub struct Signup {
    #[validate(required, length(min = 1, max = 150))]
    username: Option<String>,
    #[validate(required, email)]
    email: Option<String>,
    #[validate(required, length(min = 8))]
    password: Option<String>,
    #[validate(length(max = 150))]
    first_name: Option<String>,
    #[validate(length(max = 150))]
    last_name: Option<String>,
    profile_picture_url: Option<String>,
}

pub async fn create_user(State(state): State<AppState>, Payload(body): Payload<Signup>) -> Result<(StatusCode, Json<User>), ApiError> {
    body.validate()?;
    let (Some(username), Some(email), Some(password)) = (body.username, body.email, body.password) else {
        return Err(ApiError::bad_request("username, email and password are required."));
    };
    let password_hash = hash_password(&password)?;
    let user = state
        .store
        .create_user(NewUser {
            username: username.trim().to_string(),
            email: normalize_email(&email),
            password_hash,
            first_name: body.first_name.unwrap_or_default(),
            last_name: body.last_name.unwrap_or_default(),
            profile_picture_url: non_blank(body.profile_picture_url),
            is_staff: false,
        })
        .await?;
    tracing::info!(user_id = user.id, username = %user.username, "User registered");
    state.events.publish(&DomainEvent::Customer(CustomerEvent::Registered { user_id: user.id, email: user.email.clone() })).await;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn existing_user(State(state): State<AppState>, Path(email): Path<String>) -> Result<(StatusCode, Json<Value>), ApiError> {
    let exists = state.store.user_by_email(email.trim()).await?.is_some();
    let status = if exists { StatusCode::OK } else { StatusCode::NOT_FOUND };
    Ok((status, Json(json!({ "exists": exists }))))
}

#[derive(Debug, Deserialize)]
pub struct AddressBody {
    email: Option<String>,
    street: Option<String>,
    city: Option<String>,
    state: Option<String>,
    phone: Option<String>,
}

/// Creates (201) or replaces (200) the customer's single shipping address.
pub async fn add_address(
    State(state): State<AppState>,
    Payload(body): Payload<AddressBody>,
) -> Result<(StatusCode, Json<CustomerAddress>), ApiError> {
    let email = non_blank(body.email).ok_or_else(|| ApiError::bad_request("Email is required."))?;
    let fields = AddressFields {
        street: non_blank(body.street),
        state: non_blank(body.state),
        city: non_blank(body.city),
        phone: non_blank(body.phone),
    };
    if let Some((field, msg)) = fields.check_lengths() {
        return Err(ApiError::field(field, msg));
    }
    let user = state.store.user_by_email(&email).await?.ok_or_else(|| ApiError::not_found("User not found."))?;
    let (address, created) = state.store.upsert_address(user.id, fields).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(address)))
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    email: Option<String>,
}

pub async fn get_address(State(state): State<AppState>, Query(q): Query<EmailQuery>) -> Result<Json<CustomerAddress>, ApiError> {
    let email = non_blank(q.email).ok_or_else(|| ApiError::bad_request("Email is required."))?;
    let address = state.store.address_for_email(&email).await?.ok_or_else(|| ApiError::not_found("Address not found"))?;
    Ok(Json(address))
}

/// Orders for `?email=`, or for the authenticated user when the parameter is absent.
pub async fn get_orders(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    Query(q): Query<EmailQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let email = non_blank(q.email)
        .or_else(|| user.map(|u| u.email))
        .ok_or_else(|| ApiError::bad_request("Email is required."))?;
    Ok(Json(state.store.orders_for_email(&email).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(password: &str) -> Signup {
        Signup {
            username: Some("buyer".into()),
            email: Some("buyer@example.com".into()),
            password: Some(password.into()),
            first_name: None,
            last_name: None,
            profile_picture_url: None,
        }
    }

    #[test]
    fn test_signup_validation() {
        assert!(signup("longenough").validate().is_ok());
        let errors = signup("short").validate().unwrap_err();
        assert!(errors.field_errors().contains_key("password"));

        let missing = Signup { email: None, ..signup("longenough") };
        assert!(missing.validate().unwrap_err().field_errors().contains_key("email"));
    }
}
