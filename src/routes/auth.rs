//! JWT token pair issue and refresh.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Fields, Payload};
use crate::auth::{verify_password, AuthError, TokenPair};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    username: Option<String>,
    password: Option<String>,
}

pub async fn obtain_pair(State(state): State<AppState>, Payload(body): Payload<Credentials>) -> Result<Json<TokenPair>, ApiError> {
    let mut fields = Fields::default();
    let username = fields.required("username", body.username);
    let password = fields.required("password", body.password);
    fields.finish()?;
    let (Some(username), Some(password)) = (username, password) else {
        return Err(AuthError::InvalidCredentials.into());
    };

    let user = state
        .store
        .user_by_username(username.trim())
        .await?
        .filter(|u| u.is_active)
        .ok_or(AuthError::InvalidCredentials)?;
    if let Err(e) = verify_password(&password, &user.password_hash) {
        tracing::info!(username = %user.username, "Rejected login");
        return Err(e.into());
    }
    Ok(Json(state.tokens.issue_pair(user.id)?))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    refresh: Option<String>,
}

pub async fn refresh(State(state): State<AppState>, Payload(body): Payload<RefreshRequest>) -> Result<Json<Value>, ApiError> {
    let mut fields = Fields::default();
    let token = fields.required("refresh", body.refresh);
    fields.finish()?;
    let token = token.ok_or(AuthError::InvalidToken)?;
    let access = state.tokens.refresh(token.trim())?;
    Ok(Json(json!({ "access": access })))
}
