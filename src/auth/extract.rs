//! Bearer-token extractors.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};

use super::{AuthError, TokenType};
use crate::domain::aggregates::User;
use crate::error::ApiError;
use crate::state::AppState;

/// Requires a valid access token for an active user.
pub struct AuthUser(pub User);

/// Authenticates when a token is sent; anonymous requests pass through as `None`.
pub struct OptionalAuthUser(pub Option<User>);

/// Requires an authenticated staff user.
pub struct AdminUser(pub User);

fn bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim().to_string())
}

async fn authenticate(parts: &Parts, state: &AppState) -> Result<Option<User>, ApiError> {
    let Some(token) = bearer(&parts.headers) else { return Ok(None) };
    let claims = state.tokens.decode(&token, TokenType::Access)?;
    let user = state.store.user_by_id(claims.user_id).await?.filter(|u| u.is_active).ok_or(AuthError::InvalidToken)?;
    Ok(Some(user))
}

#[axum::async_trait]
impl FromRequestParts<AppState> for OptionalAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authenticate(parts, state).await.map(Self)
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = authenticate(parts, state).await?.ok_or(AuthError::MissingCredentials)?;
        Ok(Self(user))
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_staff {
            return Err(AuthError::NotStaff.into());
        }
        Ok(Self(user))
    }
}
