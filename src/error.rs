//! Unified error handling for the HTTP layer.

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::payments::PaymentError;
use crate::store::StoreError;

/// Field name to list of messages, rendered as the whole response body.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    /// Per-field validation failures.
    #[error("Invalid input: {0:?}")]
    Validation(FieldErrors),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self { Self::BadRequest(msg.into()) }
    pub fn not_found(msg: impl Into<String>) -> Self { Self::NotFound(msg.into()) }

    /// Single-field validation error.
    pub fn field(name: &str, msg: impl Into<String>) -> Self {
        Self::Validation(BTreeMap::from([(name.to_string(), vec![msg.into()])]))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Validation(fields) => (status, Json(fields)).into_response(),
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                (status, Json(json!({ "detail": "A server error occurred." }))).into_response()
            }
            Self::BadRequest(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::ServiceUnavailable(msg) => (status, Json(json!({ "detail": msg }))).into_response(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(format!("{} not found.", capitalize(what))),
            StoreError::Conflict(field @ ("email" | "username")) => {
                Self::field(field, format!("A user with that {field} already exists."))
            }
            StoreError::Conflict("review") => Self::BadRequest("You have already reviewed this product.".into()),
            StoreError::Conflict(field) => Self::field(field, format!("This {field} is already in use.")),
            StoreError::Database(_) | StoreError::Corrupt(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::Unauthorized("No active account found with the given credentials".into()),
            AuthError::InvalidToken => Self::Unauthorized("Token is invalid or expired".into()),
            AuthError::MissingCredentials => Self::Unauthorized("Authentication credentials were not provided.".into()),
            AuthError::NotStaff => Self::Forbidden("You do not have permission to perform this action.".into()),
            AuthError::Hash(_) | AuthError::Token(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotConfigured => Self::ServiceUnavailable("Payments are not configured.".into()),
            PaymentError::Provider(msg) => Self::BadRequest(msg),
            PaymentError::Transport(e) => Self::BadRequest(e.to_string()),
            PaymentError::InvalidSignature(_) => Self::BadRequest("Invalid signature".into()),
            PaymentError::MalformedPayload(_) => Self::BadRequest("Invalid payload".into()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| (field.to_string(), errs.iter().map(describe).collect()))
            .collect();
        Self::Validation(fields)
    }
}

fn describe(err: &validator::ValidationError) -> String {
    if let Some(message) = &err.message {
        return message.to_string();
    }
    match err.code.as_ref() {
        "required" => "This field is required.".into(),
        "email" => "Enter a valid email address.".into(),
        "length" => match (err.params.get("min"), err.params.get("max")) {
            (Some(min), _) => format!("Ensure this field has at least {min} characters."),
            (None, Some(max)) => format!("Ensure this field has no more than {max} characters."),
            (None, None) => "Invalid length.".into(),
        },
        code => format!("Invalid value ({code})."),
    }
}

fn capitalize(what: &str) -> String {
    let mut chars = what.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
