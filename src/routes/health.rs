use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn welcome() -> Json<Value> {
    Json(json!({ "message": "Welcome to our E-commerce API!" }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "shop-api" }))
}

/// Ready once the store answers a ping.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "unavailable" })))
        }
    }
}
