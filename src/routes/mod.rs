//! HTTP routes.
//!
//! Paths are registered without a trailing slash; [`crate::app`] wraps the
//! router in `NormalizePathLayer` so `/api/products/` and `/api/products`
//! resolve to the same handler.

mod auth;
mod cart;
mod catalog;
mod checkout;
mod health;
mod reviews;
mod users;
mod wishlist;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::{header::HOST, HeaderMap, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AllowedHosts;
use crate::error::{ApiError, FieldErrors};
use crate::state::AppState;
use crate::store::{Page, PageRequest};

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        // auth
        .route("/token", post(auth::obtain_pair))
        .route("/token/refresh", post(auth::refresh))
        // catalog
        .route("/products", get(catalog::list_products).post(catalog::create_product))
        .route(
            "/products/:slug",
            get(catalog::product_detail).put(catalog::replace_product).patch(catalog::patch_product).delete(catalog::delete_product),
        )
        .route("/categories", get(catalog::list_categories).post(catalog::create_category))
        .route(
            "/categories/:slug",
            get(catalog::category_detail).put(catalog::replace_category).patch(catalog::patch_category).delete(catalog::delete_category),
        )
        .route("/search", get(catalog::search))
        // cart
        .route("/add_to_cart", post(cart::add_to_cart))
        .route("/update_cartitem_quantity", put(cart::update_quantity))
        .route("/delete_cartitem/:id", delete(cart::delete_item))
        .route("/get_cart/:cart_code", get(cart::get_cart))
        .route("/get_cart_stat", get(cart::cart_stat))
        .route("/product_in_cart", get(cart::product_in_cart))
        // reviews
        .route("/add_review", post(reviews::add_review))
        .route("/update_review/:id", put(reviews::update_review))
        .route("/delete_review/:id", delete(reviews::delete_review))
        // wishlist
        .route("/add_to_wishlist", post(wishlist::toggle))
        .route("/my_wishlists", get(wishlist::my_wishlists))
        .route("/product_in_wishlist", get(wishlist::product_in_wishlist))
        // payments
        .route("/create_checkout_session", post(checkout::create_checkout_session))
        .route("/webhook", post(checkout::webhook))
        // users
        .route("/create_user", post(users::create_user))
        .route("/existing_user/:email", get(users::existing_user))
        .route("/add_address", post(users::add_address))
        .route("/get_address", get(users::get_address))
        .route("/get_orders", get(users::get_orders));

    Router::new()
        .route("/", get(health::welcome))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready))
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(state.clone(), require_allowed_host))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Rejects requests whose `Host` header is not configured in `ALLOWED_HOSTS`.
async fn require_allowed_host(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let host = request.headers().get(HOST).and_then(|h| h.to_str().ok()).or_else(|| request.uri().host());
    let allowed = match host {
        Some(host) => state.config.allowed_hosts.allows(host),
        None => state.config.allowed_hosts == AllowedHosts::Any,
    };
    if allowed {
        return next.run(request).await;
    }
    tracing::warn!(host = host.unwrap_or("<none>"), "Rejected request for disallowed host");
    ApiError::bad_request("Invalid host header.").into_response()
}

/// JSON body extractor that reports malformed bodies as `{"detail": ...}`.
pub struct Payload<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_error(&rejection)),
        }
    }
}

fn json_error(rejection: &JsonRejection) -> ApiError {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            ApiError::BadRequest("Unsupported media type in request; expected application/json.".into())
        }
        other => ApiError::BadRequest(format!("JSON parse error - {}", other.body_text())),
    }
}

/// Collects per-field validation messages.
#[derive(Default)]
pub(crate) struct Fields(FieldErrors);

impl Fields {
    pub fn add(&mut self, field: &str, msg: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(msg.into());
    }

    /// Records "required" for absent or blank values and passes present ones through.
    pub fn required(&mut self, field: &str, value: Option<String>) -> Option<String> {
        match value.filter(|v| !v.trim().is_empty()) {
            Some(v) => Some(v),
            None => {
                self.add(field, "This field is required.");
                None
            }
        }
    }

    /// Trimmed text field: absent is an error only when `required`, blank is always an error.
    pub fn text(&mut self, field: &str, value: Option<String>, required: bool, max: usize) -> Option<String> {
        let Some(value) = value else {
            if required { self.add(field, "This field is required."); }
            return None;
        };
        let value = value.trim().to_string();
        if value.is_empty() {
            self.add(field, "This field may not be blank.");
            return None;
        }
        self.max_len(field, Some(&value), max);
        Some(value)
    }

    pub fn max_len(&mut self, field: &str, value: Option<&str>, max: usize) {
        if value.is_some_and(|v| v.chars().count() > max) {
            self.add(field, format!("Ensure this field has no more than {max} characters."));
        }
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.0.is_empty() { Ok(()) } else { Err(ApiError::Validation(self.0)) }
    }
}

/// Integer from a JSON number or a numeric string.
pub(crate) fn as_int(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Non-blank string from a JSON string or number.
pub(crate) fn as_text(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Query string with trimmed, non-empty values only.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub page_size: Option<String>,
}

impl PageParams {
    pub fn request(&self) -> Result<PageRequest, ApiError> {
        let page = match non_blank(self.page.clone()) {
            None => None,
            Some(p) => Some(p.parse::<u32>().ok().filter(|p| *p > 0).ok_or_else(|| ApiError::not_found("Invalid page."))?),
        };
        let page_size = non_blank(self.page_size.clone()).and_then(|s| s.parse::<u32>().ok()).filter(|s| *s > 0);
        Ok(PageRequest::new(page, page_size))
    }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Wraps a page in the `{count, next, previous, results}` envelope.
pub(crate) fn paginated<T, U>(
    page: Page<T>,
    uri: &Uri,
    headers: &HeaderMap,
    map: impl FnMut(T) -> U,
) -> Result<Paginated<U>, ApiError> {
    if page.is_out_of_range() {
        return Err(ApiError::not_found("Invalid page."));
    }
    let current = page.request.page;
    let next = page.has_next().then(|| page_link(uri, headers, Some(current + 1)));
    let previous = page.has_previous().then(|| page_link(uri, headers, (current > 2).then_some(current - 1)));
    Ok(Paginated { count: page.total, next, previous, results: page.items.into_iter().map(map).collect() })
}

/// Same URL with `page` replaced; `None` drops the parameter (first page).
fn page_link(uri: &Uri, headers: &HeaderMap, page: Option<u32>) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in url::form_urlencoded::parse(uri.query().unwrap_or_default().as_bytes()) {
        if key != "page" {
            query.append_pair(&key, &value);
        }
    }
    if let Some(page) = page {
        query.append_pair("page", &page.to_string());
    }
    let query = query.finish();
    let origin = headers.get(HOST).and_then(|h| h.to_str().ok()).map(|h| format!("http://{h}")).unwrap_or_default();
    let path = uri.path();
    if query.is_empty() { format!("{origin}{path}") } else { format!("{origin}{path}?{query}") }
}
