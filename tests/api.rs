//! Router-level tests against the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;
use tower_http::normalize_path::NormalizePath;

use shop_api::{
    auth::hash_password,
    config::AppConfig,
    messaging::EventPublisher,
    state::AppState,
    store::{MemoryStore, NewCategory, NewProduct, NewUser, Store},
};

const WEBHOOK_SECRET: &str = "whsec_test";

struct TestApp {
    app: NormalizePath<Router>,
    state: AppState,
}

fn config(extra: &[(&str, &str)]) -> AppConfig {
    let mut vars: HashMap<String, String> = [
        ("DATABASE_URL", "postgres://localhost/shop_test"),
        ("SECRET_KEY", "test-secret-key-that-is-long-enough-for-hs256"),
        ("ALLOWED_HOSTS", "*"),
        ("STRIPE_WEBHOOK_SECRET", WEBHOOK_SECRET),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        vars.insert((*k).to_string(), (*v).to_string());
    }
    AppConfig::from_lookup(|k| vars.get(k).cloned()).unwrap()
}

fn spawn_app_with(extra: &[(&str, &str)]) -> TestApp {
    let state = AppState::new(Arc::new(MemoryStore::new()), config(extra), EventPublisher::disabled()).unwrap();
    TestApp { app: shop_api::app(state.clone()), state }
}

fn spawn_app() -> TestApp {
    spawn_app_with(&[])
}

impl TestApp {
    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn send(&self, method: Method, uri: &str, body: Value, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.call(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, body, None).await
    }

    async fn user(&self, username: &str, staff: bool) -> i64 {
        let user = self
            .state
            .store
            .create_user(NewUser {
                username: username.into(),
                email: format!("{username}@example.com"),
                password_hash: hash_password("password123").unwrap(),
                first_name: String::new(),
                last_name: String::new(),
                profile_picture_url: None,
                is_staff: staff,
            })
            .await
            .unwrap();
        user.id
    }

    async fn token_for(&self, username: &str, staff: bool) -> String {
        let id = self.user(username, staff).await;
        self.state.tokens.issue_pair(id).unwrap().access
    }

    async fn category(&self, name: &str) -> i64 {
        self.state.store.create_category(NewCategory { name: name.into(), slug: None, image: None }).await.unwrap().id
    }

    async fn product(&self, name: &str, price: i64, category_id: Option<i64>) -> i64 {
        self.state
            .store
            .create_product(NewProduct {
                name: name.into(),
                description: format!("About {name}"),
                price: Decimal::new(price * 100, 2),
                slug: None,
                image: None,
                featured: false,
                category_id,
            })
            .await
            .unwrap()
            .id
    }
}

fn sign(payload: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

fn webhook_request(payload: &str, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::post("/api/webhook/").header(header::CONTENT_TYPE, "application/json");
    if let Some(signature) = signature {
        builder = builder.header("Stripe-Signature", signature);
    }
    builder.body(Body::from(payload.to_string())).unwrap()
}

#[tokio::test]
async fn health_and_welcome() {
    let app = spawn_app();
    let (status, body) = app.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Welcome to our E-commerce API!");
    assert_eq!(app.get("/health").await.1["status"], "healthy");
    assert_eq!(app.get("/health/ready").await.0, StatusCode::OK);
}

#[tokio::test]
async fn trailing_slash_and_pagination() {
    let app = spawn_app();
    for i in 0..12 {
        app.product(&format!("Item {i}"), 10 + i, None).await;
    }
    let (status, body) = app.get("/api/products/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 12);
    assert_eq!(body["results"].as_array().unwrap().len(), 10);
    assert_eq!(body["next"], "/api/products?page=2");
    assert!(body["previous"].is_null());

    let (_, page2) = app.get("/api/products?page=2").await;
    assert_eq!(page2["results"].as_array().unwrap().len(), 2);
    assert_eq!(page2["previous"], "/api/products");

    let (status, body) = app.get("/api/products?page=9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Invalid page.");
}

#[tokio::test]
async fn product_filters_and_ordering() {
    let app = spawn_app();
    let books = app.category("Books").await;
    app.product("Python Book", 30, Some(books)).await;
    app.product("Laptop", 1200, None).await;
    app.product("Rust Book", 45, Some(books)).await;

    let (_, body) = app.get("/api/products?category=BOOKS&ordering=-price").await;
    let names: Vec<&str> = body["results"].as_array().unwrap().iter().map(|p| p["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Rust Book", "Python Book"]);

    let (_, body) = app.get("/api/products?min_price=40&max_price=1200").await;
    assert_eq!(body["count"], 2);

    let (_, body) = app.get("/api/products?search=books").await;
    assert_eq!(body["count"], 2);

    let (status, body) = app.get("/api/products?min_price=cheap").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["min_price"].is_array());
}

#[tokio::test]
async fn product_writes_require_admin() {
    let app = spawn_app();
    let payload = json!({"name": "New Product", "description": "Shiny", "price": 1200});

    let (status, body) = app.post("/api/products/", payload.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Authentication credentials were not provided.");

    let customer = app.token_for("customer", false).await;
    let (status, _) = app.send(Method::POST, "/api/products/", payload.clone(), Some(&customer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = app.token_for("admin", true).await;
    let (status, body) = app.send(Method::POST, "/api/products/", payload.clone(), Some(&admin)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["slug"], "new-product");
    assert_eq!(body["price"], "1200.00");

    let (_, body) = app.send(Method::POST, "/api/products/", payload, Some(&admin)).await;
    assert_eq!(body["slug"], "new-product-1");

    let (status, body) =
        app.send(Method::POST, "/api/products/", json!({"name": "Bad", "description": "x", "price": "-5"}), Some(&admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["price"].is_array());

    let (status, body) = app.send(Method::PATCH, "/api/products/new-product/", json!({"price": "99.5"}), Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price"], "99.50");
    assert_eq!(body["name"], "New Product");

    let (status, _) = app.send(Method::DELETE, "/api/products/new-product/", Value::Null, Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(app.get("/api/products/new-product/").await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn category_lifecycle() {
    let app = spawn_app();
    let admin = app.token_for("admin", true).await;

    let (status, body) = app.send(Method::POST, "/api/categories/", json!({"name": "Test Category"}), Some(&admin)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["slug"], "test-category");
    let category_id = body["id"].as_i64().unwrap();

    let product = app.product("Widget", 5, Some(category_id)).await;
    let (_, body) = app.get("/api/categories/test-category/").await;
    assert_eq!(body["products"][0]["id"], product);

    let (status, body) = app.send(Method::PATCH, "/api/categories/test-category/", json!({"name": "Renamed"}), Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Renamed");

    let (status, _) = app.send(Method::DELETE, "/api/categories/test-category/", Value::Null, Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let remaining = app.state.store.product_by_id(product).await.unwrap().unwrap();
    assert_eq!(remaining.category_id, None);
    assert_eq!(app.get("/api/categories/test-category/").await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cart_flow() {
    let app = spawn_app();
    let laptop = app.product("Laptop", 1200, None).await;
    let mouse = app.product("Mouse", 25, None).await;

    let (status, body) = app.post("/api/add_to_cart/", json!({"cart_code": "abc123"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "cart_code and product_id are required.");

    let (status, body) = app.post("/api/add_to_cart/", json!({"cart_code": "abc123", "product_id": 999})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Product not found.");

    app.post("/api/add_to_cart/", json!({"cart_code": "abc123", "product_id": laptop})).await;
    app.post("/api/add_to_cart/", json!({"cart_code": "abc123", "product_id": laptop})).await;
    let (status, cart) = app.post("/api/add_to_cart/", json!({"cart_code": "abc123", "product_id": mouse})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["cartitems"][0]["quantity"], 2);
    assert_eq!(cart["cart_total"], "2425.00");

    let (_, stat) = app.get("/api/get_cart_stat/?cart_code=abc123").await;
    assert_eq!(stat["total_quantity"], 3);

    let (_, body) = app.get(&format!("/api/product_in_cart/?cart_code=abc123&product_id={mouse}")).await;
    assert_eq!(body["product_in_cart"], true);

    let item_id = cart["cartitems"][1]["id"].as_i64().unwrap();
    let (status, body) =
        app.send(Method::PUT, "/api/update_cartitem_quantity/", json!({"item_id": item_id, "quantity": 4}), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Cart item updated successfully!");
    assert_eq!(body["data"]["sub_total"], "100.00");

    let (status, body) =
        app.send(Method::PUT, "/api/update_cartitem_quantity/", json!({"item_id": item_id, "quantity": "many"}), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Quantity must be an integer.");

    let (status, _) = app.send(Method::DELETE, &format!("/api/delete_cartitem/{item_id}/"), Value::Null, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = app.send(Method::DELETE, &format!("/api/delete_cartitem/{item_id}/"), Value::Null, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Cart item not found.");

    let (status, body) = app.get("/api/get_cart/nope/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Cart not found.");
}

#[tokio::test]
async fn reviews_drive_the_rating_aggregate() {
    let app = spawn_app();
    let product = app.product("Laptop", 1200, None).await;
    app.user("alice", false).await;
    app.user("bob", false).await;

    let (status, body) =
        app.post("/api/add_review/", json!({"product_id": product, "email": "alice@example.com", "rating": 6, "review": "Wow"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["rating"].is_array());

    let (status, first) =
        app.post("/api/add_review/", json!({"product_id": product, "email": "alice@example.com", "rating": 5, "review": "Great"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["user"]["username"], "alice");

    let (status, body) =
        app.post("/api/add_review/", json!({"product_id": product, "email": "alice@example.com", "rating": 4, "review": "Again"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "You have already reviewed this product.");

    let (_, second) =
        app.post("/api/add_review/", json!({"product_id": product, "email": "bob@example.com", "rating": 4, "review": "Good"})).await;

    let (_, detail) = app.get("/api/products/laptop/").await;
    assert_eq!(detail["rating"]["average_rating"], 4.5);
    assert_eq!(detail["rating"]["total_reviews"], 2);
    assert_eq!(detail["excellent_review"], 1);
    assert_eq!(detail["very_good_review"], 1);

    let second_id = second["id"].as_i64().unwrap();
    let (status, body) = app.send(Method::PUT, &format!("/api/update_review/{second_id}/"), json!({}), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Rating is required.");

    let (status, body) = app.send(Method::PUT, &format!("/api/update_review/{second_id}/"), json!({"rating": 1}), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["review"], "Good");

    for id in [first["id"].as_i64().unwrap(), second_id] {
        let (status, _) = app.send(Method::DELETE, &format!("/api/delete_review/{id}/"), Value::Null, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    let (_, detail) = app.get("/api/products/laptop/").await;
    assert_eq!(detail["rating"]["average_rating"], 0.0);
    assert_eq!(detail["rating"]["total_reviews"], 0);

    let (status, body) = app.send(Method::DELETE, "/api/delete_review/9999/", Value::Null, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Review not found.");
}

#[tokio::test]
async fn product_detail_lists_similar_products() {
    let app = spawn_app();
    let books = app.category("Books").await;
    app.product("Python Book", 30, Some(books)).await;
    app.product("Rust Book", 45, Some(books)).await;
    app.product("Laptop", 1200, None).await;

    let (_, detail) = app.get("/api/products/python-book/").await;
    let similar = detail["similar_products"].as_array().unwrap();
    assert_eq!(similar.len(), 1);
    assert_eq!(similar[0]["slug"], "rust-book");
    assert!(detail["rating"].is_null());

    let (_, detail) = app.get("/api/products/laptop/").await;
    assert!(detail["similar_products"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn search_requires_query() {
    let app = spawn_app();
    app.product("Python Book", 30, None).await;
    let (status, body) = app.get("/api/search/").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "No query provided");
    let (_, body) = app.get("/api/search/?query=python").await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn wishlist_toggles() {
    let app = spawn_app();
    let product = app.product("Laptop", 1200, None).await;
    app.user("alice", false).await;
    let payload = json!({"email": "alice@example.com", "product_id": product});

    let (status, body) = app.post("/api/add_to_wishlist/", payload.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["product"]["id"], product);

    let (_, body) = app.get(&format!("/api/product_in_wishlist/?email=alice@example.com&product_id={product}")).await;
    assert_eq!(body["product_in_wishlist"], true);
    assert_eq!(app.get("/api/my_wishlists/?email=alice@example.com").await.1.as_array().unwrap().len(), 1);

    let (status, _) = app.post("/api/add_to_wishlist/", payload).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = app.get(&format!("/api/product_in_wishlist/?email=alice@example.com&product_id={product}")).await;
    assert_eq!(body["product_in_wishlist"], false);
}

#[tokio::test]
async fn registration_and_tokens() {
    let app = spawn_app();
    let signup = json!({"username": "newuser", "email": "new@example.com", "password": "longpassword"});

    let (status, body) = app.post("/api/create_user/", signup.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["username"], "newuser");
    assert!(body.get("password").is_none());
    assert!(body.get("password_hash").is_none());

    let (status, body) = app.post("/api/create_user/", signup).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["email"][0], "A user with that email already exists.");

    let (status, body) = app.post("/api/create_user/", json!({"username": "x", "email": "x@example.com", "password": "short"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["password"].is_array());

    let (status, body) = app.get("/api/existing_user/new@example.com/").await;
    assert_eq!((status, body["exists"].as_bool()), (StatusCode::OK, Some(true)));
    let (status, body) = app.get("/api/existing_user/ghost@example.com/").await;
    assert_eq!((status, body["exists"].as_bool()), (StatusCode::NOT_FOUND, Some(false)));

    let (status, body) = app.post("/api/token/", json!({"username": "newuser", "password": "wrong-password"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "No active account found with the given credentials");

    let (status, pair) = app.post("/api/token/", json!({"username": "newuser", "password": "longpassword"})).await;
    assert_eq!(status, StatusCode::OK);
    let refresh = pair["refresh"].as_str().unwrap();
    let access = pair["access"].as_str().unwrap();

    let (status, body) = app.post("/api/token/refresh/", json!({"refresh": refresh})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access"].is_string());

    let (status, body) = app.post("/api/token/refresh/", json!({"refresh": access})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Token is invalid or expired");
}

#[tokio::test]
async fn addresses_are_upserted() {
    let app = spawn_app();
    app.user("alice", false).await;

    let (status, body) = app.post("/api/add_address/", json!({"street": "1 Main St"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Email is required.");

    let address = json!({"email": "alice@example.com", "street": "1 Main St", "city": "Lagos", "state": "LA", "phone": "0800000000"});
    let (status, body) = app.post("/api/add_address/", address).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["customer"]["email"], "alice@example.com");

    let (status, body) = app.post("/api/add_address/", json!({"email": "alice@example.com", "city": "Abuja"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["city"], "Abuja");

    let (status, body) = app.post("/api/add_address/", json!({"email": "alice@example.com", "phone": "12345678901234"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["phone"].is_array());

    let (_, body) = app.get("/api/get_address/?email=alice@example.com").await;
    assert_eq!(body["city"], "Abuja");

    let (status, body) = app.get("/api/get_address/?email=ghost@example.com").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Address not found");
}

#[tokio::test]
async fn mixed_case_email_round_trip() {
    let app = spawn_app();
    let signup = json!({"username": "mixed", "email": "Mixed.Case@Example.com", "password": "longpassword"});
    let (status, body) = app.post("/api/create_user/", signup).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "mixed.case@example.com");

    let (status, body) = app.get("/api/existing_user/Mixed.Case@Example.com/").await;
    assert_eq!((status, body["exists"].as_bool()), (StatusCode::OK, Some(true)));

    let (status, body) = app.post("/api/add_address/", json!({"email": "Mixed.Case@Example.com", "city": "Lagos"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["customer"]["username"], "mixed");
    let (status, body) = app.get("/api/get_address/?email=MIXED.CASE@EXAMPLE.COM").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["city"], "Lagos");

    let lamp = app.product("Lamp", 30, None).await;
    let (status, _) = app.post("/api/add_to_wishlist/", json!({"email": "Mixed.Case@Example.com", "product_id": lamp})).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.get(&format!("/api/product_in_wishlist/?email=mixed.case@example.com&product_id={lamp}")).await;
    assert_eq!(body["product_in_wishlist"], true);

    let review = json!({"product_id": lamp, "email": "MIXED.case@example.com", "rating": 5, "review": "Bright"});
    assert_eq!(app.post("/api/add_review/", review).await.0, StatusCode::CREATED);

    app.post("/api/add_to_cart/", json!({"cart_code": "mixcart", "product_id": lamp})).await;
    let payload = json!({
        "type": "checkout.session.completed",
        "data": {"object": {
            "id": "cs_test_mixed",
            "amount_total": 3_500,
            "currency": "usd",
            "customer_email": "Mixed.Case@Example.com",
            "metadata": {"cart_code": "mixcart"}
        }}
    })
    .to_string();
    let (status, _) = app.call(webhook_request(&payload, Some(sign(&payload, chrono::Utc::now().timestamp())))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, orders) = app.get("/api/get_orders/?email=mixed.case@example.com").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn long_and_punctuation_names_get_usable_slugs() {
    let app = spawn_app();
    let admin = app.token_for("admin", true).await;
    let long_name = "Extra Large Ergonomic Mechanical Keyboard With Backlight And Wrist Rest Pro";
    assert!(long_name.len() > 64);
    let payload = json!({"name": long_name, "description": "Clicky", "price": "80"});

    let mut slugs = Vec::new();
    for _ in 0..2 {
        let (status, body) = app.send(Method::POST, "/api/products/", payload.clone(), Some(&admin)).await;
        assert_eq!(status, StatusCode::CREATED);
        let slug = body["slug"].as_str().unwrap().to_string();
        assert!(slug.chars().count() <= 50, "{slug}");
        slugs.push(slug);
    }
    assert_ne!(slugs[0], slugs[1]);
    assert!(slugs[1].ends_with("-1"));
    for slug in &slugs {
        assert_eq!(app.get(&format!("/api/products/{slug}/")).await.0, StatusCode::OK);
    }

    let (status, body) = app.send(Method::POST, "/api/categories/", json!({"name": "!!!"}), Some(&admin)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["slug"], "item");
    let (_, body) = app.send(Method::POST, "/api/categories/", json!({"name": "???"}), Some(&admin)).await;
    assert_eq!(body["slug"], "item-1");
    assert_eq!(app.get("/api/categories/item/").await.0, StatusCode::OK);
    assert_eq!(app.send(Method::DELETE, "/api/categories/item-1/", Value::Null, Some(&admin)).await.0, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn webhook_fulfils_checkout_once() {
    let app = spawn_app();
    let laptop = app.product("Laptop", 1200, None).await;
    let token = app.token_for("alice", false).await;
    app.post("/api/add_to_cart/", json!({"cart_code": "cart1", "product_id": laptop})).await;

    let payload = json!({
        "type": "checkout.session.completed",
        "data": {"object": {
            "id": "cs_test_123",
            "amount_total": 125_000,
            "currency": "usd",
            "customer_email": "alice@example.com",
            "metadata": {"cart_code": "cart1"}
        }}
    })
    .to_string();
    let now = chrono::Utc::now().timestamp();

    let (status, body) = app.call(webhook_request(&payload, Some(sign(&payload, now - 1000)))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Invalid signature");
    assert_eq!(app.call(webhook_request(&payload, None)).await.0, StatusCode::BAD_REQUEST);

    for _ in 0..2 {
        let (status, _) = app.call(webhook_request(&payload, Some(sign(&payload, now)))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, orders) = app.send(Method::GET, "/api/get_orders/", Value::Null, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let orders = orders.as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["amount"], "1250.00");
    assert_eq!(orders[0]["status"], "Paid");
    assert_eq!(orders[0]["items"][0]["product"]["id"], laptop);
    assert_eq!(app.get("/api/get_cart/cart1/").await.0, StatusCode::NOT_FOUND);

    let other = json!({"type": "customer.created", "data": {"object": {}}}).to_string();
    assert_eq!(app.call(webhook_request(&other, Some(sign(&other, now)))).await.0, StatusCode::OK);

    assert_eq!(app.get("/api/get_orders/").await.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_unconfigured_is_unavailable() {
    let app = spawn_app_with(&[("STRIPE_WEBHOOK_SECRET", "")]);
    let (status, _) = app.call(webhook_request("{}", Some(sign("{}", chrono::Utc::now().timestamp())))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn checkout_session_via_stripe() {
    let stripe = Router::new().route(
        "/v1/checkout/sessions",
        post(|body: String| async move {
            let form: HashMap<String, String> = url::form_urlencoded::parse(body.as_bytes()).into_owned().collect();
            axum::Json(json!({
                "id": "cs_test_abc",
                "url": "https://checkout.stripe.test/cs_test_abc",
                "cart_code": form.get("metadata[cart_code]"),
                "vat": form.get("line_items[1][price_data][product_data][name]"),
                "unit_amount": form.get("line_items[0][price_data][unit_amount]"),
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, stripe).await.unwrap() });

    let base = format!("http://{addr}/");
    let app = spawn_app_with(&[("STRIPE_SECRET_KEY", "sk_test_123"), ("STRIPE_API_BASE", base.as_str())]);
    let laptop = app.product("Laptop", 1200, None).await;

    let (status, body) = app.post("/api/create_checkout_session/", json!({"cart_code": "nocart", "email": "a@b.com"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Cart not found.");

    let (_, cart) = app.post("/api/add_to_cart/", json!({"cart_code": "cart2", "product_id": laptop})).await;
    let (status, body) = app.post("/api/create_checkout_session/", json!({"cart_code": "cart2", "email": "a@b.com"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], "cs_test_abc");
    assert_eq!(body["data"]["cart_code"], "cart2");
    assert_eq!(body["data"]["vat"], "VAT Fee");
    assert_eq!(body["data"]["unit_amount"], "120000");

    let item_id = cart["cartitems"][0]["id"].as_i64().unwrap();
    app.send(Method::DELETE, &format!("/api/delete_cartitem/{item_id}/"), Value::Null, None).await;
    let (status, _) = app.post("/api/create_checkout_session/", json!({"cart_code": "cart2"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn checkout_without_stripe_is_unavailable() {
    let app = spawn_app();
    let laptop = app.product("Laptop", 1200, None).await;
    app.post("/api/add_to_cart/", json!({"cart_code": "cart3", "product_id": laptop})).await;
    let (status, body) = app.post("/api/create_checkout_session/", json!({"cart_code": "cart3"})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["detail"], "Payments are not configured.");
}

#[tokio::test]
async fn disallowed_host_is_rejected() {
    let app = spawn_app_with(&[("ALLOWED_HOSTS", "shop.test,.example.org")]);
    let request = |host: &'static str| Request::get("/health").header(header::HOST, host).body(Body::empty()).unwrap();

    let (status, body) = app.call(request("evil.test")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Invalid host header.");
    assert_eq!(app.call(request("shop.test:8083")).await.0, StatusCode::OK);
    assert_eq!(app.call(request("api.example.org")).await.0, StatusCode::OK);
}
