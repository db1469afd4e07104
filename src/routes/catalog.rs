//! Products, categories and search.

use std::str::FromStr;

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{as_int, double_option, non_blank, paginated, Fields, PageParams, Paginated, Payload};
use crate::auth::AdminUser;
use crate::domain::aggregates::{Category, Product, ProductRating, ProductSummary, RatingBreakdown, Review};
use crate::domain::value_objects::{money, Slug};
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{CategoryPatch, NewCategory, NewProduct, ProductFilter, ProductOrdering, ProductPatch};

const NAME_MAX: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    name: Option<String>,
    category: Option<String>,
    min_price: Option<String>,
    max_price: Option<String>,
    featured: Option<String>,
    search: Option<String>,
    ordering: Option<String>,
}

impl ProductQuery {
    fn into_filter(self) -> Result<ProductFilter, ApiError> {
        let mut fields = Fields::default();
        let mut number = |field: &str, raw: Option<String>| {
            let raw = non_blank(raw)?;
            Decimal::from_str(&raw).map_err(|_| fields.add(field, "Enter a number.")).ok()
        };
        let min_price = number("min_price", self.min_price);
        let max_price = number("max_price", self.max_price);
        let featured = match non_blank(self.featured).map(|f| f.to_ascii_lowercase()).as_deref() {
            None => None,
            Some("true" | "1") => Some(true),
            Some("false" | "0") => Some(false),
            Some(_) => {
                fields.add("featured", "Select a valid choice.");
                None
            }
        };
        fields.finish()?;
        Ok(ProductFilter {
            name: non_blank(self.name),
            category_slug: non_blank(self.category),
            min_price,
            max_price,
            featured,
            search: non_blank(self.search),
            ordering: ProductOrdering::parse(self.ordering.as_deref()),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ProductDetail {
    id: i64,
    name: String,
    description: String,
    slug: String,
    image: Option<String>,
    price: Decimal,
    reviews: Vec<Review>,
    rating: Option<ProductRating>,
    similar_products: Vec<ProductSummary>,
    #[serde(flatten)]
    breakdown: RatingBreakdown,
}

async fn detail(state: &AppState, product: Product) -> Result<ProductDetail, ApiError> {
    let reviews = state.store.reviews_for_product(product.id).await?;
    let rating = state.store.product_rating(product.id).await?;
    let similar_products = match product.category_id {
        Some(category_id) => state.store.products_in_category(category_id, Some(product.id)).await?.iter().map(Product::summary).collect(),
        None => Vec::new(),
    };
    Ok(ProductDetail {
        breakdown: RatingBreakdown::from_reviews(&reviews),
        id: product.id,
        name: product.name,
        description: product.description,
        slug: product.slug,
        image: product.image,
        price: product.price,
        reviews,
        rating,
        similar_products,
    })
}

pub async fn list_products(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(query): Query<ProductQuery>,
    Query(pages): Query<PageParams>,
) -> Result<Json<Paginated<ProductSummary>>, ApiError> {
    let filter = query.into_filter()?;
    let page = state.store.list_products(&filter, pages.request()?).await?;
    Ok(Json(paginated(page, &uri, &headers, |p| p.summary())?))
}

pub async fn product_detail(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<ProductDetail>, ApiError> {
    let product = state.store.product_by_slug(&slug).await?.ok_or_else(|| ApiError::not_found("Not found."))?;
    Ok(Json(detail(&state, product).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductBody {
    name: Option<String>,
    description: Option<String>,
    price: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "double_option")]
    category: Option<Option<serde_json::Value>>,
    featured: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    image: Option<Option<String>>,
    slug: Option<String>,
}

fn parse_price(value: &serde_json::Value) -> Result<Decimal, String> {
    let raw = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        _ => return Err("A valid number is required.".into()),
    };
    let price = Decimal::from_str(&raw).or_else(|_| Decimal::from_scientific(&raw)).map_err(|_| "A valid number is required.".to_string())?;
    money::normalize_price(price).map_err(|e| e.to_string())
}

fn parse_slug(fields: &mut Fields, slug: Option<String>) -> Option<String> {
    let slug = slug?;
    Slug::parse(slug.trim()).map(Slug::into_inner).map_err(|e| fields.add("slug", e.to_string())).ok()
}

/// Validates a product payload; `partial` skips the required-field checks.
async fn product_patch(state: &AppState, body: ProductBody, partial: bool) -> Result<ProductPatch, ApiError> {
    let mut fields = Fields::default();
    let name = fields.text("name", body.name, !partial, NAME_MAX);
    let description = fields.text("description", body.description, !partial, usize::MAX);
    let price = match &body.price {
        Some(value) => parse_price(value).map_err(|msg| fields.add("price", msg)).ok(),
        None => {
            if !partial { fields.add("price", "This field is required."); }
            None
        }
    };
    let slug = parse_slug(&mut fields, body.slug);
    let category_id = match body.category {
        Some(Some(value)) => match as_int(&value) {
            Some(id) => Some(Some(id)),
            None => {
                fields.add("category", format!("Incorrect type. Expected pk value, received {value}."));
                None
            }
        },
        Some(None) => Some(None),
        None => None,
    };
    fields.finish()?;

    if let Some(Some(id)) = category_id {
        if state.store.category_by_id(id).await?.is_none() {
            return Err(ApiError::field("category", format!("Invalid pk \"{id}\" - object does not exist.")));
        }
    }
    Ok(ProductPatch { name, description, price, slug, image: body.image, featured: body.featured, category_id })
}

pub async fn create_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Payload(body): Payload<ProductBody>,
) -> Result<(StatusCode, Json<ProductDetail>), ApiError> {
    let patch = product_patch(&state, body, false).await?;
    let product = state
        .store
        .create_product(NewProduct {
            name: patch.name.unwrap_or_default(),
            description: patch.description.unwrap_or_default(),
            price: patch.price.unwrap_or_default(),
            slug: patch.slug,
            image: patch.image.flatten(),
            featured: patch.featured.unwrap_or(false),
            category_id: patch.category_id.flatten(),
        })
        .await?;
    tracing::info!(product_id = product.id, slug = %product.slug, admin = %admin.username, "Product created");
    Ok((StatusCode::CREATED, Json(detail(&state, product).await?)))
}

async fn update_product(state: AppState, slug: String, body: ProductBody, partial: bool) -> Result<Json<ProductDetail>, ApiError> {
    if state.store.product_by_slug(&slug).await?.is_none() {
        return Err(ApiError::not_found("Not found."));
    }
    let patch = product_patch(&state, body, partial).await?;
    let product = state.store.update_product(&slug, patch).await?;
    Ok(Json(detail(&state, product).await?))
}

pub async fn replace_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(slug): Path<String>,
    Payload(body): Payload<ProductBody>,
) -> Result<Json<ProductDetail>, ApiError> {
    update_product(state, slug, body, false).await
}

pub async fn patch_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(slug): Path<String>,
    Payload(body): Payload<ProductBody>,
) -> Result<Json<ProductDetail>, ApiError> {
    update_product(state, slug, body, true).await
}

pub async fn delete_product(State(state): State<AppState>, _admin: AdminUser, Path(slug): Path<String>) -> Result<StatusCode, ApiError> {
    state.store.delete_product(&slug).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct CategoryDetail {
    id: i64,
    name: String,
    image: Option<String>,
    products: Vec<ProductSummary>,
}

pub async fn list_categories(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(pages): Query<PageParams>,
) -> Result<Json<Paginated<Category>>, ApiError> {
    let page = state.store.list_categories(pages.request()?).await?;
    Ok(Json(paginated(page, &uri, &headers, |c| c)?))
}

pub async fn category_detail(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<CategoryDetail>, ApiError> {
    let category = state.store.category_by_slug(&slug).await?.ok_or_else(|| ApiError::not_found("Not found."))?;
    let products = state.store.products_in_category(category.id, None).await?;
    Ok(Json(CategoryDetail {
        id: category.id,
        name: category.name,
        image: category.image,
        products: products.iter().map(Product::summary).collect(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryBody {
    name: Option<String>,
    slug: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    image: Option<Option<String>>,
}

fn category_patch(body: CategoryBody, partial: bool) -> Result<CategoryPatch, ApiError> {
    let mut fields = Fields::default();
    let name = fields.text("name", body.name, !partial, NAME_MAX);
    let slug = parse_slug(&mut fields, body.slug);
    fields.finish()?;
    Ok(CategoryPatch { name, slug, image: body.image })
}

pub async fn create_category(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Payload(body): Payload<CategoryBody>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let patch = category_patch(body, false)?;
    let category = state
        .store
        .create_category(NewCategory { name: patch.name.unwrap_or_default(), slug: patch.slug, image: patch.image.flatten() })
        .await?;
    tracing::info!(category_id = category.id, slug = %category.slug, admin = %admin.username, "Category created");
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(state: AppState, slug: String, body: CategoryBody, partial: bool) -> Result<Json<Category>, ApiError> {
    if state.store.category_by_slug(&slug).await?.is_none() {
        return Err(ApiError::not_found("Not found."));
    }
    let patch = category_patch(body, partial)?;
    Ok(Json(state.store.update_category(&slug, patch).await?))
}

pub async fn replace_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(slug): Path<String>,
    Payload(body): Payload<CategoryBody>,
) -> Result<Json<Category>, ApiError> {
    update_category(state, slug, body, false).await
}

pub async fn patch_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(slug): Path<String>,
    Payload(body): Payload<CategoryBody>,
) -> Result<Json<Category>, ApiError> {
    update_category(state, slug, body, true).await
}

pub async fn delete_category(State(state): State<AppState>, _admin: AdminUser, Path(slug): Path<String>) -> Result<StatusCode, ApiError> {
    state.store.delete_category(&slug).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    query: Option<String>,
}

pub async fn search(State(state): State<AppState>, Query(q): Query<SearchQuery>) -> Result<Json<Vec<ProductSummary>>, ApiError> {
    let term = non_blank(q.query).ok_or_else(|| ApiError::bad_request("No query provided"))?;
    let products = state.store.search_products(&term).await?;
    Ok(Json(products.iter().map(Product::summary).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price(&json!(1200)).unwrap().to_string(), "1200.00");
        assert_eq!(parse_price(&json!("19.99")).unwrap(), Decimal::new(1999, 2));
        assert!(parse_price(&json!("-1")).is_err());
        assert!(parse_price(&json!("abc")).is_err());
        assert!(parse_price(&json!(true)).is_err());
    }

    #[test]
    fn test_query_filters() {
        let query = ProductQuery { min_price: Some("10".into()), featured: Some("True".into()), ordering: Some("-price".into()), ..Default::default() };
        let filter = query.into_filter().unwrap();
        assert_eq!(filter.min_price, Some(Decimal::from(10)));
        assert_eq!(filter.featured, Some(true));
        assert_eq!(filter.ordering, ProductOrdering::PriceDesc);

        let bad = ProductQuery { max_price: Some("cheap".into()), ..Default::default() };
        assert!(matches!(bad.into_filter(), Err(ApiError::Validation(f)) if f.contains_key("max_price")));
    }

    #[test]
    fn test_category_patch_requires_name_unless_partial() {
        assert!(category_patch(CategoryBody::default(), false).is_err());
        let patch = category_patch(CategoryBody::default(), true).unwrap();
        assert_eq!(patch, CategoryPatch::default());
        let bad_slug = CategoryBody { name: Some("Books".into()), slug: Some("has space".into()), image: None };
        assert!(category_patch(bad_slug, false).is_err());
    }

    #[test]
    fn test_body_distinguishes_null_image() {
        let absent: ProductBody = serde_json::from_value(json!({"name": "x"})).unwrap();
        assert_eq!(absent.image, None);
        let null: ProductBody = serde_json::from_value(json!({"image": null})).unwrap();
        assert_eq!(null.image, Some(None));
    }
}
