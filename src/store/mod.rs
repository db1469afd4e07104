//! Persistence boundary.
//!
//! Handlers talk to a [`Store`]; production uses [`PgStore`] on `PostgreSQL`,
//! tests and local demos use [`MemoryStore`]. Both enforce the same
//! uniqueness rules and keep the `ProductRating` aggregate in step with the
//! review table.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::aggregates::{
    AddressFields, Cart, CartItem, Category, CustomerAddress, NewOrder, Order, Product, ProductRating, Review, User,
    WishlistToggle, Wishlist,
};
use crate::domain::value_objects::Rating;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced row does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Unique constraint violated; carries the offending field.
    #[error("conflict on {0}")]
    Conflict(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("data corruption: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 1-based page window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub const DEFAULT_SIZE: u32 = 10;
    pub const MAX_SIZE: u32 = 100;

    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(Self::DEFAULT_SIZE).clamp(1, Self::MAX_SIZE),
        }
    }
    pub fn offset(&self) -> i64 { i64::from(self.page - 1) * i64::from(self.page_size) }
    pub fn limit(&self) -> i64 { i64::from(self.page_size) }
}

impl Default for PageRequest {
    fn default() -> Self { Self::new(None, None) }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub request: PageRequest,
}

impl<T> Page<T> {
    pub fn num_pages(&self) -> u32 {
        let size = i64::from(self.request.page_size);
        u32::try_from(((self.total + size - 1) / size).max(1)).unwrap_or(u32::MAX)
    }
    pub fn has_next(&self) -> bool { self.request.page < self.num_pages() }
    pub fn has_previous(&self) -> bool { self.request.page > 1 }
    /// Page 1 always exists; later pages must fall within the result set.
    pub fn is_out_of_range(&self) -> bool { self.request.page > self.num_pages() }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProductOrdering {
    #[default]
    IdAsc,
    IdDesc,
    PriceAsc,
    PriceDesc,
    NameAsc,
    NameDesc,
}

impl ProductOrdering {
    /// Unknown values fall back to the default order.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("price") => Self::PriceAsc,
            Some("-price") => Self::PriceDesc,
            Some("name") => Self::NameAsc,
            Some("-name") => Self::NameDesc,
            Some("-id") => Self::IdDesc,
            _ => Self::IdAsc,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Self::IdAsc => "p.id ASC",
            Self::IdDesc => "p.id DESC",
            Self::PriceAsc => "p.price ASC, p.id ASC",
            Self::PriceDesc => "p.price DESC, p.id ASC",
            Self::NameAsc => "p.name ASC, p.id ASC",
            Self::NameDesc => "p.name DESC, p.id ASC",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProductFilter {
    pub name: Option<String>,
    pub category_slug: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub featured: Option<bool>,
    pub search: Option<String>,
    pub ordering: ProductOrdering,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_picture_url: Option<String>,
    pub is_staff: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCategory {
    pub name: String,
    /// Generated from the name when absent.
    pub slug: Option<String>,
    pub image: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub image: Option<Option<String>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub slug: Option<String>,
    pub image: Option<String>,
    pub featured: bool,
    pub category_id: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub slug: Option<String>,
    pub image: Option<Option<String>>,
    pub featured: Option<bool>,
    pub category_id: Option<Option<i64>>,
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn ping(&self) -> StoreResult<()>;

    // users
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn user_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    // categories
    async fn list_categories(&self, page: PageRequest) -> StoreResult<Page<Category>>;
    async fn category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>>;
    async fn category_by_id(&self, id: i64) -> StoreResult<Option<Category>>;
    async fn create_category(&self, category: NewCategory) -> StoreResult<Category>;
    async fn update_category(&self, slug: &str, patch: CategoryPatch) -> StoreResult<Category>;
    /// Products of a deleted category become uncategorised.
    async fn delete_category(&self, slug: &str) -> StoreResult<()>;

    // products
    async fn list_products(&self, filter: &ProductFilter, page: PageRequest) -> StoreResult<Page<Product>>;
    async fn search_products(&self, term: &str) -> StoreResult<Vec<Product>>;
    async fn product_by_id(&self, id: i64) -> StoreResult<Option<Product>>;
    async fn product_by_slug(&self, slug: &str) -> StoreResult<Option<Product>>;
    async fn products_in_category(&self, category_id: i64, exclude: Option<i64>) -> StoreResult<Vec<Product>>;
    async fn create_product(&self, product: NewProduct) -> StoreResult<Product>;
    async fn update_product(&self, slug: &str, patch: ProductPatch) -> StoreResult<Product>;
    async fn delete_product(&self, slug: &str) -> StoreResult<()>;
    async fn product_rating(&self, product_id: i64) -> StoreResult<Option<ProductRating>>;

    // carts
    async fn cart_by_code(&self, code: &str) -> StoreResult<Option<Cart>>;
    /// Creates the cart if needed, then adds one unit of the product.
    async fn add_to_cart(&self, code: &str, product_id: i64) -> StoreResult<Cart>;
    async fn update_cart_item_quantity(&self, item_id: i64, quantity: i32) -> StoreResult<CartItem>;
    async fn delete_cart_item(&self, item_id: i64) -> StoreResult<()>;

    // reviews
    async fn reviews_for_product(&self, product_id: i64) -> StoreResult<Vec<Review>>;
    async fn create_review(&self, product_id: i64, user_id: i64, rating: Rating, text: &str) -> StoreResult<Review>;
    async fn update_review(&self, review_id: i64, rating: Rating, text: Option<&str>) -> StoreResult<Review>;
    async fn delete_review(&self, review_id: i64) -> StoreResult<()>;

    // wishlists
    async fn toggle_wishlist(&self, user_id: i64, product_id: i64) -> StoreResult<WishlistToggle>;
    async fn wishlists_for_email(&self, email: &str) -> StoreResult<Vec<Wishlist>>;
    async fn product_in_wishlist(&self, email: &str, product_id: i64) -> StoreResult<bool>;

    // addresses
    /// Returns the address and whether it was newly created.
    async fn upsert_address(&self, user_id: i64, fields: AddressFields) -> StoreResult<(CustomerAddress, bool)>;
    async fn address_for_email(&self, email: &str) -> StoreResult<Option<CustomerAddress>>;

    // orders
    /// Records a paid checkout and empties the cart in one step. Returns
    /// `None` when an order for the checkout id already exists.
    async fn fulfill_checkout(&self, order: NewOrder, cart_code: Option<&str>) -> StoreResult<Option<Order>>;
    async fn orders_for_email(&self, email: &str) -> StoreResult<Vec<Order>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_bounds() {
        let p = PageRequest::new(Some(0), Some(500));
        assert_eq!(p.page, 1);
        assert_eq!(p.page_size, PageRequest::MAX_SIZE);
        assert_eq!(PageRequest::new(Some(3), Some(5)).offset(), 10);
    }

    #[test]
    fn test_page_math() {
        let page = Page { items: vec![0; 5], total: 18, request: PageRequest::new(Some(1), Some(5)) };
        assert_eq!(page.num_pages(), 4);
        assert!(page.has_next());
        assert!(!page.has_previous());
        let last = Page { items: vec![0; 3], total: 18, request: PageRequest::new(Some(4), Some(5)) };
        assert!(!last.has_next());
        let empty: Page<i32> = Page { items: vec![], total: 0, request: PageRequest::default() };
        assert!(!empty.is_out_of_range());
        let beyond: Page<i32> = Page { items: vec![], total: 3, request: PageRequest::new(Some(2), None) };
        assert!(beyond.is_out_of_range());
    }

    #[test]
    fn test_ordering_parse() {
        assert_eq!(ProductOrdering::parse(Some("-price")), ProductOrdering::PriceDesc);
        assert_eq!(ProductOrdering::parse(Some("bogus")), ProductOrdering::IdAsc);
        assert_eq!(ProductOrdering::parse(None), ProductOrdering::IdAsc);
    }
}
