//! `PostgreSQL` store backed by a sqlx pool.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};

use super::{
    CategoryPatch, NewCategory, NewProduct, NewUser, Page, PageRequest, ProductFilter, ProductPatch, Store, StoreError,
    StoreResult,
};
use crate::domain::aggregates::{
    normalize_email, AddressFields, Cart, CartItem, Category, CustomerAddress, NewOrder, Order, OrderItem, OrderStatus, Product, ProductRating,
    ProductSummary, Review, User, Wishlist, WishlistToggle,
};
use crate::domain::value_objects::{Rating, Slug};

const PRODUCT_COLS: &str = "p.id, p.name, p.description, p.price, p.slug, p.image, p.featured, p.category_id";
const SUMMARY_COLS: &str = "p.id AS p_id, p.name AS p_name, p.slug AS p_slug, p.image AS p_image, p.price AS p_price";
const USER_COLS: &str = "u.id AS u_id, u.email AS u_email, u.username AS u_username, u.first_name AS u_first_name, \
    u.last_name AS u_last_name, u.profile_picture_url AS u_profile_picture_url, u.password_hash AS u_password_hash, \
    u.is_staff AS u_is_staff, u.is_active AS u_is_active, u.date_joined AS u_date_joined";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded migrations in `migrations/`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn taken_slugs(&self, table: &'static str, base: &Slug) -> StoreResult<HashSet<String>> {
        let sql = format!("SELECT slug FROM {table} WHERE slug LIKE $1");
        let rows: Vec<(String,)> = sqlx::query_as(&sql)
            .bind(format!("{}%", escape_like(&base.stem())))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }
}

/// Maps constraint violations onto store errors; everything else stays a database error.
fn classify(err: sqlx::Error, unique: &'static str, foreign: &'static str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() { return StoreError::Conflict(unique); }
        if db.is_foreign_key_violation() { return StoreError::NotFound(foreign); }
    }
    StoreError::Database(err)
}

fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn contains_pattern(value: &str) -> String { format!("%{}%", escape_like(value)) }

fn user_from_row(row: &PgRow) -> sqlx::Result<User> {
    Ok(User {
        id: row.try_get("u_id")?,
        email: row.try_get("u_email")?,
        username: row.try_get("u_username")?,
        first_name: row.try_get("u_first_name")?,
        last_name: row.try_get("u_last_name")?,
        profile_picture_url: row.try_get("u_profile_picture_url")?,
        password_hash: row.try_get("u_password_hash")?,
        is_staff: row.try_get("u_is_staff")?,
        is_active: row.try_get("u_is_active")?,
        date_joined: row.try_get("u_date_joined")?,
    })
}

fn summary_from_row(row: &PgRow) -> sqlx::Result<ProductSummary> {
    Ok(ProductSummary {
        id: row.try_get("p_id")?,
        name: row.try_get("p_name")?,
        slug: row.try_get("p_slug")?,
        image: row.try_get("p_image")?,
        price: row.try_get("p_price")?,
    })
}

fn review_from_row(row: &PgRow) -> StoreResult<Review> {
    let rating: i16 = row.try_get("rating")?;
    Ok(Review {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        user: user_from_row(row)?,
        rating: Rating::new(i64::from(rating)).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        review: row.try_get("review")?,
        created: row.try_get("created")?,
        updated: row.try_get("updated")?,
    })
}

fn wishlist_from_row(row: &PgRow) -> StoreResult<Wishlist> {
    Ok(Wishlist { id: row.try_get("id")?, user: user_from_row(row)?, product: summary_from_row(row)?, created: row.try_get("created")? })
}

fn address_from_row(row: &PgRow) -> StoreResult<CustomerAddress> {
    Ok(CustomerAddress {
        id: row.try_get("id")?,
        customer: user_from_row(row)?,
        street: row.try_get("street")?,
        state: row.try_get("state")?,
        city: row.try_get("city")?,
        phone: row.try_get("phone")?,
    })
}

#[derive(sqlx::FromRow)]
struct CartRecord { id: i64, cart_code: String, created_at: DateTime<Utc>, updated_at: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct OrderRecord {
    id: i64,
    stripe_checkout_id: String,
    amount: Decimal,
    currency: String,
    customer_email: String,
    status: String,
    created_at: DateTime<Utc>,
}

fn review_select(filter: &str) -> String {
    format!("SELECT r.id, r.product_id, r.rating, r.review, r.created, r.updated, {USER_COLS} \
        FROM reviews r JOIN users u ON u.id = r.user_id WHERE {filter}")
}

fn wishlist_select(filter: &str) -> String {
    format!("SELECT w.id, w.created, {USER_COLS}, {SUMMARY_COLS} FROM wishlists w \
        JOIN users u ON u.id = w.user_id JOIN products p ON p.id = w.product_id WHERE {filter} ORDER BY w.id")
}

async fn load_cart_items(conn: &mut PgConnection, cart_id: i64) -> StoreResult<Vec<CartItem>> {
    let sql = format!("SELECT ci.id, ci.quantity, {SUMMARY_COLS} FROM cart_items ci JOIN products p ON p.id = ci.product_id WHERE ci.cart_id = $1 ORDER BY ci.id");
    let rows = sqlx::query(&sql).bind(cart_id).fetch_all(&mut *conn).await?;
    rows.iter()
        .map(|row| -> StoreResult<CartItem> {
            Ok(CartItem { id: row.try_get("id")?, quantity: row.try_get("quantity")?, product: summary_from_row(row)? })
        })
        .collect()
}

async fn load_cart(conn: &mut PgConnection, code: &str) -> StoreResult<Option<Cart>> {
    let record = sqlx::query_as::<_, CartRecord>("SELECT id, cart_code, created_at, updated_at FROM carts WHERE cart_code = $1")
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(record) = record else { return Ok(None) };
    let items = load_cart_items(conn, record.id).await?;
    Ok(Some(Cart { id: record.id, cart_code: record.cart_code, items, created_at: record.created_at, updated_at: record.updated_at }))
}

async fn load_cart_item(conn: &mut PgConnection, item_id: i64) -> StoreResult<Option<CartItem>> {
    let sql = format!("SELECT ci.id, ci.quantity, {SUMMARY_COLS} FROM cart_items ci JOIN products p ON p.id = ci.product_id WHERE ci.id = $1");
    let row = sqlx::query(&sql).bind(item_id).fetch_optional(&mut *conn).await?;
    row.map(|row| -> StoreResult<CartItem> { Ok(CartItem { id: row.try_get("id")?, quantity: row.try_get("quantity")?, product: summary_from_row(&row)? }) }).transpose()
}

async fn load_review(conn: &mut PgConnection, review_id: i64) -> StoreResult<Review> {
    let row = sqlx::query(&review_select("r.id = $1")).bind(review_id).fetch_optional(&mut *conn).await?;
    review_from_row(&row.ok_or(StoreError::NotFound("review"))?)
}

/// Recomputes the rating aggregate of one product from its reviews.
async fn refresh_rating(conn: &mut PgConnection, product_id: i64) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO product_ratings (product_id, average_rating, total_reviews) \
         SELECT $1, COALESCE(AVG(rating)::float8, 0), COUNT(*)::int4 FROM reviews WHERE product_id = $1 \
         ON CONFLICT (product_id) DO UPDATE SET average_rating = EXCLUDED.average_rating, total_reviews = EXCLUDED.total_reviews",
    )
    .bind(product_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn load_orders(conn: &mut PgConnection, records: Vec<OrderRecord>) -> StoreResult<Vec<Order>> {
    let ids: Vec<i64> = records.iter().map(|o| o.id).collect();
    let sql = format!("SELECT oi.id, oi.order_id, oi.quantity, {SUMMARY_COLS} FROM order_items oi \
        JOIN products p ON p.id = oi.product_id WHERE oi.order_id = ANY($1) ORDER BY oi.id");
    let rows = sqlx::query(&sql).bind(&ids).fetch_all(&mut *conn).await?;
    let mut items: Vec<(i64, OrderItem)> = Vec::with_capacity(rows.len());
    for row in &rows {
        items.push((row.try_get("order_id")?, OrderItem { id: row.try_get("id")?, quantity: row.try_get("quantity")?, product: summary_from_row(row)? }));
    }
    records
        .into_iter()
        .map(|o| -> StoreResult<Order> {
            let status = o.status.parse::<OrderStatus>().map_err(StoreError::Corrupt)?;
            let order_items = items.iter().filter(|(order_id, _)| *order_id == o.id).map(|(_, i)| i.clone()).collect();
            Ok(Order {
                id: o.id, stripe_checkout_id: o.stripe_checkout_id, amount: o.amount, currency: o.currency,
                customer_email: o.customer_email, items: order_items, status, created_at: o.created_at,
            })
        })
        .collect()
}

fn push_product_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    qb.push(" FROM products p LEFT JOIN categories c ON c.id = p.category_id WHERE TRUE");
    if let Some(name) = &filter.name {
        qb.push(" AND p.name ILIKE ").push_bind(contains_pattern(name));
    }
    if let Some(slug) = &filter.category_slug {
        qb.push(" AND LOWER(c.slug) = LOWER(").push_bind(slug.clone()).push(")");
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND p.price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND p.price <= ").push_bind(max);
    }
    if let Some(featured) = filter.featured {
        qb.push(" AND p.featured = ").push_bind(featured);
    }
    if let Some(term) = &filter.search {
        let pattern = contains_pattern(term);
        qb.push(" AND (p.name ILIKE ").push_bind(pattern.clone())
            .push(" OR p.description ILIKE ").push_bind(pattern.clone())
            .push(" OR c.name ILIKE ").push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (username, email, password_hash, first_name, last_name, profile_picture_url, is_staff) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(&user.username).bind(normalize_email(&user.email)).bind(&user.password_hash).bind(&user.first_name)
        .bind(&user.last_name).bind(&user.profile_picture_url).bind(user.is_staff)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            let email_taken = matches!(&err, sqlx::Error::Database(db) if db.constraint() == Some("users_email_key"));
            if email_taken { StoreError::Conflict("email") } else { classify(err, "username", "user") }
        })
    }

    async fn user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1").bind(id).fetch_optional(&self.pool).await?)
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1").bind(normalize_email(email)).fetch_optional(&self.pool).await?)
    }

    async fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1").bind(username).fetch_optional(&self.pool).await?)
    }

    async fn list_categories(&self, page: PageRequest) -> StoreResult<Page<Category>> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM categories").fetch_one(&self.pool).await?;
        let items = sqlx::query_as::<_, Category>("SELECT id, name, image, slug FROM categories ORDER BY id LIMIT $1 OFFSET $2")
            .bind(page.limit()).bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        Ok(Page { items, total, request: page })
    }

    async fn category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>> {
        Ok(sqlx::query_as::<_, Category>("SELECT id, name, image, slug FROM categories WHERE slug = $1").bind(slug).fetch_optional(&self.pool).await?)
    }

    async fn category_by_id(&self, id: i64) -> StoreResult<Option<Category>> {
        Ok(sqlx::query_as::<_, Category>("SELECT id, name, image, slug FROM categories WHERE id = $1").bind(id).fetch_optional(&self.pool).await?)
    }

    async fn create_category(&self, category: NewCategory) -> StoreResult<Category> {
        let slug = match category.slug {
            Some(slug) => slug,
            None => {
                let base = Slug::from_name(&category.name);
                let taken = self.taken_slugs("categories", &base).await?;
                Slug::unique(&base, |s| taken.contains(s)).into_inner()
            }
        };
        sqlx::query_as::<_, Category>("INSERT INTO categories (name, slug, image) VALUES ($1, $2, $3) RETURNING id, name, image, slug")
            .bind(&category.name).bind(&slug).bind(&category.image)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(e, "slug", "category"))
    }

    async fn update_category(&self, slug: &str, patch: CategoryPatch) -> StoreResult<Category> {
        let set_image = patch.image.is_some();
        sqlx::query_as::<_, Category>(
            "UPDATE categories SET name = COALESCE($2, name), slug = COALESCE($3, slug), \
             image = CASE WHEN $4 THEN $5 ELSE image END WHERE slug = $1 RETURNING id, name, image, slug",
        )
        .bind(slug).bind(patch.name).bind(patch.slug).bind(set_image).bind(patch.image.flatten())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify(e, "slug", "category"))?
        .ok_or(StoreError::NotFound("category"))
    }

    async fn delete_category(&self, slug: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM categories WHERE slug = $1").bind(slug).execute(&self.pool).await?;
        if result.rows_affected() == 0 { return Err(StoreError::NotFound("category")); }
        Ok(())
    }

    async fn list_products(&self, filter: &ProductFilter, page: PageRequest) -> StoreResult<Page<Product>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*)");
        push_product_filters(&mut count, filter);
        let (total,) = count.build_query_as::<(i64,)>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {PRODUCT_COLS}"));
        push_product_filters(&mut select, filter);
        select.push(format!(" ORDER BY {}", filter.ordering.sql()));
        select.push(" LIMIT ").push_bind(page.limit()).push(" OFFSET ").push_bind(page.offset());
        let items = select.build_query_as::<Product>().fetch_all(&self.pool).await?;
        Ok(Page { items, total, request: page })
    }

    async fn search_products(&self, term: &str) -> StoreResult<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLS} FROM products p LEFT JOIN categories c ON c.id = p.category_id \
            WHERE p.name ILIKE $1 OR p.description ILIKE $1 OR c.name ILIKE $1 ORDER BY p.id");
        Ok(sqlx::query_as::<_, Product>(&sql).bind(contains_pattern(term)).fetch_all(&self.pool).await?)
    }

    async fn product_by_id(&self, id: i64) -> StoreResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLS} FROM products p WHERE p.id = $1");
        Ok(sqlx::query_as::<_, Product>(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn product_by_slug(&self, slug: &str) -> StoreResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLS} FROM products p WHERE p.slug = $1");
        Ok(sqlx::query_as::<_, Product>(&sql).bind(slug).fetch_optional(&self.pool).await?)
    }

    async fn products_in_category(&self, category_id: i64, exclude: Option<i64>) -> StoreResult<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLS} FROM products p WHERE p.category_id = $1 AND ($2::BIGINT IS NULL OR p.id <> $2) ORDER BY p.id");
        Ok(sqlx::query_as::<_, Product>(&sql).bind(category_id).bind(exclude).fetch_all(&self.pool).await?)
    }

    async fn create_product(&self, product: NewProduct) -> StoreResult<Product> {
        let slug = match product.slug {
            Some(slug) => slug,
            None => {
                let base = Slug::from_name(&product.name);
                let taken = self.taken_slugs("products", &base).await?;
                Slug::unique(&base, |s| taken.contains(s)).into_inner()
            }
        };
        sqlx::query_as::<_, Product>(
            "INSERT INTO products (name, description, price, slug, image, featured, category_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id, name, description, price, slug, image, featured, category_id",
        )
        .bind(&product.name).bind(&product.description).bind(product.price).bind(&slug)
        .bind(&product.image).bind(product.featured).bind(product.category_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "slug", "category"))
    }

    async fn update_product(&self, slug: &str, patch: ProductPatch) -> StoreResult<Product> {
        let set_image = patch.image.is_some();
        let set_category = patch.category_id.is_some();
        sqlx::query_as::<_, Product>(
            "UPDATE products SET name = COALESCE($2, name), description = COALESCE($3, description), \
             price = COALESCE($4, price), slug = COALESCE($5, slug), image = CASE WHEN $6 THEN $7 ELSE image END, \
             featured = COALESCE($8, featured), category_id = CASE WHEN $9 THEN $10 ELSE category_id END \
             WHERE slug = $1 RETURNING id, name, description, price, slug, image, featured, category_id",
        )
        .bind(slug).bind(patch.name).bind(patch.description).bind(patch.price).bind(patch.slug)
        .bind(set_image).bind(patch.image.flatten()).bind(patch.featured)
        .bind(set_category).bind(patch.category_id.flatten())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify(e, "slug", "category"))?
        .ok_or(StoreError::NotFound("product"))
    }

    async fn delete_product(&self, slug: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE slug = $1").bind(slug).execute(&self.pool).await?;
        if result.rows_affected() == 0 { return Err(StoreError::NotFound("product")); }
        Ok(())
    }

    async fn product_rating(&self, product_id: i64) -> StoreResult<Option<ProductRating>> {
        Ok(sqlx::query_as::<_, ProductRating>("SELECT id, product_id, average_rating, total_reviews FROM product_ratings WHERE product_id = $1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn cart_by_code(&self, code: &str) -> StoreResult<Option<Cart>> {
        let mut conn = self.pool.acquire().await?;
        load_cart(&mut conn, code).await
    }

    async fn add_to_cart(&self, code: &str, product_id: i64) -> StoreResult<Cart> {
        let mut tx = self.pool.begin().await?;
        let (cart_id,): (i64,) = sqlx::query_as(
            "INSERT INTO carts (cart_code) VALUES ($1) ON CONFLICT (cart_code) DO UPDATE SET updated_at = NOW() RETURNING id",
        )
        .bind(code)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO cart_items (cart_id, product_id, quantity) VALUES ($1, $2, 1) \
             ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = cart_items.quantity + 1",
        )
        .bind(cart_id).bind(product_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify(e, "cart item", "product"))?;
        let cart = load_cart(&mut tx, code).await?.ok_or(StoreError::NotFound("cart"))?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn update_cart_item_quantity(&self, item_id: i64, quantity: i32) -> StoreResult<CartItem> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE cart_items SET quantity = $2 WHERE id = $1").bind(item_id).bind(quantity).execute(&mut *tx).await?;
        if result.rows_affected() == 0 { return Err(StoreError::NotFound("cart item")); }
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = (SELECT cart_id FROM cart_items WHERE id = $1)")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;
        let item = load_cart_item(&mut tx, item_id).await?.ok_or(StoreError::NotFound("cart item"))?;
        tx.commit().await?;
        Ok(item)
    }

    async fn delete_cart_item(&self, item_id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1").bind(item_id).execute(&self.pool).await?;
        if result.rows_affected() == 0 { return Err(StoreError::NotFound("cart item")); }
        Ok(())
    }

    async fn reviews_for_product(&self, product_id: i64) -> StoreResult<Vec<Review>> {
        let sql = format!("{} ORDER BY r.created DESC, r.id DESC", review_select("r.product_id = $1"));
        let rows = sqlx::query(&sql).bind(product_id).fetch_all(&self.pool).await?;
        rows.iter().map(review_from_row).collect()
    }

    async fn create_review(&self, product_id: i64, user_id: i64, rating: Rating, text: &str) -> StoreResult<Review> {
        let mut tx = self.pool.begin().await?;
        let (id,): (i64,) = sqlx::query_as("INSERT INTO reviews (product_id, user_id, rating, review) VALUES ($1, $2, $3, $4) RETURNING id")
            .bind(product_id).bind(user_id).bind(i16::from(rating.value())).bind(text)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify(e, "review", "product"))?;
        refresh_rating(&mut tx, product_id).await?;
        let review = load_review(&mut tx, id).await?;
        tx.commit().await?;
        Ok(review)
    }

    async fn update_review(&self, review_id: i64, rating: Rating, text: Option<&str>) -> StoreResult<Review> {
        let mut tx = self.pool.begin().await?;
        let product_id: Option<(i64,)> = sqlx::query_as(
            "UPDATE reviews SET rating = $2, review = COALESCE($3, review), updated = NOW() WHERE id = $1 RETURNING product_id",
        )
        .bind(review_id).bind(i16::from(rating.value())).bind(text)
        .fetch_optional(&mut *tx)
        .await?;
        let (product_id,) = product_id.ok_or(StoreError::NotFound("review"))?;
        refresh_rating(&mut tx, product_id).await?;
        let review = load_review(&mut tx, review_id).await?;
        tx.commit().await?;
        Ok(review)
    }

    async fn delete_review(&self, review_id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let product_id: Option<(i64,)> = sqlx::query_as("DELETE FROM reviews WHERE id = $1 RETURNING product_id")
            .bind(review_id)
            .fetch_optional(&mut *tx)
            .await?;
        let (product_id,) = product_id.ok_or(StoreError::NotFound("review"))?;
        refresh_rating(&mut tx, product_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn toggle_wishlist(&self, user_id: i64, product_id: i64) -> StoreResult<WishlistToggle> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM wishlists WHERE user_id = $1 AND product_id = $2")
            .bind(user_id).bind(product_id)
            .execute(&mut *tx)
            .await?;
        if removed.rows_affected() > 0 {
            tx.commit().await?;
            return Ok(WishlistToggle::Removed);
        }
        let (id,): (i64,) = sqlx::query_as("INSERT INTO wishlists (user_id, product_id) VALUES ($1, $2) RETURNING id")
            .bind(user_id).bind(product_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify(e, "wishlist", "product"))?;
        let row = sqlx::query(&wishlist_select("w.id = $1")).bind(id).fetch_one(&mut *tx).await?;
        let wishlist = wishlist_from_row(&row)?;
        tx.commit().await?;
        Ok(WishlistToggle::Added(wishlist))
    }

    async fn wishlists_for_email(&self, email: &str) -> StoreResult<Vec<Wishlist>> {
        let rows = sqlx::query(&wishlist_select("u.email = $1")).bind(normalize_email(email)).fetch_all(&self.pool).await?;
        rows.iter().map(wishlist_from_row).collect()
    }

    async fn product_in_wishlist(&self, email: &str, product_id: i64) -> StoreResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM wishlists w JOIN users u ON u.id = w.user_id WHERE u.email = $1 AND w.product_id = $2)",
        )
        .bind(normalize_email(email)).bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn upsert_address(&self, user_id: i64, fields: AddressFields) -> StoreResult<(CustomerAddress, bool)> {
        let mut tx = self.pool.begin().await?;
        let (id, created): (i64, bool) = sqlx::query_as(
            "INSERT INTO customer_addresses (customer_id, street, state, city, phone) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (customer_id) DO UPDATE SET street = EXCLUDED.street, state = EXCLUDED.state, \
             city = EXCLUDED.city, phone = EXCLUDED.phone RETURNING id, (xmax = 0) AS created",
        )
        .bind(user_id).bind(&fields.street).bind(&fields.state).bind(&fields.city).bind(&fields.phone)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| classify(e, "address", "user"))?;
        let sql = format!("SELECT a.id, a.street, a.state, a.city, a.phone, {USER_COLS} FROM customer_addresses a \
            JOIN users u ON u.id = a.customer_id WHERE a.id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_one(&mut *tx).await?;
        let address = address_from_row(&row)?;
        tx.commit().await?;
        Ok((address, created))
    }

    async fn address_for_email(&self, email: &str) -> StoreResult<Option<CustomerAddress>> {
        let sql = format!("SELECT a.id, a.street, a.state, a.city, a.phone, {USER_COLS} FROM customer_addresses a \
            JOIN users u ON u.id = a.customer_id WHERE u.email = $1 ORDER BY a.id DESC LIMIT 1");
        let row = sqlx::query(&sql).bind(normalize_email(email)).fetch_optional(&self.pool).await?;
        row.as_ref().map(address_from_row).transpose()
    }

    async fn fulfill_checkout(&self, order: NewOrder, cart_code: Option<&str>) -> StoreResult<Option<Order>> {
        let mut tx = self.pool.begin().await?;
        let inserted: Option<(i64,)> = sqlx::query_as(
            "INSERT INTO orders (stripe_checkout_id, amount, currency, customer_email, status) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (stripe_checkout_id) DO NOTHING RETURNING id",
        )
        .bind(&order.stripe_checkout_id).bind(order.amount).bind(&order.currency)
        .bind(&order.customer_email).bind(order.status.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let Some((order_id,)) = inserted else {
            tx.rollback().await?;
            return Ok(None);
        };

        if let Some(code) = cart_code {
            let cart: Option<(i64,)> = sqlx::query_as("SELECT id FROM carts WHERE cart_code = $1 FOR UPDATE")
                .bind(code)
                .fetch_optional(&mut *tx)
                .await?;
            if let Some((cart_id,)) = cart {
                sqlx::query(
                    "INSERT INTO order_items (order_id, product_id, quantity) \
                     SELECT $1, product_id, quantity FROM cart_items WHERE cart_id = $2 ORDER BY id",
                )
                .bind(order_id).bind(cart_id)
                .execute(&mut *tx)
                .await?;
                sqlx::query("DELETE FROM carts WHERE id = $1").bind(cart_id).execute(&mut *tx).await?;
            }
        }

        let records = sqlx::query_as::<_, OrderRecord>(
            "SELECT id, stripe_checkout_id, amount, currency, customer_email, status, created_at FROM orders WHERE id = $1",
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;
        let created = load_orders(&mut tx, records).await?.pop();
        tx.commit().await?;
        Ok(created)
    }

    async fn orders_for_email(&self, email: &str) -> StoreResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let records = sqlx::query_as::<_, OrderRecord>(
            "SELECT id, stripe_checkout_id, amount, currency, customer_email, status, created_at \
             FROM orders WHERE LOWER(customer_email) = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(normalize_email(email))
        .fetch_all(&mut *conn)
        .await?;
        load_orders(&mut conn, records).await
    }
}
