//! In-process store for tests and local demos.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    CategoryPatch, NewCategory, NewProduct, NewUser, Page, PageRequest, ProductFilter, ProductOrdering, ProductPatch,
    Store, StoreError, StoreResult,
};
use crate::domain::aggregates::{
    normalize_email, AddressFields, Cart, CartItem, Category, CustomerAddress, NewOrder, Order, OrderItem, Product, ProductRating,
    Review, User, Wishlist, WishlistToggle,
};
use crate::domain::value_objects::{Rating, Slug};

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

#[derive(Default)]
struct Tables {
    seq: i64,
    users: BTreeMap<i64, User>,
    categories: BTreeMap<i64, Category>,
    products: BTreeMap<i64, Product>,
    ratings: BTreeMap<i64, ProductRating>,
    carts: BTreeMap<i64, CartRow>,
    cart_items: BTreeMap<i64, CartItemRow>,
    reviews: BTreeMap<i64, ReviewRow>,
    wishlists: BTreeMap<i64, WishlistRow>,
    addresses: BTreeMap<i64, AddressRow>,
    orders: BTreeMap<i64, OrderRow>,
    order_items: BTreeMap<i64, OrderItemRow>,
}

struct CartRow { id: i64, code: String, created_at: DateTime<Utc>, updated_at: DateTime<Utc> }
struct CartItemRow { id: i64, cart_id: i64, product_id: i64, quantity: i32 }
struct ReviewRow { id: i64, product_id: i64, user_id: i64, rating: Rating, review: String, created: DateTime<Utc>, updated: DateTime<Utc> }
struct WishlistRow { id: i64, user_id: i64, product_id: i64, created: DateTime<Utc> }
struct AddressRow { id: i64, user_id: i64, fields: AddressFields }
struct OrderRow { id: i64, new: NewOrder, created_at: DateTime<Utc> }
struct OrderItemRow { id: i64, order_id: i64, product_id: i64, quantity: i32 }

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.seq += 1;
        self.seq
    }

    fn user(&self, id: i64) -> StoreResult<&User> {
        self.users.get(&id).ok_or(StoreError::NotFound("user"))
    }

    fn user_by_email(&self, email: &str) -> Option<&User> {
        let email = normalize_email(email);
        self.users.values().find(|u| u.email == email)
    }

    fn user_id_by_email(&self, email: &str) -> Option<i64> {
        self.user_by_email(email).map(|u| u.id)
    }

    fn product(&self, id: i64) -> StoreResult<&Product> {
        self.products.get(&id).ok_or(StoreError::NotFound("product"))
    }

    fn category_name(&self, id: Option<i64>) -> Option<&str> {
        id.and_then(|id| self.categories.get(&id)).map(|c| c.name.as_str())
    }

    fn product_slug_taken(&self, slug: &str, except: Option<i64>) -> bool {
        self.products.values().any(|p| p.slug == slug && Some(p.id) != except)
    }

    fn category_slug_taken(&self, slug: &str, except: Option<i64>) -> bool {
        self.categories.values().any(|c| c.slug == slug && Some(c.id) != except)
    }

    fn cart(&self, row: &CartRow) -> StoreResult<Cart> {
        let items = self.cart_items.values().filter(|i| i.cart_id == row.id).map(|i| self.cart_item(i)).collect::<StoreResult<_>>()?;
        Ok(Cart { id: row.id, cart_code: row.code.clone(), items, created_at: row.created_at, updated_at: row.updated_at })
    }

    fn cart_item(&self, row: &CartItemRow) -> StoreResult<CartItem> {
        Ok(CartItem { id: row.id, product: self.product(row.product_id)?.summary(), quantity: row.quantity })
    }

    fn review(&self, row: &ReviewRow) -> StoreResult<Review> {
        Ok(Review {
            id: row.id, product_id: row.product_id, user: self.user(row.user_id)?.clone(), rating: row.rating,
            review: row.review.clone(), created: row.created, updated: row.updated,
        })
    }

    fn wishlist(&self, row: &WishlistRow) -> StoreResult<Wishlist> {
        Ok(Wishlist { id: row.id, user: self.user(row.user_id)?.clone(), product: self.product(row.product_id)?.summary(), created: row.created })
    }

    fn address(&self, row: &AddressRow) -> StoreResult<CustomerAddress> {
        let f = &row.fields;
        Ok(CustomerAddress {
            id: row.id, customer: self.user(row.user_id)?.clone(),
            street: f.street.clone(), state: f.state.clone(), city: f.city.clone(), phone: f.phone.clone(),
        })
    }

    fn order(&self, row: &OrderRow) -> StoreResult<Order> {
        let items = self.order_items.values().filter(|i| i.order_id == row.id)
            .map(|i| -> StoreResult<OrderItem> { Ok(OrderItem { id: i.id, quantity: i.quantity, product: self.product(i.product_id)?.summary() }) })
            .collect::<StoreResult<_>>()?;
        Ok(Order {
            id: row.id, stripe_checkout_id: row.new.stripe_checkout_id.clone(), amount: row.new.amount,
            currency: row.new.currency.clone(), customer_email: row.new.customer_email.clone(), items,
            status: row.new.status, created_at: row.created_at,
        })
    }

    fn refresh_rating(&mut self, product_id: i64) {
        let (average_rating, total_reviews) = ProductRating::aggregate(
            self.reviews.values().filter(|r| r.product_id == product_id).map(|r| r.rating.value()),
        );
        match self.ratings.get_mut(&product_id) {
            Some(rating) => {
                rating.average_rating = average_rating;
                rating.total_reviews = total_reviews;
            }
            None => {
                let id = self.next_id();
                self.ratings.insert(product_id, ProductRating { id, product_id, average_rating, total_reviews });
            }
        }
    }

    fn matches(&self, p: &Product, filter: &ProductFilter) -> bool {
        if let Some(name) = &filter.name {
            if !p.name.to_lowercase().contains(&name.to_lowercase()) { return false; }
        }
        if let Some(slug) = &filter.category_slug {
            let category_slug = p.category_id.and_then(|id| self.categories.get(&id)).map(|c| c.slug.to_lowercase());
            if category_slug.as_deref() != Some(slug.to_lowercase().as_str()) { return false; }
        }
        if filter.min_price.is_some_and(|min| p.price < min) { return false; }
        if filter.max_price.is_some_and(|max| p.price > max) { return false; }
        if filter.featured.is_some_and(|f| p.featured != f) { return false; }
        if let Some(term) = &filter.search {
            if !p.matches_search(term, self.category_name(p.category_id)) { return false; }
        }
        true
    }
}

fn sort_products(products: &mut [Product], ordering: ProductOrdering) {
    match ordering {
        ProductOrdering::IdAsc => products.sort_by_key(|p| p.id),
        ProductOrdering::IdDesc => products.sort_by_key(|p| std::cmp::Reverse(p.id)),
        ProductOrdering::PriceAsc => products.sort_by(|a, b| a.price.cmp(&b.price).then(a.id.cmp(&b.id))),
        ProductOrdering::PriceDesc => products.sort_by(|a, b| b.price.cmp(&a.price).then(a.id.cmp(&b.id))),
        ProductOrdering::NameAsc => products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id))),
        ProductOrdering::NameDesc => products.sort_by(|a, b| b.name.cmp(&a.name).then(a.id.cmp(&b.id))),
    }
}

fn paginate<T: Clone>(all: &[T], request: PageRequest) -> Page<T> {
    let start = usize::try_from(request.offset()).unwrap_or(usize::MAX);
    let items = all.iter().skip(start).take(request.page_size as usize).cloned().collect();
    Page { items, total: all.len() as i64, request }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> { Ok(()) }

    async fn create_user(&self, mut user: NewUser) -> StoreResult<User> {
        user.email = normalize_email(&user.email);
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.email == user.email) { return Err(StoreError::Conflict("email")); }
        if t.users.values().any(|u| u.username == user.username) { return Err(StoreError::Conflict("username")); }
        let id = t.next_id();
        let user = User {
            id, email: user.email, username: user.username, first_name: user.first_name, last_name: user.last_name,
            profile_picture_url: user.profile_picture_url, password_hash: user.password_hash, is_staff: user.is_staff,
            is_active: true, date_joined: Utc::now(),
        };
        t.users.insert(id, user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.user_by_email(email).cloned())
    }

    async fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.values().find(|u| u.username == username).cloned())
    }

    async fn list_categories(&self, page: PageRequest) -> StoreResult<Page<Category>> {
        let t = self.tables.read().await;
        let all: Vec<Category> = t.categories.values().cloned().collect();
        Ok(paginate(&all, page))
    }

    async fn category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>> {
        Ok(self.tables.read().await.categories.values().find(|c| c.slug == slug).cloned())
    }

    async fn category_by_id(&self, id: i64) -> StoreResult<Option<Category>> {
        Ok(self.tables.read().await.categories.get(&id).cloned())
    }

    async fn create_category(&self, category: NewCategory) -> StoreResult<Category> {
        let mut t = self.tables.write().await;
        let slug = match category.slug {
            Some(slug) if t.category_slug_taken(&slug, None) => return Err(StoreError::Conflict("slug")),
            Some(slug) => slug,
            None => Slug::unique(&Slug::from_name(&category.name), |s| t.category_slug_taken(s, None)).into_inner(),
        };
        let id = t.next_id();
        let category = Category { id, name: category.name, image: category.image, slug };
        t.categories.insert(id, category.clone());
        Ok(category)
    }

    async fn update_category(&self, slug: &str, patch: CategoryPatch) -> StoreResult<Category> {
        let mut t = self.tables.write().await;
        let id = t.categories.values().find(|c| c.slug == slug).map(|c| c.id).ok_or(StoreError::NotFound("category"))?;
        if let Some(new_slug) = &patch.slug {
            if t.category_slug_taken(new_slug, Some(id)) { return Err(StoreError::Conflict("slug")); }
        }
        let category = t.categories.get_mut(&id).ok_or(StoreError::NotFound("category"))?;
        if let Some(name) = patch.name { category.name = name; }
        if let Some(slug) = patch.slug { category.slug = slug; }
        if let Some(image) = patch.image { category.image = image; }
        Ok(category.clone())
    }

    async fn delete_category(&self, slug: &str) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let id = t.categories.values().find(|c| c.slug == slug).map(|c| c.id).ok_or(StoreError::NotFound("category"))?;
        t.categories.remove(&id);
        for product in t.products.values_mut().filter(|p| p.category_id == Some(id)) {
            product.category_id = None;
        }
        Ok(())
    }

    async fn list_products(&self, filter: &ProductFilter, page: PageRequest) -> StoreResult<Page<Product>> {
        let t = self.tables.read().await;
        let mut all: Vec<Product> = t.products.values().filter(|p| t.matches(p, filter)).cloned().collect();
        sort_products(&mut all, filter.ordering);
        Ok(paginate(&all, page))
    }

    async fn search_products(&self, term: &str) -> StoreResult<Vec<Product>> {
        let t = self.tables.read().await;
        Ok(t.products.values().filter(|p| p.matches_search(term, t.category_name(p.category_id))).cloned().collect())
    }

    async fn product_by_id(&self, id: i64) -> StoreResult<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn product_by_slug(&self, slug: &str) -> StoreResult<Option<Product>> {
        Ok(self.tables.read().await.products.values().find(|p| p.slug == slug).cloned())
    }

    async fn products_in_category(&self, category_id: i64, exclude: Option<i64>) -> StoreResult<Vec<Product>> {
        let t = self.tables.read().await;
        Ok(t.products.values().filter(|p| p.category_id == Some(category_id) && Some(p.id) != exclude).cloned().collect())
    }

    async fn create_product(&self, product: NewProduct) -> StoreResult<Product> {
        let mut t = self.tables.write().await;
        if let Some(category_id) = product.category_id {
            if !t.categories.contains_key(&category_id) { return Err(StoreError::NotFound("category")); }
        }
        let slug = match product.slug {
            Some(slug) if t.product_slug_taken(&slug, None) => return Err(StoreError::Conflict("slug")),
            Some(slug) => slug,
            None => Slug::unique(&Slug::from_name(&product.name), |s| t.product_slug_taken(s, None)).into_inner(),
        };
        let id = t.next_id();
        let product = Product {
            id, name: product.name, description: product.description, price: product.price, slug,
            image: product.image, featured: product.featured, category_id: product.category_id,
        };
        t.products.insert(id, product.clone());
        Ok(product)
    }

    async fn update_product(&self, slug: &str, patch: ProductPatch) -> StoreResult<Product> {
        let mut t = self.tables.write().await;
        let id = t.products.values().find(|p| p.slug == slug).map(|p| p.id).ok_or(StoreError::NotFound("product"))?;
        if let Some(new_slug) = &patch.slug {
            if t.product_slug_taken(new_slug, Some(id)) { return Err(StoreError::Conflict("slug")); }
        }
        if let Some(Some(category_id)) = patch.category_id {
            if !t.categories.contains_key(&category_id) { return Err(StoreError::NotFound("category")); }
        }
        let product = t.products.get_mut(&id).ok_or(StoreError::NotFound("product"))?;
        if let Some(name) = patch.name { product.name = name; }
        if let Some(description) = patch.description { product.description = description; }
        if let Some(price) = patch.price { product.price = price; }
        if let Some(slug) = patch.slug { product.slug = slug; }
        if let Some(image) = patch.image { product.image = image; }
        if let Some(featured) = patch.featured { product.featured = featured; }
        if let Some(category_id) = patch.category_id { product.category_id = category_id; }
        Ok(product.clone())
    }

    async fn delete_product(&self, slug: &str) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let id = t.products.values().find(|p| p.slug == slug).map(|p| p.id).ok_or(StoreError::NotFound("product"))?;
        t.products.remove(&id);
        t.ratings.remove(&id);
        t.cart_items.retain(|_, i| i.product_id != id);
        t.reviews.retain(|_, r| r.product_id != id);
        t.wishlists.retain(|_, w| w.product_id != id);
        t.order_items.retain(|_, i| i.product_id != id);
        Ok(())
    }

    async fn product_rating(&self, product_id: i64) -> StoreResult<Option<ProductRating>> {
        Ok(self.tables.read().await.ratings.get(&product_id).cloned())
    }

    async fn cart_by_code(&self, code: &str) -> StoreResult<Option<Cart>> {
        let t = self.tables.read().await;
        t.carts.values().find(|c| c.code == code).map(|row| t.cart(row)).transpose()
    }

    async fn add_to_cart(&self, code: &str, product_id: i64) -> StoreResult<Cart> {
        let mut t = self.tables.write().await;
        t.product(product_id)?;
        let now = Utc::now();
        let existing = t.carts.values().find(|c| c.code == code).map(|c| c.id);
        let cart_id = match existing {
            Some(id) => id,
            None => {
                let id = t.next_id();
                t.carts.insert(id, CartRow { id, code: code.to_string(), created_at: now, updated_at: now });
                id
            }
        };
        let existing = t.cart_items.values().find(|i| i.cart_id == cart_id && i.product_id == product_id).map(|i| i.id);
        match existing.and_then(|id| t.cart_items.get_mut(&id)) {
            Some(item) => item.quantity += 1,
            None => {
                let id = t.next_id();
                t.cart_items.insert(id, CartItemRow { id, cart_id, product_id, quantity: 1 });
            }
        }
        let row = t.carts.get_mut(&cart_id).ok_or(StoreError::NotFound("cart"))?;
        row.updated_at = now;
        let row = t.carts.get(&cart_id).ok_or(StoreError::NotFound("cart"))?;
        t.cart(row)
    }

    async fn update_cart_item_quantity(&self, item_id: i64, quantity: i32) -> StoreResult<CartItem> {
        let mut t = self.tables.write().await;
        let item = t.cart_items.get_mut(&item_id).ok_or(StoreError::NotFound("cart item"))?;
        item.quantity = quantity;
        let item = t.cart_items.get(&item_id).ok_or(StoreError::NotFound("cart item"))?;
        t.cart_item(item)
    }

    async fn delete_cart_item(&self, item_id: i64) -> StoreResult<()> {
        self.tables.write().await.cart_items.remove(&item_id).map(|_| ()).ok_or(StoreError::NotFound("cart item"))
    }

    async fn reviews_for_product(&self, product_id: i64) -> StoreResult<Vec<Review>> {
        let t = self.tables.read().await;
        let mut rows: Vec<&ReviewRow> = t.reviews.values().filter(|r| r.product_id == product_id).collect();
        rows.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        rows.into_iter().map(|r| t.review(r)).collect()
    }

    async fn create_review(&self, product_id: i64, user_id: i64, rating: Rating, text: &str) -> StoreResult<Review> {
        let mut t = self.tables.write().await;
        t.product(product_id)?;
        t.user(user_id)?;
        if t.reviews.values().any(|r| r.product_id == product_id && r.user_id == user_id) {
            return Err(StoreError::Conflict("review"));
        }
        let id = t.next_id();
        let now = Utc::now();
        t.reviews.insert(id, ReviewRow { id, product_id, user_id, rating, review: text.to_string(), created: now, updated: now });
        t.refresh_rating(product_id);
        let row = t.reviews.get(&id).ok_or(StoreError::NotFound("review"))?;
        t.review(row)
    }

    async fn update_review(&self, review_id: i64, rating: Rating, text: Option<&str>) -> StoreResult<Review> {
        let mut t = self.tables.write().await;
        let row = t.reviews.get_mut(&review_id).ok_or(StoreError::NotFound("review"))?;
        row.rating = rating;
        if let Some(text) = text { row.review = text.to_string(); }
        row.updated = Utc::now();
        let product_id = row.product_id;
        t.refresh_rating(product_id);
        let row = t.reviews.get(&review_id).ok_or(StoreError::NotFound("review"))?;
        t.review(row)
    }

    async fn delete_review(&self, review_id: i64) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let row = t.reviews.remove(&review_id).ok_or(StoreError::NotFound("review"))?;
        t.refresh_rating(row.product_id);
        Ok(())
    }

    async fn toggle_wishlist(&self, user_id: i64, product_id: i64) -> StoreResult<WishlistToggle> {
        let mut t = self.tables.write().await;
        t.user(user_id)?;
        t.product(product_id)?;
        let existing = t.wishlists.values().find(|w| w.user_id == user_id && w.product_id == product_id).map(|w| w.id);
        if let Some(id) = existing {
            t.wishlists.remove(&id);
            return Ok(WishlistToggle::Removed);
        }
        let id = t.next_id();
        let row = WishlistRow { id, user_id, product_id, created: Utc::now() };
        let wishlist = t.wishlist(&row)?;
        t.wishlists.insert(id, row);
        Ok(WishlistToggle::Added(wishlist))
    }

    async fn wishlists_for_email(&self, email: &str) -> StoreResult<Vec<Wishlist>> {
        let t = self.tables.read().await;
        let Some(user_id) = t.user_id_by_email(email) else { return Ok(Vec::new()) };
        t.wishlists.values().filter(|w| w.user_id == user_id).map(|w| t.wishlist(w)).collect()
    }

    async fn product_in_wishlist(&self, email: &str, product_id: i64) -> StoreResult<bool> {
        let t = self.tables.read().await;
        let Some(user_id) = t.user_id_by_email(email) else { return Ok(false) };
        Ok(t.wishlists.values().any(|w| w.user_id == user_id && w.product_id == product_id))
    }

    async fn upsert_address(&self, user_id: i64, fields: AddressFields) -> StoreResult<(CustomerAddress, bool)> {
        let mut t = self.tables.write().await;
        t.user(user_id)?;
        let existing = t.addresses.values().filter(|a| a.user_id == user_id).map(|a| a.id).last();
        let (id, created) = match existing {
            Some(id) => (id, false),
            None => (t.next_id(), true),
        };
        t.addresses.insert(id, AddressRow { id, user_id, fields });
        let row = t.addresses.get(&id).ok_or(StoreError::NotFound("address"))?;
        Ok((t.address(row)?, created))
    }

    async fn address_for_email(&self, email: &str) -> StoreResult<Option<CustomerAddress>> {
        let t = self.tables.read().await;
        let Some(user_id) = t.user_id_by_email(email) else { return Ok(None) };
        t.addresses.values().filter(|a| a.user_id == user_id).last().map(|a| t.address(a)).transpose()
    }

    async fn fulfill_checkout(&self, order: NewOrder, cart_code: Option<&str>) -> StoreResult<Option<Order>> {
        let mut t = self.tables.write().await;
        if t.orders.values().any(|o| o.new.stripe_checkout_id == order.stripe_checkout_id) {
            return Ok(None);
        }
        let order_id = t.next_id();
        t.orders.insert(order_id, OrderRow { id: order_id, new: order, created_at: Utc::now() });

        let cart_id = cart_code.and_then(|code| t.carts.values().find(|c| c.code == code)).map(|c| c.id);
        if let Some(cart_id) = cart_id {
            let lines: Vec<(i64, i32)> = t.cart_items.values().filter(|i| i.cart_id == cart_id).map(|i| (i.product_id, i.quantity)).collect();
            for (product_id, quantity) in lines {
                let id = t.next_id();
                t.order_items.insert(id, OrderItemRow { id, order_id, product_id, quantity });
            }
            t.cart_items.retain(|_, i| i.cart_id != cart_id);
            t.carts.remove(&cart_id);
        }
        let row = t.orders.get(&order_id).ok_or(StoreError::NotFound("order"))?;
        t.order(row).map(Some)
    }

    async fn orders_for_email(&self, email: &str) -> StoreResult<Vec<Order>> {
        let t = self.tables.read().await;
        let email = normalize_email(email);
        t.orders.values().rev().filter(|o| normalize_email(&o.new.customer_email) == email).map(|o| t.order(o)).collect()
    }
}
