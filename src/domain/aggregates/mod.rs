//! Aggregates module
pub mod catalog;
pub mod cart;
pub mod customer;
pub mod order;
pub mod review;

pub use catalog::{Category, Product, ProductRating, ProductSummary, RatingBreakdown};
pub use cart::{Cart, CartItem};
pub use customer::{normalize_email, AddressFields, CustomerAddress, User};
pub use order::{NewOrder, Order, OrderItem, OrderStatus};
pub use review::{Review, Wishlist, WishlistToggle};
