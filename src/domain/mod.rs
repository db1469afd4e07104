//! Domain model: catalog, carts, customers, orders and reviews
pub mod aggregates;
pub mod events;
pub mod value_objects;
