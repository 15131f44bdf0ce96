//! Aggregates module
pub mod catalog;
pub mod cart;
pub mod order;
pub mod customer;

pub use catalog::{Category, Product};
pub use cart::{Cart, CartLine, CartProduct};
pub use order::{tracking_progress, Order, OrderContact, OrderItem, OrderStatus, TrackingStatus, TrackingStep};
pub use customer::{points_for, Address, Customer, CustomerKey};
