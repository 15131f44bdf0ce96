//! Record store
//!
//! Typed access to the hosted collections the storefront consumes:
//! `categories`, `products`, `orders`, `order_items`, `customers` and
//! `addresses`. Backends validate records at this boundary and reject
//! shapes they do not understand.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::domain::{Address, Category, Customer, CustomerKey, Order, OrderItem, OrderStatus, Product};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryRecordStore, Operation};
pub use postgres::PgRecordStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{table} record {id} not found")]
    NotFound { table: &'static str, id: String },
    #[error("invalid {table} record: {reason}")]
    InvalidRecord { table: &'static str, reason: String },
    #[error("{table} record conflicts with an existing row: {reason}")]
    Conflict { table: &'static str, reason: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(table: &'static str, id: impl ToString) -> Self { Self::NotFound { table, id: id.to_string() } }
    pub fn invalid(table: &'static str, reason: impl Into<String>) -> Self { Self::InvalidRecord { table, reason: reason.into() } }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Order listing filter; results are always newest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub owner: Option<CustomerKey>,
}

impl OrderFilter {
    pub fn owned_by(key: CustomerKey) -> Self { Self { status: None, owner: Some(key) } }
    pub fn with_status(status: OrderStatus) -> Self { Self { status: Some(status), owner: None } }

    pub fn matches(&self, order: &Order) -> bool {
        self.status.map_or(true, |s| order.status == s) && self.owner.as_ref().map_or(true, |k| k.matches_order(order))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub categories: i64,
    pub products: i64,
    pub orders: i64,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Active categories by display order.
    async fn active_categories(&self) -> Result<Vec<Category>>;
    /// Active products, newest first, optionally within one category.
    async fn active_products(&self, category_id: Option<Uuid>) -> Result<Vec<Product>>;
    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>>;

    async fn insert_order(&self, order: &Order) -> Result<()>;
    async fn insert_order_items(&self, items: &[OrderItem]) -> Result<()>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>>;
    /// Persists the status and tracking fields of an existing order.
    async fn update_order_status(&self, order: &Order) -> Result<()>;
    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>>;
    /// Deletes an order together with its items.
    async fn delete_order(&self, id: Uuid) -> Result<()>;
    async fn delete_all_orders(&self) -> Result<u64>;

    async fn find_customer(&self, key: &CustomerKey) -> Result<Option<Customer>>;
    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>>;
    /// All customers, biggest spenders first.
    async fn list_customers(&self) -> Result<Vec<Customer>>;
    async fn insert_customer(&self, customer: &Customer) -> Result<()>;
    async fn update_customer(&self, customer: &Customer) -> Result<()>;

    /// A user's addresses, default first, then oldest first.
    async fn addresses(&self, user_id: Uuid) -> Result<Vec<Address>>;
    async fn insert_address(&self, address: &Address) -> Result<()>;
    async fn delete_address(&self, id: Uuid) -> Result<()>;
    async fn clear_default_address(&self, user_id: Uuid) -> Result<()>;
    async fn set_default_address(&self, id: Uuid) -> Result<()>;

    async fn counts(&self) -> Result<StoreCounts>;

    /// Writes an order and its items. Backends without transactions insert
    /// the order first, then the items, and delete the order again if the
    /// items fail so no order is left without lines.
    async fn create_order(&self, order: &Order, items: &[OrderItem]) -> Result<()> {
        self.insert_order(order).await?;
        if let Err(e) = self.insert_order_items(items).await {
            warn!(order_id = %order.id, error = %e, "order items failed, removing order");
            if let Err(cleanup) = self.delete_order(order.id).await {
                error!(order_id = %order.id, error = %cleanup, "orphaned order left without items");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Sum of `total_amount` over every order owned by `key`.
    async fn order_total(&self, key: &CustomerKey) -> Result<Decimal> {
        let orders = self.list_orders(&OrderFilter::owned_by(key.clone())).await?;
        Ok(orders.iter().map(|o| o.total_amount).sum())
    }
}
