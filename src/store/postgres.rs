//! Postgres-backed record store.
//!
//! Rows are read into plain `FromRow` structs and converted into domain
//! records with `TryFrom`, so an unknown status string or a negative amount
//! surfaces as [`StoreError::InvalidRecord`] instead of leaking through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::{OrderFilter, RecordStore, Result, StoreCounts, StoreError};
use crate::domain::{Address, Category, Customer, CustomerKey, Order, OrderItem, Phone, Product, TrackingStatus};

#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn migrate(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow { id: Uuid, name: String, slug: String, description: Option<String>, display_order: i32, is_active: bool }

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, name: String, slug: String, description: Option<String>, price: Decimal, stock_count: i32,
    image_url: Option<String>, sku: Option<String>, category_id: Option<Uuid>, ingredients: Option<String>,
    dosage: Option<String>, warnings: Option<String>, is_in_stock: bool, is_featured: bool, is_active: bool,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, full_name: String, phone: String, email: Option<String>, delivery_address: String,
    total_amount: Decimal, status: String, tracking_status: Option<String>, notes: Option<String>,
    user_id: Option<Uuid>, created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow { id: Uuid, order_id: Uuid, product_id: String, product_name: String, quantity: i32, unit_price: Decimal, total_price: Decimal }

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: Uuid, user_id: Option<Uuid>, full_name: String, phone: Option<String>, email: Option<String>,
    loyalty_points: i64, total_spent: Decimal, created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AddressRow { id: Uuid, user_id: Uuid, label: String, address: String, is_default: bool, created_at: DateTime<Utc> }

impl From<CategoryRow> for Category {
    fn from(r: CategoryRow) -> Self {
        Self { id: r.id, name: r.name, slug: r.slug, description: r.description, display_order: r.display_order, is_active: r.is_active }
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;
    fn try_from(r: ProductRow) -> Result<Self> {
        if r.price.is_sign_negative() { return Err(StoreError::invalid("products", format!("{} has a negative price", r.id))); }
        Ok(Self {
            id: r.id, name: r.name, slug: r.slug, description: r.description, price: r.price, stock_count: r.stock_count,
            image_url: r.image_url, sku: r.sku, category_id: r.category_id, ingredients: r.ingredients, dosage: r.dosage,
            warnings: r.warnings, is_in_stock: r.is_in_stock, is_featured: r.is_featured, is_active: r.is_active,
            created_at: r.created_at,
        })
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> Result<Self> {
        let status = r.status.parse().map_err(|e: String| StoreError::invalid("orders", e))?;
        let phone = Phone::new(&r.phone).map_err(|e| StoreError::invalid("orders", format!("{}: {e}", r.id)))?;
        if r.total_amount.is_sign_negative() { return Err(StoreError::invalid("orders", format!("{} has a negative total", r.id))); }
        Ok(Self {
            id: r.id, full_name: r.full_name, phone, email: r.email, delivery_address: r.delivery_address,
            total_amount: r.total_amount, status, tracking_status: TrackingStatus::parse_lenient(r.tracking_status.as_deref()),
            notes: r.notes, user_id: r.user_id, created_at: r.created_at,
        })
    }
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = StoreError;
    fn try_from(r: OrderItemRow) -> Result<Self> {
        let quantity = u32::try_from(r.quantity).ok().filter(|q| *q > 0)
            .ok_or_else(|| StoreError::invalid("order_items", format!("{} has quantity {}", r.id, r.quantity)))?;
        Ok(Self { id: r.id, order_id: r.order_id, product_id: r.product_id, product_name: r.product_name, quantity, unit_price: r.unit_price, total_price: r.total_price })
    }
}

impl TryFrom<CustomerRow> for Customer {
    type Error = StoreError;
    fn try_from(r: CustomerRow) -> Result<Self> {
        let phone = r.phone.as_deref().map(Phone::new).transpose()
            .map_err(|e| StoreError::invalid("customers", format!("{}: {e}", r.id)))?;
        if r.user_id.is_none() && phone.is_none() {
            return Err(StoreError::invalid("customers", format!("{} has neither account nor phone", r.id)));
        }
        if r.loyalty_points < 0 || r.total_spent.is_sign_negative() {
            return Err(StoreError::invalid("customers", format!("{} has negative points or spend", r.id)));
        }
        Ok(Self { id: r.id, user_id: r.user_id, full_name: r.full_name, phone, email: r.email, loyalty_points: r.loyalty_points, total_spent: r.total_spent, created_at: r.created_at })
    }
}

impl From<AddressRow> for Address {
    fn from(r: AddressRow) -> Self {
        Self { id: r.id, user_id: r.user_id, label: r.label, address: r.address, is_default: r.is_default, created_at: r.created_at }
    }
}

/// Unique violations become [`StoreError::Conflict`] so callers can re-read
/// the winning row.
fn conflict(table: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() { return StoreError::Conflict { table, reason: db.message().to_string() }; }
        }
        StoreError::Database(e)
    }
}

fn convert<R, T: TryFrom<R, Error = StoreError>>(rows: Vec<R>) -> Result<Vec<T>> { rows.into_iter().map(T::try_from).collect() }

async fn write_order(conn: &mut PgConnection, order: &Order) -> Result<()> {
    sqlx::query("INSERT INTO orders (id, full_name, phone, email, delivery_address, total_amount, status, tracking_status, notes, user_id, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)")
        .bind(order.id).bind(&order.full_name).bind(order.phone.as_str()).bind(&order.email).bind(&order.delivery_address)
        .bind(order.total_amount).bind(order.status.as_str()).bind(order.tracking_status.as_str()).bind(&order.notes)
        .bind(order.user_id).bind(order.created_at)
        .execute(conn).await?;
    Ok(())
}

async fn write_items(conn: &mut PgConnection, items: &[OrderItem]) -> Result<()> {
    for item in items {
        let quantity = i32::try_from(item.quantity).map_err(|_| StoreError::invalid("order_items", format!("quantity {} out of range", item.quantity)))?;
        sqlx::query("INSERT INTO order_items (id, order_id, product_id, product_name, quantity, unit_price, total_price) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(item.id).bind(item.order_id).bind(&item.product_id).bind(&item.product_name)
            .bind(quantity).bind(item.unit_price).bind(item.total_price)
            .execute(&mut *conn).await?;
    }
    Ok(())
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn active_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>("SELECT id, name, slug, description, display_order, is_active FROM categories WHERE is_active ORDER BY display_order")
            .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn active_products(&self, category_id: Option<Uuid>) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE is_active AND ($1::uuid IS NULL OR category_id = $1) ORDER BY created_at DESC")
            .bind(category_id).fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE slug = $1 AND is_active")
            .bind(slug).fetch_optional(&self.pool).await?
            .map(Product::try_from).transpose()
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        write_order(&mut conn, order).await
    }

    async fn insert_order_items(&self, items: &[OrderItem]) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        write_items(&mut conn, items).await
    }

    /// Order and items commit together or not at all.
    async fn create_order(&self, order: &Order, items: &[OrderItem]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_order(&mut tx, order).await?;
        write_items(&mut tx, items).await?;
        tx.commit().await?;
        debug!(order_id = %order.id, items = items.len(), "order committed");
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT id, full_name, phone, email, delivery_address, total_amount, status, tracking_status, notes, user_id, created_at FROM orders WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?
            .map(Order::try_from).transpose()
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let (user_id, phone) = match &filter.owner {
            Some(CustomerKey::User(id)) => (Some(*id), None),
            Some(CustomerKey::Phone(phone)) => (None, Some(phone.as_str().to_string())),
            None => (None, None),
        };
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT id, full_name, phone, email, delivery_address, total_amount, status, tracking_status, notes, user_id, created_at FROM orders WHERE ($1::text IS NULL OR status = $1) AND ($2::uuid IS NULL OR user_id = $2) AND ($3::text IS NULL OR (phone = $3 AND user_id IS NULL)) ORDER BY created_at DESC, id DESC",
        )
            .bind(filter.status.map(|s| s.as_str())).bind(user_id).bind(phone)
            .fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn update_order_status(&self, order: &Order) -> Result<()> {
        let done = sqlx::query("UPDATE orders SET status = $2, tracking_status = $3 WHERE id = $1")
            .bind(order.id).bind(order.status.as_str()).bind(order.tracking_status.as_str())
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(StoreError::not_found("orders", order.id)); }
        Ok(())
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query_as::<_, OrderItemRow>("SELECT id, order_id, product_id, product_name, quantity, unit_price, total_price FROM order_items WHERE order_id = $1")
            .bind(order_id).fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn delete_order(&self, id: Uuid) -> Result<()> {
        // order_items cascade on the foreign key
        sqlx::query("DELETE FROM orders WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_all_orders(&self) -> Result<u64> {
        Ok(sqlx::query("DELETE FROM orders").execute(&self.pool).await?.rows_affected())
    }

    async fn find_customer(&self, key: &CustomerKey) -> Result<Option<Customer>> {
        let row = match key {
            CustomerKey::User(id) => {
                sqlx::query_as::<_, CustomerRow>("SELECT id, user_id, full_name, phone, email, loyalty_points, total_spent, created_at FROM customers WHERE user_id = $1")
                    .bind(*id).fetch_optional(&self.pool).await?
            }
            CustomerKey::Phone(phone) => {
                sqlx::query_as::<_, CustomerRow>("SELECT id, user_id, full_name, phone, email, loyalty_points, total_spent, created_at FROM customers WHERE phone = $1 AND user_id IS NULL ORDER BY created_at LIMIT 1")
                    .bind(phone.as_str()).fetch_optional(&self.pool).await?
            }
        };
        row.map(Customer::try_from).transpose()
    }

    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>> {
        sqlx::query_as::<_, CustomerRow>("SELECT id, user_id, full_name, phone, email, loyalty_points, total_spent, created_at FROM customers WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?
            .map(Customer::try_from).transpose()
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        let rows = sqlx::query_as::<_, CustomerRow>("SELECT id, user_id, full_name, phone, email, loyalty_points, total_spent, created_at FROM customers ORDER BY total_spent DESC")
            .fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn insert_customer(&self, c: &Customer) -> Result<()> {
        sqlx::query("INSERT INTO customers (id, user_id, full_name, phone, email, loyalty_points, total_spent, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(c.id).bind(c.user_id).bind(&c.full_name).bind(c.phone.as_ref().map(Phone::as_str)).bind(&c.email)
            .bind(c.loyalty_points).bind(c.total_spent).bind(c.created_at)
            .execute(&self.pool).await.map_err(conflict("customers"))?;
        Ok(())
    }

    async fn update_customer(&self, c: &Customer) -> Result<()> {
        let done = sqlx::query("UPDATE customers SET full_name = $2, phone = $3, email = $4, loyalty_points = $5, total_spent = $6 WHERE id = $1")
            .bind(c.id).bind(&c.full_name).bind(c.phone.as_ref().map(Phone::as_str)).bind(&c.email).bind(c.loyalty_points).bind(c.total_spent)
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(StoreError::not_found("customers", c.id)); }
        Ok(())
    }

    async fn addresses(&self, user_id: Uuid) -> Result<Vec<Address>> {
        let rows = sqlx::query_as::<_, AddressRow>("SELECT id, user_id, label, address, is_default, created_at FROM addresses WHERE user_id = $1 ORDER BY is_default DESC, created_at")
            .bind(user_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Address::from).collect())
    }

    async fn insert_address(&self, a: &Address) -> Result<()> {
        sqlx::query("INSERT INTO addresses (id, user_id, label, address, is_default, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(a.id).bind(a.user_id).bind(&a.label).bind(&a.address).bind(a.is_default).bind(a.created_at)
            .execute(&self.pool).await.map_err(conflict("addresses"))?;
        Ok(())
    }

    async fn delete_address(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM addresses WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn clear_default_address(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE addresses SET is_default = FALSE WHERE user_id = $1").bind(user_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn set_default_address(&self, id: Uuid) -> Result<()> {
        let done = sqlx::query("UPDATE addresses SET is_default = TRUE WHERE id = $1").bind(id).execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(StoreError::not_found("addresses", id)); }
        Ok(())
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let (categories, products, orders): (i64, i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM categories), (SELECT COUNT(*) FROM products), (SELECT COUNT(*) FROM orders)",
        ).fetch_one(&self.pool).await?;
        Ok(StoreCounts { categories, products, orders })
    }

    async fn order_total(&self, key: &CustomerKey) -> Result<Decimal> {
        // One aggregate query instead of loading the full order history.
        let total: Option<Decimal> = match key {
            CustomerKey::User(id) => {
                sqlx::query_scalar("SELECT SUM(total_amount) FROM orders WHERE user_id = $1")
                    .bind(*id).fetch_one(&self.pool).await?
            }
            CustomerKey::Phone(phone) => {
                sqlx::query_scalar("SELECT SUM(total_amount) FROM orders WHERE phone = $1 AND user_id IS NULL")
                    .bind(phone.as_str()).fetch_one(&self.pool).await?
            }
        };
        Ok(total.unwrap_or(Decimal::ZERO))
    }
}
