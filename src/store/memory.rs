//! In-memory record store with failure injection.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OrderFilter, RecordStore, Result, StoreCounts, StoreError};
use crate::domain::{Address, Category, Customer, CustomerKey, Order, OrderItem, Product};

/// Store calls that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    ReadCatalog,
    InsertOrder,
    InsertOrderItems,
    UpdateOrder,
    DeleteOrder,
    ReadOrders,
    ReadCustomers,
    WriteCustomer,
    WriteAddress,
    /// Clearing or setting a default address.
    DefaultAddress,
}

#[derive(Default)]
struct Tables {
    categories: Vec<Category>,
    products: Vec<Product>,
    orders: Vec<Order>,
    items: Vec<OrderItem>,
    customers: Vec<Customer>,
    addresses: Vec<Address>,
}

#[derive(Default)]
pub struct MemoryRecordStore {
    tables: RwLock<Tables>,
    failing: RwLock<HashSet<Operation>>,
    delay: RwLock<Option<Duration>>,
    writes: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn new() -> Self { Self::default() }

    pub async fn fail_on(&self, op: Operation) { self.failing.write().await.insert(op); }
    pub async fn recover(&self, op: Operation) { self.failing.write().await.remove(&op); }
    /// Every subsequent call sleeps this long first.
    pub async fn set_delay(&self, delay: Option<Duration>) { *self.delay.write().await = delay; }
    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize { self.writes.load(AtomicOrdering::SeqCst) }

    pub async fn insert_category(&self, category: Category) { self.tables.write().await.categories.push(category); }
    pub async fn insert_product(&self, product: Product) { self.tables.write().await.products.push(product); }

    async fn check(&self, op: Operation) -> Result<()> {
        let delay = *self.delay.read().await;
        if let Some(delay) = delay { tokio::time::sleep(delay).await; }
        if self.failing.read().await.contains(&op) {
            return Err(StoreError::Unavailable(format!("{op:?} rejected")));
        }
        Ok(())
    }

    fn wrote(&self) { self.writes.fetch_add(1, AtomicOrdering::SeqCst); }
}

fn newest_first(orders: &mut [Order]) { orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))); }

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn active_categories(&self) -> Result<Vec<Category>> {
        self.check(Operation::ReadCatalog).await?;
        let mut categories: Vec<Category> = self.tables.read().await.categories.iter().filter(|c| c.is_active).cloned().collect();
        categories.sort_by_key(|c| c.display_order);
        Ok(categories)
    }

    async fn active_products(&self, category_id: Option<Uuid>) -> Result<Vec<Product>> {
        self.check(Operation::ReadCatalog).await?;
        let mut products: Vec<Product> = self.tables.read().await.products.iter()
            .filter(|p| p.is_active && category_id.map_or(true, |c| p.category_id == Some(c)))
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        self.check(Operation::ReadCatalog).await?;
        Ok(self.tables.read().await.products.iter().find(|p| p.is_active && p.slug == slug).cloned())
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.check(Operation::InsertOrder).await?;
        let mut tables = self.tables.write().await;
        if tables.orders.iter().any(|o| o.id == order.id) {
            return Err(StoreError::Conflict { table: "orders", reason: format!("duplicate id {}", order.id) });
        }
        tables.orders.push(order.clone());
        self.wrote();
        Ok(())
    }

    async fn insert_order_items(&self, items: &[OrderItem]) -> Result<()> {
        self.check(Operation::InsertOrderItems).await?;
        let mut tables = self.tables.write().await;
        if let Some(orphan) = items.iter().find(|i| !tables.orders.iter().any(|o| o.id == i.order_id)) {
            return Err(StoreError::invalid("order_items", format!("unknown order {}", orphan.order_id)));
        }
        tables.items.extend(items.iter().cloned());
        self.wrote();
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        self.check(Operation::ReadOrders).await?;
        Ok(self.tables.read().await.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        self.check(Operation::ReadOrders).await?;
        let mut orders: Vec<Order> = self.tables.read().await.orders.iter().filter(|o| filter.matches(o)).cloned().collect();
        newest_first(&mut orders);
        Ok(orders)
    }

    async fn update_order_status(&self, order: &Order) -> Result<()> {
        self.check(Operation::UpdateOrder).await?;
        let mut tables = self.tables.write().await;
        let stored = tables.orders.iter_mut().find(|o| o.id == order.id).ok_or_else(|| StoreError::not_found("orders", order.id))?;
        stored.status = order.status;
        stored.tracking_status = order.tracking_status;
        self.wrote();
        Ok(())
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        self.check(Operation::ReadOrders).await?;
        Ok(self.tables.read().await.items.iter().filter(|i| i.order_id == order_id).cloned().collect())
    }

    async fn delete_order(&self, id: Uuid) -> Result<()> {
        self.check(Operation::DeleteOrder).await?;
        let mut tables = self.tables.write().await;
        tables.items.retain(|i| i.order_id != id);
        tables.orders.retain(|o| o.id != id);
        self.wrote();
        Ok(())
    }

    async fn delete_all_orders(&self) -> Result<u64> {
        self.check(Operation::DeleteOrder).await?;
        let mut tables = self.tables.write().await;
        let removed = tables.orders.len() as u64;
        tables.items.clear();
        tables.orders.clear();
        self.wrote();
        Ok(removed)
    }

    async fn find_customer(&self, key: &CustomerKey) -> Result<Option<Customer>> {
        self.check(Operation::ReadCustomers).await?;
        Ok(self.tables.read().await.customers.iter().find(|c| key.matches_customer(c)).cloned())
    }

    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>> {
        self.check(Operation::ReadCustomers).await?;
        Ok(self.tables.read().await.customers.iter().find(|c| c.id == id).cloned())
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        self.check(Operation::ReadCustomers).await?;
        let mut customers = self.tables.read().await.customers.clone();
        customers.sort_by(|a, b| b.total_spent.cmp(&a.total_spent));
        Ok(customers)
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<()> {
        self.check(Operation::WriteCustomer).await?;
        let mut tables = self.tables.write().await;
        if let Some(user_id) = customer.user_id {
            if tables.customers.iter().any(|c| c.user_id == Some(user_id)) {
                return Err(StoreError::Conflict { table: "customers", reason: format!("user {user_id} already has a profile") });
            }
        } else if let Some(phone) = &customer.phone {
            if tables.customers.iter().any(|c| c.user_id.is_none() && c.phone.as_ref() == Some(phone)) {
                return Err(StoreError::Conflict { table: "customers", reason: format!("guest {phone} already has a profile") });
            }
        }
        tables.customers.push(customer.clone());
        self.wrote();
        Ok(())
    }

    async fn update_customer(&self, customer: &Customer) -> Result<()> {
        self.check(Operation::WriteCustomer).await?;
        let mut tables = self.tables.write().await;
        let stored = tables.customers.iter_mut().find(|c| c.id == customer.id).ok_or_else(|| StoreError::not_found("customers", customer.id))?;
        *stored = customer.clone();
        self.wrote();
        Ok(())
    }

    async fn addresses(&self, user_id: Uuid) -> Result<Vec<Address>> {
        self.check(Operation::ReadCustomers).await?;
        let mut addresses: Vec<Address> = self.tables.read().await.addresses.iter().filter(|a| a.user_id == user_id).cloned().collect();
        addresses.sort_by(|a, b| b.is_default.cmp(&a.is_default).then(a.created_at.cmp(&b.created_at)));
        Ok(addresses)
    }

    async fn insert_address(&self, address: &Address) -> Result<()> {
        self.check(Operation::WriteAddress).await?;
        let mut tables = self.tables.write().await;
        if address.is_default && tables.addresses.iter().any(|a| a.user_id == address.user_id && a.is_default) {
            return Err(StoreError::Conflict { table: "addresses", reason: format!("user {} already has a default", address.user_id) });
        }
        tables.addresses.push(address.clone());
        self.wrote();
        Ok(())
    }

    async fn delete_address(&self, id: Uuid) -> Result<()> {
        self.check(Operation::WriteAddress).await?;
        self.tables.write().await.addresses.retain(|a| a.id != id);
        self.wrote();
        Ok(())
    }

    async fn clear_default_address(&self, user_id: Uuid) -> Result<()> {
        self.check(Operation::DefaultAddress).await?;
        for address in self.tables.write().await.addresses.iter_mut().filter(|a| a.user_id == user_id) {
            address.is_default = false;
        }
        self.wrote();
        Ok(())
    }

    async fn set_default_address(&self, id: Uuid) -> Result<()> {
        self.check(Operation::DefaultAddress).await?;
        let mut tables = self.tables.write().await;
        let address = tables.addresses.iter_mut().find(|a| a.id == id).ok_or_else(|| StoreError::not_found("addresses", id))?;
        address.is_default = true;
        self.wrote();
        Ok(())
    }

    async fn counts(&self) -> Result<StoreCounts> {
        self.check(Operation::ReadCatalog).await?;
        let tables = self.tables.read().await;
        Ok(StoreCounts {
            categories: tables.categories.len() as i64,
            products: tables.products.len() as i64,
            orders: tables.orders.len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CartLine, OrderContact, Phone};
    use rust_decimal::Decimal;

    fn order() -> (Order, Vec<OrderItem>) {
        let contact = OrderContact {
            full_name: "Otieno".into(), phone: Phone::new("0711000000").unwrap(), email: None,
            delivery_address: "Kilimani".into(), notes: None, user_id: None,
        };
        let line = CartLine { product_id: "p".into(), name: "Paracetamol".into(), unit_price: Decimal::new(150, 0), quantity: 2 };
        Order::place(contact, &[line])
    }

    #[tokio::test]
    async fn test_create_order_compensates_when_items_fail() {
        let store = MemoryRecordStore::new();
        store.fail_on(Operation::InsertOrderItems).await;
        let (order, items) = order();
        assert!(store.create_order(&order, &items).await.is_err());
        assert!(store.get_order(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_order_cascades_items() {
        let store = MemoryRecordStore::new();
        let (order, items) = order();
        store.create_order(&order, &items).await.unwrap();
        assert_eq!(store.order_items(order.id).await.unwrap().len(), 1);
        store.delete_order(order.id).await.unwrap();
        assert!(store.order_items(order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_guest_phone_is_unique() {
        let store = MemoryRecordStore::new();
        let (order, _) = order();
        store.insert_customer(&Customer::from_order(&order)).await.unwrap();
        let err = store.insert_customer(&Customer::from_order(&order)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { table: "customers", .. }));
        // An account with the same phone is a different identity.
        let mut account = Customer::from_order(&order);
        account.user_id = Some(Uuid::now_v7());
        store.insert_customer(&account).await.unwrap();
    }

    #[tokio::test]
    async fn test_catalog_filters_inactive() {
        let store = MemoryRecordStore::new();
        let mut hidden = Product::new("Hidden", Decimal::ONE, None);
        hidden.is_active = false;
        store.insert_product(hidden).await;
        store.insert_product(Product::new("Shown", Decimal::ONE, None)).await;
        assert_eq!(store.active_products(None).await.unwrap().len(), 1);
        assert!(store.product_by_slug("hidden").await.unwrap().is_none());
        assert_eq!(store.counts().await.unwrap().products, 2);
    }
}
