//! Admin console: order status and tracking, customer loyalty, dashboard

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Customer, CustomerKey, Order, OrderItem, OrderStatus, TrackingStatus};
use crate::services::reconcile::{CustomerReconciler, ReconcileStrategy};
use crate::store::{OrderFilter, RecordStore, StoreCounts, StoreError};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("order {0} not found")]
    OrderNotFound(Uuid),
    #[error("customer {0} not found")]
    CustomerNotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusChange {
    pub order: Order,
    /// Tracking was moved to delivered because the order was.
    pub tracking_forced: bool,
    /// Owner profile after the follow-up reconciliation, if it succeeded.
    pub customer: Option<Customer>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    #[serde(flatten)]
    pub counts: StoreCounts,
    pub customers: usize,
    pub total_points: i64,
    pub total_spent: Decimal,
}

#[derive(Clone)]
pub struct AdminConsole {
    store: Arc<dyn RecordStore>,
    reconciler: CustomerReconciler,
}

impl AdminConsole {
    pub fn new(store: Arc<dyn RecordStore>, reconciler: CustomerReconciler) -> Self { Self { store, reconciler } }

    /// Newest first, optionally one status only.
    pub async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, AdminError> {
        let filter = OrderFilter { status, owner: None };
        Ok(self.store.list_orders(&filter).await?)
    }

    pub async fn order_detail(&self, order_id: Uuid) -> Result<OrderDetail, AdminError> {
        let order = self.order(order_id).await?;
        let items = self.store.order_items(order_id).await?;
        Ok(OrderDetail { order, items })
    }

    /// Sets the order status, forcing tracking to delivered with it, then
    /// re-derives the owner's totals from full history. The reconciliation
    /// is best-effort; the status change stands either way.
    pub async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<StatusChange, AdminError> {
        let mut order = self.order(order_id).await?;
        let tracking_forced = order.set_status(status);
        self.store.update_order_status(&order).await?;
        info!(order_id = %order_id, status = %status, tracking = %order.tracking_status, tracking_forced, "order status updated");

        let customer = match self.reconciler.reconcile_with(&order, ReconcileStrategy::FullHistory).await {
            Ok(r) => Some(r.customer),
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "reconciliation after status change skipped");
                None
            }
        };
        Ok(StatusChange { order, tracking_forced, customer })
    }

    /// Any step, forwards or backwards. Order status is left alone.
    pub async fn set_tracking(&self, order_id: Uuid, tracking: TrackingStatus) -> Result<Order, AdminError> {
        let mut order = self.order(order_id).await?;
        order.set_tracking(tracking);
        self.store.update_order_status(&order).await?;
        info!(order_id = %order_id, tracking = %tracking, "tracking updated");
        Ok(order)
    }

    /// Deletes the order and its items, then refreshes the owner's totals.
    pub async fn delete_order(&self, order_id: Uuid) -> Result<Order, AdminError> {
        let order = self.order(order_id).await?;
        self.store.delete_order(order_id).await?;
        info!(order_id = %order_id, "order deleted");
        self.refresh_owners([CustomerKey::for_order(&order)]).await;
        Ok(order)
    }

    /// Deletes every order. Returns how many were removed.
    pub async fn clear_orders(&self) -> Result<u64, AdminError> {
        let owners: HashSet<CustomerKey> = self.store.list_orders(&OrderFilter::default()).await?.iter().map(CustomerKey::for_order).collect();
        let removed = self.store.delete_all_orders().await?;
        warn!(removed, "all orders cleared");
        self.refresh_owners(owners).await;
        Ok(removed)
    }

    /// Biggest spenders first, filtered by name, phone or email.
    pub async fn customers(&self, search: Option<&str>) -> Result<Vec<Customer>, AdminError> {
        let customers = self.store.list_customers().await?;
        Ok(match search {
            Some(needle) => customers.into_iter().filter(|c| c.matches_search(needle)).collect(),
            None => customers,
        })
    }

    /// The customer's orders, newest first.
    pub async fn customer_orders(&self, customer_id: Uuid) -> Result<Vec<Order>, AdminError> {
        let customer = self.customer(customer_id).await?;
        let Some(key) = CustomerKey::for_customer(&customer) else { return Ok(Vec::new()) };
        Ok(self.store.list_orders(&OrderFilter::owned_by(key)).await?)
    }

    /// Manual adjustment, floored at zero. Holds until the next
    /// reconciliation re-derives points from spend.
    pub async fn adjust_points(&self, customer_id: Uuid, delta: i64) -> Result<Customer, AdminError> {
        let mut customer = self.customer(customer_id).await?;
        let before = customer.loyalty_points;
        customer.adjust_points(delta);
        self.store.update_customer(&customer).await?;
        info!(customer_id = %customer_id, delta, before, after = customer.loyalty_points, "loyalty points adjusted");
        Ok(customer)
    }

    pub async fn dashboard(&self) -> Result<DashboardStats, AdminError> {
        let (counts, customers) = tokio::try_join!(self.store.counts(), self.store.list_customers())?;
        Ok(DashboardStats {
            counts,
            customers: customers.len(),
            total_points: customers.iter().map(|c| c.loyalty_points).sum(),
            total_spent: customers.iter().map(|c| c.total_spent).sum(),
        })
    }

    async fn order(&self, order_id: Uuid) -> Result<Order, AdminError> {
        self.store.get_order(order_id).await?.ok_or(AdminError::OrderNotFound(order_id))
    }

    async fn customer(&self, customer_id: Uuid) -> Result<Customer, AdminError> {
        self.store.get_customer(customer_id).await?.ok_or(AdminError::CustomerNotFound(customer_id))
    }

    async fn refresh_owners(&self, owners: impl IntoIterator<Item = CustomerKey>) {
        for key in owners {
            if let Err(e) = self.reconciler.refresh(&key).await {
                warn!(key = %key, error = %e, "customer totals not refreshed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CartLine, OrderContact, Phone};
    use crate::store::{MemoryRecordStore, Operation};

    fn console() -> (Arc<MemoryRecordStore>, AdminConsole) {
        let store = Arc::new(MemoryRecordStore::new());
        let reconciler = CustomerReconciler::new(store.clone(), ReconcileStrategy::FullHistory);
        (store.clone(), AdminConsole::new(store, reconciler))
    }

    async fn placed(store: &MemoryRecordStore, name: &str, phone: &str, total: i64) -> Order {
        let contact = OrderContact {
            full_name: name.into(), phone: Phone::new(phone).unwrap(), email: None,
            delivery_address: "Thika Road".into(), notes: None, user_id: None,
        };
        let line = CartLine { product_id: "p".into(), name: "Zinc".into(), unit_price: Decimal::new(total, 0), quantity: 1 };
        let (order, items) = Order::place(contact, &[line]);
        store.create_order(&order, &items).await.unwrap();
        order
    }

    #[tokio::test]
    async fn test_delivered_forces_tracking() {
        let (store, admin) = console();
        let order = placed(&store, "Kamau", "0700000001", 2_000).await;
        admin.set_tracking(order.id, TrackingStatus::Packed).await.unwrap();
        let change = admin.update_status(order.id, OrderStatus::Delivered).await.unwrap();
        assert!(change.tracking_forced);
        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.tracking_status, TrackingStatus::Delivered);
        assert_eq!(change.customer.unwrap().loyalty_points, 20);
    }

    #[tokio::test]
    async fn test_status_toggling_is_idempotent() {
        let (store, admin) = console();
        let order = placed(&store, "Kamau", "0700000001", 4_500).await;
        for status in [OrderStatus::Confirmed, OrderStatus::Pending, OrderStatus::Confirmed] {
            admin.update_status(order.id, status).await.unwrap();
        }
        let customers = admin.customers(None).await.unwrap();
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].total_spent, Decimal::new(4_500, 0));
    }

    #[tokio::test]
    async fn test_tracking_can_move_backwards() {
        let (store, admin) = console();
        let order = placed(&store, "Kamau", "0700000001", 100).await;
        admin.set_tracking(order.id, TrackingStatus::OutForDelivery).await.unwrap();
        let back = admin.set_tracking(order.id, TrackingStatus::Processing).await.unwrap();
        assert_eq!(back.tracking_status, TrackingStatus::Processing);
        assert_eq!(back.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_status_change_survives_reconcile_failure() {
        let (store, admin) = console();
        let order = placed(&store, "Kamau", "0700000001", 100).await;
        store.fail_on(Operation::WriteCustomer).await;
        let change = admin.update_status(order.id, OrderStatus::Confirmed).await.unwrap();
        assert!(change.customer.is_none());
        assert_eq!(store.get_order(order.id).await.unwrap().unwrap().status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_delete_order_refreshes_owner() {
        let (store, admin) = console();
        let big = placed(&store, "Njeri", "0700000002", 30_000).await;
        let small = placed(&store, "Njeri", "0700000002", 2_000).await;
        admin.update_status(small.id, OrderStatus::Confirmed).await.unwrap();
        admin.delete_order(big.id).await.unwrap();
        let customer = &admin.customers(Some("njeri")).await.unwrap()[0];
        assert_eq!(customer.total_spent, Decimal::new(2_000, 0));
        assert_eq!(customer.loyalty_points, 20);
        assert_eq!(admin.customer_orders(customer.id).await.unwrap().len(), 1);
        assert!(matches!(admin.order_detail(big.id).await, Err(AdminError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn test_clear_orders() {
        let (store, admin) = console();
        let a = placed(&store, "Achieng", "0700000003", 1_000).await;
        placed(&store, "Baraka", "0700000004", 1_000).await;
        admin.update_status(a.id, OrderStatus::Confirmed).await.unwrap();
        assert_eq!(admin.clear_orders().await.unwrap(), 2);
        assert!(admin.list_orders(None).await.unwrap().is_empty());
        let customers = admin.customers(None).await.unwrap();
        assert!(customers.iter().all(|c| c.total_spent == Decimal::ZERO));
    }

    #[tokio::test]
    async fn test_adjust_points_and_dashboard() {
        let (store, admin) = console();
        let order = placed(&store, "Wafula", "0700000005", 10_000).await;
        let customer = admin.update_status(order.id, OrderStatus::Confirmed).await.unwrap().customer.unwrap();
        assert_eq!(admin.adjust_points(customer.id, 25).await.unwrap().loyalty_points, 125);
        assert_eq!(admin.adjust_points(customer.id, -1_000).await.unwrap().loyalty_points, 0);
        assert!(matches!(admin.adjust_points(Uuid::now_v7(), 1).await, Err(AdminError::CustomerNotFound(_))));

        let stats = admin.dashboard().await.unwrap();
        assert_eq!(stats.counts.orders, 1);
        assert_eq!(stats.customers, 1);
        assert_eq!(stats.total_points, 0);
        assert_eq!(stats.total_spent, Decimal::new(10_000, 0));
    }

    #[tokio::test]
    async fn test_list_orders_by_status() {
        let (store, admin) = console();
        let a = placed(&store, "A", "0700000006", 100).await;
        placed(&store, "B", "0700000007", 100).await;
        admin.update_status(a.id, OrderStatus::Cancelled).await.unwrap();
        assert_eq!(admin.list_orders(Some(OrderStatus::Cancelled)).await.unwrap().len(), 1);
        assert_eq!(admin.list_orders(Some(OrderStatus::Pending)).await.unwrap().len(), 1);
        assert_eq!(admin.order_detail(a.id).await.unwrap().items.len(), 1);
    }
}
