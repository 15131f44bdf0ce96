//! Customer account view and address book

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{Address, Customer, CustomerKey, LoyaltyProgress, Order, TrackingStep};
use crate::store::{OrderFilter, RecordStore, StoreError};

pub const DEFAULT_ADDRESS_LABEL: &str = "Home";

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("address text is empty")]
    EmptyAddress,
    #[error("address {0} not found")]
    AddressNotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Address operations for one signed-in user. At most one address per user
/// is default, and there is always one once any address exists.
#[derive(Clone)]
pub struct AddressBook {
    store: Arc<dyn RecordStore>,
}

impl AddressBook {
    pub fn new(store: Arc<dyn RecordStore>) -> Self { Self { store } }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Address>, AccountError> { Ok(self.store.addresses(user_id).await?) }

    /// Adds an address; the user's first address becomes the default.
    pub async fn add(&self, user_id: Uuid, label: &str, text: &str) -> Result<Address, AccountError> {
        let text = text.trim();
        if text.is_empty() { return Err(AccountError::EmptyAddress); }
        let label = match label.trim() { "" => DEFAULT_ADDRESS_LABEL, l => l };
        let is_first = self.store.addresses(user_id).await?.is_empty();
        let mut address = Address::new(user_id, label, text, is_first);
        match self.store.insert_address(&address).await {
            Ok(()) => {}
            // A concurrent add already took the default slot.
            Err(StoreError::Conflict { .. }) if is_first => {
                address.is_default = false;
                self.store.insert_address(&address).await?;
            }
            Err(e) => return Err(e.into()),
        }
        info!(user_id = %user_id, address_id = %address.id, is_default = address.is_default, "address added");
        Ok(address)
    }

    /// Saves a delivery address unless the user already has one with the
    /// same text. Returns the new address when one was created.
    pub async fn remember(&self, user_id: Uuid, text: &str) -> Result<Option<Address>, AccountError> {
        let existing = self.store.addresses(user_id).await?;
        if existing.iter().any(|a| a.address.trim() == text.trim()) { return Ok(None); }
        self.add(user_id, DEFAULT_ADDRESS_LABEL, text).await.map(Some)
    }

    /// Deletes an address. When the default goes and others remain, the
    /// oldest remaining one is promoted. If the promotion fails the deleted
    /// address is put back so the user keeps a default.
    pub async fn delete(&self, user_id: Uuid, address_id: Uuid) -> Result<(), AccountError> {
        let addresses = self.store.addresses(user_id).await?;
        let target = addresses.iter().find(|a| a.id == address_id).ok_or(AccountError::AddressNotFound(address_id))?;
        self.store.delete_address(address_id).await?;
        if !target.is_default { return Ok(()); }
        let Some(next) = addresses.iter().filter(|a| a.id != address_id).min_by_key(|a| a.created_at) else { return Ok(()) };
        if let Err(e) = self.store.set_default_address(next.id).await {
            warn!(user_id = %user_id, address_id = %address_id, error = %e, "default promotion failed, restoring address");
            if let Err(restore) = self.store.insert_address(target).await {
                error!(user_id = %user_id, address_id = %address_id, error = %restore, "address lost, user left without a default");
            }
            return Err(e.into());
        }
        info!(user_id = %user_id, address_id = %next.id, "default address promoted");
        Ok(())
    }

    /// Clear-then-set. Ownership is checked first so a bad id never leaves
    /// the user without a default.
    pub async fn set_default(&self, user_id: Uuid, address_id: Uuid) -> Result<(), AccountError> {
        let addresses = self.store.addresses(user_id).await?;
        if !addresses.iter().any(|a| a.id == address_id) { return Err(AccountError::AddressNotFound(address_id)); }
        self.store.clear_default_address(user_id).await?;
        self.store.set_default_address(address_id).await?;
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub tracking: Vec<TrackingStep>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AccountOverview {
    pub customer: Option<Customer>,
    pub loyalty: LoyaltyProgress,
    pub orders: Vec<OrderView>,
    pub addresses: Vec<Address>,
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn RecordStore>,
    addresses: AddressBook,
}

impl AccountService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { addresses: AddressBook::new(store.clone()), store }
    }

    pub fn addresses(&self) -> &AddressBook { &self.addresses }

    /// Signup upsert: creates an empty profile for the account unless one
    /// already exists. An existing profile keeps its points and spend.
    pub async fn ensure_profile(&self, user_id: Uuid, full_name: &str, email: Option<String>) -> Result<Customer, AccountError> {
        let key = CustomerKey::User(user_id);
        if let Some(existing) = self.store.find_customer(&key).await? { return Ok(existing); }
        let customer = Customer::for_account(user_id, full_name.trim(), email);
        match self.store.insert_customer(&customer).await {
            Ok(()) => {
                info!(user_id = %user_id, customer_id = %customer.id, "account profile created");
                Ok(customer)
            }
            Err(StoreError::Conflict { .. }) => {
                Ok(self.store.find_customer(&key).await?.ok_or_else(|| StoreError::not_found("customers", &key))?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Profile, loyalty standing, orders newest first with tracking, and
    /// addresses default first.
    pub async fn overview(&self, user_id: Uuid) -> Result<AccountOverview, AccountError> {
        let key = CustomerKey::User(user_id);
        let filter = OrderFilter::owned_by(key.clone());
        let (customer, orders, addresses) = tokio::try_join!(
            self.store.find_customer(&key),
            self.store.list_orders(&filter),
            self.store.addresses(user_id),
        )?;
        let points = customer.as_ref().map_or(0, |c| c.loyalty_points);
        let orders = orders.into_iter().map(|order| OrderView { tracking: order.tracking_progress(), order }).collect();
        Ok(AccountOverview { customer, loyalty: LoyaltyProgress::for_points(points), orders, addresses })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CartLine, LoyaltyTier, OrderContact, Phone, TrackingStatus};
    use crate::store::{MemoryRecordStore, Operation};
    use rust_decimal::Decimal;

    fn book() -> (Arc<MemoryRecordStore>, AddressBook) {
        let store = Arc::new(MemoryRecordStore::new());
        (store.clone(), AddressBook::new(store))
    }

    async fn defaults(store: &MemoryRecordStore, user: Uuid) -> usize {
        store.addresses(user).await.unwrap().iter().filter(|a| a.is_default).count()
    }

    #[tokio::test]
    async fn test_first_address_is_default() {
        let (store, book) = book();
        let user = Uuid::now_v7();
        let home = book.add(user, "", "Pangani").await.unwrap();
        let work = book.add(user, "Work", "Upper Hill").await.unwrap();
        assert!(home.is_default);
        assert_eq!(home.label, DEFAULT_ADDRESS_LABEL);
        assert!(!work.is_default);
        assert_eq!(defaults(&store, user).await, 1);
        assert!(matches!(book.add(user, "x", "  ").await, Err(AccountError::EmptyAddress)));
    }

    #[tokio::test]
    async fn test_single_default_across_operations() {
        let (store, book) = book();
        let user = Uuid::now_v7();
        let a = book.add(user, "A", "one").await.unwrap();
        let b = book.add(user, "B", "two").await.unwrap();
        let c = book.add(user, "C", "three").await.unwrap();
        book.set_default(user, c.id).await.unwrap();
        assert_eq!(defaults(&store, user).await, 1);
        assert_eq!(store.addresses(user).await.unwrap()[0].id, c.id);

        book.delete(user, c.id).await.unwrap();
        assert_eq!(defaults(&store, user).await, 1);
        assert_eq!(store.addresses(user).await.unwrap()[0].id, a.id);

        book.delete(user, b.id).await.unwrap();
        book.delete(user, a.id).await.unwrap();
        assert!(store.addresses(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_promotion_keeps_a_default() {
        let (store, book) = book();
        let user = Uuid::now_v7();
        let home = book.add(user, "Home", "Pangani").await.unwrap();
        book.add(user, "Work", "Upper Hill").await.unwrap();
        store.fail_on(Operation::DefaultAddress).await;

        assert!(book.delete(user, home.id).await.is_err());
        let addresses = store.addresses(user).await.unwrap();
        assert_eq!(addresses.len(), 2);
        assert_eq!(addresses[0].id, home.id);
        assert_eq!(defaults(&store, user).await, 1);

        store.recover(Operation::DefaultAddress).await;
        book.delete(user, home.id).await.unwrap();
        assert_eq!(defaults(&store, user).await, 1);
    }

    #[tokio::test]
    async fn test_address_write_failure_changes_nothing() {
        let (store, book) = book();
        let user = Uuid::now_v7();
        let home = book.add(user, "Home", "Pangani").await.unwrap();
        store.fail_on(Operation::WriteAddress).await;
        assert!(book.delete(user, home.id).await.is_err());
        assert!(book.add(user, "Work", "Upper Hill").await.is_err());
        assert_eq!(store.addresses(user).await.unwrap(), vec![home]);
    }

    #[tokio::test]
    async fn test_ensure_profile_is_an_upsert() {
        let store = Arc::new(MemoryRecordStore::new());
        let accounts = AccountService::new(store.clone());
        let user = Uuid::now_v7();
        let created = accounts.ensure_profile(user, " Achieng ", Some("achieng@example.com".into())).await.unwrap();
        assert_eq!(created.full_name, "Achieng");
        assert_eq!((created.loyalty_points, created.total_spent, created.phone.clone()), (0, Decimal::ZERO, None));

        let mut adjusted = created.clone();
        adjusted.set_total_spent(Decimal::new(2_500, 0));
        store.update_customer(&adjusted).await.unwrap();
        let again = accounts.ensure_profile(user, "Someone Else", None).await.unwrap();
        assert_eq!(again.id, created.id);
        assert_eq!(again.loyalty_points, 25);
        assert_eq!(store.list_customers().await.unwrap().len(), 1);

        let overview = accounts.overview(user).await.unwrap();
        assert_eq!(overview.customer.unwrap().id, created.id);
    }

    #[tokio::test]
    async fn test_set_default_rejects_foreign_address() {
        let (store, book) = book();
        let (alice, bob) = (Uuid::now_v7(), Uuid::now_v7());
        book.add(alice, "A", "one").await.unwrap();
        let bobs = book.add(bob, "B", "two").await.unwrap();
        assert!(matches!(book.set_default(alice, bobs.id).await, Err(AccountError::AddressNotFound(_))));
        assert_eq!(defaults(&store, alice).await, 1);
        assert!(matches!(book.delete(alice, bobs.id).await, Err(AccountError::AddressNotFound(_))));
    }

    #[tokio::test]
    async fn test_overview() {
        let store = Arc::new(MemoryRecordStore::new());
        let user = Uuid::now_v7();
        let contact = OrderContact {
            full_name: "Achieng".into(), phone: Phone::new("0722000111").unwrap(), email: None,
            delivery_address: "Karen".into(), notes: None, user_id: Some(user),
        };
        let line = CartLine { product_id: "p".into(), name: "p".into(), unit_price: Decimal::new(25_000, 0), quantity: 1 };
        let (mut order, _) = Order::place(contact, &[line]);
        order.set_tracking(TrackingStatus::OutForDelivery);
        store.insert_order(&order).await.unwrap();
        store.insert_customer(&Customer::from_order(&order)).await.unwrap();

        let overview = AccountService::new(store).overview(user).await.unwrap();
        assert_eq!(overview.loyalty.tier, LoyaltyTier::Silver);
        assert_eq!(overview.loyalty.points_to_next, Some(250));
        assert_eq!(overview.orders.len(), 1);
        assert_eq!(overview.orders[0].tracking.iter().filter(|s| s.complete).count(), 3);
    }

    #[tokio::test]
    async fn test_overview_without_profile() {
        let overview = AccountService::new(Arc::new(MemoryRecordStore::new())).overview(Uuid::now_v7()).await.unwrap();
        assert!(overview.customer.is_none());
        assert_eq!(overview.loyalty.tier, LoyaltyTier::Bronze);
        assert!(overview.orders.is_empty());
    }
}
