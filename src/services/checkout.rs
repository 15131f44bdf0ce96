//! Checkout orchestration
//!
//! Validate buyer fields, turn the cart into an order plus its items,
//! reconcile the customer profile, then clear the cart. Nothing touches the
//! record store until validation has passed, and the cart is only cleared
//! once the order exists.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::cart_store::{CartStorage, CartStore};
use crate::domain::{Customer, Money, Order, OrderContact, OrderItem, Phone};
use crate::services::reconcile::CustomerReconciler;
use crate::store::{RecordStore, StoreError};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Buyer-entered checkout fields as submitted.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct BuyerForm {
    pub full_name: String,
    pub phone: String,
    pub delivery_address: String,
    #[validate(email)]
    pub email: Option<String>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter your full name")]
    MissingName,
    #[error("Please enter a phone number")]
    MissingPhone,
    #[error("Please enter a delivery address")]
    MissingAddress,
    #[error("Phone number is not valid")]
    InvalidPhone,
    #[error("Email address is not valid")]
    InvalidEmail,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// M-Pesa express; treated as settled on submit.
    #[default]
    Mpesa,
    /// Card placeholder; needs an explicit confirmation step.
    Card,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Your bag is empty")]
    EmptyCart,
    #[error("Card payment needs confirmation")]
    CardConfirmationRequired,
    #[error("Order failed, please retry")]
    OrderFailed(#[source] StoreError),
    #[error("Order failed, please retry")]
    TimedOut,
}

impl CheckoutError {
    /// Whether resubmitting the same checkout could succeed.
    pub fn is_retryable(&self) -> bool { matches!(self, Self::OrderFailed(_) | Self::TimedOut) }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl BuyerForm {
    /// Name, then phone, then address; the first violation wins. Email
    /// format is checked last and only when an email was given.
    pub fn validate_ordered(&self) -> Result<ValidatedBuyer, ValidationError> {
        let full_name = non_empty(&self.full_name).ok_or(ValidationError::MissingName)?;
        if self.phone.trim().is_empty() { return Err(ValidationError::MissingPhone); }
        let delivery_address = non_empty(&self.delivery_address).ok_or(ValidationError::MissingAddress)?;
        let phone = Phone::new(&self.phone).map_err(|_| ValidationError::InvalidPhone)?;
        let mut form = self.clone();
        form.email = self.email.as_deref().and_then(non_empty);
        form.validate().map_err(|_| ValidationError::InvalidEmail)?;
        Ok(ValidatedBuyer {
            full_name,
            phone,
            email: form.email,
            delivery_address,
            notes: self.notes.as_deref().and_then(non_empty),
        })
    }
}

/// Buyer fields that passed validation. Only [`BuyerForm::validate_ordered`]
/// produces one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedBuyer {
    full_name: String,
    phone: Phone,
    email: Option<String>,
    delivery_address: String,
    notes: Option<String>,
}

/// A validated checkout awaiting submission.
#[derive(Clone, Debug)]
pub struct PendingCheckout {
    buyer: ValidatedBuyer,
    user_id: Option<Uuid>,
    payment: PaymentMethod,
    card_confirmed: bool,
}

impl PendingCheckout {
    pub fn payment(&self) -> PaymentMethod { self.payment }
    pub fn needs_card_confirmation(&self) -> bool { self.payment == PaymentMethod::Card && !self.card_confirmed }

    /// The card step. Buyer fields are already validated and are not
    /// checked again.
    pub fn confirm_card(mut self) -> Self {
        self.card_confirmed = true;
        self
    }

    fn into_contact(self) -> OrderContact {
        OrderContact {
            full_name: self.buyer.full_name,
            phone: self.buyer.phone,
            email: self.buyer.email,
            delivery_address: self.buyer.delivery_address,
            notes: self.buyer.notes,
            user_id: self.user_id,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct OrderConfirmation {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub total: Money,
    /// Profile after reconciliation; `None` when it could not be updated.
    pub customer: Option<Customer>,
    pub cart_cleared: bool,
}

impl OrderConfirmation {
    pub fn delivery_address(&self) -> &str { &self.order.delivery_address }
    pub fn phone(&self) -> &Phone { &self.order.phone }
}

#[derive(Clone)]
pub struct CheckoutOrchestrator {
    store: Arc<dyn RecordStore>,
    reconciler: CustomerReconciler,
    timeout: Duration,
}

impl CheckoutOrchestrator {
    pub fn new(store: Arc<dyn RecordStore>, reconciler: CustomerReconciler) -> Self {
        Self { store, reconciler, timeout: DEFAULT_STORE_TIMEOUT }
    }

    /// Bounds every awaited store call made during checkout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validates the buyer form against a non-empty cart. No store access.
    pub fn prepare<S: CartStorage>(
        &self,
        cart: &CartStore<S>,
        form: &BuyerForm,
        payment: PaymentMethod,
        user_id: Option<Uuid>,
    ) -> Result<PendingCheckout, CheckoutError> {
        if cart.is_empty() { return Err(CheckoutError::EmptyCart); }
        let buyer = form.validate_ordered()?;
        Ok(PendingCheckout { buyer, user_id, payment, card_confirmed: false })
    }

    /// Persists the order and its items from the current cart, reconciles
    /// the customer, and clears the cart. If the order cannot be written
    /// the cart is left untouched so the buyer can resubmit.
    pub async fn place<S: CartStorage>(
        &self,
        pending: PendingCheckout,
        cart: &mut CartStore<S>,
    ) -> Result<OrderConfirmation, CheckoutError> {
        if pending.needs_card_confirmation() { return Err(CheckoutError::CardConfirmationRequired); }
        let snapshot = cart.snapshot();
        if snapshot.is_empty() { return Err(CheckoutError::EmptyCart); }

        let payment = pending.payment();
        let (order, items) = Order::place(pending.into_contact(), snapshot.lines());
        if let Err(e) = self.write_order(&order, &items).await {
            error!(order_id = %order.id, error = ?e, "checkout failed, cart kept");
            return Err(e);
        }
        info!(order_id = %order.id, total = %order.total(), items = items.len(), payment = ?payment, "order placed");

        let customer = match self.bounded(self.reconciler.reconcile_order(&order)).await {
            Ok(r) => Some(r.customer),
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "customer reconciliation skipped");
                None
            }
        };

        let cart_cleared = match cart.clear() {
            Ok(()) => true,
            Err(e) => {
                error!(order_id = %order.id, error = %e, "order placed but cart not cleared");
                false
            }
        };

        Ok(OrderConfirmation { total: order.total(), order, items, customer, cart_cleared })
    }

    /// The order write runs on its own task so a deadline never stops it
    /// between the order and its items. A write that lands after the
    /// deadline is deleted again; the buyer was already told to retry.
    async fn write_order(&self, order: &Order, items: &[OrderItem]) -> Result<(), CheckoutError> {
        let store = self.store.clone();
        let (pending_order, pending_items) = (order.clone(), items.to_vec());
        let mut write = tokio::spawn(async move { store.create_order(&pending_order, &pending_items).await });
        match tokio::time::timeout(self.timeout, &mut write).await {
            Ok(Ok(result)) => result.map_err(CheckoutError::OrderFailed),
            Ok(Err(join)) => Err(CheckoutError::OrderFailed(StoreError::Unavailable(join.to_string()))),
            Err(_) => {
                let store = self.store.clone();
                let order_id = order.id;
                tokio::spawn(async move {
                    if let Ok(Ok(())) = write.await {
                        match store.delete_order(order_id).await {
                            Ok(()) => warn!(order_id = %order_id, "order written after checkout timed out, removed"),
                            Err(e) => error!(order_id = %order_id, error = %e, "late order could not be removed"),
                        }
                    }
                });
                Err(CheckoutError::TimedOut)
            }
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T, StoreError>>) -> Result<T, CheckoutError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CheckoutError::OrderFailed(e)),
            Err(_) => Err(CheckoutError::TimedOut),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart_store::MemoryStorage;
    use crate::domain::CartProduct;
    use crate::services::reconcile::ReconcileStrategy;
    use crate::store::{MemoryRecordStore, OrderFilter, Operation};
    use rust_decimal::Decimal;

    fn form() -> BuyerForm {
        BuyerForm {
            full_name: "Jane Wanjiru".into(),
            phone: "0700111222".into(),
            delivery_address: "Westlands, Nairobi".into(),
            email: None,
            notes: None,
        }
    }

    fn setup() -> (Arc<MemoryRecordStore>, CheckoutOrchestrator, CartStore<MemoryStorage>) {
        let store = Arc::new(MemoryRecordStore::new());
        let reconciler = CustomerReconciler::new(store.clone(), ReconcileStrategy::FullHistory);
        let checkout = CheckoutOrchestrator::new(store.clone(), reconciler);
        let mut cart = CartStore::open(MemoryStorage::new());
        cart.add(&CartProduct { id: "vit-c".into(), name: "Vitamin C".into(), unit_price: Decimal::new(1200, 0) }, 2).unwrap();
        (store, checkout, cart)
    }

    #[test]
    fn test_validation_order() {
        let blank = BuyerForm::default();
        assert_eq!(blank.validate_ordered(), Err(ValidationError::MissingName));
        let no_phone = BuyerForm { phone: " ".into(), delivery_address: String::new(), ..form() };
        assert_eq!(no_phone.validate_ordered(), Err(ValidationError::MissingPhone));
        let no_address = BuyerForm { delivery_address: "  ".into(), ..form() };
        assert_eq!(no_address.validate_ordered(), Err(ValidationError::MissingAddress));
        let bad_email = BuyerForm { email: Some("not-an-email".into()), ..form() };
        assert_eq!(bad_email.validate_ordered(), Err(ValidationError::InvalidEmail));
        let blank_email = BuyerForm { email: Some("  ".into()), ..form() };
        assert!(blank_email.validate_ordered().is_ok());
    }

    #[tokio::test]
    async fn test_place_order() {
        let (store, checkout, mut cart) = setup();
        let pending = checkout.prepare(&cart, &form(), PaymentMethod::Mpesa, None).unwrap();
        let confirmation = checkout.place(pending, &mut cart).await.unwrap();
        assert_eq!(confirmation.total.amount(), Decimal::new(2400, 0));
        assert_eq!(confirmation.delivery_address(), "Westlands, Nairobi");
        assert_eq!(confirmation.phone().as_str(), "0700111222");
        assert!(confirmation.cart_cleared);
        assert_eq!(cart.count(), 0);
        assert_eq!(store.order_items(confirmation.order.id).await.unwrap().len(), 1);
        assert_eq!(confirmation.customer.unwrap().loyalty_points, 24);
    }

    #[tokio::test]
    async fn test_card_requires_confirmation() {
        let (store, checkout, mut cart) = setup();
        let pending = checkout.prepare(&cart, &form(), PaymentMethod::Card, None).unwrap();
        assert!(pending.needs_card_confirmation());
        assert!(matches!(checkout.place(pending.clone(), &mut cart).await, Err(CheckoutError::CardConfirmationRequired)));
        assert_eq!(store.write_count(), 0);
        checkout.place(pending.confirm_card(), &mut cart).await.unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_order_failure_keeps_cart() {
        let (store, checkout, mut cart) = setup();
        store.fail_on(Operation::InsertOrder).await;
        let pending = checkout.prepare(&cart, &form(), PaymentMethod::Mpesa, None).unwrap();
        let err = checkout.place(pending.clone(), &mut cart).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Order failed, please retry");
        assert_eq!(cart.count(), 2);

        store.recover(Operation::InsertOrder).await;
        checkout.place(pending, &mut cart).await.unwrap();
        assert_eq!(store.list_orders(&OrderFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_item_failure_leaves_no_orphan() {
        let (store, checkout, mut cart) = setup();
        store.fail_on(Operation::InsertOrderItems).await;
        let pending = checkout.prepare(&cart, &form(), PaymentMethod::Mpesa, None).unwrap();
        assert!(checkout.place(pending, &mut cart).await.is_err());
        assert!(store.list_orders(&OrderFilter::default()).await.unwrap().is_empty());
        assert_eq!(cart.count(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_failure_still_confirms() {
        let (store, checkout, mut cart) = setup();
        store.fail_on(Operation::WriteCustomer).await;
        let pending = checkout.prepare(&cart, &form(), PaymentMethod::Mpesa, None).unwrap();
        let confirmation = checkout.place(pending, &mut cart).await.unwrap();
        assert!(confirmation.customer.is_none());
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_hung_store_times_out() {
        let (store, checkout, mut cart) = setup();
        let checkout = checkout.with_timeout(Duration::from_millis(20));
        store.set_delay(Some(Duration::from_millis(200))).await;
        let pending = checkout.prepare(&cart, &form(), PaymentMethod::Mpesa, None).unwrap();
        assert!(matches!(checkout.place(pending, &mut cart).await, Err(CheckoutError::TimedOut)));
        assert_eq!(cart.count(), 2);
        store.set_delay(None).await;
        assert!(store.list_orders(&OrderFilter::default()).await.unwrap().is_empty());

        // The abandoned write still lands, and is removed again.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(store.list_orders(&OrderFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_between_order_and_items_leaves_nothing() {
        let (store, checkout, mut cart) = setup();
        // Each call fits the deadline, the order plus its items do not.
        let checkout = checkout.with_timeout(Duration::from_millis(25));
        store.set_delay(Some(Duration::from_millis(15))).await;
        let pending = checkout.prepare(&cart, &form(), PaymentMethod::Mpesa, None).unwrap();
        let err = checkout.place(pending.clone(), &mut cart).await.unwrap_err();
        assert!(matches!(err, CheckoutError::TimedOut));
        assert_eq!(cart.count(), 2);
        store.set_delay(None).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.list_orders(&OrderFilter::default()).await.unwrap().is_empty());
        assert!(store.list_customers().await.unwrap().is_empty());

        let confirmation = checkout.place(pending, &mut cart).await.unwrap();
        assert_eq!(store.list_orders(&OrderFilter::default()).await.unwrap().len(), 1);
        assert_eq!(confirmation.customer.unwrap().total_spent, Decimal::new(2400, 0));
    }

    #[test]
    fn test_empty_cart_rejected() {
        let (_, checkout, _) = setup();
        let empty = CartStore::open(MemoryStorage::new());
        assert!(matches!(checkout.prepare(&empty, &form(), PaymentMethod::Mpesa, None), Err(CheckoutError::EmptyCart)));
    }
}
