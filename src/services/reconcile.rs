//! Customer profile reconciliation
//!
//! Folds a completed order into the owning customer's loyalty profile and,
//! for signed-in buyers, their address book.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{Customer, CustomerKey, Order};
use crate::services::account::AddressBook;
use crate::store::{RecordStore, StoreError};

/// How lifetime spend is recomputed when a known customer orders again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStrategy {
    /// Re-sum every order the customer owns. Idempotent; one aggregate read
    /// per reconciliation.
    #[default]
    FullHistory,
    /// Add this order's total to the stored spend. Constant cost, but
    /// reconciling the same order twice counts it twice.
    Incremental,
}

impl FromStr for ReconcileStrategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full_history" => Ok(Self::FullHistory),
            "incremental" => Ok(Self::Incremental),
            _ => Err(format!("invalid reconcile strategy: {s}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub customer: Customer,
    pub created: bool,
    pub address_saved: bool,
}

#[derive(Clone)]
pub struct CustomerReconciler {
    store: Arc<dyn RecordStore>,
    strategy: ReconcileStrategy,
}

impl CustomerReconciler {
    pub fn new(store: Arc<dyn RecordStore>, strategy: ReconcileStrategy) -> Self { Self { store, strategy } }

    pub fn strategy(&self) -> ReconcileStrategy { self.strategy }

    /// Reconciles with the configured strategy. Used once per checkout.
    pub async fn reconcile_order(&self, order: &Order) -> Result<Reconciliation, StoreError> {
        self.reconcile_with(order, self.strategy).await
    }

    pub async fn reconcile_with(&self, order: &Order, strategy: ReconcileStrategy) -> Result<Reconciliation, StoreError> {
        let key = CustomerKey::for_order(order);
        let (customer, created) = match self.store.find_customer(&key).await? {
            Some(customer) => (self.fold(customer, order, &key, strategy).await?, false),
            None => {
                let customer = Customer::from_order(order);
                match self.store.insert_customer(&customer).await {
                    Ok(()) => (customer, true),
                    // Another order for the same key created the profile first.
                    Err(StoreError::Conflict { .. }) => {
                        let existing = self.store.find_customer(&key).await?
                            .ok_or_else(|| StoreError::not_found("customers", &key))?;
                        warn!(key = %key, customer_id = %existing.id, "concurrent first orders, folding into existing profile");
                        (self.fold(existing, order, &key, ReconcileStrategy::FullHistory).await?, false)
                    }
                    Err(e) => return Err(e),
                }
            }
        };
        info!(
            customer_id = %customer.id, key = %key, created,
            total_spent = %customer.total_spent, loyalty_points = customer.loyalty_points,
            "customer reconciled"
        );

        let address_saved = match order.user_id {
            Some(user_id) if !order.delivery_address.trim().is_empty() => {
                match AddressBook::new(self.store.clone()).remember(user_id, &order.delivery_address).await {
                    Ok(saved) => saved.is_some(),
                    Err(e) => {
                        warn!(order_id = %order.id, error = %e, "delivery address not saved");
                        false
                    }
                }
            }
            _ => false,
        };

        Ok(Reconciliation { customer, created, address_saved })
    }

    async fn fold(&self, mut customer: Customer, order: &Order, key: &CustomerKey, strategy: ReconcileStrategy) -> Result<Customer, StoreError> {
        let total_spent = match strategy {
            ReconcileStrategy::FullHistory => self.store.order_total(key).await?,
            ReconcileStrategy::Incremental => customer.total_spent + order.total_amount,
        };
        customer.set_total_spent(total_spent);
        customer.refresh_contact(order);
        self.store.update_customer(&customer).await?;
        Ok(customer)
    }

    /// Re-derives spend from order history for an existing customer, e.g.
    /// after orders were deleted. Returns `None` when no profile exists.
    pub async fn refresh(&self, key: &CustomerKey) -> Result<Option<Customer>, StoreError> {
        let Some(mut customer) = self.store.find_customer(key).await? else { return Ok(None) };
        customer.set_total_spent(self.store.order_total(key).await?);
        self.store.update_customer(&customer).await?;
        info!(customer_id = %customer.id, key = %key, total_spent = %customer.total_spent, "customer refreshed");
        Ok(Some(customer))
    }
}
