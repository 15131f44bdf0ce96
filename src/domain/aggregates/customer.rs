//! Customer Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use crate::domain::aggregates::order::Order;
use crate::domain::loyalty::LoyaltyTier;
use crate::domain::value_objects::Phone;

/// Spend per loyalty point.
pub const SPEND_PER_POINT: Decimal = Decimal::ONE_HUNDRED;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub full_name: String,
    /// Always present for guest profiles. Account profiles created at
    /// signup have none until their first order.
    pub phone: Option<Phone>,
    pub email: Option<String>,
    pub loyalty_points: i64,
    pub total_spent: Decimal,
    pub created_at: DateTime<Utc>,
}

/// How a customer is found: the account id when signed in, otherwise phone.
/// A phone key only covers guest records; signed-in orders always belong to
/// the account.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum CustomerKey {
    User(Uuid),
    Phone(Phone),
}

impl CustomerKey {
    pub fn for_order(order: &Order) -> Self {
        match order.user_id {
            Some(user_id) => Self::User(user_id),
            None => Self::Phone(order.phone.clone()),
        }
    }

    pub fn matches_order(&self, order: &Order) -> bool {
        match self {
            Self::User(id) => order.user_id == Some(*id),
            Self::Phone(phone) => order.user_id.is_none() && &order.phone == phone,
        }
    }

    /// The key that owns this customer's orders; `None` for a guest record
    /// without a phone, which owns nothing.
    pub fn for_customer(customer: &Customer) -> Option<Self> {
        match (customer.user_id, &customer.phone) {
            (Some(user_id), _) => Some(Self::User(user_id)),
            (None, Some(phone)) => Some(Self::Phone(phone.clone())),
            (None, None) => None,
        }
    }

    pub fn matches_customer(&self, customer: &Customer) -> bool {
        match self {
            Self::User(id) => customer.user_id == Some(*id),
            Self::Phone(phone) => customer.user_id.is_none() && customer.phone.as_ref() == Some(phone),
        }
    }
}

impl fmt::Display for CustomerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Phone(phone) => write!(f, "phone:{phone}"),
        }
    }
}

/// `floor(total_spent / 100)`, never negative.
pub fn points_for(total_spent: Decimal) -> i64 {
    (total_spent / SPEND_PER_POINT).floor().to_i64().unwrap_or(0).max(0)
}

impl Customer {
    /// First-order profile: spend and points come from this order alone.
    pub fn from_order(order: &Order) -> Self {
        let mut customer = Self {
            id: Uuid::now_v7(),
            user_id: order.user_id,
            full_name: order.full_name.clone(),
            phone: Some(order.phone.clone()),
            email: order.email.clone(),
            loyalty_points: 0,
            total_spent: Decimal::ZERO,
            created_at: Utc::now(),
        };
        customer.set_total_spent(order.total_amount);
        customer
    }

    /// Empty profile for a new account, before any order.
    pub fn for_account(user_id: Uuid, full_name: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: Some(user_id),
            full_name: full_name.into(),
            phone: None,
            email,
            loyalty_points: 0,
            total_spent: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }

    /// Sets lifetime spend and re-derives points from it.
    pub fn set_total_spent(&mut self, total_spent: Decimal) {
        self.total_spent = total_spent.max(Decimal::ZERO);
        self.loyalty_points = points_for(self.total_spent);
    }

    /// Latest order wins for contact details.
    pub fn refresh_contact(&mut self, order: &Order) {
        self.full_name = order.full_name.clone();
        self.phone = Some(order.phone.clone());
        if order.email.is_some() { self.email = order.email.clone(); }
    }

    /// Manual admin adjustment, floored at zero. Returns the new balance.
    pub fn adjust_points(&mut self, delta: i64) -> i64 {
        self.loyalty_points = self.loyalty_points.saturating_add(delta).max(0);
        self.loyalty_points
    }

    pub fn tier(&self) -> LoyaltyTier { LoyaltyTier::for_points(self.loyalty_points) }

    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        needle.is_empty()
            || self.full_name.to_lowercase().contains(&needle)
            || self.phone.as_ref().is_some_and(|p| p.as_str().contains(&needle))
            || self.email.as_deref().is_some_and(|e| e.to_lowercase().contains(&needle))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub label: String,
    pub address: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl Address {
    pub fn new(user_id: Uuid, label: impl Into<String>, address: impl Into<String>, is_default: bool) -> Self {
        Self { id: Uuid::now_v7(), user_id, label: label.into(), address: address.into(), is_default, created_at: Utc::now() }
    }
}
