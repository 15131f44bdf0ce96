//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::aggregates::cart::CartLine;
use crate::domain::value_objects::{Money, Phone};

/// A persisted checkout. `total_amount` is fixed at creation; only the two
/// status fields change afterwards, and only from the admin console.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub full_name: String,
    pub phone: Phone,
    pub email: Option<String>,
    pub delivery_address: String,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub tracking_status: TrackingStatus,
    pub notes: Option<String>,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

/// Buyer and ownership details stamped onto a new order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderContact {
    pub full_name: String,
    pub phone: Phone,
    pub email: Option<String>,
    pub delivery_address: String,
    pub notes: Option<String>,
    pub user_id: Option<Uuid>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Confirmed, Delivered, Cancelled }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus { #[default] Processing, Packed, OutForDelivery, Delivered }

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [Self::Pending, Self::Confirmed, Self::Delivered, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl TrackingStatus {
    /// Fulfilment steps in the order the buyer sees them.
    pub const STEPS: [TrackingStatus; 4] = [Self::Processing, Self::Packed, Self::OutForDelivery, Self::Delivered];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Packed => "packed",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Processing => "Processing",
            Self::Packed => "Packed",
            Self::OutForDelivery => "Out for Delivery",
            Self::Delivered => "Delivered",
        }
    }

    pub fn index(&self) -> usize { Self::STEPS.iter().position(|s| s == self).unwrap_or(0) }

    /// Parses a stored value, falling back to `Processing` for missing or
    /// unknown text the way the account page renders it.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str() == s).ok_or_else(|| format!("invalid order status: {s}"))
    }
}

impl FromStr for TrackingStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::STEPS.into_iter().find(|st| st.as_str() == s).ok_or_else(|| format!("invalid tracking status: {s}"))
    }
}

/// One cell of the 4-step progress bar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrackingStep {
    pub status: TrackingStatus,
    pub label: &'static str,
    pub complete: bool,
}

/// Steps `0..=current` are complete, the rest pending.
pub fn tracking_progress(current: TrackingStatus) -> Vec<TrackingStep> {
    let idx = current.index();
    TrackingStatus::STEPS
        .iter()
        .enumerate()
        .map(|(i, s)| TrackingStep { status: *s, label: s.label(), complete: i <= idx })
        .collect()
}

impl Order {
    /// Builds a pending order and one item per cart line. The total is
    /// derived from the lines, never supplied by the caller.
    pub fn place(contact: OrderContact, lines: &[CartLine]) -> (Order, Vec<OrderItem>) {
        let id = Uuid::now_v7();
        let items: Vec<OrderItem> = lines.iter().map(|l| OrderItem::from_line(id, l)).collect();
        let total: Money = lines.iter().map(CartLine::line_total).sum();
        let order = Order {
            id,
            full_name: contact.full_name,
            phone: contact.phone,
            email: contact.email,
            delivery_address: contact.delivery_address,
            total_amount: total.amount(),
            status: OrderStatus::Pending,
            tracking_status: TrackingStatus::Processing,
            notes: contact.notes,
            user_id: contact.user_id,
            created_at: Utc::now(),
        };
        (order, items)
    }

    pub fn total(&self) -> Money { Money::kes(self.total_amount) }

    /// Sets the order status. Delivering an order also forces tracking to
    /// `Delivered`; returns true when tracking changed as a result.
    pub fn set_status(&mut self, status: OrderStatus) -> bool {
        self.status = status;
        if status == OrderStatus::Delivered && self.tracking_status != TrackingStatus::Delivered {
            self.tracking_status = TrackingStatus::Delivered;
            return true;
        }
        false
    }

    /// Any step may be set, including moving backwards.
    pub fn set_tracking(&mut self, tracking: TrackingStatus) { self.tracking_status = tracking; }

    pub fn tracking_progress(&self) -> Vec<TrackingStep> { tracking_progress(self.tracking_status) }
}

impl OrderItem {
    pub fn from_line(order_id: Uuid, line: &CartLine) -> Self {
        Self {
            id: Uuid::now_v7(),
            order_id,
            product_id: line.product_id.clone(),
            product_name: line.name.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            total_price: line.line_total().amount(),
        }
    }
}
