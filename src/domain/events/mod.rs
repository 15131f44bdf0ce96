//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::{CustomerKey, OrderStatus, TrackingStatus};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderPlaced { order_id: Uuid, total: Decimal, items: usize, customer: CustomerKey },
    OrderStatusChanged { order_id: Uuid, status: OrderStatus, tracking: TrackingStatus },
    TrackingStatusChanged { order_id: Uuid, tracking: TrackingStatus },
    OrderDeleted { order_id: Uuid },
    CustomerReconciled { customer_id: Uuid, total_spent: Decimal, loyalty_points: i64 },
}

impl DomainEvent {
    /// NATS subject the event is published under.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::OrderPlaced { .. } => "commerce.order.placed",
            Self::OrderStatusChanged { .. } => "commerce.order.status_changed",
            Self::TrackingStatusChanged { .. } => "commerce.order.tracking_changed",
            Self::OrderDeleted { .. } => "commerce.order.deleted",
            Self::CustomerReconciled { .. } => "commerce.customer.reconciled",
        }
    }
}
