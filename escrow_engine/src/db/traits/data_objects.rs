use chrono::{DateTime, Utc};

use crate::db_types::{Order, OrderStatusType};

pub enum InsertOrderResult {
    Inserted(Order),
    AlreadyExists(Order),
}

impl InsertOrderResult {
    pub fn into_order(self) -> Order {
        match self {
            Self::Inserted(o) | Self::AlreadyExists(o) => o,
        }
    }
}

/// A conditional change to the fulfillment status of an order. It is only applied when the order's current status is
/// one of `from`.
#[derive(Debug, Clone)]
pub struct FulfillmentUpdate {
    pub from: Vec<OrderStatusType>,
    pub to: OrderStatusType,
    /// Set when moving to `Delivered`. The stored value is never overwritten once set.
    pub delivered_at: Option<DateTime<Utc>>,
    /// Set alongside `delivered_at`.
    pub auto_release_date: Option<DateTime<Utc>>,
}

impl FulfillmentUpdate {
    pub fn new(to: OrderStatusType) -> Self {
        Self { from: OrderStatusType::predecessors_of(to), to, delivered_at: None, auto_release_date: None }
    }

    pub fn delivered(at: DateTime<Utc>, auto_release_date: DateTime<Utc>) -> Self {
        Self { delivered_at: Some(at), auto_release_date: Some(auto_release_date), ..Self::new(OrderStatusType::Delivered) }
    }
}
