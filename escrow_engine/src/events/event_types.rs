use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db_types::{CommissionRecord, Order, OrderId, ReleaseTrigger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReleasedEvent {
    pub order: Order,
    pub commission: CommissionRecord,
    pub trigger: ReleaseTrigger,
}

impl PaymentReleasedEvent {
    pub fn new(order: Order, commission: CommissionRecord, trigger: ReleaseTrigger) -> Self {
        Self { order, commission, trigger }
    }
}

/// Published when a release could not complete and an operator may need to step in (no payout channel configured,
/// or the payout gateway failed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseFailedEvent {
    pub order_id: OrderId,
    pub seller_id: String,
    pub trigger: ReleaseTrigger,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentReleased,
    PaymentReceived,
}

/// The obligation to tell a user something. Delivery itself (push, email, ...) belongs to a [`NotificationSink`].
///
/// [`NotificationSink`]: crate::events::NotificationSink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: Value,
}

impl Notification {
    /// Tells the buyer that the money they paid has gone to the seller.
    pub fn payment_released_to_seller(order: &Order) -> Self {
        Self {
            user_id: order.buyer_id.clone(),
            kind: NotificationKind::PaymentReleased,
            title: "Payment released".to_string(),
            message: format!("Your payment for order {} has been released to the seller.", order.order_id),
            data: serde_json::json!({ "order_id": order.order_id }),
        }
    }

    /// Tells the seller they have been paid, how much, and how.
    pub fn payment_received_by_seller(order: &Order) -> Self {
        let method = order.payment_method.map(|m| m.description()).unwrap_or("an unknown method");
        Self {
            user_id: order.seller_id.clone(),
            kind: NotificationKind::PaymentReceived,
            title: "Payment received".to_string(),
            message: format!(
                "You have been paid {} for order {} via {method}.",
                order.seller_amount, order.order_id
            ),
            data: serde_json::json!({
                "order_id": order.order_id,
                "amount": order.seller_amount,
                "method": order.payment_method,
                "reference": order.transfer_reference,
            }),
        }
    }
}
