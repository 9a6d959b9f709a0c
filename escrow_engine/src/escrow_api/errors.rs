use thiserror::Error;

use crate::db_types::{OrderId, OrderStatusType, PaymentStatus};

#[derive(Debug, Clone, Error)]
pub enum ReleaseError {
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order is not eligible for release. {0}")]
    NotEligible(String),
    #[error("The payment for order {0} has already been released")]
    AlreadyReleased(OrderId),
    #[error("Another release of order {0} is under way. Try again once it has finished")]
    ReleaseInProgress(OrderId),
    #[error("Seller {0} has not configured any payout channel")]
    NoPayoutChannel(String),
    #[error("The payout transfer failed. {0}")]
    TransferFailed(String),
    #[error("Payment for order {order_id} cannot move from {from} to {to}")]
    InvalidTransition { order_id: OrderId, from: PaymentStatus, to: PaymentStatus },
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl ReleaseError {
    pub(crate) fn database<E: std::error::Error>(e: E) -> Self {
        Self::DatabaseError(e.to_string())
    }

    /// `AlreadyReleased` means the release was completed earlier, possibly by somebody else winning a race. The money
    /// has moved exactly once, so callers should treat it as a no-op success.
    ///
    /// `ReleaseInProgress` is not a success: the other caller's transfer may still fail.
    pub fn is_success_equivalent(&self) -> bool {
        matches!(self, Self::AlreadyReleased(_))
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition { order_id: OrderId, from: OrderStatusType, to: OrderStatusType },
    #[error("Order {0} does not belong to this seller")]
    NotOrderOwner(OrderId),
    #[error("Invalid order. {0}")]
    InvalidOrder(String),
    #[error("Invalid payout profile. {0}")]
    InvalidPayoutProfile(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl OrderFlowError {
    pub(crate) fn database<E: std::error::Error>(e: E) -> Self {
        Self::DatabaseError(e.to_string())
    }
}
