use std::fmt::Debug;

use chrono::{DateTime, Utc};
use escrow_common::Money;
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db::traits::{EscrowBackend, InsertOrderResult},
    db_types::{CommissionRecord, NewOrder, Order, OrderId, OrderStatusType, PayoutProfile},
    escrow_api::errors::OrderFlowError,
    state_machine::OrderPaymentStateMachine,
};

/// An order together with the commission recorded against it, if it has been released.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub commission: Option<CommissionRecord>,
}

/// `OrderFlowApi` handles everything that happens to an order before its payment is released: checkout, the seller's
/// fulfillment actions and the seller's payout details.
pub struct OrderFlowApi<B> {
    state: OrderPaymentStateMachine<B>,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B: Clone> Clone for OrderFlowApi<B> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone() }
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B) -> Self {
        Self { state: OrderPaymentStateMachine::new(db) }
    }

    pub fn with_hold_period(mut self, hold_period: chrono::Duration) -> Self {
        self.state = self.state.with_hold_period(hold_period);
        self
    }

    pub fn db(&self) -> &B {
        self.state.db()
    }
}

impl<B> OrderFlowApi<B>
where B: EscrowBackend
{
    /// Stores a freshly checked-out order. Payment has already been captured, so the order starts out `pending` and
    /// `paid`.
    ///
    /// Submitting the same order twice is harmless: the stored order is returned unchanged.
    pub async fn create_order(&self, order: NewOrder) -> Result<Order, OrderFlowError> {
        if order.amount.is_zero() || order.amount.is_negative() {
            return Err(OrderFlowError::InvalidOrder(format!("Order amount must be positive, got {}", order.amount)));
        }
        if order.commission_amount().is_negative() || order.seller_amount().is_negative() {
            return Err(OrderFlowError::InvalidOrder(format!(
                "Commission rate {} is out of range",
                order.commission_rate()
            )));
        }
        let result = self.db().insert_order(order).await.map_err(OrderFlowError::database)?;
        match result {
            InsertOrderResult::Inserted(order) => {
                info!(
                    "📦️ Order {} created. {} held for seller {} ({} commission)",
                    order.order_id, order.seller_amount, order.seller_id, order.commission_amount
                );
                Ok(order)
            },
            InsertOrderResult::AlreadyExists(order) => {
                debug!("📦️ Order {} was already stored", order.order_id);
                Ok(order)
            },
        }
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        self.db()
            .fetch_order(order_id)
            .await
            .map_err(OrderFlowError::database)?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))
    }

    /// Fetches the order, checking that it belongs to `seller_id`.
    pub async fn fetch_order_for_seller(&self, order_id: &OrderId, seller_id: &str) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        if order.seller_id != seller_id {
            warn!("📦️ Seller {seller_id} tried to act on order {order_id}, which belongs to {}", order.seller_id);
            return Err(OrderFlowError::NotOrderOwner(order_id.clone()));
        }
        Ok(order)
    }

    pub async fn order_details(&self, order_id: &OrderId) -> Result<OrderDetails, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        let commission = self.db().fetch_commission(order_id).await.map_err(OrderFlowError::database)?;
        Ok(OrderDetails { order, commission })
    }

    pub async fn confirm_order(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        self.state.update_status(order_id, OrderStatusType::Confirmed).await
    }

    pub async fn ship_order(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        self.state.update_status(order_id, OrderStatusType::Shipped).await
    }

    pub async fn mark_delivered(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        self.mark_delivered_at(order_id, Utc::now()).await
    }

    pub async fn mark_delivered_at(&self, order_id: &OrderId, at: DateTime<Utc>) -> Result<Order, OrderFlowError> {
        self.state.mark_delivered(order_id, at).await
    }

    pub async fn cancel_order(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        self.state.update_status(order_id, OrderStatusType::Cancelled).await
    }

    pub async fn fetch_payout_profile(&self, seller_id: &str) -> Result<Option<PayoutProfile>, OrderFlowError> {
        self.db().fetch_payout_profile(seller_id).await.map_err(OrderFlowError::database)
    }

    /// Creates or replaces the seller's payout details.
    pub async fn set_payout_profile(&self, profile: PayoutProfile) -> Result<PayoutProfile, OrderFlowError> {
        if profile.seller_id.trim().is_empty() {
            return Err(OrderFlowError::InvalidPayoutProfile("A seller id is required".to_string()));
        }
        if let Some(bank) = &profile.bank {
            if !bank.is_complete() {
                return Err(OrderFlowError::InvalidPayoutProfile(
                    "Bank details need both an account number and a bank code".to_string(),
                ));
            }
        }
        let saved = self.db().upsert_payout_profile(profile).await.map_err(OrderFlowError::database)?;
        match saved.resolve_channel() {
            Some(channel) => info!("📦️ Seller {} will be paid via {}", saved.seller_id, channel.method().description()),
            None => warn!("📦️ Seller {} has no usable payout channel", saved.seller_id),
        }
        Ok(saved)
    }

    /// Total platform commission collected so far.
    pub async fn total_commission(&self) -> Result<Money, OrderFlowError> {
        self.db().total_commission().await.map_err(OrderFlowError::database)
    }
}
