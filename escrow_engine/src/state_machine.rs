//! The lifecycle of an order's payment.
//!
//! An order moves along two independent axes. The fulfillment axis ([`OrderStatusType`]) is driven by the seller
//! (confirm, ship, deliver). The payment axis ([`PaymentStatus`]) is driven by the release engine. The
//! [`OrderPaymentStateMachine`] is the only component that writes either of them, and every write is a conditional
//! update in the database so that concurrent callers cannot both succeed.
//!
//! Payment axis:
//!
//! ```text
//!   pending ──► paid ──► released   (terminal)
//!                 ├────► refunded   (terminal, separate refund flow)
//!                 └────► failed     (terminal, manual verification flows)
//!   pending_verification ──► paid | failed
//! ```
use chrono::{DateTime, Duration, Utc};
use log::*;

use crate::{
    db::traits::{FulfillmentUpdate, OrderManagement, ReleaseManagement},
    db_types::{
        CommissionRecord,
        NewCommission,
        Order,
        OrderId,
        OrderStatusType,
        PaymentStatus,
        PayoutMethod,
        ReleaseClaim,
        ReleaseRecord,
        ReleaseTrigger,
    },
    escrow_api::errors::{OrderFlowError, ReleaseError},
};

/// How long after delivery the buyer has to raise a problem before the payment is released automatically.
pub const DEFAULT_HOLD_PERIOD_DAYS: i64 = 7;

pub struct OrderPaymentStateMachine<B> {
    db: B,
    hold_period: Duration,
}

impl<B: Clone> Clone for OrderPaymentStateMachine<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), hold_period: self.hold_period }
    }
}

impl<B> OrderPaymentStateMachine<B> {
    pub fn new(db: B) -> Self {
        Self { db, hold_period: Duration::days(DEFAULT_HOLD_PERIOD_DAYS) }
    }

    pub fn with_hold_period(mut self, hold_period: Duration) -> Self {
        self.hold_period = hold_period;
        self
    }

    pub fn hold_period(&self) -> Duration {
        self.hold_period
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Checks whether the order's payment may be released right now, for the given trigger. This never touches the
    /// database.
    ///
    /// * Any release requires `payment_status == paid`.
    /// * An automatic release additionally requires the order to be `delivered` and `now` to be on or after the
    ///   auto-release date.
    pub fn check_release(order: &Order, trigger: ReleaseTrigger, now: DateTime<Utc>) -> Result<(), ReleaseError> {
        match order.payment_status {
            PaymentStatus::Paid => {},
            PaymentStatus::Released => return Err(ReleaseError::AlreadyReleased(order.order_id.clone())),
            other => return Err(ReleaseError::NotEligible(format!("Payment status is {other}, not paid"))),
        }
        if trigger == ReleaseTrigger::Manual {
            return Ok(());
        }
        if order.status != OrderStatusType::Delivered {
            return Err(ReleaseError::NotEligible(format!("Order status is {}, not delivered", order.status)));
        }
        match order.auto_release_date {
            None => Err(ReleaseError::NotEligible("Order has no auto-release date".to_string())),
            Some(date) if now < date => {
                Err(ReleaseError::NotEligible(format!("Auto-release date {date} has not been reached")))
            },
            Some(_) => Ok(()),
        }
    }

    pub fn can_release(order: &Order, trigger: ReleaseTrigger, now: DateTime<Utc>) -> bool {
        Self::check_release(order, trigger, now).is_ok()
    }
}

impl<B> OrderPaymentStateMachine<B>
where B: OrderManagement + ReleaseManagement
{
    /// Moves the order along the fulfillment axis, if the current status allows it.
    pub async fn update_status(&self, order_id: &OrderId, to: OrderStatusType) -> Result<Order, OrderFlowError> {
        let update = match to {
            OrderStatusType::Delivered => {
                let at = Utc::now();
                FulfillmentUpdate::delivered(at, at + self.hold_period)
            },
            _ => FulfillmentUpdate::new(to),
        };
        self.apply_fulfillment_update(order_id, update).await
    }

    /// Marks the order as delivered at `at`. The delivery timestamp and the auto-release date (`at` plus the hold
    /// period) are set once and never moved.
    pub async fn mark_delivered(&self, order_id: &OrderId, at: DateTime<Utc>) -> Result<Order, OrderFlowError> {
        let update = FulfillmentUpdate::delivered(at, at + self.hold_period);
        let order = self.apply_fulfillment_update(order_id, update).await?;
        info!(
            "📦️ Order {order_id} delivered at {at}. Payment will be released automatically from {}",
            order.auto_release_date.map(|d| d.to_rfc3339()).unwrap_or_else(|| "(never)".into())
        );
        Ok(order)
    }

    async fn apply_fulfillment_update(
        &self,
        order_id: &OrderId,
        update: FulfillmentUpdate,
    ) -> Result<Order, OrderFlowError> {
        let to = update.to;
        let updated = self.db.update_fulfillment_status(order_id, update).await.map_err(OrderFlowError::database)?;
        if let Some(order) = updated {
            debug!("📦️ Order {order_id} is now {to}");
            return Ok(order);
        }
        let order = self
            .db
            .fetch_order(order_id)
            .await
            .map_err(OrderFlowError::database)?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        debug!("📦️ Order {order_id} cannot move from {} to {to}", order.status);
        Err(OrderFlowError::InvalidTransition { order_id: order_id.clone(), from: order.status, to })
    }

    /// Takes the release claim on the order. Returns `false` if somebody else holds it, or the order is no longer
    /// `paid`.
    pub async fn claim_release(&self, order_id: &OrderId, claim: &ReleaseClaim) -> Result<bool, ReleaseError> {
        self.db.try_claim_release(order_id, claim).await.map_err(ReleaseError::database)
    }

    /// Records the release of the order's payment, together with its commission, in one step.
    ///
    /// Fails with [`ReleaseError::AlreadyReleased`] if the order is no longer `paid` by the time the update runs.
    pub async fn mark_released(
        &self,
        order: &Order,
        method: PayoutMethod,
        reference: &str,
        trigger: ReleaseTrigger,
        at: DateTime<Utc>,
        claim_token: Option<&str>,
    ) -> Result<(Order, CommissionRecord), ReleaseError> {
        if !order.payment_status.can_transition_to(PaymentStatus::Released) {
            return Err(match order.payment_status {
                PaymentStatus::Released => ReleaseError::AlreadyReleased(order.order_id.clone()),
                from => ReleaseError::InvalidTransition {
                    order_id: order.order_id.clone(),
                    from,
                    to: PaymentStatus::Released,
                },
            });
        }
        let record = ReleaseRecord {
            claim_token: claim_token.map(String::from),
            method,
            reference: reference.to_string(),
            trigger,
            released_at: at,
            commission: NewCommission::for_order(order),
        };
        self.db
            .commit_release(&order.order_id, record)
            .await
            .map_err(ReleaseError::database)?
            .ok_or_else(|| ReleaseError::AlreadyReleased(order.order_id.clone()))
    }

    /// Records a failed release attempt. The order stays `paid`, so it can be released later.
    pub async fn mark_failed(
        &self,
        order_id: &OrderId,
        reason: &str,
        claim_token: Option<&str>,
    ) -> Result<(), ReleaseError> {
        self.db.record_release_failure(order_id, claim_token, reason).await.map_err(ReleaseError::database)
    }
}

#[cfg(test)]
mod test {
    use escrow_common::Money;
    use rust_decimal_macros::dec;

    use super::*;

    type Machine = OrderPaymentStateMachine<()>;

    fn delivered_order(auto_release_date: DateTime<Utc>) -> Order {
        let now = Utc::now();
        Order {
            id: 1,
            order_id: OrderId::from("o1"),
            buyer_id: "buyer".into(),
            seller_id: "seller".into(),
            amount: Money::from(200),
            commission_rate: dec!(0.05),
            commission_amount: Money::from(10),
            seller_amount: Money::from(190),
            status: OrderStatusType::Delivered,
            payment_status: PaymentStatus::Paid,
            created_at: now,
            updated_at: now,
            delivered_at: Some(auto_release_date - Duration::days(DEFAULT_HOLD_PERIOD_DAYS)),
            auto_release_date: Some(auto_release_date),
            transferred_at: None,
            transfer_reference: None,
            payment_method: None,
            release_trigger: None,
            release_attempts: 0,
            last_release_error: None,
        }
    }

    #[test]
    fn manual_release_only_needs_paid() {
        let now = Utc::now();
        let mut order = delivered_order(now + Duration::days(2));
        assert!(Machine::can_release(&order, ReleaseTrigger::Manual, now));
        order.status = OrderStatusType::Shipped;
        assert!(Machine::can_release(&order, ReleaseTrigger::Manual, now));
        order.payment_status = PaymentStatus::Refunded;
        assert!(matches!(
            Machine::check_release(&order, ReleaseTrigger::Manual, now),
            Err(ReleaseError::NotEligible(_))
        ));
    }

    #[test]
    fn automatic_release_boundary_is_inclusive() {
        let date = Utc::now();
        let order = delivered_order(date);
        assert!(!Machine::can_release(&order, ReleaseTrigger::Automatic, date - Duration::seconds(1)));
        assert!(Machine::can_release(&order, ReleaseTrigger::Automatic, date));
        assert!(Machine::can_release(&order, ReleaseTrigger::Automatic, date + Duration::seconds(1)));
    }

    #[test]
    fn automatic_release_needs_delivery() {
        let now = Utc::now();
        let mut order = delivered_order(now - Duration::days(1));
        order.status = OrderStatusType::UnderReview;
        assert!(!Machine::can_release(&order, ReleaseTrigger::Automatic, now));
        order.status = OrderStatusType::Delivered;
        order.auto_release_date = None;
        assert!(!Machine::can_release(&order, ReleaseTrigger::Automatic, now));
    }

    #[test]
    fn released_orders_report_already_released() {
        let now = Utc::now();
        let mut order = delivered_order(now - Duration::days(1));
        order.payment_status = PaymentStatus::Released;
        let err = Machine::check_release(&order, ReleaseTrigger::Automatic, now).unwrap_err();
        assert!(err.is_success_equivalent());
        let err = Machine::check_release(&order, ReleaseTrigger::Manual, now).unwrap_err();
        assert!(matches!(err, ReleaseError::AlreadyReleased(_)));
    }

    #[test]
    fn hold_period_is_configurable() {
        let machine = OrderPaymentStateMachine::new(()).with_hold_period(Duration::days(3));
        assert_eq!(machine.hold_period(), Duration::days(3));
        assert_eq!(OrderPaymentStateMachine::new(()).hold_period(), Duration::days(7));
    }
}
