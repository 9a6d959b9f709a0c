use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use futures_util::{stream, StreamExt};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db::traits::EscrowBackend,
    db_types::{
        CommissionRecord,
        Order,
        OrderId,
        OrderStatusType,
        PaymentStatus,
        PayoutMethod,
        ReleaseClaim,
        ReleaseTrigger,
    },
    escrow_api::errors::ReleaseError,
    events::{EventProducers, Notification, PaymentReleasedEvent, ReleaseFailedEvent},
    gateways::{PayoutRails, PayoutRequest},
    state_machine::OrderPaymentStateMachine,
};

pub const DEFAULT_MAX_CONCURRENT_RELEASES: usize = 4;
pub const DEFAULT_RELEASE_CLAIM_TIMEOUT_SECS: i64 = 900;

/// The outcome of a successful release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseResult {
    pub order: Order,
    pub method: PayoutMethod,
    pub reference: String,
    pub commission: CommissionRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub order_id: OrderId,
    pub reason: String,
}

/// What one pass of the auto-release sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepResult {
    /// Paid and delivered orders that were looked at
    pub candidates: usize,
    pub released: Vec<OrderId>,
    /// Released by somebody else in the meantime, being released by somebody else right now, or no longer eligible
    pub skipped: Vec<OrderId>,
    pub failed: Vec<SweepFailure>,
}

impl SweepResult {
    pub fn not_yet_due(&self) -> usize {
        self.candidates - self.released.len() - self.skipped.len() - self.failed.len()
    }
}

/// `PaymentReleaseApi` is the single entry point for paying a seller out. Admin requests and the auto-release sweep
/// both go through [`Self::release`], so there is exactly one implementation of the release sequence.
///
/// A release:
/// 1. loads the order and checks that it may be released for the given trigger,
/// 2. resolves the seller's payout channel,
/// 3. claims the order in the database, so that no other caller can start a transfer for it,
/// 4. sends the transfer through the matching payout rail,
/// 5. records the commission and marks the payment as released in one transaction,
/// 6. notifies buyer and seller.
///
/// The transfer happens before the bookkeeping is committed. If the process dies between steps 4 and 5 the order
/// still reads as `paid` while the money has left. The claim blocks any new attempt until it goes stale, and the
/// transfer reference is logged the moment it arrives so that the two can be reconciled.
pub struct PaymentReleaseApi<B> {
    state: OrderPaymentStateMachine<B>,
    rails: PayoutRails,
    producers: EventProducers,
    claim_timeout: Duration,
    max_concurrent_releases: usize,
}

impl<B> Debug for PaymentReleaseApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentReleaseApi ({:?})", self.rails)
    }
}

impl<B: Clone> Clone for PaymentReleaseApi<B> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            rails: self.rails.clone(),
            producers: self.producers.clone(),
            claim_timeout: self.claim_timeout,
            max_concurrent_releases: self.max_concurrent_releases,
        }
    }
}

impl<B> PaymentReleaseApi<B> {
    pub fn new(db: B, rails: PayoutRails, producers: EventProducers) -> Self {
        Self {
            state: OrderPaymentStateMachine::new(db),
            rails,
            producers,
            claim_timeout: Duration::seconds(DEFAULT_RELEASE_CLAIM_TIMEOUT_SECS),
            max_concurrent_releases: DEFAULT_MAX_CONCURRENT_RELEASES,
        }
    }

    /// A claim older than this is assumed to belong to a process that died mid-release, and may be taken over.
    pub fn with_claim_timeout(mut self, timeout: Duration) -> Self {
        self.claim_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_releases(mut self, max: usize) -> Self {
        self.max_concurrent_releases = max.max(1);
        self
    }

    pub fn with_hold_period(mut self, hold_period: Duration) -> Self {
        self.state = self.state.with_hold_period(hold_period);
        self
    }

    pub fn state_machine(&self) -> &OrderPaymentStateMachine<B> {
        &self.state
    }

    pub fn max_concurrent_releases(&self) -> usize {
        self.max_concurrent_releases
    }

    pub fn db(&self) -> &B {
        self.state.db()
    }
}

impl<B> PaymentReleaseApi<B>
where B: EscrowBackend
{
    pub async fn release(&self, order_id: &OrderId, trigger: ReleaseTrigger) -> Result<ReleaseResult, ReleaseError> {
        self.release_at(order_id, trigger, Utc::now()).await
    }

    /// Releases the payment for the order, as if the current time were `now`. `now` is only used for eligibility and
    /// as the transfer timestamp.
    pub async fn release_at(
        &self,
        order_id: &OrderId,
        trigger: ReleaseTrigger,
        now: DateTime<Utc>,
    ) -> Result<ReleaseResult, ReleaseError> {
        let result = self.try_release(order_id, trigger, now).await;
        match &result {
            Ok(r) => info!("💸 Order {order_id} released ({trigger}) via {} with reference {}", r.method, r.reference),
            Err(e @ (ReleaseError::AlreadyReleased(_) | ReleaseError::ReleaseInProgress(_))) => {
                warn!("💸 Release of order {order_id} ({trigger}) skipped. {e}")
            },
            Err(ReleaseError::NotEligible(reason)) => debug!("💸 Order {order_id} not released ({trigger}). {reason}"),
            Err(e) => error!("💸 Release of order {order_id} ({trigger}) failed. {e}"),
        }
        result
    }

    async fn try_release(
        &self,
        order_id: &OrderId,
        trigger: ReleaseTrigger,
        now: DateTime<Utc>,
    ) -> Result<ReleaseResult, ReleaseError> {
        let db = self.state.db();
        let order = db
            .fetch_order(order_id)
            .await
            .map_err(ReleaseError::database)?
            .ok_or_else(|| ReleaseError::OrderNotFound(order_id.clone()))?;
        OrderPaymentStateMachine::<B>::check_release(&order, trigger, now)?;

        let profile = db.fetch_payout_profile(&order.seller_id).await.map_err(ReleaseError::database)?;
        let Some(channel) = profile.and_then(|p| p.resolve_channel()) else {
            let err = ReleaseError::NoPayoutChannel(order.seller_id.clone());
            self.publish_failure(&order, trigger, &err);
            return Err(err);
        };
        trace!("💸 Order {order_id} will be paid out via {}", channel.method());

        let claim = ReleaseClaim::new(Utc::now(), self.claim_timeout);
        if !self.state.claim_release(order_id, &claim).await? {
            return Err(self.lost_claim(order_id).await);
        }

        let request = PayoutRequest::for_order(order_id, order.seller_amount);
        let receipt = match self.rails.transfer(&channel, &request).await {
            Ok(receipt) => receipt,
            Err(e) => {
                if let Some(recipient_id) = e.new_recipient_id() {
                    self.cache_recipient(&order.seller_id, recipient_id).await;
                }
                let err = ReleaseError::TransferFailed(e.to_string());
                if let Err(e) = self.state.mark_failed(order_id, &err.to_string(), Some(&claim.token)).await {
                    error!("💸 Could not record the failed release of order {order_id}. {e}");
                }
                self.publish_failure(&order, trigger, &err);
                return Err(err);
            },
        };
        info!(
            "💸 Transfer of {} for order {order_id} accepted by {}. Reference: {}",
            order.seller_amount, receipt.method, receipt.reference
        );
        if let Some(recipient_id) = &receipt.recipient_id {
            self.cache_recipient(&order.seller_id, recipient_id).await;
        }

        let committed = self
            .state
            .mark_released(&order, receipt.method, &receipt.reference, trigger, now, Some(&claim.token))
            .await;
        let (released, commission) = match committed {
            Ok(v) => v,
            Err(e) => {
                error!(
                    "💸 Order {order_id} was paid out with reference {} but the release could not be recorded. This \
                     needs to be reconciled by hand. {e}",
                    receipt.reference
                );
                return Err(e);
            },
        };

        self.producers.notify(Notification::payment_released_to_seller(&released));
        self.producers.notify(Notification::payment_received_by_seller(&released));
        self.producers.payment_released(PaymentReleasedEvent::new(released.clone(), commission.clone(), trigger));
        Ok(ReleaseResult { order: released, method: receipt.method, reference: receipt.reference, commission })
    }

    async fn cache_recipient(&self, seller_id: &str, recipient_id: &str) {
        match self.state.db().cache_gateway_recipient(seller_id, recipient_id).await {
            Ok(_) => debug!("💸 Cached payout recipient {recipient_id} for seller {seller_id}"),
            Err(e) => warn!("💸 Could not cache recipient {recipient_id} for seller {seller_id}. {e}"),
        }
    }

    /// Somebody else holds the order. Only report it as released once the payment really has been recorded.
    async fn lost_claim(&self, order_id: &OrderId) -> ReleaseError {
        match self.state.db().fetch_order(order_id).await {
            Ok(Some(order)) if order.is_released() => ReleaseError::AlreadyReleased(order_id.clone()),
            Ok(Some(_)) => ReleaseError::ReleaseInProgress(order_id.clone()),
            Ok(None) => ReleaseError::OrderNotFound(order_id.clone()),
            Err(e) => ReleaseError::database(e),
        }
    }

    fn publish_failure(&self, order: &Order, trigger: ReleaseTrigger, err: &ReleaseError) {
        self.producers.release_failed(ReleaseFailedEvent {
            order_id: order.order_id.clone(),
            seller_id: order.seller_id.clone(),
            trigger,
            reason: err.to_string(),
        });
    }

    pub async fn run_auto_release_sweep(&self) -> Result<SweepResult, ReleaseError> {
        self.run_auto_release_sweep_at(Utc::now()).await
    }

    /// Releases every delivered, paid order whose auto-release date is on or before `now`.
    ///
    /// At most [`Self::max_concurrent_releases`] releases run at once. A failure on one order is logged and recorded in
    /// the result, and never stops the rest of the sweep.
    pub async fn run_auto_release_sweep_at(&self, now: DateTime<Utc>) -> Result<SweepResult, ReleaseError> {
        let candidates = self
            .db()
            .fetch_orders_with_status(OrderStatusType::Delivered, PaymentStatus::Paid)
            .await
            .map_err(ReleaseError::database)?;
        let mut result = SweepResult { candidates: candidates.len(), ..Default::default() };
        let due = candidates
            .into_iter()
            .filter(|o| OrderPaymentStateMachine::<B>::can_release(o, ReleaseTrigger::Automatic, now))
            .map(|o| o.order_id)
            .collect::<Vec<_>>();
        info!("🕰️ Auto-release sweep: {} of {} delivered orders are due", due.len(), result.candidates);

        let outcomes = stream::iter(due)
            .map(|order_id| async move {
                let outcome = self.release_at(&order_id, ReleaseTrigger::Automatic, now).await;
                (order_id, outcome)
            })
            .buffer_unordered(self.max_concurrent_releases)
            .collect::<Vec<_>>()
            .await;
        for (order_id, outcome) in outcomes {
            match outcome {
                Ok(_) => result.released.push(order_id),
                Err(
                    ReleaseError::AlreadyReleased(_) | ReleaseError::ReleaseInProgress(_) | ReleaseError::NotEligible(_),
                ) => result.skipped.push(order_id),
                Err(e) => result.failed.push(SweepFailure { order_id, reason: e.to_string() }),
            }
        }
        info!(
            "🕰️ Auto-release sweep complete. {} released, {} skipped, {} failed",
            result.released.len(),
            result.skipped.len(),
            result.failed.len()
        );
        Ok(result)
    }
}
