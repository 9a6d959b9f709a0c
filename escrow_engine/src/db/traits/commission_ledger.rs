use escrow_common::Money;

use crate::{
    db::traits::EscrowDatabase,
    db_types::{CommissionRecord, NewCommission, OrderId},
};

/// Platform commission, recorded exactly once per order no matter how often a release is attempted.
#[allow(async_fn_in_trait)]
pub trait CommissionLedger: EscrowDatabase {
    /// Creates the commission record for the order, or marks an existing one as collected. This must be a single
    /// atomic upsert keyed on `order_id`, never read-then-write, because a manual release and the auto-release sweep
    /// may race on the same order.
    async fn record_commission(&self, commission: NewCommission) -> Result<CommissionRecord, Self::Error>;

    async fn fetch_commission(&self, order_id: &OrderId) -> Result<Option<CommissionRecord>, Self::Error>;

    /// The sum of all collected commission.
    async fn total_commission(&self) -> Result<Money, Self::Error>;
}
