use crate::{
    db::traits::EscrowDatabase,
    db_types::{CommissionRecord, Order, OrderId, ReleaseClaim, ReleaseRecord},
};

#[allow(async_fn_in_trait)]
pub trait ReleaseManagement: EscrowDatabase {
    /// Atomically claims the right to pay out the order. The claim succeeds only if the order is still `paid` and no
    /// other fresh claim is held. Returns `false` if the claim could not be taken.
    async fn try_claim_release(&self, order_id: &OrderId, claim: &ReleaseClaim) -> Result<bool, Self::Error>;

    /// In a single transaction, upserts the commission record and moves the order to `released`, conditional on the
    /// order still being `paid` (and the claim in `release.claim_token`, if any, still being held).
    ///
    /// Returns `None` if the conditional update matched no rows, i.e. the order had already been released. Nothing is
    /// written in that case.
    async fn commit_release(
        &self,
        order_id: &OrderId,
        release: ReleaseRecord,
    ) -> Result<Option<(Order, CommissionRecord)>, Self::Error>;

    /// Records a failed release attempt. The payment status is left as `paid` so the release can be retried, and the
    /// claim (if `claim_token` is supplied and still held) is dropped.
    async fn record_release_failure(
        &self,
        order_id: &OrderId,
        claim_token: Option<&str>,
        reason: &str,
    ) -> Result<(), Self::Error>;
}
