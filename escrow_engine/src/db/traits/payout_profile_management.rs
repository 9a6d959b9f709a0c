use crate::{db::traits::EscrowDatabase, db_types::PayoutProfile};

#[allow(async_fn_in_trait)]
pub trait PayoutProfileManagement: EscrowDatabase {
    async fn fetch_payout_profile(&self, seller_id: &str) -> Result<Option<PayoutProfile>, Self::Error>;

    /// Creates or replaces the payout details for a seller. A cached gateway recipient id is discarded if the bank
    /// details changed, since it would point at the old account.
    async fn upsert_payout_profile(&self, profile: PayoutProfile) -> Result<PayoutProfile, Self::Error>;

    /// Write-through cache for the recipient token issued by the bank-transfer provider.
    async fn cache_gateway_recipient(&self, seller_id: &str, recipient_id: &str) -> Result<(), Self::Error>;
}
