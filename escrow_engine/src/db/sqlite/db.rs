use std::fmt::Debug;

use escrow_common::Money;
use log::*;
use sqlx::SqlitePool;

use super::{commissions, db_url, new_pool, orders, payout_profiles, SqliteDatabaseError};
use crate::{
    db::traits::{
        CommissionLedger,
        EscrowDatabase,
        FulfillmentUpdate,
        InsertOrderResult,
        OrderManagement,
        PayoutProfileManagement,
        ReleaseManagement,
    },
    db_types::{
        CommissionRecord,
        NewCommission,
        NewOrder,
        Order,
        OrderId,
        OrderStatusType,
        PaymentStatus,
        PayoutProfile,
        ReleaseClaim,
        ReleaseRecord,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl EscrowDatabase for SqliteDatabase {
    type Error = SqliteDatabaseError;

    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.pool.close().await;
        Ok(())
    }
}

impl OrderManagement for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::idempotent_insert(order, &mut conn).await
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_order_id(order_id, &mut conn).await
    }

    async fn fetch_orders_with_status(
        &self,
        status: OrderStatusType,
        payment_status: PaymentStatus,
    ) -> Result<Vec<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders_with_status(status, payment_status, &mut conn).await
    }

    async fn update_fulfillment_status(
        &self,
        order_id: &OrderId,
        update: FulfillmentUpdate,
    ) -> Result<Option<Order>, Self::Error> {
        let mut tx = self.pool.begin().await?;
        trace!("🗃️ Order {order_id} moving to {} if currently one of {:?}", update.to, update.from);
        let updated = orders::update_fulfillment_status(order_id, update, &mut tx).await?;
        let order = match updated {
            true => orders::fetch_order_by_order_id(order_id, &mut tx).await?,
            false => None,
        };
        tx.commit().await?;
        Ok(order)
    }
}

impl PayoutProfileManagement for SqliteDatabase {
    async fn fetch_payout_profile(&self, seller_id: &str) -> Result<Option<PayoutProfile>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        payout_profiles::fetch_payout_profile(seller_id, &mut conn).await
    }

    async fn upsert_payout_profile(&self, profile: PayoutProfile) -> Result<PayoutProfile, Self::Error> {
        let mut tx = self.pool.begin().await?;
        payout_profiles::upsert_payout_profile(&profile, &mut tx).await?;
        let saved = payout_profiles::fetch_payout_profile(&profile.seller_id, &mut tx)
            .await?
            .ok_or_else(|| SqliteDatabaseError::QueryError(format!("Profile for {} vanished", profile.seller_id)))?;
        tx.commit().await?;
        Ok(saved)
    }

    async fn cache_gateway_recipient(&self, seller_id: &str, recipient_id: &str) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        payout_profiles::cache_gateway_recipient(seller_id, recipient_id, &mut conn).await
    }
}

impl CommissionLedger for SqliteDatabase {
    async fn record_commission(&self, commission: NewCommission) -> Result<CommissionRecord, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        commissions::upsert_commission(&commission, &mut conn).await
    }

    async fn fetch_commission(&self, order_id: &OrderId) -> Result<Option<CommissionRecord>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        commissions::fetch_commission(order_id, &mut conn).await
    }

    async fn total_commission(&self) -> Result<Money, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        commissions::total_collected(&mut conn).await
    }
}

impl ReleaseManagement for SqliteDatabase {
    async fn try_claim_release(&self, order_id: &OrderId, claim: &ReleaseClaim) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let claimed = orders::try_claim_release(order_id, claim, &mut conn).await?;
        trace!("🗃️ Release claim on order {order_id}: {}", if claimed { "acquired" } else { "refused" });
        Ok(claimed)
    }

    /// Commission and release status are committed together, so an order is never `released` without its commission
    /// record, and a lost race writes nothing at all.
    async fn commit_release(
        &self,
        order_id: &OrderId,
        release: ReleaseRecord,
    ) -> Result<Option<(Order, CommissionRecord)>, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let commission = commissions::upsert_commission(&release.commission, &mut tx).await?;
        if !orders::mark_released(order_id, &release, &mut tx).await? {
            debug!("🗃️ Order {order_id} was not in a releasable state. Rolling back.");
            tx.rollback().await?;
            return Ok(None);
        }
        let order = orders::fetch_order_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| SqliteDatabaseError::OrderNotFound(order_id.to_string()))?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} released via {} ({})", release.method, release.reference);
        Ok(Some((order, commission)))
    }

    async fn record_release_failure(
        &self,
        order_id: &OrderId,
        claim_token: Option<&str>,
        reason: &str,
    ) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::record_release_failure(order_id, claim_token, reason, &mut conn).await
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `ESC_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date.
    pub async fn migrate(&self) -> Result<(), SqliteDatabaseError> {
        sqlx::migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
