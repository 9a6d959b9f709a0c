use std::str::FromStr;

use chrono::{DateTime, Utc};
use escrow_common::Money;
use log::{debug, trace};
use rust_decimal::Decimal;
use sqlx::{FromRow, QueryBuilder, SqliteConnection};

use crate::{
    db::{
        sqlite::SqliteDatabaseError,
        traits::{FulfillmentUpdate, InsertOrderResult},
    },
    db_types::{
        NewOrder,
        Order,
        OrderId,
        OrderStatusType,
        PaymentStatus,
        PayoutMethod,
        ReleaseClaim,
        ReleaseRecord,
        ReleaseTrigger,
    },
};

const ORDER_COLUMNS: &str = "id, order_id, buyer_id, seller_id, amount, commission_rate, commission_amount, \
                             seller_amount, status, payment_status, created_at, updated_at, delivered_at, \
                             auto_release_date, transferred_at, transfer_reference, payment_method, release_trigger, \
                             release_attempts, last_release_error";

/// The raw `orders` row. Decimal amounts and enums are stored as text, and converted into an [`Order`] on the way out.
#[derive(Debug, Clone, FromRow)]
struct OrderRow {
    id: i64,
    order_id: String,
    buyer_id: String,
    seller_id: String,
    amount: String,
    commission_rate: String,
    commission_amount: String,
    seller_amount: String,
    status: String,
    payment_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
    auto_release_date: Option<DateTime<Utc>>,
    transferred_at: Option<DateTime<Utc>>,
    transfer_reference: Option<String>,
    payment_method: Option<String>,
    release_trigger: Option<String>,
    release_attempts: i64,
    last_release_error: Option<String>,
}

impl TryFrom<OrderRow> for Order {
    type Error = SqliteDatabaseError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let commission_rate = Decimal::from_str(&row.commission_rate)
            .map_err(|e| SqliteDatabaseError::ConversionError(format!("commission_rate {}: {e}", row.commission_rate)))?;
        Ok(Self {
            id: row.id,
            order_id: OrderId(row.order_id),
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            amount: Money::from_str(&row.amount)?,
            commission_rate,
            commission_amount: Money::from_str(&row.commission_amount)?,
            seller_amount: Money::from_str(&row.seller_amount)?,
            status: OrderStatusType::from_str(&row.status)?,
            payment_status: PaymentStatus::from_str(&row.payment_status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            delivered_at: row.delivered_at,
            auto_release_date: row.auto_release_date,
            transferred_at: row.transferred_at,
            transfer_reference: row.transfer_reference,
            payment_method: row.payment_method.as_deref().map(PayoutMethod::from_str).transpose()?,
            release_trigger: row.release_trigger.as_deref().map(ReleaseTrigger::from_str).transpose()?,
            release_attempts: row.release_attempts,
            last_release_error: row.last_release_error,
        })
    }
}

/// Inserts the order unless one with the same `order_id` already exists. The check and the insert are one statement,
/// so concurrent checkouts of the same order cannot create duplicates.
pub async fn idempotent_insert(
    order: NewOrder,
    conn: &mut SqliteConnection,
) -> Result<InsertOrderResult, SqliteDatabaseError> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
            INSERT INTO orders (
                order_id,
                buyer_id,
                seller_id,
                amount,
                commission_rate,
                commission_amount,
                seller_amount,
                status,
                payment_status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_id) DO NOTHING;
        "#,
    )
    .bind(order.order_id.as_str())
    .bind(&order.buyer_id)
    .bind(&order.seller_id)
    .bind(order.amount.value().to_string())
    .bind(order.commission_rate().to_string())
    .bind(order.commission_amount().value().to_string())
    .bind(order.seller_amount().value().to_string())
    .bind(OrderStatusType::Pending.as_str())
    .bind(PaymentStatus::Paid.as_str())
    .bind(order.created_at)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    let inserted = result.rows_affected() == 1;
    let stored = fetch_order_by_order_id(&order.order_id, conn)
        .await?
        .ok_or_else(|| SqliteDatabaseError::OrderNotFound(order.order_id.to_string()))?;
    if inserted {
        debug!("🗃️ Order {} has been saved in the DB with id {}", stored.order_id, stored.id);
        Ok(InsertOrderResult::Inserted(stored))
    } else {
        debug!("🗃️ Order {} already exists", stored.order_id);
        Ok(InsertOrderResult::AlreadyExists(stored))
    }
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1");
    let row = sqlx::query_as::<_, OrderRow>(&sql).bind(order_id.as_str()).fetch_optional(conn).await?;
    row.map(Order::try_from).transpose()
}

/// Fetches orders with the given fulfillment and payment status, ordered by `created_at` ascending.
pub async fn fetch_orders_with_status(
    status: OrderStatusType,
    payment_status: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, SqliteDatabaseError> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 AND payment_status = $2 ORDER BY created_at ASC"
    );
    let rows = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(status.as_str())
        .bind(payment_status.as_str())
        .fetch_all(conn)
        .await?;
    trace!("🗃️ {} orders are {status} with payment {payment_status}", rows.len());
    rows.into_iter().map(Order::try_from).collect()
}

/// Applies a conditional fulfillment update. Returns `true` if the order was updated.
///
/// `delivered_at` and `auto_release_date` are set at most once; an existing value is never overwritten.
pub(crate) async fn update_fulfillment_status(
    order_id: &OrderId,
    update: FulfillmentUpdate,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    if update.from.is_empty() {
        debug!("🗃️ No status can transition to {}. Update for order {order_id} skipped.", update.to);
        return Ok(false);
    }
    let mut builder = QueryBuilder::new("UPDATE orders SET status = ");
    builder.push_bind(update.to.as_str());
    builder.push(", updated_at = ");
    builder.push_bind(Utc::now());
    builder.push(", delivered_at = COALESCE(delivered_at, ");
    builder.push_bind(update.delivered_at);
    builder.push("), auto_release_date = COALESCE(auto_release_date, ");
    builder.push_bind(update.auto_release_date);
    builder.push(") WHERE order_id = ");
    builder.push_bind(order_id.as_str());
    builder.push(" AND status IN (");
    let mut statuses = builder.separated(", ");
    for status in &update.from {
        statuses.push_bind(status.as_str());
    }
    statuses.push_unseparated(")");
    trace!("🗃️ Executing query: {}", builder.sql());
    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected() == 1)
}

/// Takes the release claim for the order if it is still `paid` and unclaimed (or the previous claim has gone stale).
pub(crate) async fn try_claim_release(
    order_id: &OrderId,
    claim: &ReleaseClaim,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            UPDATE orders SET
                release_claim = $1,
                release_claimed_at = $2,
                updated_at = $3
            WHERE order_id = $4
              AND payment_status = 'paid'
              AND (release_claim IS NULL OR release_claimed_at IS NULL OR release_claimed_at < $5);
        "#,
    )
    .bind(&claim.token)
    .bind(claim.claimed_at.timestamp())
    .bind(Utc::now())
    .bind(order_id.as_str())
    .bind(claim.stale_before().timestamp())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Moves a `paid` order to `released`. Returns `false` if no row matched.
pub(crate) async fn mark_released(
    order_id: &OrderId,
    release: &ReleaseRecord,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let mut builder = QueryBuilder::new("UPDATE orders SET payment_status = ");
    builder.push_bind(PaymentStatus::Released.as_str());
    builder.push(", payment_method = ");
    builder.push_bind(release.method.as_str());
    builder.push(", transfer_reference = ");
    builder.push_bind(release.reference.as_str());
    builder.push(", transferred_at = ");
    builder.push_bind(release.released_at);
    builder.push(", release_trigger = ");
    builder.push_bind(release.trigger.as_str());
    builder.push(", release_claim = NULL, release_claimed_at = NULL, last_release_error = NULL, updated_at = ");
    builder.push_bind(Utc::now());
    builder.push(" WHERE order_id = ");
    builder.push_bind(order_id.as_str());
    builder.push(" AND payment_status = ");
    builder.push_bind(PaymentStatus::Paid.as_str());
    if let Some(token) = &release.claim_token {
        builder.push(" AND release_claim = ");
        builder.push_bind(token.as_str());
    }
    trace!("🗃️ Executing query: {}", builder.sql());
    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected() == 1)
}

pub(crate) async fn record_release_failure(
    order_id: &OrderId,
    claim_token: Option<&str>,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    // SET expressions see the row as it was before the update, so both CASEs test the old claim.
    let result = sqlx::query(
        r#"
            UPDATE orders SET
                release_attempts = release_attempts + 1,
                last_release_error = ?,
                updated_at = ?,
                release_claim = CASE WHEN release_claim = ? THEN NULL ELSE release_claim END,
                release_claimed_at = CASE WHEN release_claim = ? THEN NULL ELSE release_claimed_at END
            WHERE order_id = ? AND payment_status = 'paid';
        "#,
    )
    .bind(reason)
    .bind(Utc::now())
    .bind(claim_token)
    .bind(claim_token)
    .bind(order_id.as_str())
    .execute(conn)
    .await?;
    trace!("🗃️ Release failure recorded for order {order_id}. {} rows updated", result.rows_affected());
    Ok(())
}
