use std::str::FromStr;

use chrono::{DateTime, Utc};
use escrow_common::Money;
use log::trace;
use rust_decimal::Decimal;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{CommissionRecord, CommissionStatus, NewCommission, OrderId},
};

#[derive(Debug, Clone, FromRow)]
struct CommissionRow {
    order_id: String,
    amount: String,
    rate: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CommissionRow> for CommissionRecord {
    type Error = SqliteDatabaseError;

    fn try_from(row: CommissionRow) -> Result<Self, Self::Error> {
        let rate = Decimal::from_str(&row.rate)
            .map_err(|e| SqliteDatabaseError::ConversionError(format!("commission rate {}: {e}", row.rate)))?;
        Ok(Self {
            order_id: OrderId(row.order_id),
            amount: Money::from_str(&row.amount)?,
            rate,
            status: CommissionStatus::from_str(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A single-statement upsert keyed on `order_id`. The amount and rate of an existing record are never changed; only
/// its status is (re)set to `collected`.
pub async fn upsert_commission(
    commission: &NewCommission,
    conn: &mut SqliteConnection,
) -> Result<CommissionRecord, SqliteDatabaseError> {
    let now = Utc::now();
    let row = sqlx::query_as::<_, CommissionRow>(
        r#"
            INSERT INTO commissions (order_id, amount, rate, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (order_id) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at
            RETURNING order_id, amount, rate, status, created_at, updated_at;
        "#,
    )
    .bind(commission.order_id.as_str())
    .bind(commission.amount.value().to_string())
    .bind(commission.rate.to_string())
    .bind(CommissionStatus::Collected.as_str())
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Commission for order {} recorded", commission.order_id);
    CommissionRecord::try_from(row)
}

pub async fn fetch_commission(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<CommissionRecord>, SqliteDatabaseError> {
    let row = sqlx::query_as::<_, CommissionRow>(
        "SELECT order_id, amount, rate, status, created_at, updated_at FROM commissions WHERE order_id = $1",
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    row.map(CommissionRecord::try_from).transpose()
}

pub async fn total_collected(conn: &mut SqliteConnection) -> Result<Money, SqliteDatabaseError> {
    let amounts: Vec<String> = sqlx::query_scalar("SELECT amount FROM commissions WHERE status = $1")
        .bind(CommissionStatus::Collected.as_str())
        .fetch_all(conn)
        .await?;
    let mut total = Money::default();
    for amount in amounts {
        total += Money::from_str(&amount)?;
    }
    Ok(total)
}
