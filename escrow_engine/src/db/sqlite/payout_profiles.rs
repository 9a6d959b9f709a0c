use chrono::Utc;
use log::debug;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{BankAccount, PayoutProfile},
};

#[derive(Debug, Clone, FromRow)]
struct PayoutProfileRow {
    seller_id: String,
    bank_account_name: Option<String>,
    bank_account_number: Option<String>,
    bank_code: Option<String>,
    mobile_money_a: Option<String>,
    mobile_money_b: Option<String>,
    other_instructions: Option<String>,
    gateway_recipient_id: Option<String>,
}

impl From<PayoutProfileRow> for PayoutProfile {
    fn from(row: PayoutProfileRow) -> Self {
        let bank = match (row.bank_account_number, row.bank_code) {
            (Some(account_number), Some(bank_code)) => Some(BankAccount {
                account_name: row.bank_account_name.unwrap_or_default(),
                account_number,
                bank_code,
            }),
            _ => None,
        };
        Self {
            seller_id: row.seller_id,
            bank,
            mobile_money_a: row.mobile_money_a,
            mobile_money_b: row.mobile_money_b,
            other_instructions: row.other_instructions,
            gateway_recipient_id: row.gateway_recipient_id,
        }
    }
}

pub async fn fetch_payout_profile(
    seller_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PayoutProfile>, SqliteDatabaseError> {
    let row = sqlx::query_as::<_, PayoutProfileRow>(
        r#"
            SELECT
                seller_id,
                bank_account_name,
                bank_account_number,
                bank_code,
                mobile_money_a,
                mobile_money_b,
                other_instructions,
                gateway_recipient_id
            FROM payout_profiles
            WHERE seller_id = $1
        "#,
    )
    .bind(seller_id)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(PayoutProfile::from))
}

/// Inserts or replaces a seller's payout details. The cached gateway recipient survives only if the bank account is
/// unchanged.
pub async fn upsert_payout_profile(
    profile: &PayoutProfile,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let now = Utc::now();
    let bank = profile.bank.as_ref();
    let _ = sqlx::query(
        r#"
            INSERT INTO payout_profiles (
                seller_id,
                bank_account_name,
                bank_account_number,
                bank_code,
                mobile_money_a,
                mobile_money_b,
                other_instructions,
                gateway_recipient_id,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (seller_id) DO UPDATE SET
                bank_account_name = excluded.bank_account_name,
                bank_account_number = excluded.bank_account_number,
                bank_code = excluded.bank_code,
                mobile_money_a = excluded.mobile_money_a,
                mobile_money_b = excluded.mobile_money_b,
                other_instructions = excluded.other_instructions,
                gateway_recipient_id = CASE
                    WHEN payout_profiles.bank_account_number IS excluded.bank_account_number
                     AND payout_profiles.bank_code IS excluded.bank_code
                    THEN COALESCE(excluded.gateway_recipient_id, payout_profiles.gateway_recipient_id)
                    ELSE excluded.gateway_recipient_id
                END,
                updated_at = excluded.updated_at;
        "#,
    )
    .bind(&profile.seller_id)
    .bind(bank.map(|b| b.account_name.as_str()))
    .bind(bank.map(|b| b.account_number.as_str()))
    .bind(bank.map(|b| b.bank_code.as_str()))
    .bind(profile.mobile_money_a.as_deref())
    .bind(profile.mobile_money_b.as_deref())
    .bind(profile.other_instructions.as_deref())
    .bind(profile.gateway_recipient_id.as_deref())
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;
    debug!("🗃️ Payout profile for seller {} saved", profile.seller_id);
    Ok(())
}

pub async fn cache_gateway_recipient(
    seller_id: &str,
    recipient_id: &str,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query("UPDATE payout_profiles SET gateway_recipient_id = $1, updated_at = $2 WHERE seller_id = $3")
        .bind(recipient_id)
        .bind(Utc::now())
        .bind(seller_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(SqliteDatabaseError::QueryError(format!("No payout profile exists for seller {seller_id}")));
    }
    debug!("🗃️ Gateway recipient cached for seller {seller_id}");
    Ok(())
}
