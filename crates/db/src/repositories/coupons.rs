use sqlx::sqlite::SqliteRow;
use sqlx::{Sqlite, Transaction};

use tally_core::domain::coupon::{Coupon, CouponClearRecord, CouponCode, CouponStatus};
use tally_core::pagination::PageQuery;

use super::rows::{
    encode_money, encode_opt_ts, encode_ts, get, get_money, get_opt_ts, get_opt_user_id, get_ts,
    get_user_id, is_unique_violation, parse_enum,
};
use super::{CouponRepository, RepositoryError};
use crate::DbPool;

const SELECT_COUPON: &str = "SELECT code, customer_name, server, category, reason, zelle_name,
            amount, remaining_balance, issued_by, issued_at, expires_at, status, used_by,
            used_by_name, used_at, updated_at, version
     FROM coupon";

pub struct SqlCouponRepository {
    pool: DbPool,
}

impl SqlCouponRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_coupon(row: &SqliteRow) -> Result<Coupon, RepositoryError> {
    let status: String = get(row, "status")?;

    Ok(Coupon {
        code: CouponCode(get(row, "code")?),
        customer_name: get(row, "customer_name")?,
        server: get(row, "server")?,
        category: get(row, "category")?,
        reason: get(row, "reason")?,
        zelle_name: get(row, "zelle_name")?,
        amount: get_money(row, "amount")?,
        remaining_balance: get_money(row, "remaining_balance")?,
        issued_by: get_user_id(row, "issued_by")?,
        issued_at: get_ts(row, "issued_at")?,
        expires_at: get_ts(row, "expires_at")?,
        status: parse_enum("status", &status, CouponStatus::parse)?,
        used_by: get_opt_user_id(row, "used_by")?,
        used_by_name: get(row, "used_by_name")?,
        used_at: get_opt_ts(row, "used_at")?,
        updated_at: get_ts(row, "updated_at")?,
        version: get(row, "version")?,
    })
}

fn row_to_clear(row: &SqliteRow) -> Result<CouponClearRecord, RepositoryError> {
    Ok(CouponClearRecord {
        id: get(row, "id")?,
        coupon_code: CouponCode(get(row, "coupon_code")?),
        cleared_at: get_ts(row, "cleared_at")?,
        cleared_by: get_user_id(row, "cleared_by")?,
        cleared_by_name: get(row, "cleared_by_name")?,
        cleared_amount: get_money(row, "cleared_amount")?,
    })
}

async fn update_coupon(
    tx: &mut Transaction<'_, Sqlite>,
    coupon: &Coupon,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE coupon
         SET remaining_balance = ?, status = ?, used_by = ?, used_by_name = ?, used_at = ?,
             updated_at = ?, version = version + 1
         WHERE code = ? AND version = ?",
    )
    .bind(encode_money(coupon.remaining_balance))
    .bind(coupon.status.as_str())
    .bind(coupon.used_by.as_ref().map(|id| id.0.clone()))
    .bind(&coupon.used_by_name)
    .bind(encode_opt_ts(coupon.used_at))
    .bind(encode_ts(coupon.updated_at))
    .bind(&coupon.code.0)
    .bind(coupon.version)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::StaleVersion { entity: "coupon", id: coupon.code.0.clone() });
    }
    Ok(())
}

#[async_trait::async_trait]
impl CouponRepository for SqlCouponRepository {
    async fn code_exists(&self, code: &CouponCode) -> Result<bool, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM coupon WHERE code = ?")
            .bind(&code.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COUPON} WHERE code = ?"))
            .bind(&code.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_coupon).transpose()
    }

    async fn insert(&self, coupon: Coupon) -> Result<Coupon, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO coupon (
                code, customer_name, server, category, reason, zelle_name, amount,
                remaining_balance, issued_by, issued_at, expires_at, status, used_by,
                used_by_name, used_at, updated_at, version
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&coupon.code.0)
        .bind(&coupon.customer_name)
        .bind(&coupon.server)
        .bind(&coupon.category)
        .bind(&coupon.reason)
        .bind(&coupon.zelle_name)
        .bind(encode_money(coupon.amount))
        .bind(encode_money(coupon.remaining_balance))
        .bind(&coupon.issued_by.0)
        .bind(encode_ts(coupon.issued_at))
        .bind(encode_ts(coupon.expires_at))
        .bind(coupon.status.as_str())
        .bind(coupon.used_by.as_ref().map(|id| id.0.clone()))
        .bind(&coupon.used_by_name)
        .bind(encode_opt_ts(coupon.used_at))
        .bind(encode_ts(coupon.updated_at))
        .bind(coupon.version)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(coupon),
            Err(error) if is_unique_violation(&error) => {
                Err(RepositoryError::Duplicate(format!("coupon code {}", coupon.code)))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn update(&self, coupon: Coupon) -> Result<Coupon, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        update_coupon(&mut tx, &coupon).await?;
        tx.commit().await?;

        Ok(Coupon { version: coupon.version + 1, ..coupon })
    }

    async fn record_clear(
        &self,
        coupon: Coupon,
        record: CouponClearRecord,
    ) -> Result<Coupon, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        update_coupon(&mut tx, &coupon).await?;

        sqlx::query(
            "INSERT INTO coupon_clear_history (
                id, coupon_code, cleared_at, cleared_by, cleared_by_name, cleared_amount
             ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.coupon_code.0)
        .bind(encode_ts(record.cleared_at))
        .bind(&record.cleared_by.0)
        .bind(&record.cleared_by_name)
        .bind(encode_money(record.cleared_amount))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Coupon { version: coupon.version + 1, ..coupon })
    }

    async fn history_page(
        &self,
        code: Option<&CouponCode>,
        page: &PageQuery,
    ) -> Result<Vec<CouponClearRecord>, RepositoryError> {
        let code = code.map(|code| code.0.clone());
        let after_ts = page.after.as_ref().map(|cursor| encode_ts(cursor.timestamp));
        let after_id = page.after.as_ref().map(|cursor| cursor.id.clone());

        let rows = sqlx::query(
            "SELECT id, coupon_code, cleared_at, cleared_by, cleared_by_name, cleared_amount
             FROM coupon_clear_history
             WHERE (? IS NULL OR coupon_code = ?)
               AND (? IS NULL OR cleared_at < ? OR (cleared_at = ? AND id < ?))
             ORDER BY cleared_at DESC, id DESC
             LIMIT ?",
        )
        .bind(&code)
        .bind(&code)
        .bind(&after_ts)
        .bind(&after_ts)
        .bind(&after_ts)
        .bind(&after_id)
        .bind(i64::from(page.fetch_size()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_clear).collect()
    }
}
