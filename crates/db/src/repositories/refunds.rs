use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;

use tally_core::domain::refund::{RefundFilter, RefundId, RefundRequest, RefundStatus};
use tally_core::pagination::PageQuery;

use super::rows::{
    encode_money, encode_opt_ts, encode_ts, get, get_money, get_opt_ts, get_opt_user_id, get_ts,
    get_user_id, parse_enum, user_ids_json,
};
use super::{RefundRepository, RepositoryError};
use crate::DbPool;

const SELECT_REFUND: &str = "SELECT id, requested_by, customer_name, zelle_sender_name, server,
            category, reason, amount, refunded_amount, status, attachment_url, editable_until,
            processed_by, processed_at, fully_refunded_at, employee_confirmed_at, archived_at,
            created_at, updated_at, version
     FROM refund_request";

pub struct SqlRefundRepository {
    pool: DbPool,
}

impl SqlRefundRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_refund(row: &SqliteRow) -> Result<RefundRequest, RepositoryError> {
    let status: String = get(row, "status")?;

    Ok(RefundRequest {
        id: RefundId(get(row, "id")?),
        requested_by: get_user_id(row, "requested_by")?,
        customer_name: get(row, "customer_name")?,
        zelle_sender_name: get(row, "zelle_sender_name")?,
        server: get(row, "server")?,
        category: get(row, "category")?,
        reason: get(row, "reason")?,
        amount: get_money(row, "amount")?,
        refunded_amount: get_money(row, "refunded_amount")?,
        status: parse_enum("status", &status, RefundStatus::parse)?,
        attachment_url: get(row, "attachment_url")?,
        editable_until: get_ts(row, "editable_until")?,
        processed_by: get_opt_user_id(row, "processed_by")?,
        processed_at: get_opt_ts(row, "processed_at")?,
        fully_refunded_at: get_opt_ts(row, "fully_refunded_at")?,
        employee_confirmed_at: get_opt_ts(row, "employee_confirmed_at")?,
        archived_at: get_opt_ts(row, "archived_at")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
        version: get(row, "version")?,
    })
}

#[async_trait::async_trait]
impl RefundRepository for SqlRefundRepository {
    async fn find_by_id(&self, id: &RefundId) -> Result<Option<RefundRequest>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_REFUND} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_refund).transpose()
    }

    async fn insert(&self, refund: RefundRequest) -> Result<RefundRequest, RepositoryError> {
        sqlx::query(
            "INSERT INTO refund_request (
                id, requested_by, customer_name, zelle_sender_name, server, category, reason,
                amount, refunded_amount, status, attachment_url, editable_until, processed_by,
                processed_at, fully_refunded_at, employee_confirmed_at, archived_at,
                created_at, updated_at, version, search_text
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&refund.id.0)
        .bind(&refund.requested_by.0)
        .bind(&refund.customer_name)
        .bind(&refund.zelle_sender_name)
        .bind(&refund.server)
        .bind(&refund.category)
        .bind(&refund.reason)
        .bind(encode_money(refund.amount))
        .bind(encode_money(refund.refunded_amount))
        .bind(refund.status.as_str())
        .bind(&refund.attachment_url)
        .bind(encode_ts(refund.editable_until))
        .bind(refund.processed_by.as_ref().map(|id| id.0.clone()))
        .bind(encode_opt_ts(refund.processed_at))
        .bind(encode_opt_ts(refund.fully_refunded_at))
        .bind(encode_opt_ts(refund.employee_confirmed_at))
        .bind(encode_opt_ts(refund.archived_at))
        .bind(encode_ts(refund.created_at))
        .bind(encode_ts(refund.updated_at))
        .bind(refund.version)
        .bind(refund.search_text())
        .execute(&self.pool)
        .await?;

        Ok(refund)
    }

    async fn update(&self, refund: RefundRequest) -> Result<RefundRequest, RepositoryError> {
        let result = sqlx::query(
            "UPDATE refund_request
             SET customer_name = ?, zelle_sender_name = ?, server = ?, category = ?, reason = ?,
                 amount = ?, refunded_amount = ?, status = ?, attachment_url = ?,
                 processed_by = ?, processed_at = ?, fully_refunded_at = ?,
                 employee_confirmed_at = ?, archived_at = ?, updated_at = ?,
                 search_text = ?, version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(&refund.customer_name)
        .bind(&refund.zelle_sender_name)
        .bind(&refund.server)
        .bind(&refund.category)
        .bind(&refund.reason)
        .bind(encode_money(refund.amount))
        .bind(encode_money(refund.refunded_amount))
        .bind(refund.status.as_str())
        .bind(&refund.attachment_url)
        .bind(refund.processed_by.as_ref().map(|id| id.0.clone()))
        .bind(encode_opt_ts(refund.processed_at))
        .bind(encode_opt_ts(refund.fully_refunded_at))
        .bind(encode_opt_ts(refund.employee_confirmed_at))
        .bind(encode_opt_ts(refund.archived_at))
        .bind(encode_ts(refund.updated_at))
        .bind(refund.search_text())
        .bind(&refund.id.0)
        .bind(refund.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::StaleVersion { entity: "refund", id: refund.id.0 });
        }
        Ok(RefundRequest { version: refund.version + 1, ..refund })
    }

    async fn list_page(
        &self,
        filter: &RefundFilter,
        page: &PageQuery,
    ) -> Result<Vec<RefundRequest>, RepositoryError> {
        let status = filter.status.map(|status| status.as_str());
        let owners = user_ids_json(filter.requested_by.as_deref());
        let query = filter.search_needle();
        let amount = filter.amount.map(encode_money);
        let after_ts = page.after.as_ref().map(|cursor| encode_ts(cursor.timestamp));
        let after_id = page.after.as_ref().map(|cursor| cursor.id.clone());

        let rows = sqlx::query(&format!(
            "{SELECT_REFUND}
             WHERE (? IS NULL OR status = ?)
               AND (? IS NULL OR requested_by IN (SELECT value FROM json_each(?)))
               AND (? IS NULL OR instr(search_text, ?) > 0)
               AND (? IS NULL OR amount = ?)
               AND (? IS NULL OR created_at < ? OR (created_at = ? AND id < ?))
             ORDER BY created_at DESC, id DESC
             LIMIT ?"
        ))
        .bind(status)
        .bind(status)
        .bind(&owners)
        .bind(&owners)
        .bind(&query)
        .bind(&query)
        .bind(&amount)
        .bind(&amount)
        .bind(&after_ts)
        .bind(&after_ts)
        .bind(&after_ts)
        .bind(&after_id)
        .bind(i64::from(page.fetch_size()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_refund).collect()
    }

    async fn purge_archived_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RefundRequest>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(&format!(
            "{SELECT_REFUND} WHERE status = 'ARCHIVED' AND archived_at < ? ORDER BY archived_at"
        ))
        .bind(encode_ts(cutoff))
        .fetch_all(&mut *tx)
        .await?;
        let purged = rows.iter().map(row_to_refund).collect::<Result<Vec<_>, _>>()?;

        sqlx::query("DELETE FROM refund_request WHERE status = 'ARCHIVED' AND archived_at < ?")
            .bind(encode_ts(cutoff))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(purged)
    }
}
