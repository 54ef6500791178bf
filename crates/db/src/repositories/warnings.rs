use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use tally_core::authz::Role;
use tally_core::domain::user::UserId;
use tally_core::domain::warning::{Deduction, DeductionId, Warning, WarningId, WarningTab};
use tally_core::pagination::PageQuery;

use super::rows::{
    encode_money, encode_opt_ts, encode_ts, get, get_money, get_opt_money, get_opt_ts, get_ts,
    get_user_id, user_ids_json,
};
use super::{RepositoryError, WarningRepository};
use crate::DbPool;

const SELECT_WARNING: &str = "SELECT id, user_id, reason, note, source_role, source_user_id,
            deduction_amount, is_read, read_at, archived_at, created_at
     FROM warning";

pub struct SqlWarningRepository {
    pool: DbPool,
}

impl SqlWarningRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn role_column(row: &SqliteRow, column: &str) -> Result<Role, RepositoryError> {
    let raw: String = get(row, column)?;
    raw.parse::<Role>().map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

fn row_to_warning(row: &SqliteRow) -> Result<Warning, RepositoryError> {
    Ok(Warning {
        id: WarningId(get(row, "id")?),
        user_id: get_user_id(row, "user_id")?,
        reason: get(row, "reason")?,
        note: get(row, "note")?,
        source_role: role_column(row, "source_role")?,
        source_user_id: get_user_id(row, "source_user_id")?,
        deduction_amount: get_opt_money(row, "deduction_amount")?,
        is_read: get::<i64>(row, "is_read")? != 0,
        read_at: get_opt_ts(row, "read_at")?,
        archived_at: get_opt_ts(row, "archived_at")?,
        created_at: get_ts(row, "created_at")?,
    })
}

fn row_to_deduction(row: &SqliteRow) -> Result<Deduction, RepositoryError> {
    Ok(Deduction {
        id: DeductionId(get(row, "id")?),
        user_id: get_user_id(row, "user_id")?,
        amount: get_money(row, "amount")?,
        reason: get(row, "reason")?,
        source_role: role_column(row, "source_role")?,
        source_user_id: get_user_id(row, "source_user_id")?,
        warning_id: get::<Option<String>>(row, "warning_id")?.map(WarningId),
        created_at: get_ts(row, "created_at")?,
    })
}

async fn insert_deduction_row(
    conn: &mut SqliteConnection,
    deduction: &Deduction,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO deduction (
            id, user_id, amount, reason, source_role, source_user_id, warning_id, created_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&deduction.id.0)
    .bind(&deduction.user_id.0)
    .bind(encode_money(deduction.amount))
    .bind(&deduction.reason)
    .bind(deduction.source_role.as_str())
    .bind(&deduction.source_user_id.0)
    .bind(deduction.warning_id.as_ref().map(|id| id.0.clone()))
    .bind(encode_ts(deduction.created_at))
    .execute(conn)
    .await?;

    Ok(())
}

#[async_trait::async_trait]
impl WarningRepository for SqlWarningRepository {
    async fn insert(
        &self,
        warning: Warning,
        deduction: Option<Deduction>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO warning (
                id, user_id, reason, note, source_role, source_user_id, deduction_amount,
                is_read, read_at, archived_at, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&warning.id.0)
        .bind(&warning.user_id.0)
        .bind(&warning.reason)
        .bind(&warning.note)
        .bind(warning.source_role.as_str())
        .bind(&warning.source_user_id.0)
        .bind(warning.deduction_amount.map(encode_money))
        .bind(i64::from(warning.is_read))
        .bind(encode_opt_ts(warning.read_at))
        .bind(encode_opt_ts(warning.archived_at))
        .bind(encode_ts(warning.created_at))
        .execute(&mut *tx)
        .await?;

        if let Some(deduction) = &deduction {
            insert_deduction_row(&mut tx, deduction).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_deduction(&self, deduction: Deduction) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        insert_deduction_row(&mut conn, &deduction).await
    }

    async fn find_by_id(&self, id: &WarningId) -> Result<Option<Warning>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_WARNING} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_warning).transpose()
    }

    async fn update(&self, warning: &Warning) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE warning
             SET is_read = MAX(is_read, ?),
                 read_at = COALESCE(read_at, ?),
                 archived_at = COALESCE(archived_at, ?)
             WHERE id = ?",
        )
        .bind(i64::from(warning.is_read))
        .bind(encode_opt_ts(warning.read_at))
        .bind(encode_opt_ts(warning.archived_at))
        .bind(&warning.id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn archive_stale(
        &self,
        user_id: &UserId,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE warning SET archived_at = ?
             WHERE user_id = ? AND archived_at IS NULL AND created_at <= ?",
        )
        .bind(encode_ts(now))
        .bind(&user_id.0)
        .bind(encode_ts(cutoff))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_page(
        &self,
        user_id: &UserId,
        tab: WarningTab,
        cutoff: DateTime<Utc>,
        page: &PageQuery,
    ) -> Result<Vec<Warning>, RepositoryError> {
        let tab_clause = match tab {
            WarningTab::Recent => "archived_at IS NULL AND created_at > ?",
            WarningTab::Archive => "(archived_at IS NOT NULL OR created_at <= ?)",
        };
        let after_ts = page.after.as_ref().map(|cursor| encode_ts(cursor.timestamp));
        let after_id = page.after.as_ref().map(|cursor| cursor.id.clone());

        let rows = sqlx::query(&format!(
            "{SELECT_WARNING}
             WHERE user_id = ? AND {tab_clause}
               AND (? IS NULL OR created_at < ? OR (created_at = ? AND id < ?))
             ORDER BY created_at DESC, id DESC
             LIMIT ?"
        ))
        .bind(&user_id.0)
        .bind(encode_ts(cutoff))
        .bind(&after_ts)
        .bind(&after_ts)
        .bind(&after_ts)
        .bind(&after_id)
        .bind(i64::from(page.fetch_size()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_warning).collect()
    }

    async fn unread_recent_count(
        &self,
        user_id: &UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM warning
             WHERE user_id = ? AND is_read = 0 AND archived_at IS NULL AND created_at > ?",
        )
        .bind(&user_id.0)
        .bind(encode_ts(cutoff))
        .fetch_one(&self.pool)
        .await?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn deductions_between(
        &self,
        user_ids: Option<&[UserId]>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Deduction>, RepositoryError> {
        let users = user_ids_json(user_ids);
        let rows = sqlx::query(
            "SELECT id, user_id, amount, reason, source_role, source_user_id, warning_id, created_at
             FROM deduction
             WHERE created_at >= ? AND created_at < ?
               AND (? IS NULL OR user_id IN (SELECT value FROM json_each(?)))
             ORDER BY created_at ASC, id ASC",
        )
        .bind(encode_ts(start))
        .bind(encode_ts(end))
        .bind(&users)
        .bind(&users)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_deduction).collect()
    }
}
