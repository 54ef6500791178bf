use sqlx::sqlite::SqliteRow;

use tally_core::authz::Role;
use tally_core::domain::user::{UserAccount, UserId};

use super::rows::{encode_money, encode_ts, get, get_opt_money, get_ts, get_user_id};
use super::{RepositoryError, UserRepository};
use crate::DbPool;

const SELECT_ACTOR: &str = "SELECT id, display_name, role, active, rate_per_order, created_at, updated_at
     FROM actor";

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &SqliteRow) -> Result<UserAccount, RepositoryError> {
    let role: String = get(row, "role")?;
    let role = role.parse::<Role>().map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(UserAccount {
        id: get_user_id(row, "id")?,
        display_name: get(row, "display_name")?,
        role,
        active: get::<i64>(row, "active")? != 0,
        rate_per_order: get_opt_money(row, "rate_per_order")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserAccount>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_ACTOR} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn save(&self, user: UserAccount) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO actor (id, display_name, role, active, rate_per_order, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 role = excluded.role,
                 active = excluded.active,
                 rate_per_order = excluded.rate_per_order,
                 updated_at = excluded.updated_at",
        )
        .bind(&user.id.0)
        .bind(&user.display_name)
        .bind(user.role.as_str())
        .bind(i64::from(user.active))
        .bind(user.rate_per_order.map(encode_money))
        .bind(encode_ts(user.created_at))
        .bind(encode_ts(user.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, include_inactive: bool) -> Result<Vec<UserAccount>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_ACTOR} WHERE (? = 1 OR active = 1) ORDER BY display_name ASC, id ASC"
        ))
        .bind(i64::from(include_inactive))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect()
    }
}
