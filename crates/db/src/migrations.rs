use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use super::run_pending;
    use crate::{connect_with_settings, migrations::MIGRATOR, DbPool};

    const MANAGED_TABLES: &[&str] = &[
        "actor",
        "team_assignment",
        "order_submission",
        "refund_request",
        "coupon",
        "coupon_clear_history",
        "warning",
        "deduction",
    ];

    async fn table_names(pool: &DbPool) -> Vec<String> {
        sqlx::query_scalar::<_, String>(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE '_sqlx%' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .expect("list tables")
    }

    #[tokio::test]
    async fn migrations_create_every_ledger_table() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let tables = table_names(&pool).await;
        for table in MANAGED_TABLES {
            assert!(tables.iter().any(|name| name == table), "missing table {table}");
        }
    }

    #[tokio::test]
    async fn order_day_uniqueness_is_enforced_by_schema() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO actor (id, display_name, role, active, created_at, updated_at)
             VALUES ('emp-1', 'Eli', 'EMPLOYEE', 1, '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z')",
        )
        .execute(&pool)
        .await
        .expect("actor");

        let insert = "INSERT INTO order_submission
            (id, user_id, date_key, submitted_count, status, created_at, updated_at)
            VALUES (?, 'emp-1', '2024-01-15', 10, 'PENDING', '2024-01-15T09:00:00.000000Z', '2024-01-15T09:00:00.000000Z')";
        sqlx::query(insert).bind("ord-1").execute(&pool).await.expect("first row");
        let duplicate = sqlx::query(insert).bind("ord-2").execute(&pool).await;

        assert!(duplicate.is_err(), "second row for the same day must be rejected");
    }

    #[tokio::test]
    async fn migrations_up_down_up_is_clean() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("first up");
        let before = table_names(&pool).await;

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");
        assert!(table_names(&pool).await.is_empty(), "undo should drop every managed table");

        run_pending(&pool).await.expect("second up");
        assert_eq!(table_names(&pool).await, before);
    }
}
