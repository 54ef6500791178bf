use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Rows the demo dataset guarantees, keyed by table.
const SEED_ACTOR_IDS: &[&str] = &[
    "usr-demo-admin",
    "usr-demo-manager",
    "usr-demo-floater",
    "usr-demo-eli",
    "usr-demo-jo",
    "usr-demo-kit",
];
const SEED_ORDER_IDS: &[&str] = &["ord-demo-001", "ord-demo-002", "ord-demo-003"];
const SEED_REFUND_IDS: &[&str] = &["rf-demo-001"];
const SEED_COUPON_CODES: &[&str] = &["CPN-20240115-DEMO23"];
const SEED_DEDUCTION_IDS: &[&str] = &["ded-demo-001"];
const SEED_MANAGER_ID: &str = "usr-demo-manager";

/// Demo portal dataset: one admin, a scoped and an unscoped manager, three
/// employees, a month of orders, one partially settled refund and one active
/// coupon.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(Self::SQL).execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(SeedResult {
            actors: SEED_ACTOR_IDS.len(),
            orders: SEED_ORDER_IDS.len(),
            refunds: SEED_REFUND_IDS.len(),
            coupons: SEED_COUPON_CODES.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        checks.push(("actors", count_ids(pool, "actor", "id", SEED_ACTOR_IDS).await?));
        checks.push(("orders", count_ids(pool, "order_submission", "id", SEED_ORDER_IDS).await?));
        checks.push(("refunds", count_ids(pool, "refund_request", "id", SEED_REFUND_IDS).await?));
        checks.push(("coupons", count_ids(pool, "coupon", "code", SEED_COUPON_CODES).await?));
        checks.push(("deductions", count_ids(pool, "deduction", "id", SEED_DEDUCTION_IDS).await?));

        let team_size: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM team_assignment WHERE manager_id = ?1")
                .bind(SEED_MANAGER_ID)
                .fetch_one(pool)
                .await?;
        checks.push(("team", team_size == 2));

        let approved: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM order_submission
             WHERE id = 'ord-demo-001' AND status = 'APPROVED' AND approved_count = 10",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("approved-order", approved == 1));

        let partial: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM refund_request
             WHERE id = 'rf-demo-001' AND status = 'PENDING' AND refunded_amount = '40.00'",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("partial-refund", partial == 1));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let statements = [
            format!("DELETE FROM coupon_clear_history WHERE coupon_code IN {}", sql_list(SEED_COUPON_CODES)),
            format!("DELETE FROM coupon WHERE code IN {}", sql_list(SEED_COUPON_CODES)),
            format!("DELETE FROM refund_request WHERE id IN {}", sql_list(SEED_REFUND_IDS)),
            format!("DELETE FROM deduction WHERE id IN {}", sql_list(SEED_DEDUCTION_IDS)),
            format!("DELETE FROM order_submission WHERE id IN {}", sql_list(SEED_ORDER_IDS)),
            format!("DELETE FROM team_assignment WHERE manager_id = '{SEED_MANAGER_ID}'"),
        ];
        for statement in &statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        // Actors stay if anything else still references them.
        sqlx::query(&format!(
            "DELETE FROM actor WHERE id IN {}
               AND id NOT IN (SELECT user_id FROM order_submission)
               AND id NOT IN (SELECT requested_by FROM refund_request)
               AND id NOT IN (SELECT issued_by FROM coupon)
               AND id NOT IN (SELECT user_id FROM warning)
               AND id NOT IN (SELECT source_user_id FROM warning)
               AND id NOT IN (SELECT user_id FROM deduction)
               AND id NOT IN (SELECT source_user_id FROM deduction)
               AND id NOT IN (SELECT manager_id FROM team_assignment)
               AND id NOT IN (SELECT employee_id FROM team_assignment)
               AND id NOT IN (SELECT approver_id FROM order_submission WHERE approver_id IS NOT NULL)
               AND id NOT IN (SELECT processed_by FROM refund_request WHERE processed_by IS NOT NULL)
               AND id NOT IN (SELECT used_by FROM coupon WHERE used_by IS NOT NULL)
               AND id NOT IN (SELECT cleared_by FROM coupon_clear_history)",
            sql_list(SEED_ACTOR_IDS)
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

async fn count_ids(
    pool: &DbPool,
    table: &str,
    column: &str,
    ids: &[&str],
) -> Result<bool, RepositoryError> {
    let found: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(1) FROM {table} WHERE {column} IN {}",
        sql_list(ids)
    ))
    .fetch_one(pool)
    .await?;
    Ok(usize::try_from(found).is_ok_and(|found| found == ids.len()))
}

fn sql_list(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedResult {
    pub actors: usize,
    pub orders: usize,
    pub refunds: usize,
    pub coupons: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!DemoSeedDataset::SQL.is_empty());
        for id in SEED_ACTOR_IDS.iter().chain(SEED_ORDER_IDS).chain(SEED_COUPON_CODES) {
            assert!(DemoSeedDataset::SQL.contains(&format!("'{id}'")), "fixture misses {id}");
        }
    }

    #[tokio::test]
    async fn load_is_idempotent_and_verifies() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = DemoSeedDataset::load(&pool).await.expect("load");
        let first_verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);

        let second = DemoSeedDataset::load(&pool).await.expect("reload");
        let second_verification = DemoSeedDataset::verify(&pool).await.expect("re-verify");
        assert_eq!(first, second);
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn clean_removes_seeded_rows() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        DemoSeedDataset::load(&pool).await.expect("load");
        DemoSeedDataset::clean(&pool).await.expect("clean");

        let verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        let actors: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM actor")
            .fetch_one(&pool)
            .await
            .expect("count actors");
        assert_eq!(actors, 0);
    }
}
