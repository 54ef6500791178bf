use sqlx::sqlite::SqliteRow;

use tally_core::domain::calendar::{DateKey, MonthKey};
use tally_core::domain::order::{OrderFilter, OrderId, OrderStatus, OrderSubmission};
use tally_core::domain::user::UserId;
use tally_core::pagination::PageQuery;

use super::rows::{
    encode_opt_ts, encode_ts, get, get_opt_ts, get_opt_user_id, get_ts, get_user_id,
    is_unique_violation, parse_enum, user_ids_json,
};
use super::{OrderRepository, RepositoryError};
use crate::DbPool;

const SELECT_ORDER: &str = "SELECT id, user_id, date_key, submitted_count, approved_count, status,
            approver_id, approved_at, created_at, updated_at, version
     FROM order_submission";

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn count_column(row: &SqliteRow, column: &str) -> Result<u32, RepositoryError> {
    let raw: i64 = get(row, column)?;
    u32::try_from(raw).map_err(|_| RepositoryError::Decode(format!("{column}: {raw} out of range")))
}

fn row_to_order(row: &SqliteRow) -> Result<OrderSubmission, RepositoryError> {
    let date_key: String = get(row, "date_key")?;
    let status: String = get(row, "status")?;
    let approved_count = get::<Option<i64>>(row, "approved_count")?
        .map(|raw| {
            u32::try_from(raw).map_err(|_| {
                RepositoryError::Decode(format!("approved_count: {raw} out of range"))
            })
        })
        .transpose()?;

    Ok(OrderSubmission {
        id: OrderId(get(row, "id")?),
        user_id: get_user_id(row, "user_id")?,
        date_key: parse_enum("date_key", &date_key, DateKey::parse)?,
        submitted_count: count_column(row, "submitted_count")?,
        approved_count,
        status: parse_enum("status", &status, OrderStatus::parse)?,
        approver_id: get_opt_user_id(row, "approver_id")?,
        approved_at: get_opt_ts(row, "approved_at")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
        version: get(row, "version")?,
    })
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderSubmission>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_ORDER} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn find_for_day(
        &self,
        user_id: &UserId,
        date_key: DateKey,
    ) -> Result<Option<OrderSubmission>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_ORDER} WHERE user_id = ? AND date_key = ?"))
            .bind(&user_id.0)
            .bind(date_key.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn insert(&self, order: OrderSubmission) -> Result<OrderSubmission, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO order_submission (
                id, user_id, date_key, submitted_count, approved_count, status,
                approver_id, approved_at, created_at, updated_at, version
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.id.0)
        .bind(&order.user_id.0)
        .bind(order.date_key.to_string())
        .bind(i64::from(order.submitted_count))
        .bind(order.approved_count.map(i64::from))
        .bind(order.status.as_str())
        .bind(order.approver_id.as_ref().map(|id| id.0.clone()))
        .bind(encode_opt_ts(order.approved_at))
        .bind(encode_ts(order.created_at))
        .bind(encode_ts(order.updated_at))
        .bind(order.version)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(order),
            Err(error) if is_unique_violation(&error) => Err(RepositoryError::Duplicate(format!(
                "order for {} on {}",
                order.user_id, order.date_key
            ))),
            Err(error) => Err(error.into()),
        }
    }

    async fn update(&self, order: OrderSubmission) -> Result<OrderSubmission, RepositoryError> {
        let result = sqlx::query(
            "UPDATE order_submission
             SET submitted_count = ?, approved_count = ?, status = ?, approver_id = ?,
                 approved_at = ?, updated_at = ?, version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(i64::from(order.submitted_count))
        .bind(order.approved_count.map(i64::from))
        .bind(order.status.as_str())
        .bind(order.approver_id.as_ref().map(|id| id.0.clone()))
        .bind(encode_opt_ts(order.approved_at))
        .bind(encode_ts(order.updated_at))
        .bind(&order.id.0)
        .bind(order.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::StaleVersion { entity: "order", id: order.id.0 });
        }
        Ok(OrderSubmission { version: order.version + 1, ..order })
    }

    async fn list_for_month(
        &self,
        user_ids: Option<&[UserId]>,
        month: MonthKey,
    ) -> Result<Vec<OrderSubmission>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_ORDER}
             WHERE date_key >= ? AND date_key <= ?
               AND (? IS NULL OR user_id IN (SELECT value FROM json_each(?)))
             ORDER BY date_key ASC, id ASC"
        ))
        .bind(month.first_day().format("%Y-%m-%d").to_string())
        .bind(month.last_day().format("%Y-%m-%d").to_string())
        .bind(user_ids_json(user_ids))
        .bind(user_ids_json(user_ids))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_order).collect()
    }

    async fn list_page(
        &self,
        filter: &OrderFilter,
        page: &PageQuery,
    ) -> Result<Vec<OrderSubmission>, RepositoryError> {
        let status = filter.status.map(|status| status.as_str());
        let employees = user_ids_json(filter.employee_ids.as_deref());
        let from = filter.from.map(|date| date.to_string());
        let to = filter.to.map(|date| date.to_string());
        let after_ts = page.after.as_ref().map(|cursor| encode_ts(cursor.timestamp));
        let after_id = page.after.as_ref().map(|cursor| cursor.id.clone());

        let rows = sqlx::query(&format!(
            "{SELECT_ORDER}
             WHERE (? IS NULL OR status = ?)
               AND (? IS NULL OR user_id IN (SELECT value FROM json_each(?)))
               AND (? IS NULL OR date_key >= ?)
               AND (? IS NULL OR date_key <= ?)
               AND (? IS NULL OR created_at < ? OR (created_at = ? AND id < ?))
             ORDER BY created_at DESC, id DESC
             LIMIT ?"
        ))
        .bind(status)
        .bind(status)
        .bind(&employees)
        .bind(&employees)
        .bind(&from)
        .bind(&from)
        .bind(&to)
        .bind(&to)
        .bind(&after_ts)
        .bind(&after_ts)
        .bind(&after_ts)
        .bind(&after_id)
        .bind(i64::from(page.fetch_size()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_order).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use tally_core::authz::Role;
    use tally_core::domain::calendar::{DateKey, MonthKey};
    use tally_core::domain::order::{OrderDecision, OrderFilter, OrderStatus, OrderSubmission};
    use tally_core::domain::user::UserAccount;
    use tally_core::pagination::{CursorKey, PageQuery};

    use super::SqlOrderRepository;
    use crate::repositories::{OrderRepository, RepositoryError, SqlUserRepository, UserRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> (SqlOrderRepository, UserAccount, UserAccount) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let users = SqlUserRepository::new(pool.clone());
        let employee = UserAccount::new("Eli", Role::Employee, None, Utc::now()).expect("user");
        let manager = UserAccount::new("Mia", Role::Manager, None, Utc::now()).expect("user");
        users.save(employee.clone()).await.expect("save employee");
        users.save(manager.clone()).await.expect("save manager");
        (SqlOrderRepository::new(pool), employee, manager)
    }

    fn day(raw: &str) -> DateKey {
        DateKey::parse(raw).expect("date")
    }

    #[tokio::test]
    async fn one_row_per_user_and_day() {
        let (repo, employee, _) = setup().await;
        let now = tally_core::domain::current_time();
        repo.insert(OrderSubmission::new(employee.id.clone(), day("2024-01-15"), 10, now))
            .await
            .expect("first insert");

        let error = repo
            .insert(OrderSubmission::new(employee.id.clone(), day("2024-01-15"), 12, now))
            .await
            .expect_err("duplicate day");
        assert!(matches!(error, RepositoryError::Duplicate(_)));

        let stored = repo
            .find_for_day(&employee.id, day("2024-01-15"))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(stored.submitted_count, 10);
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let (repo, employee, manager) = setup().await;
        let now = tally_core::domain::current_time();
        let order = repo
            .insert(OrderSubmission::new(employee.id.clone(), day("2024-01-15"), 10, now))
            .await
            .expect("insert");

        let mut first = order.clone();
        first
            .decide(OrderDecision::Approve { approved_count: Some(8) }, &manager.id, now)
            .expect("approve");
        let saved = repo.update(first).await.expect("first update");
        assert_eq!(saved.version, 1);

        let mut second = order;
        second.decide(OrderDecision::Reject, &manager.id, now).expect("reject");
        let error = repo.update(second).await.expect_err("stale");
        assert!(matches!(error, RepositoryError::StaleVersion { entity: "order", .. }));

        let stored = repo.find_by_id(&saved.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, OrderStatus::Approved);
        assert_eq!(stored.approved_count, Some(8));
    }

    #[tokio::test]
    async fn pages_walk_newest_first_without_overlap() {
        let (repo, employee, _) = setup().await;
        let base = tally_core::domain::current_time() - Duration::hours(1);
        for offset in 0..5_i64 {
            let date = format!("2024-01-{:02}", 10 + offset);
            let order =
                OrderSubmission::new(employee.id.clone(), day(&date), 1, base + Duration::minutes(offset));
            repo.insert(order).await.expect("insert");
        }

        let filter = OrderFilter::default();
        let first = repo.list_page(&filter, &PageQuery::first(2)).await.expect("page one");
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].date_key, day("2024-01-14"));

        let next = PageQuery { after: Some(first[1].cursor()), limit: 2 };
        let second = repo.list_page(&filter, &next).await.expect("page two");
        assert_eq!(
            second.iter().map(|order| order.date_key).collect::<Vec<_>>(),
            vec![day("2024-01-12"), day("2024-01-11"), day("2024-01-10")]
        );
    }

    #[tokio::test]
    async fn month_listing_respects_bounds_and_scope() {
        let (repo, employee, manager) = setup().await;
        let now = tally_core::domain::current_time();
        for date in ["2024-01-31", "2024-02-01", "2024-02-29", "2024-03-01"] {
            repo.insert(OrderSubmission::new(employee.id.clone(), day(date), 3, now))
                .await
                .expect("insert");
        }
        let february = MonthKey::parse("2024-02").expect("month");

        let all = repo.list_for_month(None, february).await.expect("month");
        assert_eq!(all.len(), 2);

        let scoped = repo
            .list_for_month(Some(&[manager.id.clone()]), february)
            .await
            .expect("scoped month");
        assert!(scoped.is_empty());
    }
}
