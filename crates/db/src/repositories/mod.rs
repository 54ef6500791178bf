use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use tally_core::domain::calendar::{DateKey, MonthKey};
use tally_core::domain::coupon::{Coupon, CouponClearRecord, CouponCode};
use tally_core::domain::order::{OrderFilter, OrderId, OrderSubmission};
use tally_core::domain::refund::{RefundFilter, RefundId, RefundRequest};
use tally_core::domain::user::{TeamAssignment, UserAccount, UserId};
use tally_core::domain::warning::{Deduction, Warning, WarningId, WarningTab};
use tally_core::errors::{ApplicationError, DomainError};
use tally_core::pagination::PageQuery;

pub mod coupons;
pub mod memory;
pub mod orders;
pub mod refunds;
pub mod rows;
pub mod teams;
pub mod users;
pub mod warnings;

pub use coupons::SqlCouponRepository;
pub use memory::{
    InMemoryCouponRepository, InMemoryOrderRepository, InMemoryRefundRepository,
    InMemoryTeamRepository, InMemoryUserRepository, InMemoryWarningRepository,
};
pub use orders::SqlOrderRepository;
pub use refunds::SqlRefundRepository;
pub use teams::{SqlTeamRepository, TeamScopeResolver};
pub use users::SqlUserRepository;
pub use warnings::SqlWarningRepository;

use crate::DbPool;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("duplicate {0}")]
    Duplicate(String),
    #[error("{entity} `{id}` was modified concurrently; reload and retry")]
    StaleVersion { entity: &'static str, id: String },
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Duplicate(_) | RepositoryError::StaleVersion { .. } => {
                Self::Domain(DomainError::Conflict(error.to_string()))
            }
            RepositoryError::Database(_) | RepositoryError::Decode(_) => {
                Self::Persistence(error.to_string())
            }
        }
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserAccount>, RepositoryError>;
    async fn save(&self, user: UserAccount) -> Result<(), RepositoryError>;
    async fn list(&self, include_inactive: bool) -> Result<Vec<UserAccount>, RepositoryError>;
}

#[async_trait]
pub trait TeamRepository: Send + Sync {
    /// Returns false when the pair already existed.
    async fn assign(&self, assignment: TeamAssignment) -> Result<bool, RepositoryError>;
    async fn unassign(
        &self,
        manager_id: &UserId,
        employee_id: &UserId,
    ) -> Result<bool, RepositoryError>;
    async fn employees_of(&self, manager_id: &UserId) -> Result<Vec<UserId>, RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderSubmission>, RepositoryError>;
    async fn find_for_day(
        &self,
        user_id: &UserId,
        date_key: DateKey,
    ) -> Result<Option<OrderSubmission>, RepositoryError>;
    /// Fails with `Duplicate` when the `(user, day)` row already exists.
    async fn insert(&self, order: OrderSubmission) -> Result<OrderSubmission, RepositoryError>;
    /// Writes when the stored version still equals `order.version`.
    async fn update(&self, order: OrderSubmission) -> Result<OrderSubmission, RepositoryError>;
    async fn list_for_month(
        &self,
        user_ids: Option<&[UserId]>,
        month: MonthKey,
    ) -> Result<Vec<OrderSubmission>, RepositoryError>;
    /// Newest first, at most `page.fetch_size()` rows.
    async fn list_page(
        &self,
        filter: &OrderFilter,
        page: &PageQuery,
    ) -> Result<Vec<OrderSubmission>, RepositoryError>;
}

#[async_trait]
pub trait RefundRepository: Send + Sync {
    async fn find_by_id(&self, id: &RefundId) -> Result<Option<RefundRequest>, RepositoryError>;
    async fn insert(&self, refund: RefundRequest) -> Result<RefundRequest, RepositoryError>;
    async fn update(&self, refund: RefundRequest) -> Result<RefundRequest, RepositoryError>;
    async fn list_page(
        &self,
        filter: &RefundFilter,
        page: &PageQuery,
    ) -> Result<Vec<RefundRequest>, RepositoryError>;
    /// Deletes archived refunds archived before `cutoff` and returns them.
    async fn purge_archived_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RefundRequest>, RepositoryError>;
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn code_exists(&self, code: &CouponCode) -> Result<bool, RepositoryError>;
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, RepositoryError>;
    async fn insert(&self, coupon: Coupon) -> Result<Coupon, RepositoryError>;
    async fn update(&self, coupon: Coupon) -> Result<Coupon, RepositoryError>;
    /// Balance update and history append in one unit of work.
    async fn record_clear(
        &self,
        coupon: Coupon,
        record: CouponClearRecord,
    ) -> Result<Coupon, RepositoryError>;
    async fn history_page(
        &self,
        code: Option<&CouponCode>,
        page: &PageQuery,
    ) -> Result<Vec<CouponClearRecord>, RepositoryError>;
}

#[async_trait]
pub trait WarningRepository: Send + Sync {
    /// Warning and optional linked deduction in one unit of work.
    async fn insert(
        &self,
        warning: Warning,
        deduction: Option<Deduction>,
    ) -> Result<(), RepositoryError>;
    async fn insert_deduction(&self, deduction: Deduction) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &WarningId) -> Result<Option<Warning>, RepositoryError>;
    /// Merges the read and archive markers. Markers already stored are never cleared.
    async fn update(&self, warning: &Warning) -> Result<(), RepositoryError>;
    /// Stamps `archived_at = now` on the user's unarchived warnings created at or before `cutoff`.
    async fn archive_stale(
        &self,
        user_id: &UserId,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;
    async fn list_page(
        &self,
        user_id: &UserId,
        tab: WarningTab,
        cutoff: DateTime<Utc>,
        page: &PageQuery,
    ) -> Result<Vec<Warning>, RepositoryError>;
    async fn unread_recent_count(
        &self,
        user_id: &UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;
    async fn deductions_between(
        &self,
        user_ids: Option<&[UserId]>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Deduction>, RepositoryError>;
}

/// Every repository the workflows need, behind trait objects.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub teams: Arc<dyn TeamRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub refunds: Arc<dyn RefundRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    pub warnings: Arc<dyn WarningRepository>,
}

impl Repositories {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            users: Arc::new(SqlUserRepository::new(pool.clone())),
            teams: Arc::new(SqlTeamRepository::new(pool.clone())),
            orders: Arc::new(SqlOrderRepository::new(pool.clone())),
            refunds: Arc::new(SqlRefundRepository::new(pool.clone())),
            coupons: Arc::new(SqlCouponRepository::new(pool.clone())),
            warnings: Arc::new(SqlWarningRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryUserRepository::default()),
            teams: Arc::new(InMemoryTeamRepository::default()),
            orders: Arc::new(InMemoryOrderRepository::default()),
            refunds: Arc::new(InMemoryRefundRepository::default()),
            coupons: Arc::new(InMemoryCouponRepository::default()),
            warnings: Arc::new(InMemoryWarningRepository::default()),
        }
    }

    pub fn scope_resolver(&self) -> TeamScopeResolver {
        TeamScopeResolver::new(self.teams.clone())
    }
}
