use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use tally_core::domain::calendar::{DateKey, MonthKey};
use tally_core::domain::coupon::{Coupon, CouponClearRecord, CouponCode};
use tally_core::domain::order::{OrderFilter, OrderId, OrderSubmission};
use tally_core::domain::refund::{RefundFilter, RefundId, RefundRequest};
use tally_core::domain::user::{TeamAssignment, UserAccount, UserId};
use tally_core::domain::warning::{Deduction, Warning, WarningId, WarningTab};
use tally_core::pagination::{CursorKey, PageQuery};

use super::{
    CouponRepository, OrderRepository, RefundRepository, RepositoryError, TeamRepository,
    UserRepository, WarningRepository,
};

/// Newest first, strictly after the cursor, at most `fetch_size` rows.
fn page_of<'a, T>(rows: impl Iterator<Item = &'a T>, page: &PageQuery) -> Vec<T>
where
    T: CursorKey + Clone + 'a,
{
    let mut selected: Vec<T> = rows
        .filter(|row| {
            page.after
                .as_ref()
                .map_or(true, |cursor| cursor.precedes(row.cursor_timestamp(), row.cursor_id()))
        })
        .cloned()
        .collect();
    selected.sort_by(|a, b| {
        b.cursor_timestamp()
            .cmp(&a.cursor_timestamp())
            .then_with(|| b.cursor_id().cmp(a.cursor_id()))
    });
    selected.truncate(page.fetch_size() as usize);
    selected
}

fn in_users(user_ids: Option<&[UserId]>, user_id: &UserId) -> bool {
    user_ids.map_or(true, |ids| ids.contains(user_id))
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, UserAccount>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserAccount>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn save(&self, user: UserAccount) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
        Ok(())
    }

    async fn list(&self, include_inactive: bool) -> Result<Vec<UserAccount>, RepositoryError> {
        let users = self.users.read().await;
        let mut listed: Vec<UserAccount> =
            users.values().filter(|user| include_inactive || user.active).cloned().collect();
        listed.sort_by(|a, b| a.display_name.cmp(&b.display_name).then_with(|| a.id.cmp(&b.id)));
        Ok(listed)
    }
}

#[derive(Default)]
pub struct InMemoryTeamRepository {
    pairs: RwLock<BTreeSet<(UserId, UserId)>>,
}

#[async_trait::async_trait]
impl TeamRepository for InMemoryTeamRepository {
    async fn assign(&self, assignment: TeamAssignment) -> Result<bool, RepositoryError> {
        let mut pairs = self.pairs.write().await;
        Ok(pairs.insert((assignment.manager_id, assignment.employee_id)))
    }

    async fn unassign(
        &self,
        manager_id: &UserId,
        employee_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        let mut pairs = self.pairs.write().await;
        Ok(pairs.remove(&(manager_id.clone(), employee_id.clone())))
    }

    async fn employees_of(&self, manager_id: &UserId) -> Result<Vec<UserId>, RepositoryError> {
        let pairs = self.pairs.read().await;
        Ok(pairs
            .iter()
            .filter(|(manager, _)| manager == manager_id)
            .map(|(_, employee)| employee.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<String, OrderSubmission>>,
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderSubmission>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id.0).cloned())
    }

    async fn find_for_day(
        &self,
        user_id: &UserId,
        date_key: DateKey,
    ) -> Result<Option<OrderSubmission>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|order| &order.user_id == user_id && order.date_key == date_key)
            .cloned())
    }

    async fn insert(&self, order: OrderSubmission) -> Result<OrderSubmission, RepositoryError> {
        let mut orders = self.orders.write().await;
        if orders
            .values()
            .any(|existing| existing.user_id == order.user_id && existing.date_key == order.date_key)
        {
            return Err(RepositoryError::Duplicate(format!(
                "order for {} on {}",
                order.user_id, order.date_key
            )));
        }
        orders.insert(order.id.0.clone(), order.clone());
        Ok(order)
    }

    async fn update(&self, order: OrderSubmission) -> Result<OrderSubmission, RepositoryError> {
        let mut orders = self.orders.write().await;
        match orders.get(&order.id.0) {
            Some(stored) if stored.version == order.version => {}
            _ => return Err(RepositoryError::StaleVersion { entity: "order", id: order.id.0 }),
        }
        let saved = OrderSubmission { version: order.version + 1, ..order };
        orders.insert(saved.id.0.clone(), saved.clone());
        Ok(saved)
    }

    async fn list_for_month(
        &self,
        user_ids: Option<&[UserId]>,
        month: MonthKey,
    ) -> Result<Vec<OrderSubmission>, RepositoryError> {
        let orders = self.orders.read().await;
        let mut listed: Vec<OrderSubmission> = orders
            .values()
            .filter(|order| month.contains(&order.date_key) && in_users(user_ids, &order.user_id))
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.date_key.cmp(&b.date_key).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(listed)
    }

    async fn list_page(
        &self,
        filter: &OrderFilter,
        page: &PageQuery,
    ) -> Result<Vec<OrderSubmission>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(page_of(orders.values().filter(|order| filter.matches(order)), page))
    }
}

#[derive(Default)]
pub struct InMemoryRefundRepository {
    refunds: RwLock<HashMap<String, RefundRequest>>,
}

#[async_trait::async_trait]
impl RefundRepository for InMemoryRefundRepository {
    async fn find_by_id(&self, id: &RefundId) -> Result<Option<RefundRequest>, RepositoryError> {
        let refunds = self.refunds.read().await;
        Ok(refunds.get(&id.0).cloned())
    }

    async fn insert(&self, refund: RefundRequest) -> Result<RefundRequest, RepositoryError> {
        let mut refunds = self.refunds.write().await;
        if refunds.contains_key(&refund.id.0) {
            return Err(RepositoryError::Duplicate(format!("refund {}", refund.id)));
        }
        refunds.insert(refund.id.0.clone(), refund.clone());
        Ok(refund)
    }

    async fn update(&self, refund: RefundRequest) -> Result<RefundRequest, RepositoryError> {
        let mut refunds = self.refunds.write().await;
        match refunds.get(&refund.id.0) {
            Some(stored) if stored.version == refund.version => {}
            _ => return Err(RepositoryError::StaleVersion { entity: "refund", id: refund.id.0 }),
        }
        let saved = RefundRequest { version: refund.version + 1, ..refund };
        refunds.insert(saved.id.0.clone(), saved.clone());
        Ok(saved)
    }

    async fn list_page(
        &self,
        filter: &RefundFilter,
        page: &PageQuery,
    ) -> Result<Vec<RefundRequest>, RepositoryError> {
        let refunds = self.refunds.read().await;
        Ok(page_of(refunds.values().filter(|refund| filter.matches(refund)), page))
    }

    async fn purge_archived_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RefundRequest>, RepositoryError> {
        let mut refunds = self.refunds.write().await;
        let ids: Vec<String> = refunds
            .values()
            .filter(|refund| refund.is_purgeable(cutoff))
            .map(|refund| refund.id.0.clone())
            .collect();
        let mut purged: Vec<RefundRequest> =
            ids.iter().filter_map(|id| refunds.remove(id)).collect();
        purged.sort_by_key(|refund| refund.archived_at);
        Ok(purged)
    }
}

#[derive(Default)]
pub struct InMemoryCouponRepository {
    coupons: RwLock<HashMap<String, Coupon>>,
    history: RwLock<Vec<CouponClearRecord>>,
}

impl InMemoryCouponRepository {
    fn replace(
        coupons: &mut HashMap<String, Coupon>,
        coupon: Coupon,
    ) -> Result<Coupon, RepositoryError> {
        match coupons.get(&coupon.code.0) {
            Some(stored) if stored.version == coupon.version => {}
            _ => {
                return Err(RepositoryError::StaleVersion { entity: "coupon", id: coupon.code.0 })
            }
        }
        let saved = Coupon { version: coupon.version + 1, ..coupon };
        coupons.insert(saved.code.0.clone(), saved.clone());
        Ok(saved)
    }
}

#[async_trait::async_trait]
impl CouponRepository for InMemoryCouponRepository {
    async fn code_exists(&self, code: &CouponCode) -> Result<bool, RepositoryError> {
        let coupons = self.coupons.read().await;
        Ok(coupons.contains_key(&code.0))
    }

    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, RepositoryError> {
        let coupons = self.coupons.read().await;
        Ok(coupons.get(&code.0).cloned())
    }

    async fn insert(&self, coupon: Coupon) -> Result<Coupon, RepositoryError> {
        let mut coupons = self.coupons.write().await;
        if coupons.contains_key(&coupon.code.0) {
            return Err(RepositoryError::Duplicate(format!("coupon code {}", coupon.code)));
        }
        coupons.insert(coupon.code.0.clone(), coupon.clone());
        Ok(coupon)
    }

    async fn update(&self, coupon: Coupon) -> Result<Coupon, RepositoryError> {
        let mut coupons = self.coupons.write().await;
        Self::replace(&mut coupons, coupon)
    }

    async fn record_clear(
        &self,
        coupon: Coupon,
        record: CouponClearRecord,
    ) -> Result<Coupon, RepositoryError> {
        let mut coupons = self.coupons.write().await;
        let mut history = self.history.write().await;
        let saved = Self::replace(&mut coupons, coupon)?;
        history.push(record);
        Ok(saved)
    }

    async fn history_page(
        &self,
        code: Option<&CouponCode>,
        page: &PageQuery,
    ) -> Result<Vec<CouponClearRecord>, RepositoryError> {
        let history = self.history.read().await;
        Ok(page_of(
            history.iter().filter(|record| code.map_or(true, |code| &record.coupon_code == code)),
            page,
        ))
    }
}

#[derive(Default)]
pub struct InMemoryWarningRepository {
    warnings: RwLock<HashMap<String, Warning>>,
    deductions: RwLock<Vec<Deduction>>,
}

fn in_recent_tab(warning: &Warning, cutoff: DateTime<Utc>) -> bool {
    warning.archived_at.is_none() && warning.created_at > cutoff
}

#[async_trait::async_trait]
impl WarningRepository for InMemoryWarningRepository {
    async fn insert(
        &self,
        warning: Warning,
        deduction: Option<Deduction>,
    ) -> Result<(), RepositoryError> {
        let mut warnings = self.warnings.write().await;
        let mut deductions = self.deductions.write().await;
        if warnings.contains_key(&warning.id.0) {
            return Err(RepositoryError::Duplicate(format!("warning {}", warning.id)));
        }
        warnings.insert(warning.id.0.clone(), warning);
        deductions.extend(deduction);
        Ok(())
    }

    async fn insert_deduction(&self, deduction: Deduction) -> Result<(), RepositoryError> {
        self.deductions.write().await.push(deduction);
        Ok(())
    }

    async fn find_by_id(&self, id: &WarningId) -> Result<Option<Warning>, RepositoryError> {
        let warnings = self.warnings.read().await;
        Ok(warnings.get(&id.0).cloned())
    }

    async fn update(&self, warning: &Warning) -> Result<(), RepositoryError> {
        let mut warnings = self.warnings.write().await;
        if let Some(stored) = warnings.get_mut(&warning.id.0) {
            if warning.is_read {
                stored.is_read = true;
                stored.read_at = stored.read_at.or(warning.read_at);
            }
            stored.archived_at = stored.archived_at.or(warning.archived_at);
        }
        Ok(())
    }

    async fn archive_stale(
        &self,
        user_id: &UserId,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut warnings = self.warnings.write().await;
        let mut archived = 0;
        for warning in warnings.values_mut() {
            if &warning.user_id == user_id && warning.created_at <= cutoff && warning.archive(now) {
                archived += 1;
            }
        }
        Ok(archived)
    }

    async fn list_page(
        &self,
        user_id: &UserId,
        tab: WarningTab,
        cutoff: DateTime<Utc>,
        page: &PageQuery,
    ) -> Result<Vec<Warning>, RepositoryError> {
        let warnings = self.warnings.read().await;
        let rows = warnings.values().filter(|warning| {
            &warning.user_id == user_id
                && match tab {
                    WarningTab::Recent => in_recent_tab(warning, cutoff),
                    WarningTab::Archive => !in_recent_tab(warning, cutoff),
                }
        });
        Ok(page_of(rows, page))
    }

    async fn unread_recent_count(
        &self,
        user_id: &UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let warnings = self.warnings.read().await;
        let count = warnings
            .values()
            .filter(|warning| {
                &warning.user_id == user_id && !warning.is_read && in_recent_tab(warning, cutoff)
            })
            .count();
        Ok(count as u64)
    }

    async fn deductions_between(
        &self,
        user_ids: Option<&[UserId]>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Deduction>, RepositoryError> {
        let deductions = self.deductions.read().await;
        let mut listed: Vec<Deduction> = deductions
            .iter()
            .filter(|deduction| {
                deduction.created_at >= start
                    && deduction.created_at < end
                    && in_users(user_ids, &deduction.user_id)
            })
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(listed)
    }
}
