use tracing::debug;

use tally_core::authz::Role;
use tally_core::domain::calendar::MonthKey;
use tally_core::domain::user::UserId;
use tally_core::errors::{ApplicationError, PermissionDenied};
use tally_core::payroll::{SalaryEngine, SalaryReport, TeamMonthRow};

use super::{now, Caller, Workflows};

impl Workflows {
    /// Salary for one user and month; defaults to the caller and the current month.
    pub async fn salary(
        &self,
        caller: &Caller,
        user_id: Option<UserId>,
        month: Option<&str>,
    ) -> Result<SalaryReport, ApplicationError> {
        let month = resolve_month(month)?;
        let target_id = user_id.unwrap_or_else(|| caller.id().clone());
        if &target_id != caller.id() {
            if caller.account.role == Role::Employee {
                return Err(PermissionDenied::NotOwner.into());
            }
            self.policy.authorize(&caller.actor(), &target_id, "view salary").await?;
        }

        let user = self.load_user(&target_id).await?;
        let ids = [user.id.clone()];
        let orders = self.repos.orders.list_for_month(Some(&ids), month).await?;
        let (start, end) = month.window();
        let deductions = self.repos.warnings.deductions_between(Some(&ids), start, end).await?;

        let report = SalaryEngine::calculate(&user, month, &orders, &deductions);
        debug!(
            event_name = "payroll.salary.calculated",
            correlation_id = %caller.correlation_id,
            user_id = %report.user_id,
            month = %report.month_key,
            approved = report.approved_orders_count,
            salary = %report.salary,
            "salary calculated"
        );
        Ok(report)
    }

    /// One row per active employee in the caller's scope.
    pub async fn team_analytics(
        &self,
        caller: &Caller,
        month: Option<&str>,
    ) -> Result<Vec<TeamMonthRow>, ApplicationError> {
        let month = resolve_month(month)?;
        let scope = self.policy.scope_for(&caller.actor(), "view team analytics").await?;
        let members = scope.members();

        let mut employees = self.repos.users.list(false).await?;
        employees.retain(|user| user.role == Role::Employee && scope.contains(&user.id));
        if employees.is_empty() {
            return Ok(Vec::new());
        }

        let orders = self.repos.orders.list_for_month(members.as_deref(), month).await?;
        let (start, end) = month.window();
        let deductions =
            self.repos.warnings.deductions_between(members.as_deref(), start, end).await?;

        let mut rows: Vec<TeamMonthRow> = employees
            .iter()
            .map(|user| SalaryEngine::team_row(user, month, &orders, &deductions))
            .collect();
        rows.sort_by(|left, right| left.display_name.cmp(&right.display_name));
        Ok(rows)
    }
}

fn resolve_month(raw: Option<&str>) -> Result<MonthKey, ApplicationError> {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => Ok(MonthKey::parse(raw)?),
        None => Ok(MonthKey::containing(now())),
    }
}
