use serde::Deserialize;
use tracing::info;

use tally_core::authz::Role;
use tally_core::domain::user::{TeamAssignment, UserAccount, UserId};
use tally_core::errors::{ApplicationError, DomainError};
use tally_core::money::Money;

use super::{now, Caller, Workflows};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub rate_per_order: Option<Money>,
}

impl Workflows {
    pub async fn create_account(
        &self,
        caller: &Caller,
        request: NewAccount,
    ) -> Result<UserAccount, ApplicationError> {
        caller.actor().require_role(&[Role::Admin], "create accounts")?;
        let account =
            UserAccount::new(&request.display_name, request.role, request.rate_per_order, now())?;
        self.repos.users.save(account.clone()).await?;

        info!(
            event_name = "accounts.user.created",
            correlation_id = %caller.correlation_id,
            user_id = %account.id,
            role = account.role.as_str(),
            "account created"
        );
        Ok(account)
    }

    pub async fn list_accounts(
        &self,
        caller: &Caller,
        include_inactive: bool,
    ) -> Result<Vec<UserAccount>, ApplicationError> {
        caller.actor().require_role(&[Role::Admin], "list accounts")?;
        Ok(self.repos.users.list(include_inactive).await?)
    }

    /// Soft delete; repeated calls return the already inactive account.
    pub async fn deactivate_account(
        &self,
        caller: &Caller,
        user_id: &UserId,
    ) -> Result<UserAccount, ApplicationError> {
        caller.actor().require_role(&[Role::Admin], "deactivate accounts")?;
        if user_id == caller.id() {
            return Err(DomainError::validation("userId", "cannot deactivate yourself").into());
        }

        let mut account = self.load_user(user_id).await?;
        if account.deactivate(now()) {
            self.repos.users.save(account.clone()).await?;
            info!(
                event_name = "accounts.user.deactivated",
                correlation_id = %caller.correlation_id,
                user_id = %account.id,
                "account deactivated"
            );
        }
        Ok(account)
    }

    pub async fn set_rate(
        &self,
        caller: &Caller,
        user_id: &UserId,
        rate: Option<Money>,
    ) -> Result<UserAccount, ApplicationError> {
        caller.actor().require_role(&[Role::Admin], "change pay rates")?;
        let mut account = self.load_user(user_id).await?;
        account.set_rate(rate, now())?;
        self.repos.users.save(account.clone()).await?;

        info!(
            event_name = "accounts.rate.updated",
            correlation_id = %caller.correlation_id,
            user_id = %account.id,
            rate = %account.rate_per_order.map(|rate| rate.to_string()).unwrap_or_default(),
            "pay rate updated"
        );
        Ok(account)
    }

    /// Returns the assignment and whether it was newly created.
    pub async fn assign_to_team(
        &self,
        caller: &Caller,
        manager_id: &UserId,
        employee_id: &UserId,
    ) -> Result<(TeamAssignment, bool), ApplicationError> {
        caller.actor().require_role(&[Role::Admin], "manage teams")?;
        let manager = self.load_user(manager_id).await?;
        let employee = self.load_user(employee_id).await?;
        manager.ensure_active()?;
        employee.ensure_active()?;

        let assignment = TeamAssignment::new(&manager, &employee, now())?;
        let created = self.repos.teams.assign(assignment.clone()).await?;
        if created {
            info!(
                event_name = "accounts.team.assigned",
                correlation_id = %caller.correlation_id,
                manager_id = %manager.id,
                employee_id = %employee.id,
                "employee assigned to manager"
            );
        }
        Ok((assignment, created))
    }

    pub async fn unassign_from_team(
        &self,
        caller: &Caller,
        manager_id: &UserId,
        employee_id: &UserId,
    ) -> Result<(), ApplicationError> {
        caller.actor().require_role(&[Role::Admin], "manage teams")?;
        if !self.repos.teams.unassign(manager_id, employee_id).await? {
            return Err(DomainError::not_found(
                "team assignment",
                format!("{manager_id}/{employee_id}"),
            )
            .into());
        }

        info!(
            event_name = "accounts.team.unassigned",
            correlation_id = %caller.correlation_id,
            manager_id = %manager_id,
            employee_id = %employee_id,
            "employee removed from manager"
        );
        Ok(())
    }

    /// Active employees the caller may act on.
    pub async fn roster(&self, caller: &Caller) -> Result<Vec<UserAccount>, ApplicationError> {
        let scope = self.policy.scope_for(&caller.actor(), "view the team roster").await?;
        let users = self.repos.users.list(false).await?;
        Ok(users
            .into_iter()
            .filter(|user| user.role == Role::Employee && scope.contains(&user.id))
            .collect())
    }
}
