use std::sync::Arc;

use async_trait::async_trait;

use tally_core::authz::{Scope, ScopeResolver};
use tally_core::domain::user::{TeamAssignment, UserId};
use tally_core::errors::ApplicationError;

use super::rows::encode_ts;
use super::{RepositoryError, TeamRepository};
use crate::DbPool;

pub struct SqlTeamRepository {
    pool: DbPool,
}

impl SqlTeamRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TeamRepository for SqlTeamRepository {
    async fn assign(&self, assignment: TeamAssignment) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO team_assignment (manager_id, employee_id, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(manager_id, employee_id) DO NOTHING",
        )
        .bind(&assignment.manager_id.0)
        .bind(&assignment.employee_id.0)
        .bind(encode_ts(assignment.created_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn unassign(
        &self,
        manager_id: &UserId,
        employee_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM team_assignment WHERE manager_id = ? AND employee_id = ?")
                .bind(&manager_id.0)
                .bind(&employee_id.0)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn employees_of(&self, manager_id: &UserId) -> Result<Vec<UserId>, RepositoryError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT employee_id FROM team_assignment WHERE manager_id = ? ORDER BY employee_id",
        )
        .bind(&manager_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(UserId).collect())
    }
}

/// Resolves a manager's scope from the assignment table; no rows means unscoped.
#[derive(Clone)]
pub struct TeamScopeResolver {
    teams: Arc<dyn TeamRepository>,
}

impl TeamScopeResolver {
    pub fn new(teams: Arc<dyn TeamRepository>) -> Self {
        Self { teams }
    }
}

#[async_trait]
impl ScopeResolver for TeamScopeResolver {
    async fn resolve_scope(&self, manager_id: &UserId) -> Result<Scope, ApplicationError> {
        let members = self.teams.employees_of(manager_id).await?;
        Ok(Scope::from_assignments(members))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use tally_core::authz::{Role, Scope, ScopeResolver};
    use tally_core::domain::user::{TeamAssignment, UserAccount};

    use super::{SqlTeamRepository, TeamScopeResolver};
    use crate::repositories::{SqlUserRepository, TeamRepository, UserRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    async fn account(pool: &DbPool, name: &str, role: Role) -> UserAccount {
        let user = UserAccount::new(name, role, None, Utc::now()).expect("user");
        SqlUserRepository::new(pool.clone()).save(user.clone()).await.expect("save user");
        user
    }

    #[tokio::test]
    async fn duplicate_assign_is_a_no_op() {
        let pool = setup().await;
        let manager = account(&pool, "Mia", Role::Manager).await;
        let employee = account(&pool, "Eli", Role::Employee).await;
        let repo = SqlTeamRepository::new(pool);

        let assignment = TeamAssignment::new(&manager, &employee, Utc::now()).expect("pair");
        assert!(repo.assign(assignment.clone()).await.expect("first assign"));
        assert!(!repo.assign(assignment).await.expect("second assign"));
        assert_eq!(repo.employees_of(&manager.id).await.expect("team"), vec![employee.id.clone()]);

        assert!(repo.unassign(&manager.id, &employee.id).await.expect("unassign"));
        assert!(!repo.unassign(&manager.id, &employee.id).await.expect("unassign again"));
    }

    #[tokio::test]
    async fn resolver_treats_empty_team_as_unscoped() {
        let pool = setup().await;
        let scoped = account(&pool, "Mia", Role::Manager).await;
        let free = account(&pool, "Max", Role::Manager).await;
        let employee = account(&pool, "Eli", Role::Employee).await;
        let other = account(&pool, "Ola", Role::Employee).await;
        let repo = Arc::new(SqlTeamRepository::new(pool));
        repo.assign(TeamAssignment::new(&scoped, &employee, Utc::now()).expect("pair"))
            .await
            .expect("assign");

        let resolver = TeamScopeResolver::new(repo);
        assert_eq!(resolver.resolve_scope(&free.id).await.expect("scope"), Scope::All);

        let scope = resolver.resolve_scope(&scoped.id).await.expect("scope");
        assert!(scope.contains(&employee.id));
        assert!(!scope.contains(&other.id));
    }
}
