//! Team-scoped authorization.
//!
//! A manager's authority is the set of employees assigned to them. A manager
//! with no assignments at all is unscoped and may act on every employee.
//! Every manager-initiated mutation goes through [`TeamPolicy`] so that rule
//! lives in exactly one place.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::{ApplicationError, DomainError, PermissionDenied};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Employee,
    Manager,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "EMPLOYEE",
            Self::Manager => "MANAGER",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "EMPLOYEE" => Ok(Self::Employee),
            "MANAGER" => Ok(Self::Manager),
            "ADMIN" => Ok(Self::Admin),
            other => Err(DomainError::validation(
                "role",
                format!("unknown role `{other}` (expected EMPLOYEE|MANAGER|ADMIN)"),
            )),
        }
    }
}

/// The authenticated caller of an operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: UserId(id.into()), role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_role(&self, allowed: &[Role], action: &'static str) -> Result<(), DomainError> {
        if allowed.contains(&self.role) {
            return Ok(());
        }
        Err(PermissionDenied::RoleNotAllowed { role: self.role, action }.into())
    }
}

/// The employees a manager may act upon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    All,
    Only(BTreeSet<UserId>),
}

impl Scope {
    /// An empty assignment list means the manager is unscoped.
    pub fn from_assignments(employee_ids: impl IntoIterator<Item = UserId>) -> Self {
        let members: BTreeSet<UserId> = employee_ids.into_iter().collect();
        if members.is_empty() {
            Self::All
        } else {
            Self::Only(members)
        }
    }

    pub fn contains(&self, user_id: &UserId) -> bool {
        match self {
            Self::All => true,
            Self::Only(members) => members.contains(user_id),
        }
    }

    pub fn ensure_contains(&self, user_id: &UserId) -> Result<(), DomainError> {
        if self.contains(user_id) {
            return Ok(());
        }
        Err(PermissionDenied::OutOfScope { target: user_id.0.clone() }.into())
    }

    /// `None` when unscoped, otherwise the explicit member list for query filters.
    pub fn members(&self) -> Option<Vec<UserId>> {
        match self {
            Self::All => None,
            Self::Only(members) => Some(members.iter().cloned().collect()),
        }
    }
}

#[async_trait]
pub trait ScopeResolver: Send + Sync {
    async fn resolve_scope(&self, manager_id: &UserId) -> Result<Scope, ApplicationError>;
}

#[derive(Clone)]
pub struct TeamPolicy {
    resolver: Arc<dyn ScopeResolver>,
}

impl TeamPolicy {
    pub fn new(resolver: Arc<dyn ScopeResolver>) -> Self {
        Self { resolver }
    }

    /// Scope of a manager or admin; employees have no team authority.
    pub async fn scope_for(
        &self,
        actor: &Actor,
        action: &'static str,
    ) -> Result<Scope, ApplicationError> {
        match actor.role {
            Role::Admin => Ok(Scope::All),
            Role::Manager => self.resolver.resolve_scope(&actor.id).await,
            Role::Employee => {
                Err(PermissionDenied::RoleNotAllowed { role: actor.role, action }.into())
            }
        }
    }

    /// Fails unless `actor` may perform a team action on `target`.
    pub async fn authorize(
        &self,
        actor: &Actor,
        target: &UserId,
        action: &'static str,
    ) -> Result<Scope, ApplicationError> {
        let scope = self.scope_for(actor, action).await?;
        scope.ensure_contains(target)?;
        Ok(scope)
    }

    /// Read visibility: employees see themselves, managers their scope.
    pub async fn visible_users(&self, actor: &Actor) -> Result<Scope, ApplicationError> {
        match actor.role {
            Role::Employee => Ok(Scope::Only(BTreeSet::from([actor.id.clone()]))),
            _ => self.scope_for(actor, "view team records").await,
        }
    }
}
