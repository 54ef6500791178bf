use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authz::{Actor, Role};
use crate::domain::required_text;
use crate::errors::{DomainError, PermissionDenied};
use crate::money::Money;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn generate() -> Self {
        Self(format!("usr-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A portal account. Accounts are deactivated, never deleted, so history
/// that references them stays intact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: UserId,
    pub display_name: String,
    pub role: Role,
    pub active: bool,
    pub rate_per_order: Option<Money>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(
        display_name: &str,
        role: Role,
        rate_per_order: Option<Money>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let rate_per_order = rate_per_order
            .map(|rate| rate.checked_scale("ratePerOrder"))
            .transpose()?;
        if rate_per_order.is_some_and(|rate| rate.is_negative()) {
            return Err(DomainError::validation("ratePerOrder", "must not be negative"));
        }

        Ok(Self {
            id: UserId::generate(),
            display_name: required_text("displayName", display_name)?,
            role,
            active: true,
            rate_per_order,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn actor(&self) -> Actor {
        Actor { id: self.id.clone(), role: self.role }
    }

    pub fn ensure_active(&self) -> Result<(), DomainError> {
        if self.active {
            return Ok(());
        }
        Err(PermissionDenied::Inactive(self.id.0.clone()).into())
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.updated_at = now;
        true
    }

    pub fn set_rate(&mut self, rate: Option<Money>, now: DateTime<Utc>) -> Result<(), DomainError> {
        if let Some(rate) = rate {
            rate.checked_scale("ratePerOrder")?;
            if rate.is_negative() {
                return Err(DomainError::validation("ratePerOrder", "must not be negative"));
            }
        }
        self.rate_per_order = rate;
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamAssignment {
    pub manager_id: UserId,
    pub employee_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl TeamAssignment {
    pub fn new(
        manager: &UserAccount,
        employee: &UserAccount,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if manager.role != Role::Manager {
            return Err(DomainError::validation("managerId", "account is not a MANAGER"));
        }
        if employee.role != Role::Employee {
            return Err(DomainError::validation("employeeId", "account is not an EMPLOYEE"));
        }
        Ok(Self { manager_id: manager.id.clone(), employee_id: employee.id.clone(), created_at: now })
    }
}
