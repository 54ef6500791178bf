use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authz::{Actor, Role};
use crate::domain::user::{UserAccount, UserId};
use crate::domain::{optional_text, required_text};
use crate::errors::{DomainError, PermissionDenied};
use crate::money::Money;
use crate::pagination::CursorKey;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WarningId(pub String);

impl WarningId {
    pub fn generate() -> Self {
        Self(format!("wrn-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for WarningId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeductionId(pub String);

impl DeductionId {
    pub fn generate() -> Self {
        Self(format!("ded-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningTab {
    Recent,
    Archive,
}

impl WarningTab {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "recent" | "" => Ok(Self::Recent),
            "archive" | "archived" => Ok(Self::Archive),
            other => Err(DomainError::validation(
                "tab",
                format!("unknown tab `{other}` (expected recent|archive)"),
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub id: WarningId,
    pub user_id: UserId,
    pub reason: String,
    pub note: Option<String>,
    pub source_role: Role,
    pub source_user_id: UserId,
    pub deduction_amount: Option<Money>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Append-only payroll debit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deduction {
    pub id: DeductionId,
    pub user_id: UserId,
    pub amount: Money,
    pub reason: String,
    pub source_role: Role,
    pub source_user_id: UserId,
    pub warning_id: Option<WarningId>,
    pub created_at: DateTime<Utc>,
}

impl Deduction {
    pub fn standalone(
        target: &UserAccount,
        issuer: &Actor,
        amount: Money,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        ensure_targetable(target, issuer)?;
        Ok(Self {
            id: DeductionId::generate(),
            user_id: target.id.clone(),
            amount: amount.require_positive("amount")?,
            reason: required_text("reason", reason)?,
            source_role: issuer.role,
            source_user_id: issuer.id.clone(),
            warning_id: None,
            created_at: now,
        })
    }
}

fn ensure_targetable(target: &UserAccount, issuer: &Actor) -> Result<(), DomainError> {
    target.ensure_active()?;
    if issuer.role == Role::Manager && target.role != Role::Employee {
        return Err(PermissionDenied::OutOfScope { target: target.id.0.clone() }.into());
    }
    if target.id == issuer.id {
        return Err(DomainError::validation("userId", "cannot target yourself"));
    }
    Ok(())
}

impl Warning {
    /// Creates the warning and, for a positive amount, its linked deduction.
    pub fn issue(
        target: &UserAccount,
        issuer: &Actor,
        reason: &str,
        note: Option<String>,
        deduction_amount: Option<Money>,
        now: DateTime<Utc>,
    ) -> Result<(Self, Option<Deduction>), DomainError> {
        ensure_targetable(target, issuer)?;
        let reason = required_text("reason", reason)?;

        let deduction_amount = match deduction_amount {
            Some(amount) => {
                let amount = amount.checked_scale("deductionAmount")?;
                if amount.is_negative() {
                    return Err(DomainError::validation("deductionAmount", "must not be negative"));
                }
                Some(amount).filter(Money::is_positive)
            }
            None => None,
        };

        let warning = Self {
            id: WarningId::generate(),
            user_id: target.id.clone(),
            reason: reason.clone(),
            note: optional_text(note),
            source_role: issuer.role,
            source_user_id: issuer.id.clone(),
            deduction_amount,
            is_read: false,
            read_at: None,
            archived_at: None,
            created_at: now,
        };
        let deduction = deduction_amount.map(|amount| Deduction {
            id: DeductionId::generate(),
            user_id: target.id.clone(),
            amount,
            reason,
            source_role: issuer.role,
            source_user_id: issuer.id.clone(),
            warning_id: Some(warning.id.clone()),
            created_at: now,
        });
        Ok((warning, deduction))
    }

    /// Idempotent; returns true only on the first read.
    pub fn mark_read(&mut self, reader: &UserId, now: DateTime<Utc>) -> Result<bool, DomainError> {
        if &self.user_id != reader {
            return Err(PermissionDenied::NotOwner.into());
        }
        if self.is_read {
            return Ok(false);
        }
        self.is_read = true;
        self.read_at = Some(now);
        Ok(true)
    }

    pub fn archive(&mut self, now: DateTime<Utc>) -> bool {
        if self.archived_at.is_some() {
            return false;
        }
        self.archived_at = Some(now);
        true
    }

    pub fn is_due_for_archive(&self, now: DateTime<Utc>, archive_after: Duration) -> bool {
        self.archived_at.is_none() && self.created_at <= now - archive_after
    }

    pub fn in_tab(&self, tab: WarningTab, now: DateTime<Utc>, archive_after: Duration) -> bool {
        let aged = self.created_at <= now - archive_after;
        match tab {
            WarningTab::Recent => self.archived_at.is_none() && !aged,
            WarningTab::Archive => self.archived_at.is_some() || aged,
        }
    }
}

impl CursorKey for Warning {
    fn cursor_timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn cursor_id(&self) -> &str {
        &self.id.0
    }
}
