use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user::UserId;
use crate::domain::{optional_text, required_text};
use crate::errors::{DomainError, PermissionDenied};
use crate::money::Money;
use crate::pagination::CursorKey;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefundId(pub String);

impl RefundId {
    pub fn generate() -> Self {
        Self(format!("rf-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for RefundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Pending,
    Done,
    Archived,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Done => "DONE",
            Self::Archived => "ARCHIVED",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "DONE" => Ok(Self::Done),
            "ARCHIVED" => Ok(Self::Archived),
            other => {
                Err(DomainError::validation("status", format!("unknown refund status `{other}`")))
            }
        }
    }
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Employee-entered refund fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundDraft {
    pub customer_name: String,
    pub zelle_sender_name: Option<String>,
    pub server: Option<String>,
    pub category: Option<String>,
    pub reason: Option<String>,
    pub amount: Money,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundEdit {
    pub customer_name: Option<String>,
    pub zelle_sender_name: Option<String>,
    pub server: Option<String>,
    pub category: Option<String>,
    pub reason: Option<String>,
    pub amount: Option<Money>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub id: RefundId,
    pub requested_by: UserId,
    pub customer_name: String,
    pub zelle_sender_name: Option<String>,
    pub server: Option<String>,
    pub category: Option<String>,
    pub reason: Option<String>,
    pub amount: Money,
    pub refunded_amount: Money,
    pub status: RefundStatus,
    pub attachment_url: Option<String>,
    pub editable_until: DateTime<Utc>,
    pub processed_by: Option<UserId>,
    pub processed_at: Option<DateTime<Utc>>,
    pub fully_refunded_at: Option<DateTime<Utc>>,
    pub employee_confirmed_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettlementOutcome {
    Partial,
    Completed,
}

impl RefundRequest {
    pub fn open(
        requested_by: UserId,
        draft: RefundDraft,
        attachment_url: Option<String>,
        edit_window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id: RefundId::generate(),
            requested_by,
            customer_name: required_text("customerName", &draft.customer_name)?,
            zelle_sender_name: optional_text(draft.zelle_sender_name),
            server: optional_text(draft.server),
            category: optional_text(draft.category),
            reason: optional_text(draft.reason),
            amount: draft.amount.require_positive("amount")?,
            refunded_amount: Money::ZERO,
            status: RefundStatus::Pending,
            attachment_url,
            editable_until: now + edit_window,
            processed_by: None,
            processed_at: None,
            fully_refunded_at: None,
            employee_confirmed_at: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Owner edit, allowed only while pending and inside the edit window.
    pub fn apply_edit(
        &mut self,
        editor: &UserId,
        edit: RefundEdit,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if &self.requested_by != editor {
            return Err(PermissionDenied::NotOwner.into());
        }
        if self.status != RefundStatus::Pending {
            return Err(PermissionDenied::RefundNotPending.into());
        }
        if now >= self.editable_until {
            return Err(
                PermissionDenied::EditWindowExpired { editable_until: self.editable_until }.into()
            );
        }

        if let Some(amount) = edit.amount {
            let amount = amount.require_positive("amount")?;
            if amount < self.refunded_amount {
                return Err(DomainError::validation(
                    "amount",
                    format!("cannot be lowered below the {} already refunded", self.refunded_amount),
                ));
            }
            self.amount = amount;
        }
        if let Some(customer_name) = edit.customer_name {
            self.customer_name = required_text("customerName", &customer_name)?;
        }
        if edit.zelle_sender_name.is_some() {
            self.zelle_sender_name = optional_text(edit.zelle_sender_name);
        }
        if edit.server.is_some() {
            self.server = optional_text(edit.server);
        }
        if edit.category.is_some() {
            self.category = optional_text(edit.category);
        }
        if edit.reason.is_some() {
            self.reason = optional_text(edit.reason);
        }
        self.updated_at = now;
        Ok(())
    }

    /// Records the cumulative amount refunded so far.
    pub fn settle(
        &mut self,
        manager: &UserId,
        refunded_total: Money,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome, DomainError> {
        if self.status != RefundStatus::Pending {
            return Err(DomainError::conflict(format!(
                "refund {} is {} and cannot be settled again",
                self.id, self.status
            )));
        }
        let refunded_total = refunded_total.require_positive("refundedAmount")?;
        if refunded_total > self.amount {
            return Err(DomainError::validation(
                "refundedAmount",
                format!("{refunded_total} exceeds the requested {}", self.amount),
            ));
        }

        self.refunded_amount = refunded_total;
        self.processed_by = Some(manager.clone());
        self.processed_at = Some(now);
        self.updated_at = now;

        if refunded_total >= self.amount {
            self.status = RefundStatus::Done;
            self.fully_refunded_at = Some(now);
            return Ok(SettlementOutcome::Completed);
        }
        Ok(SettlementOutcome::Partial)
    }

    /// "Confirm notified": accepted once the refund is DONE or fully paid.
    pub fn archive(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status == RefundStatus::Archived {
            return Err(DomainError::conflict(format!("refund {} is already archived", self.id)));
        }
        if self.status != RefundStatus::Done && self.refunded_amount < self.amount {
            return Err(DomainError::conflict(format!(
                "refund {} still has {} outstanding and cannot be archived",
                self.id,
                self.shortfall()
            )));
        }

        self.status = RefundStatus::Archived;
        self.employee_confirmed_at = Some(now);
        self.archived_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn shortfall(&self) -> Money {
        self.amount.shortfall(self.refunded_amount)
    }

    pub fn is_purgeable(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == RefundStatus::Archived
            && self.archived_at.is_some_and(|archived_at| archived_at < cutoff)
    }
}

impl CursorKey for RefundRequest {
    fn cursor_timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn cursor_id(&self) -> &str {
        &self.id.0
    }
}

/// List and search filters. `requested_by = None` means no owner restriction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefundFilter {
    pub status: Option<RefundStatus>,
    pub requested_by: Option<Vec<UserId>>,
    pub query: Option<String>,
    pub amount: Option<Money>,
}

impl RefundFilter {
    pub fn matches(&self, refund: &RefundRequest) -> bool {
        self.status.map_or(true, |status| refund.status == status)
            && self.requested_by.as_ref().map_or(true, |ids| ids.contains(&refund.requested_by))
            && self.amount.map_or(true, |amount| refund.amount == amount)
            && self.search_needle().map_or(true, |needle| refund.search_text().contains(&needle))
    }

    /// The free-text query folded the same way as [`RefundRequest::search_text`].
    pub fn search_needle(&self) -> Option<String> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|query| !query.is_empty())
            .map(str::to_lowercase)
    }
}

impl RefundRequest {
    /// Lower-cased customer, Zelle sender and reason, one per line. Persisted
    /// alongside the row so storage-side search folds case the same way.
    pub fn search_text(&self) -> String {
        [Some(self.customer_name.as_str()), self.zelle_sender_name.as_deref(), self.reason.as_deref()]
            .into_iter()
            .flatten()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
