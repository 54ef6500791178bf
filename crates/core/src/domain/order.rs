use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::calendar::DateKey;
use crate::domain::user::UserId;
use crate::errors::{DomainError, PermissionDenied};
use crate::pagination::CursorKey;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn generate() -> Self {
        Self(format!("ord-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Approved,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(DomainError::validation("status", format!("unknown order status `{other}`"))),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One employee's order count for one day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSubmission {
    pub id: OrderId,
    pub user_id: UserId,
    pub date_key: DateKey,
    pub submitted_count: u32,
    pub approved_count: Option<u32>,
    pub status: OrderStatus,
    pub approver_id: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderDecision {
    Approve { approved_count: Option<u32> },
    Reject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecisionOutcome {
    Applied,
    /// The row was already APPROVED; nothing changed.
    AlreadyApproved,
}

impl OrderSubmission {
    pub fn new(user_id: UserId, date_key: DateKey, submitted_count: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: OrderId::generate(),
            user_id,
            date_key,
            submitted_count,
            approved_count: None,
            status: OrderStatus::Pending,
            approver_id: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Employee update of an existing row for the same day.
    pub fn resubmit(&mut self, submitted_count: u32, now: DateTime<Utc>) -> Result<(), DomainError> {
        match self.status {
            OrderStatus::Approved => {
                return Err(PermissionDenied::OrderImmutable { date_key: self.date_key.to_string() }
                    .into());
            }
            OrderStatus::Rejected => {
                self.status = OrderStatus::Pending;
                self.clear_decision();
            }
            OrderStatus::Pending => {}
        }
        self.submitted_count = submitted_count;
        self.updated_at = now;
        Ok(())
    }

    pub fn decide(
        &mut self,
        decision: OrderDecision,
        approver: &UserId,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, DomainError> {
        if self.status == OrderStatus::Approved && matches!(decision, OrderDecision::Approve { .. })
        {
            return Ok(DecisionOutcome::AlreadyApproved);
        }
        if self.status != OrderStatus::Pending {
            return Err(DomainError::conflict(format!(
                "order for {} is {} and can no longer be decided",
                self.date_key, self.status
            )));
        }

        match decision {
            OrderDecision::Approve { approved_count } => {
                let approved = approved_count.unwrap_or(self.submitted_count);
                if approved > self.submitted_count {
                    return Err(DomainError::validation(
                        "approvedCount",
                        format!(
                            "{approved} exceeds the {} submitted orders",
                            self.submitted_count
                        ),
                    ));
                }
                self.status = OrderStatus::Approved;
                self.approved_count = Some(approved);
                self.approver_id = Some(approver.clone());
                self.approved_at = Some(now);
            }
            OrderDecision::Reject => {
                self.status = OrderStatus::Rejected;
                self.clear_decision();
            }
        }
        self.updated_at = now;
        Ok(DecisionOutcome::Applied)
    }

    /// Orders counted toward pay.
    pub fn payable_count(&self) -> u64 {
        match self.status {
            OrderStatus::Approved => u64::from(self.approved_count.unwrap_or(0)),
            _ => 0,
        }
    }

    fn clear_decision(&mut self) {
        self.approved_count = None;
        self.approver_id = None;
        self.approved_at = None;
    }
}

impl CursorKey for OrderSubmission {
    fn cursor_timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn cursor_id(&self) -> &str {
        &self.id.0
    }
}

/// Manager list filters; `employee_ids` is filled in from the caller's scope.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub employee_ids: Option<Vec<UserId>>,
    pub from: Option<DateKey>,
    pub to: Option<DateKey>,
}

impl OrderFilter {
    pub fn matches(&self, order: &OrderSubmission) -> bool {
        self.status.map_or(true, |status| order.status == status)
            && self
                .employee_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&order.user_id))
            && self.from.map_or(true, |from| order.date_key >= from)
            && self.to.map_or(true, |to| order.date_key <= to)
    }
}
