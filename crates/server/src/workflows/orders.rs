use serde::Deserialize;
use tracing::{info, warn};

use tally_core::authz::Role;
use tally_core::domain::calendar::{DateKey, MonthKey};
use tally_core::domain::order::{
    DecisionOutcome, OrderDecision, OrderFilter, OrderId, OrderStatus, OrderSubmission,
};
use tally_core::domain::user::UserId;
use tally_core::errors::{ApplicationError, DomainError};
use tally_core::pagination::Page;
use tally_db::RepositoryError;

use super::{now, Caller, Workflows};

/// Manager list filters as they arrive from the caller.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListRequest {
    pub status: Option<String>,
    pub employee_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Approve,
    Reject,
}

impl Workflows {
    /// Creates the day's row or updates it while it is still open.
    pub async fn submit_orders(
        &self,
        caller: &Caller,
        date_key: &str,
        submitted_count: u32,
    ) -> Result<OrderSubmission, ApplicationError> {
        caller.actor().require_role(&[Role::Employee], "submit orders")?;
        let date_key = DateKey::parse(date_key)?;

        let existing = self.repos.orders.find_for_day(caller.id(), date_key).await?;
        let saved = match existing {
            Some(order) => self.resubmit(order, submitted_count).await?,
            None => {
                let order = OrderSubmission::new(caller.id().clone(), date_key, submitted_count, now());
                match self.repos.orders.insert(order).await {
                    Ok(order) => order,
                    Err(RepositoryError::Duplicate(_)) => {
                        // Another request created the row first; fold into an update.
                        let order = self
                            .repos
                            .orders
                            .find_for_day(caller.id(), date_key)
                            .await?
                            .ok_or_else(|| DomainError::not_found("order", date_key.to_string()))?;
                        self.resubmit(order, submitted_count).await?
                    }
                    Err(error) => return Err(error.into()),
                }
            }
        };

        info!(
            event_name = "orders.submission.saved",
            correlation_id = %caller.correlation_id,
            order_id = %saved.id,
            date_key = %saved.date_key,
            submitted_count = saved.submitted_count,
            "order submission saved"
        );
        Ok(saved)
    }

    async fn resubmit(
        &self,
        mut order: OrderSubmission,
        submitted_count: u32,
    ) -> Result<OrderSubmission, ApplicationError> {
        order.resubmit(submitted_count, now())?;
        Ok(self.repos.orders.update(order).await?)
    }

    pub async fn my_orders(
        &self,
        caller: &Caller,
        month: &str,
    ) -> Result<Vec<OrderSubmission>, ApplicationError> {
        let month = MonthKey::parse(month)?;
        let own = [caller.id().clone()];
        Ok(self.repos.orders.list_for_month(Some(&own), month).await?)
    }

    /// Manager view, restricted to the caller's team.
    pub async fn manage_orders(
        &self,
        caller: &Caller,
        request: OrderListRequest,
    ) -> Result<Page<OrderSubmission>, ApplicationError> {
        let scope = self.policy.scope_for(&caller.actor(), "review orders").await?;

        let employee_ids = match non_blank(request.employee_id) {
            Some(raw) => {
                let employee = UserId(raw);
                scope.ensure_contains(&employee)?;
                Some(vec![employee])
            }
            None => scope.members(),
        };
        let filter = OrderFilter {
            status: non_blank(request.status).as_deref().map(OrderStatus::parse).transpose()?,
            employee_ids,
            from: non_blank(request.from).as_deref().map(DateKey::parse).transpose()?,
            to: non_blank(request.to).as_deref().map(DateKey::parse).transpose()?,
        };
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(DomainError::validation("from", "must not be after `to`").into());
            }
        }

        let page = self.page_query(request.cursor.as_deref(), request.limit);
        let rows = self.repos.orders.list_page(&filter, &page).await?;
        Ok(Page::from_overfetch(rows, page.limit, &self.codec))
    }

    pub async fn decide_order(
        &self,
        caller: &Caller,
        order_id: &OrderId,
        action: DecisionAction,
        approved_count: Option<u32>,
    ) -> Result<OrderSubmission, ApplicationError> {
        let mut order = self
            .repos
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id.0.clone()))?;
        self.policy.authorize(&caller.actor(), &order.user_id, "decide orders").await?;

        let decision = match action {
            DecisionAction::Approve => OrderDecision::Approve { approved_count },
            DecisionAction::Reject => OrderDecision::Reject,
        };
        match order.decide(decision, caller.id(), now())? {
            DecisionOutcome::AlreadyApproved => {
                warn!(
                    event_name = "orders.decision.noop",
                    correlation_id = %caller.correlation_id,
                    order_id = %order.id,
                    approver_id = ?order.approver_id,
                    "order already approved; returning current state"
                );
                Ok(order)
            }
            DecisionOutcome::Applied => {
                let saved = self.repos.orders.update(order).await?;
                info!(
                    event_name = "orders.decision.applied",
                    correlation_id = %caller.correlation_id,
                    order_id = %saved.id,
                    status = saved.status.as_str(),
                    "order decided"
                );
                Ok(saved)
            }
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|raw| raw.trim().to_string()).filter(|raw| !raw.is_empty())
}
