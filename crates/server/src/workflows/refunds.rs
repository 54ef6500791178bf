use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use tally_core::authz::Role;
use tally_core::domain::refund::{
    RefundDraft, RefundEdit, RefundFilter, RefundId, RefundRequest, RefundStatus,
    SettlementOutcome,
};
use tally_core::errors::{ApplicationError, DomainError, PermissionDenied};
use tally_core::money::Money;
use tally_core::notify::{Notification, NotificationKind};
use tally_core::pagination::Page;

use super::{now, Caller, Workflows};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentUpload {
    pub file_name: String,
    pub content_base64: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRefund {
    pub customer_name: String,
    #[serde(default)]
    pub zelle_sender_name: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    pub amount: Money,
    #[serde(default)]
    pub attachment: Option<AttachmentUpload>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundListRequest {
    pub status: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundSearchRequest {
    pub q: Option<String>,
    pub amount: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    pub purged: Vec<RefundId>,
    pub attachments_deleted: usize,
    pub attachment_failures: usize,
}

impl Workflows {
    pub async fn create_refund(
        &self,
        caller: &Caller,
        request: NewRefund,
    ) -> Result<RefundRequest, ApplicationError> {
        caller.actor().require_role(&[Role::Employee], "request refunds")?;
        let draft = RefundDraft {
            customer_name: request.customer_name,
            zelle_sender_name: request.zelle_sender_name,
            server: request.server,
            category: request.category,
            reason: request.reason,
            amount: request.amount,
        };
        let window = self.settings.refund_edit_window();
        let mut refund = RefundRequest::open(caller.id().clone(), draft, None, window, now())?;

        if let Some(upload) = request.attachment {
            let bytes = STANDARD
                .decode(upload.content_base64.trim())
                .map_err(|_| DomainError::validation("attachment", "content is not valid base64"))?;
            refund.attachment_url = Some(self.attachments.put(&upload.file_name, bytes).await?);
        }

        let attachment_url = refund.attachment_url.clone();
        let saved = match self.repos.refunds.insert(refund).await {
            Ok(saved) => saved,
            Err(error) => {
                if let Some(url) = attachment_url {
                    self.discard_attachment(caller, &url).await;
                }
                return Err(error.into());
            }
        };

        info!(
            event_name = "refunds.request.created",
            correlation_id = %caller.correlation_id,
            refund_id = %saved.id,
            amount = %saved.amount,
            has_attachment = saved.attachment_url.is_some(),
            "refund requested"
        );
        Ok(saved)
    }

    pub async fn list_refunds(
        &self,
        caller: &Caller,
        request: RefundListRequest,
    ) -> Result<Page<RefundRequest>, ApplicationError> {
        let status = request
            .status
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(RefundStatus::parse)
            .transpose()?;
        let filter = RefundFilter { status, ..self.refund_visibility(caller).await? };
        self.refund_page(filter, request.cursor.as_deref(), request.limit).await
    }

    pub async fn search_refunds(
        &self,
        caller: &Caller,
        request: RefundSearchRequest,
    ) -> Result<Page<RefundRequest>, ApplicationError> {
        let query =
            request.q.map(|raw| raw.trim().to_string()).filter(|raw| !raw.is_empty());
        let amount = request
            .amount
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| Money::parse("amount", raw))
            .transpose()?;
        let filter = RefundFilter { query, amount, ..self.refund_visibility(caller).await? };
        self.refund_page(filter, request.cursor.as_deref(), request.limit).await
    }

    pub async fn edit_refund(
        &self,
        caller: &Caller,
        refund_id: &RefundId,
        edit: RefundEdit,
    ) -> Result<RefundRequest, ApplicationError> {
        let mut refund = self.load_refund(refund_id).await?;
        refund.apply_edit(caller.id(), edit, now())?;
        let saved = self.repos.refunds.update(refund).await?;

        info!(
            event_name = "refunds.request.edited",
            correlation_id = %caller.correlation_id,
            refund_id = %saved.id,
            "refund edited"
        );
        Ok(saved)
    }

    /// `refunded_total` is the cumulative amount paid back so far.
    pub async fn settle_refund(
        &self,
        caller: &Caller,
        refund_id: &RefundId,
        refunded_total: Money,
    ) -> Result<RefundRequest, ApplicationError> {
        let mut refund = self.load_refund(refund_id).await?;
        self.policy.authorize(&caller.actor(), &refund.requested_by, "settle refunds").await?;

        let outcome = refund.settle(caller.id(), refunded_total, now())?;
        let saved = self.repos.refunds.update(refund).await?;

        info!(
            event_name = "refunds.request.settled",
            correlation_id = %caller.correlation_id,
            refund_id = %saved.id,
            refunded_amount = %saved.refunded_amount,
            status = saved.status.as_str(),
            "refund settlement recorded"
        );
        if outcome == SettlementOutcome::Completed {
            self.notifier.notify(
                Notification::new(
                    NotificationKind::RefundCompleted,
                    saved.requested_by.clone(),
                    format!("Refund for {} fully settled", saved.customer_name),
                    caller.correlation_id.clone(),
                )
                .with_metadata("refundId", saved.id.0.clone())
                .with_metadata("amount", saved.refunded_amount.to_string()),
            );
        }
        Ok(saved)
    }

    /// Owner confirmation, or a manager acting within their team.
    pub async fn archive_refund(
        &self,
        caller: &Caller,
        refund_id: &RefundId,
    ) -> Result<RefundRequest, ApplicationError> {
        let mut refund = self.load_refund(refund_id).await?;
        if &refund.requested_by != caller.id() {
            if caller.account.role == Role::Employee {
                return Err(PermissionDenied::NotOwner.into());
            }
            self.policy.authorize(&caller.actor(), &refund.requested_by, "archive refunds").await?;
        }

        refund.archive(now())?;
        let saved = self.repos.refunds.update(refund).await?;

        info!(
            event_name = "refunds.request.archived",
            correlation_id = %caller.correlation_id,
            refund_id = %saved.id,
            "refund archived"
        );
        Ok(saved)
    }

    /// Removes archived refunds older than `archived_before` with their receipts.
    pub async fn purge_refunds(
        &self,
        caller: &Caller,
        archived_before: DateTime<Utc>,
    ) -> Result<PurgeReport, ApplicationError> {
        caller.actor().require_role(&[Role::Admin], "purge refunds")?;
        if archived_before > now() {
            return Err(DomainError::validation("archivedBefore", "must not be in the future").into());
        }

        let removed = self.repos.refunds.purge_archived_before(archived_before).await?;
        let mut report = PurgeReport {
            purged: removed.iter().map(|refund| refund.id.clone()).collect(),
            attachments_deleted: 0,
            attachment_failures: 0,
        };
        for url in removed.iter().filter_map(|refund| refund.attachment_url.as_deref()) {
            if self.discard_attachment(caller, url).await {
                report.attachments_deleted += 1;
            } else {
                report.attachment_failures += 1;
            }
        }

        info!(
            event_name = "refunds.purge.completed",
            correlation_id = %caller.correlation_id,
            purged = report.purged.len(),
            attachment_failures = report.attachment_failures,
            "archived refunds purged"
        );
        Ok(report)
    }

    async fn load_refund(&self, refund_id: &RefundId) -> Result<RefundRequest, ApplicationError> {
        self.repos
            .refunds
            .find_by_id(refund_id)
            .await?
            .ok_or_else(|| DomainError::not_found("refund", refund_id.0.clone()).into())
    }

    /// Employees see their own refunds; managers their team.
    async fn refund_visibility(&self, caller: &Caller) -> Result<RefundFilter, ApplicationError> {
        let scope = self.policy.visible_users(&caller.actor()).await?;
        Ok(RefundFilter { requested_by: scope.members(), ..RefundFilter::default() })
    }

    async fn refund_page(
        &self,
        filter: RefundFilter,
        cursor: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Page<RefundRequest>, ApplicationError> {
        let page = self.page_query(cursor, limit);
        let rows = self.repos.refunds.list_page(&filter, &page).await?;
        Ok(Page::from_overfetch(rows, page.limit, &self.codec))
    }

    /// Best-effort blob removal; failures are logged and reported as `false`.
    async fn discard_attachment(&self, caller: &Caller, url: &str) -> bool {
        match self.attachments.delete(url).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    event_name = "refunds.attachment.delete_failed",
                    correlation_id = %caller.correlation_id,
                    url = %url,
                    error = %error,
                    "attachment could not be deleted"
                );
                false
            }
        }
    }
}
