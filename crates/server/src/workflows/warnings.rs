use serde::Deserialize;
use tracing::{info, warn};

use tally_core::authz::Role;
use tally_core::domain::user::UserId;
use tally_core::domain::warning::{Deduction, Warning, WarningId, WarningTab};
use tally_core::errors::{ApplicationError, DomainError, PermissionDenied};
use tally_core::money::Money;
use tally_core::notify::{Notification, NotificationKind};
use tally_core::pagination::Page;

use super::{now, Caller, Workflows};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWarning {
    pub user_id: String,
    pub reason: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub deduction_amount: Option<Money>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeduction {
    pub user_id: String,
    pub amount: Money,
    pub reason: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningListRequest {
    pub tab: Option<String>,
    pub user_id: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

impl Workflows {
    /// Issues a warning and, for a positive amount, its linked deduction.
    pub async fn issue_warning(
        &self,
        caller: &Caller,
        request: NewWarning,
    ) -> Result<Warning, ApplicationError> {
        let actor = caller.actor();
        actor.require_role(&[Role::Manager, Role::Admin], "issue warnings")?;
        let target = self.load_user(&UserId(request.user_id)).await?;
        self.policy.authorize(&actor, &target.id, "issue warnings").await?;

        let (warning, deduction) = Warning::issue(
            &target,
            &actor,
            &request.reason,
            request.note,
            request.deduction_amount,
            now(),
        )?;
        let deduction_id = deduction.as_ref().map(|deduction| deduction.id.0.clone());
        self.repos.warnings.insert(warning.clone(), deduction).await?;

        info!(
            event_name = "warnings.warning.issued",
            correlation_id = %caller.correlation_id,
            warning_id = %warning.id,
            user_id = %warning.user_id,
            deduction_id = deduction_id.as_deref().unwrap_or("none"),
            "warning issued"
        );
        let mut notification = Notification::new(
            NotificationKind::WarningIssued,
            warning.user_id.clone(),
            warning.reason.clone(),
            caller.correlation_id.clone(),
        )
        .with_metadata("warningId", warning.id.0.clone());
        if let Some(amount) = warning.deduction_amount {
            notification = notification.with_metadata("deductionAmount", amount.to_string());
        }
        self.notifier.notify(notification);
        Ok(warning)
    }

    pub async fn issue_deduction(
        &self,
        caller: &Caller,
        request: NewDeduction,
    ) -> Result<Deduction, ApplicationError> {
        let actor = caller.actor();
        actor.require_role(&[Role::Manager, Role::Admin], "issue deductions")?;
        let target = self.load_user(&UserId(request.user_id)).await?;
        self.policy.authorize(&actor, &target.id, "issue deductions").await?;

        let deduction = Deduction::standalone(&target, &actor, request.amount, &request.reason, now())?;
        self.repos.warnings.insert_deduction(deduction.clone()).await?;

        info!(
            event_name = "warnings.deduction.issued",
            correlation_id = %caller.correlation_id,
            deduction_id = %deduction.id.0,
            user_id = %deduction.user_id,
            amount = %deduction.amount,
            "standalone deduction issued"
        );
        Ok(deduction)
    }

    /// Lists one user's warnings after archiving the ones that aged out.
    pub async fn list_warnings(
        &self,
        caller: &Caller,
        request: WarningListRequest,
    ) -> Result<Page<Warning>, ApplicationError> {
        let tab = WarningTab::parse(request.tab.as_deref().unwrap_or_default())?;
        let target = request
            .user_id
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(UserId)
            .unwrap_or_else(|| caller.id().clone());
        self.ensure_warning_access(caller, &target, "view warnings").await?;

        let now = now();
        let cutoff = now - self.settings.warning_archive_after();
        self.archive_stale_warnings(caller, &target, cutoff, now).await;

        let page = self.page_query(request.cursor.as_deref(), request.limit);
        let rows = self.repos.warnings.list_page(&target, tab, cutoff, &page).await?;
        Ok(Page::from_overfetch(rows, page.limit, &self.codec))
    }

    pub async fn unread_warning_count(&self, caller: &Caller) -> Result<u64, ApplicationError> {
        let now = now();
        let cutoff = now - self.settings.warning_archive_after();
        self.archive_stale_warnings(caller, caller.id(), cutoff, now).await;
        Ok(self.repos.warnings.unread_recent_count(caller.id(), cutoff).await?)
    }

    /// Idempotent; only the recipient may mark a warning read.
    pub async fn mark_warning_read(
        &self,
        caller: &Caller,
        warning_id: &WarningId,
    ) -> Result<Warning, ApplicationError> {
        let mut warning = self.load_warning(warning_id).await?;
        if warning.mark_read(caller.id(), now())? {
            self.repos.warnings.update(&warning).await?;
            info!(
                event_name = "warnings.warning.read",
                correlation_id = %caller.correlation_id,
                warning_id = %warning.id,
                "warning marked read"
            );
        }
        Ok(warning)
    }

    pub async fn archive_warning(
        &self,
        caller: &Caller,
        warning_id: &WarningId,
    ) -> Result<Warning, ApplicationError> {
        let mut warning = self.load_warning(warning_id).await?;
        self.ensure_warning_access(caller, &warning.user_id.clone(), "archive warnings").await?;

        if warning.archive(now()) {
            self.repos.warnings.update(&warning).await?;
            info!(
                event_name = "warnings.warning.archived",
                correlation_id = %caller.correlation_id,
                warning_id = %warning.id,
                "warning archived"
            );
        }
        Ok(warning)
    }

    async fn load_warning(&self, warning_id: &WarningId) -> Result<Warning, ApplicationError> {
        self.repos
            .warnings
            .find_by_id(warning_id)
            .await?
            .ok_or_else(|| DomainError::not_found("warning", warning_id.0.clone()).into())
    }

    /// The recipient, or a manager/admin whose scope covers the recipient.
    async fn ensure_warning_access(
        &self,
        caller: &Caller,
        owner: &UserId,
        action: &'static str,
    ) -> Result<(), ApplicationError> {
        if owner == caller.id() {
            return Ok(());
        }
        if caller.account.role == Role::Employee {
            return Err(PermissionDenied::NotOwner.into());
        }
        self.policy.authorize(&caller.actor(), owner, action).await?;
        Ok(())
    }

    /// Lazy archival never fails the read it precedes.
    async fn archive_stale_warnings(
        &self,
        caller: &Caller,
        user_id: &UserId,
        cutoff: chrono::DateTime<chrono::Utc>,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        match self.repos.warnings.archive_stale(user_id, cutoff, now).await {
            Ok(0) => {}
            Ok(archived) => info!(
                event_name = "warnings.warning.auto_archived",
                correlation_id = %caller.correlation_id,
                user_id = %user_id,
                archived,
                "aged warnings archived"
            ),
            Err(error) => warn!(
                event_name = "warnings.warning.auto_archive_failed",
                correlation_id = %caller.correlation_id,
                user_id = %user_id,
                error = %error,
                "lazy warning archival failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use tally_core::authz::Role;
    use tally_core::domain::warning::Warning;
    use tally_core::errors::{ApplicationError, DomainError, PermissionDenied};
    use tally_core::money::Money;
    use tally_core::notify::NotificationKind;

    use super::{NewDeduction, NewWarning, WarningListRequest};
    use crate::workflows::testing::Harness;
    use crate::workflows::now;

    fn warning_for(user_id: &str, deduction: Option<i64>) -> NewWarning {
        NewWarning {
            user_id: user_id.to_string(),
            reason: "late for shift".to_string(),
            note: None,
            deduction_amount: deduction.map(Money::from_cents),
        }
    }

    fn tab(name: &str) -> WarningListRequest {
        WarningListRequest { tab: Some(name.to_string()), ..Default::default() }
    }

    #[tokio::test]
    async fn issuing_links_a_deduction_and_notifies() {
        let harness = Harness::new();
        let mia = harness.account("Mia", Role::Manager, None).await;
        let eli = harness.account("Eli", Role::Employee, None).await;

        let warning = harness
            .workflows
            .issue_warning(&mia, warning_for(&eli.account.id.0, Some(1_250)))
            .await
            .expect("issue");
        assert_eq!(warning.deduction_amount, Some(Money::from_cents(1_250)));

        let (start, end) = (now() - Duration::days(1), now() + Duration::days(1));
        let deductions = harness
            .workflows
            .repositories()
            .warnings
            .deductions_between(Some(&[eli.account.id.clone()]), start, end)
            .await
            .expect("deductions");
        assert_eq!(deductions.len(), 1);
        assert_eq!(deductions[0].warning_id, Some(warning.id.clone()));

        let sent = harness.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::WarningIssued);
        assert_eq!(sent[0].recipient, eli.account.id);
    }

    #[tokio::test]
    async fn old_warnings_move_to_the_archive_tab_on_read() {
        let harness = Harness::new();
        let mia = harness.account("Mia", Role::Manager, None).await;
        let eli = harness.account("Eli", Role::Employee, None).await;

        let (old, _) = Warning::issue(
            &eli.account,
            &mia.actor(),
            "no show",
            None,
            None,
            now() - Duration::days(31),
        )
        .expect("old warning");
        let repos = harness.workflows.repositories();
        repos.warnings.insert(old.clone(), None).await.expect("insert old");
        harness
            .workflows
            .issue_warning(&mia, warning_for(&eli.account.id.0, None))
            .await
            .expect("fresh warning");

        let recent = harness.workflows.list_warnings(&eli, tab("recent")).await.expect("recent");
        assert_eq!(recent.items.len(), 1);
        assert_ne!(recent.items[0].id, old.id);

        let archive = harness.workflows.list_warnings(&eli, tab("archive")).await.expect("archive");
        assert_eq!(archive.items.len(), 1);
        assert_eq!(archive.items[0].id, old.id);
        assert!(archive.items[0].archived_at.is_some());

        assert_eq!(harness.workflows.unread_warning_count(&eli).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_owner_only() {
        let harness = Harness::new();
        let mia = harness.account("Mia", Role::Manager, None).await;
        let eli = harness.account("Eli", Role::Employee, None).await;
        let warning = harness
            .workflows
            .issue_warning(&mia, warning_for(&eli.account.id.0, None))
            .await
            .expect("issue");

        let error = harness.workflows.mark_warning_read(&mia, &warning.id).await.expect_err("owner");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::Permission(PermissionDenied::NotOwner))
        ));

        let first = harness.workflows.mark_warning_read(&eli, &warning.id).await.expect("read");
        let second = harness.workflows.mark_warning_read(&eli, &warning.id).await.expect("again");
        assert!(first.is_read);
        assert_eq!(first.read_at, second.read_at);
        assert_eq!(harness.workflows.unread_warning_count(&eli).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn scope_and_targets_are_enforced() {
        let harness = Harness::new();
        let scoped = harness.account("Mia", Role::Manager, None).await;
        let other = harness.account("Max", Role::Manager, None).await;
        let admin = harness.account("Ada", Role::Admin, None).await;
        let eli = harness.account("Eli", Role::Employee, None).await;
        let jo = harness.account("Jo", Role::Employee, None).await;
        harness.assign(&scoped, &eli).await;

        let error = harness
            .workflows
            .issue_warning(&scoped, warning_for(&jo.account.id.0, None))
            .await
            .expect_err("outside team");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::Permission(PermissionDenied::OutOfScope { .. }))
        ));

        let error = harness
            .workflows
            .issue_warning(&scoped, warning_for(&other.account.id.0, None))
            .await
            .expect_err("manager target");
        assert!(matches!(error, ApplicationError::Domain(DomainError::Permission(_))));

        let error = harness
            .workflows
            .issue_warning(&eli, warning_for(&jo.account.id.0, None))
            .await
            .expect_err("employee issuer");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::Permission(PermissionDenied::RoleNotAllowed { .. }))
        ));

        harness
            .workflows
            .issue_warning(&admin, warning_for(&other.account.id.0, None))
            .await
            .expect("admins may warn managers");

        let error = harness
            .workflows
            .list_warnings(
                &scoped,
                WarningListRequest { user_id: Some(jo.account.id.0.clone()), ..Default::default() },
            )
            .await
            .expect_err("cannot read outside team");
        assert!(matches!(error, ApplicationError::Domain(DomainError::Permission(_))));
    }

    #[tokio::test]
    async fn standalone_deductions_require_an_active_target() {
        let harness = Harness::new();
        let admin = harness.account("Ada", Role::Admin, None).await;
        let mia = harness.account("Mia", Role::Manager, None).await;
        let eli = harness.account("Eli", Role::Employee, None).await;

        let deduction = harness
            .workflows
            .issue_deduction(
                &mia,
                NewDeduction {
                    user_id: eli.account.id.0.clone(),
                    amount: Money::from_cents(500),
                    reason: "broken glass".to_string(),
                },
            )
            .await
            .expect("deduction");
        assert_eq!(deduction.warning_id, None);

        harness.workflows.deactivate_account(&admin, &eli.account.id).await.expect("deactivate");
        let error = harness
            .workflows
            .issue_deduction(
                &mia,
                NewDeduction {
                    user_id: eli.account.id.0.clone(),
                    amount: Money::from_cents(500),
                    reason: "again".to_string(),
                },
            )
            .await
            .expect_err("inactive");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::Permission(PermissionDenied::Inactive(_)))
        ));
    }

    #[tokio::test]
    async fn managers_archive_team_warnings_explicitly() {
        let harness = Harness::new();
        let mia = harness.account("Mia", Role::Manager, None).await;
        let eli = harness.account("Eli", Role::Employee, None).await;
        let warning = harness
            .workflows
            .issue_warning(&mia, warning_for(&eli.account.id.0, None))
            .await
            .expect("issue");

        let archived = harness.workflows.archive_warning(&mia, &warning.id).await.expect("archive");
        assert!(archived.archived_at.is_some());

        let recent = harness.workflows.list_warnings(&eli, tab("recent")).await.expect("recent");
        assert!(recent.items.is_empty());
        let archive = harness
            .workflows
            .list_warnings(
                &mia,
                WarningListRequest {
                    tab: Some("archive".to_string()),
                    user_id: Some(eli.account.id.0.clone()),
                    ..Default::default()
                },
            )
            .await
            .expect("manager view");
        assert_eq!(archive.items.len(), 1);
    }
}
