//! Request-scoped workflow services.
//!
//! Each operation takes the authenticated [`Caller`], resolves team scope
//! through [`TeamPolicy`], applies the domain transition and persists it.
//! Handlers in `api` only translate HTTP in and out of these calls.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tally_core::authz::{Actor, TeamPolicy};
use tally_core::config::{AppConfig, WorkflowConfig};
use tally_core::domain::user::{UserAccount, UserId};
use tally_core::errors::{ApplicationError, DomainError};
use tally_core::pagination::{CursorCodec, PageLimits, PageQuery};
use tally_core::{AttachmentStore, Notifier};
use tally_db::Repositories;

pub mod accounts;
pub mod coupons;
pub mod orders;
pub mod payroll;
pub mod refunds;
pub mod warnings;

/// The authenticated account behind one request.
#[derive(Clone, Debug)]
pub struct Caller {
    pub account: UserAccount,
    pub correlation_id: String,
}

impl Caller {
    pub fn new(account: UserAccount, correlation_id: impl Into<String>) -> Self {
        Self { account, correlation_id: correlation_id.into() }
    }

    pub fn actor(&self) -> Actor {
        self.account.actor()
    }

    pub fn id(&self) -> &UserId {
        &self.account.id
    }
}

/// Collaborators shared by every workflow.
#[derive(Clone)]
pub struct Workflows {
    pub(crate) repos: Repositories,
    pub(crate) policy: TeamPolicy,
    pub(crate) codec: CursorCodec,
    pub(crate) limits: PageLimits,
    pub(crate) settings: WorkflowConfig,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) attachments: Arc<dyn AttachmentStore>,
}

impl Workflows {
    pub fn new(
        repos: Repositories,
        config: &AppConfig,
        notifier: Arc<dyn Notifier>,
        attachments: Arc<dyn AttachmentStore>,
    ) -> Self {
        let policy = TeamPolicy::new(Arc::new(repos.scope_resolver()));
        Self {
            repos,
            policy,
            codec: config.pagination.codec(),
            limits: config.pagination.limits(),
            settings: config.workflow,
            notifier,
            attachments,
        }
    }

    #[cfg(test)]
    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    /// Turns a caller's raw cursor and limit into a repository page request.
    pub(crate) fn page_query(&self, cursor: Option<&str>, limit: Option<u32>) -> PageQuery {
        PageQuery { after: self.codec.decode_lenient(cursor), limit: self.limits.resolve(limit) }
    }

    pub(crate) async fn load_user(&self, id: &UserId) -> Result<UserAccount, ApplicationError> {
        self.repos
            .users
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("user", id.0.clone()).into())
    }

    /// Active account lookup used for identity resolution.
    pub async fn authenticate(
        &self,
        id: &UserId,
    ) -> Result<Option<UserAccount>, ApplicationError> {
        Ok(self.repos.users.find_by_id(id).await?)
    }
}

pub(crate) fn now() -> DateTime<Utc> {
    tally_core::domain::current_time()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::Utc;
    use tally_core::authz::Role;
    use tally_core::config::AppConfig;
    use tally_core::domain::user::{TeamAssignment, UserAccount};
    use tally_core::money::Money;
    use tally_core::{InMemoryAttachmentStore, InMemoryNotifier};
    use tally_db::Repositories;

    use super::{Caller, Workflows};

    pub struct Harness {
        pub workflows: Workflows,
        pub notifier: InMemoryNotifier,
        pub attachments: InMemoryAttachmentStore,
    }

    impl Harness {
        pub fn new() -> Self {
            let mut config = AppConfig::default();
            config.pagination.cursor_secret = "workflow-test-cursor-secret".to_string().into();
            let notifier = InMemoryNotifier::default();
            let attachments = InMemoryAttachmentStore::default();
            let workflows = Workflows::new(
                Repositories::in_memory(),
                &config,
                Arc::new(notifier.clone()),
                Arc::new(attachments.clone()),
            );
            Self { workflows, notifier, attachments }
        }

        pub async fn account(&self, name: &str, role: Role, rate: Option<&str>) -> Caller {
            let rate = rate.map(|raw| Money::parse("rate", raw).expect("rate"));
            let account = UserAccount::new(name, role, rate, Utc::now()).expect("account");
            self.workflows.repos.users.save(account.clone()).await.expect("save account");
            Caller::new(account, format!("test-{name}"))
        }

        pub async fn assign(&self, manager: &Caller, employee: &Caller) {
            let assignment =
                TeamAssignment::new(&manager.account, &employee.account, Utc::now()).expect("pair");
            self.workflows.repos.teams.assign(assignment).await.expect("assign");
        }
    }
}
