use std::sync::Arc;

use tally_core::config::{AppConfig, ConfigError, LoadOptions};
use tally_core::TracingNotifier;
use tally_db::{connect_with_settings, migrations, DbPool, Repositories};
use thiserror::Error;
use tracing::info;

use crate::attachments::DiskAttachmentStore;
use crate::workflows::Workflows;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub workflows: Workflows,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Connects, migrates and wires the workflow services for an already loaded config.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let workflows = Workflows::new(
        Repositories::sql(db_pool.clone()),
        &config,
        Arc::new(TracingNotifier),
        Arc::new(DiskAttachmentStore::new(&config.attachments)),
    );

    Ok(Application { config, db_pool, workflows })
}

#[cfg(test)]
mod tests {
    use tally_core::authz::Role;
    use tally_core::config::{ConfigOverrides, LoadOptions};
    use tally_core::domain::user::UserId;
    use tally_db::DemoSeedDataset;
    use tempfile::TempDir;

    use crate::bootstrap::bootstrap;
    use crate::workflows::Caller;

    fn overrides(dir: &TempDir, secret: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(format!(
                    "sqlite://{}?mode=rwc",
                    dir.path().join("tally.db").display()
                )),
                cursor_secret: Some(secret.to_string()),
                attachments_root_dir: Some(dir.path().join("attachments")),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_a_short_cursor_secret() {
        let dir = TempDir::new().expect("tempdir");
        let result = bootstrap(overrides(&dir, "short")).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("pagination.cursor_secret"), "{message}");
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_serves_seeded_payroll() {
        let dir = TempDir::new().expect("tempdir");
        let app = bootstrap(overrides(&dir, "bootstrap-test-cursor-secret"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('actor', 'team_assignment', 'order_submission', 'refund_request', 'coupon', \
              'coupon_clear_history', 'warning', 'deduction')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("tables");
        assert_eq!(table_count, 8);

        DemoSeedDataset::load(&app.db_pool).await.expect("seed");
        let admin = app
            .workflows
            .authenticate(&UserId("usr-demo-admin".to_string()))
            .await
            .expect("lookup")
            .expect("seeded admin");
        assert_eq!(admin.role, Role::Admin);

        let caller = Caller::new(admin, "bootstrap-test");
        let everyone = app.workflows.list_accounts(&caller, true).await.expect("accounts");
        assert_eq!(everyone.len(), 6);

        let report = app
            .workflows
            .salary(&caller, Some(UserId("usr-demo-eli".to_string())), Some("2024-01"))
            .await
            .expect("salary");
        assert_eq!(report.approved_orders_count, 10);
        assert_eq!(report.salary.to_string(), "45.00");
    }
}
