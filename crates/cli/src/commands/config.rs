use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use tally_core::config::{AppConfig, LoadOptions};
use toml::Value;

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source =
            field_source(&field, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    vec![
        field("database.url", &["TALLY_DATABASE_URL"], config.database.url.clone()),
        field(
            "database.max_connections",
            &["TALLY_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        field(
            "database.timeout_secs",
            &["TALLY_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs.to_string(),
        ),
        field(
            "server.bind_address",
            &["TALLY_SERVER_BIND_ADDRESS"],
            config.server.bind_address.clone(),
        ),
        field("server.port", &["TALLY_SERVER_PORT"], config.server.port.to_string()),
        field(
            "server.health_check_port",
            &["TALLY_SERVER_HEALTH_CHECK_PORT"],
            config.server.health_check_port.to_string(),
        ),
        field(
            "server.graceful_shutdown_secs",
            &["TALLY_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            config.server.graceful_shutdown_secs.to_string(),
        ),
        field(
            "pagination.default_limit",
            &["TALLY_PAGINATION_DEFAULT_LIMIT"],
            config.pagination.default_limit.to_string(),
        ),
        field(
            "pagination.max_limit",
            &["TALLY_PAGINATION_MAX_LIMIT"],
            config.pagination.max_limit.to_string(),
        ),
        field(
            "pagination.cursor_secret",
            &["TALLY_PAGINATION_CURSOR_SECRET"],
            redact_secret(config.pagination.cursor_secret.expose_secret()),
        ),
        field(
            "workflow.refund_edit_window_hours",
            &["TALLY_WORKFLOW_REFUND_EDIT_WINDOW_HOURS"],
            config.workflow.refund_edit_window_hours.to_string(),
        ),
        field(
            "workflow.coupon_validity_days",
            &["TALLY_WORKFLOW_COUPON_VALIDITY_DAYS"],
            config.workflow.coupon_validity_days.to_string(),
        ),
        field(
            "workflow.coupon_code_max_attempts",
            &["TALLY_WORKFLOW_COUPON_CODE_MAX_ATTEMPTS"],
            config.workflow.coupon_code_max_attempts.to_string(),
        ),
        field(
            "workflow.warning_archive_after_days",
            &["TALLY_WORKFLOW_WARNING_ARCHIVE_AFTER_DAYS"],
            config.workflow.warning_archive_after_days.to_string(),
        ),
        field(
            "attachments.root_dir",
            &["TALLY_ATTACHMENTS_ROOT_DIR"],
            config.attachments.root_dir.display().to_string(),
        ),
        field(
            "attachments.public_base_url",
            &["TALLY_ATTACHMENTS_PUBLIC_BASE_URL"],
            config.attachments.public_base_url.clone(),
        ),
        field(
            "logging.level",
            &["TALLY_LOGGING_LEVEL", "TALLY_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        field(
            "logging.format",
            &["TALLY_LOGGING_FORMAT", "TALLY_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn field(key: &'static str, env_keys: &'static [&'static str], value: String) -> Field {
    Field { key, env_keys, value }
}

fn detect_config_path() -> Option<PathBuf> {
    ["tally.toml", "config/tally.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    field: &Field,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if config_file_doc.is_some_and(|doc| contains_path(doc, field.key)) {
        let file_path = config_file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    key_path.split('.').try_fold(root, |current, key| current.get(key)).is_some()
}

fn redact_secret(secret: &str) -> String {
    if secret.trim().is_empty() {
        "<unset>".to_string()
    } else {
        format!("<redacted; {} chars>", secret.chars().count())
    }
}
