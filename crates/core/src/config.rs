use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pagination::{CursorCodec, PageLimits};

pub const MIN_CURSOR_SECRET_LEN: usize = 16;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub pagination: PaginationConfig,
    pub workflow: WorkflowConfig,
    pub attachments: AttachmentsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PaginationConfig {
    pub default_limit: u32,
    pub max_limit: u32,
    pub cursor_secret: SecretString,
}

impl PaginationConfig {
    pub fn limits(&self) -> PageLimits {
        PageLimits { default_limit: self.default_limit, max_limit: self.max_limit }
    }

    pub fn codec(&self) -> CursorCodec {
        CursorCodec::new(self.cursor_secret.expose_secret().as_bytes())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub refund_edit_window_hours: u32,
    pub coupon_validity_days: u32,
    pub coupon_code_max_attempts: u32,
    pub warning_archive_after_days: u32,
}

impl WorkflowConfig {
    pub fn refund_edit_window(&self) -> Duration {
        Duration::hours(i64::from(self.refund_edit_window_hours))
    }

    pub fn coupon_validity(&self) -> Duration {
        Duration::days(i64::from(self.coupon_validity_days))
    }

    pub fn warning_archive_after(&self) -> Duration {
        Duration::days(i64::from(self.warning_archive_after_days))
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            refund_edit_window_hours: 12,
            coupon_validity_days: 90,
            coupon_code_max_attempts: 10,
            warning_archive_after_days: 30,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AttachmentsConfig {
    pub root_dir: PathBuf,
    pub public_base_url: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub cursor_secret: Option<String>,
    pub attachments_root_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tally.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            pagination: PaginationConfig {
                default_limit: 20,
                max_limit: 100,
                cursor_secret: String::new().into(),
            },
            workflow: WorkflowConfig::default(),
            attachments: AttachmentsConfig {
                root_dir: PathBuf::from("data/attachments"),
                public_base_url: "/attachments".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tally.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(pagination) = patch.pagination {
            if let Some(default_limit) = pagination.default_limit {
                self.pagination.default_limit = default_limit;
            }
            if let Some(max_limit) = pagination.max_limit {
                self.pagination.max_limit = max_limit;
            }
            if let Some(cursor_secret) = pagination.cursor_secret {
                self.pagination.cursor_secret = cursor_secret.into();
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(hours) = workflow.refund_edit_window_hours {
                self.workflow.refund_edit_window_hours = hours;
            }
            if let Some(days) = workflow.coupon_validity_days {
                self.workflow.coupon_validity_days = days;
            }
            if let Some(attempts) = workflow.coupon_code_max_attempts {
                self.workflow.coupon_code_max_attempts = attempts;
            }
            if let Some(days) = workflow.warning_archive_after_days {
                self.workflow.warning_archive_after_days = days;
            }
        }

        if let Some(attachments) = patch.attachments {
            if let Some(root_dir) = attachments.root_dir {
                self.attachments.root_dir = root_dir;
            }
            if let Some(public_base_url) = attachments.public_base_url {
                self.attachments.public_base_url = public_base_url;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TALLY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = env_number("TALLY_DATABASE_MAX_CONNECTIONS")? {
            self.database.max_connections = value;
        }
        if let Some(value) = env_number("TALLY_DATABASE_TIMEOUT_SECS")? {
            self.database.timeout_secs = value;
        }

        if let Some(value) = read_env("TALLY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = env_number("TALLY_SERVER_PORT")? {
            self.server.port = value;
        }
        if let Some(value) = env_number("TALLY_SERVER_HEALTH_CHECK_PORT")? {
            self.server.health_check_port = value;
        }
        if let Some(value) = env_number("TALLY_SERVER_GRACEFUL_SHUTDOWN_SECS")? {
            self.server.graceful_shutdown_secs = value;
        }

        if let Some(value) = env_number("TALLY_PAGINATION_DEFAULT_LIMIT")? {
            self.pagination.default_limit = value;
        }
        if let Some(value) = env_number("TALLY_PAGINATION_MAX_LIMIT")? {
            self.pagination.max_limit = value;
        }
        if let Some(value) = read_env("TALLY_PAGINATION_CURSOR_SECRET") {
            self.pagination.cursor_secret = value.into();
        }

        if let Some(value) = env_number("TALLY_WORKFLOW_REFUND_EDIT_WINDOW_HOURS")? {
            self.workflow.refund_edit_window_hours = value;
        }
        if let Some(value) = env_number("TALLY_WORKFLOW_COUPON_VALIDITY_DAYS")? {
            self.workflow.coupon_validity_days = value;
        }
        if let Some(value) = env_number("TALLY_WORKFLOW_COUPON_CODE_MAX_ATTEMPTS")? {
            self.workflow.coupon_code_max_attempts = value;
        }
        if let Some(value) = env_number("TALLY_WORKFLOW_WARNING_ARCHIVE_AFTER_DAYS")? {
            self.workflow.warning_archive_after_days = value;
        }

        if let Some(value) = read_env("TALLY_ATTACHMENTS_ROOT_DIR") {
            self.attachments.root_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("TALLY_ATTACHMENTS_PUBLIC_BASE_URL") {
            self.attachments.public_base_url = value;
        }

        let log_level = read_env("TALLY_LOGGING_LEVEL").or_else(|| read_env("TALLY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("TALLY_LOGGING_FORMAT").or_else(|| read_env("TALLY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(cursor_secret) = overrides.cursor_secret {
            self.pagination.cursor_secret = cursor_secret.into();
        }
        if let Some(root_dir) = overrides.attachments_root_dir {
            self.attachments.root_dir = root_dir;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_pagination(&self.pagination)?;
        validate_workflow(&self.workflow)?;
        validate_attachments(&self.attachments)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tally.toml"), PathBuf::from("config/tally.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 || server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.port and server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.port == server.health_check_port {
        return Err(ConfigError::Validation(
            "server.health_check_port must differ from server.port".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_pagination(pagination: &PaginationConfig) -> Result<(), ConfigError> {
    if pagination.max_limit == 0 || pagination.default_limit == 0 {
        return Err(ConfigError::Validation(
            "pagination.default_limit and pagination.max_limit must be greater than zero"
                .to_string(),
        ));
    }
    if pagination.default_limit > pagination.max_limit {
        return Err(ConfigError::Validation(
            "pagination.default_limit must not exceed pagination.max_limit".to_string(),
        ));
    }

    let secret = pagination.cursor_secret.expose_secret();
    if secret.trim().is_empty() {
        return Err(ConfigError::Validation(
            "pagination.cursor_secret is required. Set TALLY_PAGINATION_CURSOR_SECRET or \
             [pagination].cursor_secret to a random string"
                .to_string(),
        ));
    }
    if secret.len() < MIN_CURSOR_SECRET_LEN {
        return Err(ConfigError::Validation(format!(
            "pagination.cursor_secret must be at least {MIN_CURSOR_SECRET_LEN} characters"
        )));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.refund_edit_window_hours == 0 {
        return Err(ConfigError::Validation(
            "workflow.refund_edit_window_hours must be greater than zero".to_string(),
        ));
    }
    if workflow.coupon_validity_days == 0 {
        return Err(ConfigError::Validation(
            "workflow.coupon_validity_days must be greater than zero".to_string(),
        ));
    }
    if workflow.coupon_code_max_attempts == 0 || workflow.coupon_code_max_attempts > 100 {
        return Err(ConfigError::Validation(
            "workflow.coupon_code_max_attempts must be in range 1..=100".to_string(),
        ));
    }
    if workflow.warning_archive_after_days == 0 {
        return Err(ConfigError::Validation(
            "workflow.warning_archive_after_days must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_attachments(attachments: &AttachmentsConfig) -> Result<(), ConfigError> {
    if attachments.root_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("attachments.root_dir must not be empty".to_string()));
    }
    let base = attachments.public_base_url.trim();
    let acceptable =
        base.starts_with('/') || base.starts_with("http://") || base.starts_with("https://");
    if !acceptable {
        return Err(ConfigError::Validation(
            "attachments.public_base_url must be an absolute path or start with http:// or https://"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_number<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    read_env(key)
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
                key: key.to_string(),
                value,
            })
        })
        .transpose()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    pagination: Option<PaginationPatch>,
    workflow: Option<WorkflowPatch>,
    attachments: Option<AttachmentsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PaginationPatch {
    default_limit: Option<u32>,
    max_limit: Option<u32>,
    cursor_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    refund_edit_window_hours: Option<u32>,
    coupon_validity_days: Option<u32>,
    coupon_code_max_attempts: Option<u32>,
    warning_archive_after_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AttachmentsPatch {
    root_dir: Option<PathBuf>,
    public_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const TEST_SECRET: &str = "cursor-secret-for-tests";

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_TALLY_CURSOR_SECRET", "interpolated-cursor-secret");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tally.toml");
            fs::write(
                &path,
                r#"
[pagination]
cursor_secret = "${TEST_TALLY_CURSOR_SECRET}"
max_limit = 50

[workflow]
coupon_validity_days = 60
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.pagination.cursor_secret.expose_secret() == "interpolated-cursor-secret",
                "cursor secret should be loaded from environment",
            )?;
            ensure(config.pagination.max_limit == 50, "file max_limit should apply")?;
            ensure(config.workflow.coupon_validity_days == 60, "file validity should apply")?;
            ensure(
                config.workflow.refund_edit_window_hours == 12,
                "unset workflow keys keep defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_TALLY_CURSOR_SECRET"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TALLY_PAGINATION_CURSOR_SECRET", TEST_SECRET);
        env::set_var("TALLY_LOG_LEVEL", "warn");
        env::set_var("TALLY_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["TALLY_PAGINATION_CURSOR_SECRET", "TALLY_LOG_LEVEL", "TALLY_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TALLY_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("TALLY_SERVER_PORT", "9100");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tally.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[server]
port = 9000

[pagination]
cursor_secret = "file-cursor-secret-value"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.server.port == 9100, "env port should win over file")?;
            ensure(
                config.pagination.cursor_secret.expose_secret() == "file-cursor-secret-value",
                "file secret should win over defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["TALLY_DATABASE_URL", "TALLY_SERVER_PORT"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TALLY_PAGINATION_CURSOR_SECRET", "short");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("pagination.cursor_secret")
            );
            ensure(has_message, "validation failure should mention pagination.cursor_secret")
        })();

        clear_vars(&["TALLY_PAGINATION_CURSOR_SECRET"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TALLY_PAGINATION_CURSOR_SECRET", TEST_SECRET);
        env::set_var("TALLY_WORKFLOW_COUPON_CODE_MAX_ATTEMPTS", "ten");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env parse failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "TALLY_WORKFLOW_COUPON_CODE_MAX_ATTEMPTS"
                ),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["TALLY_PAGINATION_CURSOR_SECRET", "TALLY_WORKFLOW_COUPON_CODE_MAX_ATTEMPTS"]);
        result
    }

    #[test]
    fn numeric_env_overrides_parse_into_the_field_width() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        let vars = [
            "TALLY_PAGINATION_CURSOR_SECRET",
            "TALLY_DATABASE_TIMEOUT_SECS",
            "TALLY_WORKFLOW_COUPON_VALIDITY_DAYS",
            "TALLY_SERVER_HEALTH_CHECK_PORT",
        ];

        env::set_var("TALLY_PAGINATION_CURSOR_SECRET", TEST_SECRET);
        env::set_var("TALLY_DATABASE_TIMEOUT_SECS", " 45 ");
        env::set_var("TALLY_WORKFLOW_COUPON_VALIDITY_DAYS", "90");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.database.timeout_secs == 45, "padded u64 override should apply")?;
            ensure(config.workflow.coupon_validity_days == 90, "u32 override should apply")?;

            env::set_var("TALLY_SERVER_HEALTH_CHECK_PORT", "70000");
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("a port above u16 range should be rejected".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, ref value }
                        if key == "TALLY_SERVER_HEALTH_CHECK_PORT" && value == "70000"
                ),
                "overflowing port should name the variable and value",
            )
        })();

        clear_vars(&vars);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    cursor_secret: Some("super-secret-cursor-key".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("super-secret-cursor-key"),
                "debug output should not contain the cursor secret",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(config.pagination.limits().default_limit == 20, "default page size is 20")?;
            Ok(())
        })();

        result
    }
}
