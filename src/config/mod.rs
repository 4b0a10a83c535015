use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::clients::betterstack::DEFAULT_BASE_URL;
use crate::clients::retry::{DEFAULT_FALLBACK_WAIT, DEFAULT_MAX_RETRIES};
use crate::clients::RetryPolicy;

pub const DEFAULT_ACK_COMMENT: &str = "Acknowledged by Better Stack";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is required")]
    Missing(&'static str),

    #[error("environment variable {key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Which correlation store backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackendKind {
    Sqlite,
    Memory,
}

impl FromStr for StoreBackendKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Settings the correlation engine and reverse sync need at request time.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Requester for created incidents and fallback actor for ack/resolve.
    pub default_contact_email: String,
    /// Comment attached to acknowledgements pushed back to Nagios.
    pub ack_comment: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_backend: StoreBackendKind,
    pub sqlite_db_path: Option<String>,
    pub backup_directory: PathBuf,
    pub backup_interval: Duration,
    pub better_stack_api_key: String,
    pub better_stack_base_url: String,
    pub nagios_api_user: String,
    pub nagios_api_key: String,
    pub nagios_base_url: String,
    pub nagios_site_name: String,
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
    pub retry: RetryPolicy,
    pub relay: RelaySettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_backend = optional_parsed("STORE_BACKEND", StoreBackendKind::Sqlite)?;
        let sqlite_db_path = match store_backend {
            StoreBackendKind::Sqlite => Some(required("SQLITE_DB_PATH")?),
            StoreBackendKind::Memory => env::var("SQLITE_DB_PATH").ok(),
        };

        Ok(Self {
            store_backend,
            sqlite_db_path,
            backup_directory: PathBuf::from(required("BACKUP_DIRECTORY")?),
            backup_interval: Duration::from_secs(required_parsed("BACKUP_INTERVAL_SECS")?),
            better_stack_api_key: required("BETTER_STACK_API_KEY")?,
            better_stack_base_url: env::var("BETTER_STACK_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            nagios_api_user: required("NAGIOS_THRUK_API_USER")?,
            nagios_api_key: required("NAGIOS_THRUK_API_KEY")?,
            nagios_base_url: required("NAGIOS_THRUK_BASE_URL")?,
            nagios_site_name: required("NAGIOS_THRUK_SITE_NAME")?,
            host: env::var("BACKEND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: optional_parsed("BACKEND_PORT", 8080)?,
            request_timeout: Duration::from_secs(optional_parsed("REQUEST_TIMEOUT_SECS", 120)?),
            shutdown_grace: Duration::from_secs(optional_parsed("SHUTDOWN_GRACE_SECS", 30)?),
            retry: RetryPolicy {
                max_retries: optional_parsed("RATE_LIMIT_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
                fallback_wait: Duration::from_secs(optional_parsed(
                    "RATE_LIMIT_FALLBACK_WAIT_SECS",
                    DEFAULT_FALLBACK_WAIT.as_secs(),
                )?),
            },
            relay: RelaySettings {
                default_contact_email: required("BETTER_STACK_DEFAULT_CONTACT_EMAIL")?,
                ack_comment: env::var("MONITORING_ACK_COMMENT")
                    .ok()
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_ACK_COMMENT.to_string()),
            },
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn required_parsed<T: FromStr>(key: &'static str) -> Result<T, ConfigError> {
    let value = required(key)?;
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

fn optional_parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        _ => Ok(default),
    }
}
