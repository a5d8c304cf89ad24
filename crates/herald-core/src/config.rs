//! RelayConfig - 起動時設定と検証
//!
//! 値の読み込み（CLI フラグ / 環境変数）は herald-cli が clap で行う。
//! ここでは「起動してよいか」だけを判定する。検証に通らなければ
//! どのタスクも起動せずにプロセスを終了する（Fail-fast）。

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::impls::is_valid_table_name;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BATCH_SIZE: u32 = 100;
pub const DEFAULT_ADAPTER_OUTBOX_TABLE: &str = "adapter_outbox";
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DATABASE_URL is required")]
    MissingDatabaseUrl,

    #[error("MATRIX_HOMESERVER_URL is required")]
    MissingHomeserverUrl,

    #[error("MATRIX_HOMESERVER_URL is not a valid http(s) url: {0}")]
    InvalidHomeserverUrl(String),

    #[error("MATRIX_USER_ID is required")]
    MissingUserId,

    #[error("MATRIX_USER_ID must look like @user:domain, got {0:?}")]
    InvalidUserId(String),

    #[error("MATRIX_ACCESS_TOKEN is required")]
    MissingAccessToken,

    #[error("POLL_INTERVAL must be greater than zero")]
    ZeroPollInterval,

    #[error("MAX_RETRIES must be >= 1")]
    InvalidMaxRetries,

    #[error("OUTBOX_BATCH_SIZE must be >= 1")]
    InvalidBatchSize,

    #[error("OUTBOX_TABLES is required")]
    MissingOutboxTables,

    #[error("outbox table name contains invalid characters: {0:?}")]
    InvalidTableName(String),

    #[error("invalid duration {0:?} (expected e.g. 500ms, 5s, 2m, 1h)")]
    InvalidDuration(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub database_url: String,
    pub homeserver_url: String,
    pub user_id: String,
    pub access_token: String,
    pub poll_interval: Duration,
    pub max_retries: u32,
    pub batch_size: u32,
    pub allowed_rooms: Vec<String>,
    pub outbox_tables: Vec<String>,
    pub adapter_outbox_table: String,
    pub shutdown_timeout: Duration,
    pub sync_timeout: Duration,
}

impl RelayConfig {
    /// Check every startup rule, in the order an operator would fix them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::MissingDatabaseUrl);
        }
        let homeserver = self.homeserver_url.trim();
        if homeserver.is_empty() {
            return Err(ConfigError::MissingHomeserverUrl);
        }
        match Url::parse(homeserver) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(ConfigError::InvalidHomeserverUrl(homeserver.to_string())),
        }
        let user_id = self.user_id.trim();
        if user_id.is_empty() {
            return Err(ConfigError::MissingUserId);
        }
        if !is_valid_user_id(user_id) {
            return Err(ConfigError::InvalidUserId(user_id.to_string()));
        }
        if self.access_token.trim().is_empty() {
            return Err(ConfigError::MissingAccessToken);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.max_retries < 1 {
            return Err(ConfigError::InvalidMaxRetries);
        }
        if self.batch_size < 1 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.outbox_tables.is_empty() {
            return Err(ConfigError::MissingOutboxTables);
        }
        for table in self
            .outbox_tables
            .iter()
            .chain(std::iter::once(&self.adapter_outbox_table))
        {
            if !is_valid_table_name(table) {
                return Err(ConfigError::InvalidTableName(table.clone()));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("homeserver_url", &self.homeserver_url)
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .field("poll_interval", &self.poll_interval)
            .field("max_retries", &self.max_retries)
            .field("batch_size", &self.batch_size)
            .field("allowed_rooms", &self.allowed_rooms)
            .field("outbox_tables", &self.outbox_tables)
            .field("adapter_outbox_table", &self.adapter_outbox_table)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("sync_timeout", &self.sync_timeout)
            .finish_non_exhaustive()
    }
}

/// `@localpart:server`
pub fn is_valid_user_id(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.starts_with('@') && trimmed.contains(':')
}

/// Split a comma-separated list, dropping blank entries.
pub fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a human-readable duration such as `500ms`, `5s`, or `1h 30m`.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(input.trim())
        .map_err(|_| ConfigError::InvalidDuration(input.to_string()))
}
