//! Application configuration loaded from environment variables.

use crate::error::{AppError, Result};
use std::env;
use std::time::Duration;

/// Log output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Whitelist synchronization tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Whitelist entries per `whitelist_add_batch` command
    pub batch_size: i64,

    /// Wall-clock limit for one sync run, checked lazily on the next poll
    pub timeout: Duration,

    /// Maximum plate entries in one `white_list_operate` block (vendor limit)
    pub operate_limit: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            timeout: Duration::from_secs(30 * 60),
            operate_limit: 5,
        }
    }
}

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Database connection URL (`memory://` selects the in-memory store)
    pub database_url: String,

    /// Server bind address (host:port)
    pub bind_address: String,

    /// Log level
    pub log_level: String,

    /// Log output format
    pub log_format: LogFormat,

    /// Maximum Postgres pool connections
    pub db_max_connections: u32,

    pub sync: SyncSettings,
}

redacted_debug!(Config {
    redact database_url,
    show bind_address,
    show log_level,
    show log_format,
    show db_max_connections,
    show sync,
});

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SyncSettings::default();

        let batch_size: i64 = parse_or(&lookup, "WHITELIST_SYNC_BATCH_SIZE", defaults.batch_size)?;
        if batch_size < 1 {
            return Err(AppError::Config(
                "WHITELIST_SYNC_BATCH_SIZE must be at least 1".into(),
            ));
        }
        let timeout_minutes: u64 = parse_or(&lookup, "WHITELIST_SYNC_TIMEOUT_MINUTES", 30)?;
        let timeout_secs = timeout_minutes.checked_mul(60).ok_or_else(|| {
            AppError::Config(format!(
                "WHITELIST_SYNC_TIMEOUT_MINUTES ({}) is too large",
                timeout_minutes
            ))
        })?;
        let operate_limit: usize =
            parse_or(&lookup, "WHITELIST_OPERATE_LIMIT", defaults.operate_limit)?;
        if operate_limit < batch_size as usize {
            return Err(AppError::Config(format!(
                "WHITELIST_OPERATE_LIMIT ({}) must not be smaller than WHITELIST_SYNC_BATCH_SIZE ({})",
                operate_limit, batch_size
            )));
        }

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "LOG_FORMAT must be 'text' or 'json', got '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| AppError::Config("DATABASE_URL not set".into()))?,
            bind_address: lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:5174".into()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            log_format,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 20)?,
            sync: SyncSettings {
                batch_size,
                timeout: Duration::from_secs(timeout_secs),
                operate_limit,
            },
        })
    }

    /// Whether the in-memory store was requested instead of Postgres.
    pub fn uses_memory_store(&self) -> bool {
        self.database_url.starts_with("memory://")
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: '{}'", key, raw))),
    }
}
