//! Runtime configuration loaded from environment variables.
//!
//! `AppConfig::from_env` reads a `.env` file first if one exists, then the
//! process environment. Every variable is optional; invalid values are
//! errors rather than silently replaced by defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use todo_core::{StoreConfig, DEFAULT_BUSY_TIMEOUT};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_DATABASE_URL: &str = "sqlite://todos.db";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unsupported log format `{other}`; expected text|json")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub busy_timeout: Duration,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            log_format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from `.env` (if present) and the environment.
    ///
    /// # Environment Variables
    ///
    /// - `HOST`: bind address (default `0.0.0.0`)
    /// - `PORT`: listening port (default `5000`)
    /// - `DATABASE_URL`: SQLite file, optionally `sqlite://`-prefixed
    ///   (default `sqlite://todos.db`)
    /// - `DATABASE_BUSY_TIMEOUT_MS`: per-connection busy timeout (default `5000`)
    /// - `LOG_FORMAT`: `text` or `json` (default `text`)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let busy_timeout = match parse_optional::<u64, _>(&lookup, "DATABASE_BUSY_TIMEOUT_MS")? {
            Some(millis) => Duration::from_millis(millis),
            None => defaults.busy_timeout,
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_optional(&lookup, "PORT")?.unwrap_or(defaults.port),
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            busy_timeout,
            log_format: parse_optional(&lookup, "LOG_FORMAT")?.unwrap_or(defaults.log_format),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::from_url(&self.database_url).with_busy_timeout(self.busy_timeout)
    }
}

fn parse_optional<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: err.to_string(),
            })
        })
        .transpose()
}
