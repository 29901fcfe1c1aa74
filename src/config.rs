use anyhow::{Context, Result};
use std::str::FromStr;

pub const ENV_DATABASE_URL: &str = "ORDERS_DATABASE_URL";
pub const ENV_DB_MAX_CONNECTIONS: &str = "ORDERS_DB_MAX_CONNECTIONS";
pub const ENV_METRICS_PORT: &str = "ORDERS_METRICS_PORT";
pub const ENV_METRICS_ENABLED: &str = "ORDERS_METRICS_ENABLED";
pub const ENV_COMMAND_MAX_ATTEMPTS: &str = "ORDERS_COMMAND_MAX_ATTEMPTS";

/// Runtime settings, read from `ORDERS_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Postgres connection string; the in-memory store is used when unset
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub metrics_port: u16,
    pub metrics_enabled: bool,
    /// Attempts per order command when saves hit a version conflict
    pub command_max_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: 10,
            metrics_port: 9090,
            metrics_enabled: true,
            command_max_attempts: 3,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let database_url = lookup(ENV_DATABASE_URL).filter(|url| !url.trim().is_empty());

        Ok(Self {
            database_url,
            db_max_connections: parse_or(&lookup, ENV_DB_MAX_CONNECTIONS, defaults.db_max_connections)?,
            metrics_port: parse_or(&lookup, ENV_METRICS_PORT, defaults.metrics_port)?,
            metrics_enabled: parse_or(&lookup, ENV_METRICS_ENABLED, defaults.metrics_enabled)?,
            command_max_attempts: parse_or(&lookup, ENV_COMMAND_MAX_ATTEMPTS, defaults.command_max_attempts)?,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
