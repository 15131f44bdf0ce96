//! Environment configuration

use std::time::Duration;

use thiserror::Error;

use crate::services::ReconcileStrategy;

pub const DEFAULT_PORT: u16 = 8083;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid { key: &'static str, value: String, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    /// Postgres URL; without one the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub store_timeout: Duration,
    pub reconcile_strategy: ReconcileStrategy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            database_max_connections: DEFAULT_MAX_CONNECTIONS,
            nats_url: None,
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
            reconcile_strategy: ReconcileStrategy::default(),
        }
    }
}

impl Config {
    /// Reads the process environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|key| dotenvy::var(key).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();
        Ok(Self {
            port: parse(get("PORT"), "PORT")?.unwrap_or(defaults.port),
            database_url: get("DATABASE_URL"),
            database_max_connections: parse(get("DATABASE_MAX_CONNECTIONS"), "DATABASE_MAX_CONNECTIONS")?
                .unwrap_or(defaults.database_max_connections),
            nats_url: get("NATS_URL"),
            store_timeout: parse::<u64>(get("STORE_TIMEOUT_SECS"), "STORE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.store_timeout),
            reconcile_strategy: parse(get("RECONCILE_STRATEGY"), "RECONCILE_STRATEGY")?.unwrap_or(defaults.reconcile_strategy),
        })
    }
}

fn parse<T>(value: Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|v| v.parse::<T>().map_err(|e| ConfigError::Invalid { key, reason: e.to_string(), value: v }))
        .transpose()
}
