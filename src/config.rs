//! Application configuration
//!
//! Values come from environment variables with defaults; command line flags
//! override them in `main`.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::db::{Database, EmptyTagsPolicy, StoreOptions};

// Environment variable names
pub const ENV_HTTP_PORT: &str = "HTTP_PORT";
pub const ENV_DB_PATH: &str = "CAMP_DB_PATH";
pub const ENV_REQUEST_TIMEOUT: &str = "CAMP_REQUEST_TIMEOUT_SECS";
pub const ENV_SHUTDOWN_TIMEOUT: &str = "CAMP_SHUTDOWN_TIMEOUT_SECS";
pub const ENV_EMPTY_TAGS: &str = "CAMP_EMPTY_TAGS";

pub const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_port: u16,
    pub db_path: PathBuf,
    /// Upper bound for one request's database work.
    pub request_timeout: Duration,
    /// Upper bound for running all shutdown hooks.
    pub shutdown_timeout: Duration,
    pub store: StoreOptions,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or blank keys use defaults;
    /// present but malformed values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let http_port = match get(ENV_HTTP_PORT) {
            Some(v) => v
                .trim()
                .parse()
                .with_context(|| format!("{} must be a port number, got {:?}", ENV_HTTP_PORT, v))?,
            None => DEFAULT_HTTP_PORT,
        };

        let db_path = match get(ENV_DB_PATH) {
            Some(v) => PathBuf::from(v),
            None => Database::default_path()?,
        };

        let request_timeout = parse_secs(get(ENV_REQUEST_TIMEOUT), ENV_REQUEST_TIMEOUT)?
            .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));
        let shutdown_timeout = parse_secs(get(ENV_SHUTDOWN_TIMEOUT), ENV_SHUTDOWN_TIMEOUT)?
            .unwrap_or(Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS));

        let mut store = StoreOptions::default();
        if let Some(v) = get(ENV_EMPTY_TAGS) {
            store.empty_tags = EmptyTagsPolicy::parse(&v).ok_or_else(|| {
                anyhow!("{} must be \"reject\" or \"ignore\", got {:?}", ENV_EMPTY_TAGS, v)
            })?;
        }

        Ok(Self {
            http_port,
            db_path,
            request_timeout,
            shutdown_timeout,
            store,
        })
    }

    pub fn open_database(&self) -> Result<Database> {
        Database::open_at(&self.db_path, self.store.clone())
            .with_context(|| format!("failed to open database at {}", self.db_path.display()))
    }
}

fn parse_secs(value: Option<String>, key: &str) -> Result<Option<Duration>> {
    match value {
        Some(v) => {
            let secs: u64 = v
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds, got {:?}", key, v))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[(ENV_DB_PATH, "/tmp/camp.db")])).unwrap();
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.db_path, PathBuf::from("/tmp/camp.db"));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(config.store.empty_tags, EmptyTagsPolicy::Reject);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            (ENV_HTTP_PORT, "9000"),
            (ENV_DB_PATH, "/tmp/other.db"),
            (ENV_REQUEST_TIMEOUT, "3"),
            (ENV_SHUTDOWN_TIMEOUT, "1"),
            (ENV_EMPTY_TAGS, "ignore"),
        ]))
        .unwrap();
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.store.empty_tags, EmptyTagsPolicy::Ignore);
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = AppConfig::from_lookup(lookup(&[
            (ENV_HTTP_PORT, "  "),
            (ENV_DB_PATH, "/tmp/camp.db"),
        ]))
        .unwrap();
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
    }

    #[test]
    fn test_malformed_values_are_errors() {
        assert!(AppConfig::from_lookup(lookup(&[
            (ENV_HTTP_PORT, "http"),
            (ENV_DB_PATH, "/tmp/camp.db"),
        ]))
        .is_err());
        assert!(AppConfig::from_lookup(lookup(&[
            (ENV_EMPTY_TAGS, "sometimes"),
            (ENV_DB_PATH, "/tmp/camp.db"),
        ]))
        .is_err());
        assert!(AppConfig::from_lookup(lookup(&[
            (ENV_REQUEST_TIMEOUT, "-1"),
            (ENV_DB_PATH, "/tmp/camp.db"),
        ]))
        .is_err());
    }
}
