//! Environment-driven settings.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default prefix of every index and alias name.
const DEFAULT_INDEX_PREFIX: &str = "search";

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

/// Default PostgreSQL URL.
const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/datahub";

/// Default size of the PostgreSQL connection pool.
const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default number of rows per bulk request.
pub const DEFAULT_BULK_BATCH_SIZE: usize = 2000;

/// Default delay between job store polls when no job is due.
const DEFAULT_WORKER_POLL_INTERVAL_MS: u64 = 1000;

/// Default number of primary shards per index.
const DEFAULT_NUMBER_OF_SHARDS: u32 = 1;

/// Default number of replicas per primary shard.
const DEFAULT_NUMBER_OF_REPLICAS: u32 = 1;

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry connection at a fixed interval until successful.
    Retry,
}

impl ConnectionMode {
    /// Parse a connection mode.
    ///
    /// Valid values: "fail-fast" or "retry" (case-insensitive).
    /// Anything else falls back to "retry".
    fn parse(value: Option<&str>) -> Self {
        match value.unwrap_or("retry").to_lowercase().as_str() {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            other => {
                warn!(value = other, "Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// Process configuration, read once at start-up.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub opensearch_url: String,
    pub index_prefix: String,
    pub connection_mode: ConnectionMode,
    pub retry_interval: Duration,
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    pub database_url: String,
    pub database_max_connections: u32,
    pub bulk_batch_size: usize,
    pub worker_poll_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            opensearch_url: DEFAULT_OPENSEARCH_URL.to_string(),
            index_prefix: DEFAULT_INDEX_PREFIX.to_string(),
            connection_mode: ConnectionMode::Retry,
            retry_interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
            number_of_shards: DEFAULT_NUMBER_OF_SHARDS,
            number_of_replicas: DEFAULT_NUMBER_OF_REPLICAS,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            database_max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            bulk_batch_size: DEFAULT_BULK_BATCH_SIZE,
            worker_poll_interval: Duration::from_millis(DEFAULT_WORKER_POLL_INTERVAL_MS),
        }
    }
}

impl Settings {
    /// Read settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `OPENSEARCH_INDEX_PREFIX`: Prefix of index and alias names (default: search)
    /// - `OPENSEARCH_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: Retry interval in seconds (default: 15)
    /// - `OPENSEARCH_NUMBER_OF_SHARDS` / `OPENSEARCH_NUMBER_OF_REPLICAS` (default: 1 / 1)
    /// - `DATABASE_URL`: PostgreSQL URL
    /// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
    /// - `SEARCH_BULK_BATCH_SIZE`: Rows per bulk request (default: 2000)
    /// - `SEARCH_WORKER_POLL_INTERVAL_MS`: Idle poll interval of the worker (default: 1000)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            opensearch_url: lookup("OPENSEARCH_URL").unwrap_or(defaults.opensearch_url),
            index_prefix: lookup("OPENSEARCH_INDEX_PREFIX").unwrap_or(defaults.index_prefix),
            connection_mode: ConnectionMode::parse(lookup("OPENSEARCH_CONNECTION_MODE").as_deref()),
            retry_interval: parsed(&lookup, "OPENSEARCH_RETRY_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_interval),
            number_of_shards: parsed(&lookup, "OPENSEARCH_NUMBER_OF_SHARDS")
                .unwrap_or(defaults.number_of_shards),
            number_of_replicas: parsed(&lookup, "OPENSEARCH_NUMBER_OF_REPLICAS")
                .unwrap_or(defaults.number_of_replicas),
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            bulk_batch_size: parsed(&lookup, "SEARCH_BULK_BATCH_SIZE")
                .filter(|size: &usize| *size > 0)
                .unwrap_or(defaults.bulk_batch_size),
            worker_poll_interval: parsed(&lookup, "SEARCH_WORKER_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.worker_poll_interval),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let value = lookup(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value = %value, "Ignoring unparsable setting, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings(&[]);
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.index_prefix, "search");
        assert_eq!(settings.bulk_batch_size, 2000);
        assert_eq!(settings.connection_mode, ConnectionMode::Retry);
    }

    #[test]
    fn test_overrides() {
        let settings = settings(&[
            ("OPENSEARCH_INDEX_PREFIX", "test"),
            ("OPENSEARCH_CONNECTION_MODE", "FAIL-FAST"),
            ("OPENSEARCH_RETRY_INTERVAL_SECS", "3"),
            ("SEARCH_BULK_BATCH_SIZE", "500"),
            ("SEARCH_WORKER_POLL_INTERVAL_MS", "50"),
        ]);
        assert_eq!(settings.index_prefix, "test");
        assert_eq!(settings.connection_mode, ConnectionMode::FailFast);
        assert_eq!(settings.retry_interval, Duration::from_secs(3));
        assert_eq!(settings.bulk_batch_size, 500);
        assert_eq!(settings.worker_poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let settings = settings(&[
            ("OPENSEARCH_CONNECTION_MODE", "sometimes"),
            ("SEARCH_BULK_BATCH_SIZE", "0"),
            ("DATABASE_MAX_CONNECTIONS", "many"),
        ]);
        assert_eq!(settings.connection_mode, ConnectionMode::Retry);
        assert_eq!(settings.bulk_batch_size, DEFAULT_BULK_BATCH_SIZE);
        assert_eq!(settings.database_max_connections, 10);
    }
}
