use crate::error::IndexError;
use std::env;
use std::time::Duration;

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_u16(key: &str, default: u16) -> u16 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn env_duration_millis(key: &str, default_millis: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(default_millis))
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Connection settings for the search engine.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
    pub prefix: Option<String>,
    pub request_timeout: Duration,
}

impl SinkConfig {
    pub fn from_env() -> Self {
        Self {
            scheme: env_string("ES_SCHEME", "http"),
            host: env_string("ES_HOST", "localhost"),
            port: env_u16("ES_PORT", 9200),
            user: env_optional("ES_USER"),
            password: env_optional("ES_PASS"),
            api_key: env_optional("ES_API_KEY"),
            prefix: env_optional("ES_PREFIX"),
            request_timeout: env_duration_millis("ES_TIMEOUT_MS", 60_000),
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Physical index name for a logical index, honouring `ES_PREFIX`.
    pub fn index_name(&self, index: &str) -> String {
        prefixed_index_name(self.prefix.as_deref(), index)
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

pub fn prefixed_index_name(prefix: Option<&str>, index: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}_{index}"),
        _ => index.to_string(),
    }
}

/// Runtime configuration for an indexing run.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub database_url: Option<String>,
    pub database_pool_size: Option<u32>,
    /// Records per page and per unit of work.
    pub batch_size: usize,
    /// Work units allowed to run at once.
    pub worker_pool_size: usize,
    /// Units allowed to wait for a worker, per worker.
    pub queue_factor: usize,
    /// `index.refresh_interval` applied while bulk loading.
    pub refresh_interval: String,
    pub sink: SinkConfig,
}

impl IndexerConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env_optional("DATABASE_URL"),
            database_pool_size: env_optional("DB_POOL").and_then(|value| value.parse().ok()),
            batch_size: env_usize("INDEXER_BATCH_SIZE", 100),
            worker_pool_size: env_usize("INDEXER_CONCURRENCY", num_cpus::get()),
            queue_factor: env_usize("INDEXER_QUEUE_FACTOR", 10),
            refresh_interval: env_string("ES_IMPORT_REFRESH_INTERVAL", "-1"),
            sink: SinkConfig::from_env(),
        }
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.batch_size == 0 {
            return Err(IndexError::Config(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.worker_pool_size == 0 {
            return Err(IndexError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Connections needed so every worker can hold one plus the cursor.
    pub fn effective_pool_size(&self) -> u32 {
        let minimum = self.worker_pool_size as u32 + 1;
        match self.database_pool_size {
            Some(size) if size < minimum => {
                log::warn!(
                    "DB_POOL={} is smaller than concurrency + 1 ({}); raising it",
                    size,
                    minimum
                );
                minimum
            }
            Some(size) => size,
            None => minimum,
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
