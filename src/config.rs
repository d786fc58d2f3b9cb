//! Configuration module for newsagg.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::rss::validate_url;
use crate::{NewsaggError, Result};

/// Shortest poll interval accepted at startup, in seconds.
pub const MIN_POLL_INTERVAL_SECS: u64 = 5;

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL (e.g. `sqlite://data/newsagg.db` or `postgres://...`).
    #[serde(default = "default_db_url")]
    pub url: String,
    /// Maximum number of pooled connections.
    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,
}

fn default_db_url() -> String {
    "sqlite://data/newsagg.db".to_string()
}

fn default_db_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            max_connections: default_db_max_connections(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional path to a log file. Logs go to stdout only when unset.
    #[serde(default)]
    pub file: Option<String>,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            format: LogFormat::Text,
        }
    }
}

/// Ingestion strategy used by a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// In-process worker pool with a single aggregating writer.
    #[default]
    Direct,
    /// Tasks go through the durable queue and are handled by consumer workers.
    Queue,
}

/// Ingestion configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Which ingestion path is active.
    #[serde(default)]
    pub mode: IngestMode,
    /// Feed URLs to poll.
    #[serde(default)]
    pub feeds: Vec<String>,
    /// Seconds between two ingestion rounds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Number of fetch workers in direct mode.
    #[serde(default = "default_ingest_workers")]
    pub workers: usize,
    /// Capacity of the direct mode task channel.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_poll_interval() -> u64 {
    300 // 5 minutes
}

fn default_ingest_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            mode: IngestMode::Direct,
            feeds: Vec::new(),
            poll_interval_secs: default_poll_interval(),
            workers: default_ingest_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl IngestConfig {
    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Feed fetch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Total attempts per fetch, the first one included.
    #[serde(default = "default_fetch_attempts")]
    pub attempts: u32,
    /// Fixed delay between attempts in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Per-request deadline in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_fetch_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    2000
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_user_agent() -> String {
    "newsagg/0.1 (feed ingester)".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            attempts: default_fetch_attempts(),
            retry_delay_ms: default_retry_delay(),
            timeout_secs: default_fetch_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_feed_size_bytes: default_max_feed_size(),
            user_agent: default_user_agent(),
        }
    }
}

/// Durable task queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Connection URL of the queue store.
    #[serde(default = "default_queue_url")]
    pub url: String,
    /// Queue name.
    #[serde(default = "default_queue_name")]
    pub name: String,
    /// Number of consumer workers.
    #[serde(default = "default_queue_workers")]
    pub workers: usize,
    /// How long an idle worker waits before polling again, in milliseconds.
    #[serde(default = "default_queue_poll_interval")]
    pub poll_interval_ms: u64,
    /// Seconds after which an unacknowledged delivery becomes deliverable again.
    #[serde(default = "default_lease")]
    pub lease_secs: u64,
    /// Deliveries after which a failing message is dead-lettered.
    /// Unset means messages are requeued forever.
    #[serde(default)]
    pub max_deliveries: Option<u32>,
    /// Publish one task per feed on every poll round.
    #[serde(default = "default_true")]
    pub run_producer: bool,
    /// Run the consumer worker pool in this process.
    #[serde(default = "default_true")]
    pub run_consumer: bool,
}

fn default_queue_url() -> String {
    "sqlite://data/queue.db".to_string()
}

fn default_queue_name() -> String {
    "rss_feeds".to_string()
}

fn default_queue_workers() -> usize {
    4
}

fn default_queue_poll_interval() -> u64 {
    500
}

fn default_lease() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: default_queue_url(),
            name: default_queue_name(),
            workers: default_queue_workers(),
            poll_interval_ms: default_queue_poll_interval(),
            lease_secs: default_lease(),
            max_deliveries: None,
            run_producer: true,
            run_consumer: true,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Ingestion configuration.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Fetch configuration.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(NewsaggError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| NewsaggError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `NEWSAGG_DATABASE_URL`: database connection URL
    /// - `NEWSAGG_QUEUE_URL`: queue store connection URL
    /// - `NEWSAGG_LOG_LEVEL`: log level
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env("NEWSAGG_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(url) = non_empty_env("NEWSAGG_QUEUE_URL") {
            self.queue.url = url;
        }
        if let Some(level) = non_empty_env("NEWSAGG_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate the configuration.
    ///
    /// Rejects poll intervals below [`MIN_POLL_INTERVAL_SECS`], zero-sized
    /// pools, zero fetch attempts and feed URLs that are not absolute
    /// http(s) URLs.
    pub fn validate(&self) -> Result<()> {
        if self.ingest.poll_interval_secs < MIN_POLL_INTERVAL_SECS {
            return Err(NewsaggError::Validation(format!(
                "poll interval must be >= {} seconds (got {})",
                MIN_POLL_INTERVAL_SECS, self.ingest.poll_interval_secs
            )));
        }
        if self.fetch.attempts == 0 {
            return Err(NewsaggError::Validation(
                "fetch attempts must be at least 1".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(NewsaggError::Validation(
                "database max_connections must be at least 1".to_string(),
            ));
        }
        for url in &self.ingest.feeds {
            validate_url(url).map_err(|e| {
                NewsaggError::Validation(format!("invalid feed URL {url}: {e}"))
            })?;
        }

        match self.ingest.mode {
            IngestMode::Direct => {
                if self.ingest.workers == 0 || self.ingest.queue_capacity == 0 {
                    return Err(NewsaggError::Validation(
                        "ingest workers and queue_capacity must be at least 1".to_string(),
                    ));
                }
            }
            IngestMode::Queue => {
                if self.queue.name.trim().is_empty() {
                    return Err(NewsaggError::Validation(
                        "queue name must not be empty".to_string(),
                    ));
                }
                if self.queue.workers == 0 {
                    return Err(NewsaggError::Validation(
                        "queue workers must be at least 1".to_string(),
                    ));
                }
                if self.queue.max_deliveries == Some(0) {
                    return Err(NewsaggError::Validation(
                        "queue max_deliveries must be at least 1 when set".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
