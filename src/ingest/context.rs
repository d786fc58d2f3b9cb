//! Shared dependencies handed to every pipeline component.

use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::rss::FeedFetcher;
use crate::Result;

/// Explicitly constructed context for the ingestion components.
///
/// Cloning is cheap: the database pool, fetcher and configuration are shared.
#[derive(Debug, Clone)]
pub struct IngestContext {
    /// Store for feed sources and news items.
    pub db: Database,
    /// Feed fetch client.
    pub fetcher: Arc<FeedFetcher>,
    /// Loaded configuration.
    pub config: Arc<Config>,
}

impl IngestContext {
    /// Build a context, creating the fetcher from `config.fetch`.
    pub fn new(db: Database, config: Config) -> Result<Self> {
        let fetcher = FeedFetcher::new(&config.fetch)?;
        Ok(Self::with_fetcher(db, fetcher, config))
    }

    /// Build a context around an existing fetcher.
    pub fn with_fetcher(db: Database, fetcher: FeedFetcher, config: Config) -> Self {
        Self {
            db,
            fetcher: Arc::new(fetcher),
            config: Arc::new(config),
        }
    }
}
