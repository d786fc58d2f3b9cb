//! Task handler turning one queued feed URL into stored items.

use tracing::info;

use crate::ingest::{persist_feed, IngestContext, IngestStats};
use crate::rss::validate_url;
use crate::{NewsaggError, Result};

/// Fetch-and-store handler for queue consumers.
#[derive(Debug, Clone)]
pub struct FeedWorker {
    ctx: IngestContext,
}

impl FeedWorker {
    /// Create a worker over the shared context.
    pub fn new(ctx: IngestContext) -> Self {
        Self { ctx }
    }

    /// Handle one message body.
    ///
    /// The body must be a feed URL. The feed is fetched with retries and then
    /// stored in a single transaction; any error leaves the store untouched
    /// and is returned so the message can be requeued.
    pub async fn handle_task(&self, body: &str) -> Result<IngestStats> {
        let url = body.trim();
        if url.is_empty() {
            return Err(NewsaggError::Validation("empty task body".to_string()));
        }
        validate_url(url)?;

        let feed = self.ctx.fetcher.fetch(url).await?;
        let (feed_id, stats) = persist_feed(&self.ctx.db, url, &feed).await?;

        info!(
            url,
            feed_id,
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            invalid_dates = stats.invalid_dates,
            "Feed ingested"
        );
        Ok(stats)
    }
}
