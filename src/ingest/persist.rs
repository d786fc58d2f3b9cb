//! Turning fetched items into stored rows.

use sqlx::Executor;
use tracing::{debug, warn};

use crate::datetime::parse_publication_date;
use crate::db::{Database, Db, FeedSourceRepository, NewNewsItem, NewsItemRepository, UpsertOutcome};
use crate::rss::{ParsedFeed, ParsedItem};
use crate::Result;

/// What happened to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Stored as a new row.
    Inserted,
    /// Already stored under the same source link.
    Duplicate,
    /// Skipped because its publication date could not be parsed.
    InvalidDate,
}

/// Counters for a batch of ingested items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// New rows written.
    pub inserted: u64,
    /// Items already present.
    pub duplicates: u64,
    /// Items skipped for an unparseable date.
    pub invalid_dates: u64,
    /// Items whose write failed.
    pub failed_writes: u64,
    /// Feeds that could not be fetched or registered.
    pub feed_errors: u64,
}

impl IngestStats {
    /// Count one item outcome.
    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Inserted => self.inserted += 1,
            ItemOutcome::Duplicate => self.duplicates += 1,
            ItemOutcome::InvalidDate => self.invalid_dates += 1,
        }
    }

    /// Add another set of counters to this one.
    pub fn merge(&mut self, other: &IngestStats) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.invalid_dates += other.invalid_dates;
        self.failed_writes += other.failed_writes;
        self.feed_errors += other.feed_errors;
    }
}

/// Parse the item's publication date and store it under `feed_id`.
///
/// An unparseable date is not an error: the item is skipped and reported as
/// [`ItemOutcome::InvalidDate`].
pub async fn persist_item<'e, E>(
    executor: E,
    item: &ParsedItem,
    feed_id: i64,
) -> Result<ItemOutcome>
where
    E: Executor<'e, Database = Db>,
{
    let publication_date = match parse_publication_date(&item.pub_date) {
        Ok(dt) => dt,
        Err(e) => {
            warn!(
                link = %item.link,
                pub_date = %item.pub_date,
                error = %e,
                "Skipping item with unparseable publication date"
            );
            return Ok(ItemOutcome::InvalidDate);
        }
    };

    let new_item = NewNewsItem::new(
        item.title.as_str(),
        item.description.as_str(),
        publication_date,
        item.link.as_str(),
        feed_id,
    );

    match NewsItemRepository::upsert(executor, &new_item).await? {
        UpsertOutcome::Inserted => Ok(ItemOutcome::Inserted),
        UpsertOutcome::Skipped => {
            debug!(link = %item.link, "Item already stored");
            Ok(ItemOutcome::Duplicate)
        }
    }
}

/// Store a whole feed as one unit of work.
///
/// The feed source is resolved first and every item is written in the same
/// transaction, so either the feed and all its storable items land, or
/// nothing does. Returns the feed id and per-item counters.
pub async fn persist_feed(
    db: &Database,
    url: &str,
    feed: &ParsedFeed,
) -> Result<(i64, IngestStats)> {
    let mut tx = db.begin().await?;
    let feed_id = FeedSourceRepository::upsert(&mut *tx, url, Some(feed.title.as_str())).await?;

    let mut stats = IngestStats::default();
    for item in &feed.items {
        let outcome = persist_item(&mut *tx, item, feed_id).await?;
        stats.record(outcome);
    }

    tx.commit().await?;
    Ok((feed_id, stats))
}
