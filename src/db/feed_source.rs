//! Feed source records.

use chrono::{DateTime, Utc};
use sqlx::Executor;

use super::Db;
use crate::datetime::{now_db_string, parse_db_datetime};
use crate::rss::normalize_url;
use crate::Result;

/// A registered feed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    /// Assigned identifier.
    pub id: i64,
    /// Normalized feed URL (unique).
    pub url: String,
    /// Display name taken from the channel title.
    pub source: Option<String>,
    /// When the feed was last fetched successfully. Advisory only.
    pub last_polled_at: Option<DateTime<Utc>>,
    /// When the feed was first seen.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedSourceRow {
    id: i64,
    url: String,
    source: Option<String>,
    last_polled_at: Option<String>,
    created_at: String,
}

impl From<FeedSourceRow> for FeedSource {
    fn from(row: FeedSourceRow) -> Self {
        FeedSource {
            id: row.id,
            url: row.url,
            source: row.source,
            last_polled_at: row.last_polled_at.and_then(|s| parse_db_datetime(&s)),
            created_at: parse_db_datetime(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Repository for feed sources.
///
/// Every method accepts any sqlx executor, so the same calls work on the
/// shared pool and inside a transaction.
pub struct FeedSourceRepository;

impl FeedSourceRepository {
    /// Insert the feed or update it on URL conflict, returning its stable id.
    ///
    /// The URL is normalized first, so spelling variants of one feed resolve
    /// to the same row. A `None` source keeps the stored display name.
    pub async fn upsert<'e, E>(executor: E, url: &str, source: Option<&str>) -> Result<i64>
    where
        E: Executor<'e, Database = Db>,
    {
        let url = normalize_url(url)?;
        let source = source
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO rss_feeds (url, source, last_polled_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (url) DO UPDATE SET
                source = COALESCE(excluded.source, rss_feeds.source),
                last_polled_at = excluded.last_polled_at
            RETURNING id
            "#,
        )
        .bind(url)
        .bind(source)
        .bind(now_db_string())
        .fetch_one(executor)
        .await?;

        Ok(id)
    }

    /// Get a feed by URL. The lookup URL is normalized the same way as on upsert.
    pub async fn get_by_url<'e, E>(executor: E, url: &str) -> Result<Option<FeedSource>>
    where
        E: Executor<'e, Database = Db>,
    {
        let url = normalize_url(url)?;
        let row = sqlx::query_as::<_, FeedSourceRow>(
            r#"
            SELECT id, url, source, last_polled_at, created_at
            FROM rss_feeds
            WHERE url = $1
            "#,
        )
        .bind(url)
        .fetch_optional(executor)
        .await?;

        Ok(row.map(FeedSource::from))
    }

    /// List all feeds in registration order.
    pub async fn list<'e, E>(executor: E) -> Result<Vec<FeedSource>>
    where
        E: Executor<'e, Database = Db>,
    {
        let rows = sqlx::query_as::<_, FeedSourceRow>(
            r#"
            SELECT id, url, source, last_polled_at, created_at
            FROM rss_feeds
            ORDER BY id ASC
            "#,
        )
        .fetch_all(executor)
        .await?;

        Ok(rows.into_iter().map(FeedSource::from).collect())
    }

    /// Count stored feeds.
    pub async fn count<'e, E>(executor: E) -> Result<i64>
    where
        E: Executor<'e, Database = Db>,
    {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rss_feeds")
            .fetch_one(executor)
            .await?;
        Ok(count)
    }
}
