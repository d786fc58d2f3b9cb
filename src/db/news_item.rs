//! News item records.

use chrono::{DateTime, Utc};
use sqlx::Executor;

use super::Db;
use crate::datetime::{parse_db_datetime, to_db_string};
use crate::Result;

/// A stored news item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsItem {
    /// Item ID.
    pub id: i64,
    /// Item title.
    pub title: String,
    /// Item description/body.
    pub description: String,
    /// Publication time as given by the feed.
    pub publication_date: DateTime<Utc>,
    /// Link to the original article (unique).
    pub source_link: String,
    /// Owning feed.
    pub rss_feed_id: i64,
}

/// News item to be stored.
#[derive(Debug, Clone)]
pub struct NewNewsItem {
    /// Item title.
    pub title: String,
    /// Item description/body.
    pub description: String,
    /// Parsed publication time.
    pub publication_date: DateTime<Utc>,
    /// Link to the original article.
    pub source_link: String,
    /// Owning feed, resolved through [`super::FeedSourceRepository::upsert`].
    pub rss_feed_id: i64,
}

impl NewNewsItem {
    /// Create a new item.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        publication_date: DateTime<Utc>,
        source_link: impl Into<String>,
        rss_feed_id: i64,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            publication_date,
            source_link: source_link.into(),
            rss_feed_id,
        }
    }
}

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was written.
    Inserted,
    /// A row with the same source link already existed; nothing changed.
    Skipped,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct NewsItemRow {
    id: i64,
    title: String,
    description: String,
    publication_date: String,
    source_link: String,
    rss_feed_id: i64,
}

impl From<NewsItemRow> for NewsItem {
    fn from(row: NewsItemRow) -> Self {
        NewsItem {
            id: row.id,
            title: row.title,
            description: row.description,
            publication_date: parse_db_datetime(&row.publication_date).unwrap_or_else(Utc::now),
            source_link: row.source_link,
            rss_feed_id: row.rss_feed_id,
        }
    }
}

/// Repository for news items.
pub struct NewsItemRepository;

impl NewsItemRepository {
    /// Insert the item unless one with the same source link exists.
    pub async fn upsert<'e, E>(executor: E, item: &NewNewsItem) -> Result<UpsertOutcome>
    where
        E: Executor<'e, Database = Db>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO news (title, description, publication_date, source_link, rss_feed_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (source_link) DO NOTHING
            "#,
        )
        .bind(item.title.clone())
        .bind(item.description.clone())
        .bind(to_db_string(&item.publication_date))
        .bind(item.source_link.clone())
        .bind(item.rss_feed_id)
        .execute(executor)
        .await?;

        if result.rows_affected() > 0 {
            Ok(UpsertOutcome::Inserted)
        } else {
            Ok(UpsertOutcome::Skipped)
        }
    }

    /// Get an item by its source link.
    pub async fn get_by_link<'e, E>(executor: E, source_link: &str) -> Result<Option<NewsItem>>
    where
        E: Executor<'e, Database = Db>,
    {
        let row = sqlx::query_as::<_, NewsItemRow>(
            r#"
            SELECT id, title, description, publication_date, source_link, rss_feed_id
            FROM news
            WHERE source_link = $1
            "#,
        )
        .bind(source_link.to_string())
        .fetch_optional(executor)
        .await?;

        Ok(row.map(NewsItem::from))
    }

    /// Latest items, newest publication first.
    pub async fn latest<'e, E>(executor: E, limit: i64) -> Result<Vec<NewsItem>>
    where
        E: Executor<'e, Database = Db>,
    {
        let rows = sqlx::query_as::<_, NewsItemRow>(
            r#"
            SELECT id, title, description, publication_date, source_link, rss_feed_id
            FROM news
            ORDER BY publication_date DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(executor)
        .await?;

        Ok(rows.into_iter().map(NewsItem::from).collect())
    }

    /// Count stored items.
    pub async fn count<'e, E>(executor: E) -> Result<i64>
    where
        E: Executor<'e, Database = Db>,
    {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news")
            .fetch_one(executor)
            .await?;
        Ok(count)
    }

    /// Count items belonging to one feed.
    pub async fn count_by_feed<'e, E>(executor: E, rss_feed_id: i64) -> Result<i64>
    where
        E: Executor<'e, Database = Db>,
    {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news WHERE rss_feed_id = $1")
            .bind(rss_feed_id)
            .fetch_one(executor)
            .await?;
        Ok(count)
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::db::{Database, FeedSourceRepository};
    use chrono::TimeZone;

    async fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().await.unwrap();
        let feed_id = FeedSourceRepository::upsert(db.pool(), "https://example.com/rss", None)
            .await
            .unwrap();
        (db, feed_id)
    }

    fn item(link: &str, feed_id: i64, day: u32) -> NewNewsItem {
        NewNewsItem::new(
            format!("Title {link}"),
            "Body",
            Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
            link,
            feed_id,
        )
    }

    #[tokio::test]
    async fn test_upsert_inserts_item() {
        let (db, feed_id) = setup().await;

        let outcome =
            NewsItemRepository::upsert(db.pool(), &item("https://example.com/1", feed_id, 1))
                .await
                .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let stored = NewsItemRepository::get_by_link(db.pool(), "https://example.com/1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.title, "Title https://example.com/1");
        assert_eq!(stored.description, "Body");
        assert_eq!(
            stored.publication_date,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(stored.rss_feed_id, feed_id);
    }

    #[tokio::test]
    async fn test_upsert_duplicate_link_is_skipped() {
        let (db, feed_id) = setup().await;
        let new_item = item("https://example.com/1", feed_id, 1);

        assert_eq!(
            NewsItemRepository::upsert(db.pool(), &new_item).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            NewsItemRepository::upsert(db.pool(), &new_item).await.unwrap(),
            UpsertOutcome::Skipped
        );
        assert_eq!(NewsItemRepository::count(db.pool()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_link_keeps_first_version() {
        let (db, feed_id) = setup().await;
        NewsItemRepository::upsert(db.pool(), &item("https://example.com/1", feed_id, 1))
            .await
            .unwrap();

        let mut changed = item("https://example.com/1", feed_id, 2);
        changed.title = "Changed".to_string();
        NewsItemRepository::upsert(db.pool(), &changed).await.unwrap();

        let stored = NewsItemRepository::get_by_link(db.pool(), "https://example.com/1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.title, "Title https://example.com/1");
    }

    #[tokio::test]
    async fn test_upsert_unknown_feed_fails() {
        let (db, _) = setup().await;
        let result =
            NewsItemRepository::upsert(db.pool(), &item("https://example.com/1", 999, 1)).await;
        assert!(result.is_err());
        assert_eq!(NewsItemRepository::count(db.pool()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_concurrent_callers() {
        let (db, feed_id) = setup().await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            let new_item = item("https://example.com/1", feed_id, 1);
            handles.push(tokio::spawn(async move {
                NewsItemRepository::upsert(db.pool(), &new_item).await
            }));
        }

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == UpsertOutcome::Inserted {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(NewsItemRepository::count(db.pool()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_latest_orders_by_publication_date() {
        let (db, feed_id) = setup().await;
        for (link, day) in [
            ("https://example.com/a", 2),
            ("https://example.com/b", 9),
            ("https://example.com/c", 5),
        ] {
            NewsItemRepository::upsert(db.pool(), &item(link, feed_id, day))
                .await
                .unwrap();
        }

        let latest = NewsItemRepository::latest(db.pool(), 2).await.unwrap();
        let links: Vec<&str> = latest.iter().map(|n| n.source_link.as_str()).collect();
        assert_eq!(links, vec!["https://example.com/b", "https://example.com/c"]);
        assert_eq!(NewsItemRepository::count_by_feed(db.pool(), feed_id).await.unwrap(), 3);
        assert_eq!(NewsItemRepository::count_by_feed(db.pool(), feed_id + 1).await.unwrap(), 0);
    }
}
