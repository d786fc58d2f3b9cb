//! Database schema and migrations for newsagg.
//!
//! `rss_feeds` and `news` are the boundary the read-side services query, so
//! column names here are part of the external contract.

/// Bookkeeping table recording applied migrations.
#[cfg(feature = "sqlite")]
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT NOT NULL
)
"#;

/// Bookkeeping table recording applied migrations.
#[cfg(feature = "postgres")]
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version     BIGINT PRIMARY KEY,
    applied_at  TEXT NOT NULL
)
"#;

/// Database migrations.
///
/// Each migration is a SQL script executed in order inside its own transaction.
#[cfg(feature = "sqlite")]
pub const MIGRATIONS: &[&str] = &[
    // v1: feed sources, unique by URL
    r#"
CREATE TABLE rss_feeds (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    url             TEXT NOT NULL UNIQUE,
    source          TEXT,
    last_polled_at  TEXT,
    created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);
"#,
    // v2: news items, unique by source link
    r#"
CREATE TABLE news (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    title             TEXT NOT NULL,
    description       TEXT NOT NULL DEFAULT '',
    publication_date  TEXT NOT NULL,
    source_link       TEXT NOT NULL UNIQUE,
    rss_feed_id       INTEGER NOT NULL REFERENCES rss_feeds(id) ON DELETE CASCADE,
    created_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE INDEX idx_news_publication_date ON news(publication_date DESC);
CREATE INDEX idx_news_rss_feed_id ON news(rss_feed_id);
"#,
];

/// Database migrations.
///
/// Each migration is a SQL script executed in order inside its own transaction.
#[cfg(feature = "postgres")]
pub const MIGRATIONS: &[&str] = &[
    // v1: feed sources, unique by URL
    r#"
CREATE TABLE rss_feeds (
    id              BIGSERIAL PRIMARY KEY,
    url             TEXT NOT NULL UNIQUE,
    source          TEXT,
    last_polled_at  TEXT,
    created_at      TEXT NOT NULL DEFAULT (to_char(NOW() AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"'))
);
"#,
    // v2: news items, unique by source link
    r#"
CREATE TABLE news (
    id                BIGSERIAL PRIMARY KEY,
    title             TEXT NOT NULL,
    description       TEXT NOT NULL DEFAULT '',
    publication_date  TEXT NOT NULL,
    source_link       TEXT NOT NULL UNIQUE,
    rss_feed_id       BIGINT NOT NULL REFERENCES rss_feeds(id) ON DELETE CASCADE,
    created_at        TEXT NOT NULL DEFAULT (to_char(NOW() AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"'))
);

CREATE INDEX idx_news_publication_date ON news(publication_date DESC);
CREATE INDEX idx_news_rss_feed_id ON news(rss_feed_id);
"#,
];
