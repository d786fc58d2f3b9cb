//! Database module for newsagg.
//!
//! This module provides the sqlx connection pool, migration management and the
//! idempotent repositories for feed sources and news items.

mod feed_source;
mod news_item;
mod schema;

pub use feed_source::{FeedSource, FeedSourceRepository};
pub use news_item::{NewNewsItem, NewsItem, NewsItemRepository, UpsertOutcome};
pub use schema::MIGRATIONS;

use std::time::Duration;

use sqlx::pool::PoolOptions;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::datetime::now_db_string;
use crate::{NewsaggError, Result};

/// Database backend selected at compile time.
#[cfg(feature = "sqlite")]
pub type Db = sqlx::Sqlite;
/// Database backend selected at compile time.
#[cfg(feature = "postgres")]
pub type Db = sqlx::Postgres;

/// Shared connection pool.
pub type DbPool = sqlx::Pool<Db>;

/// An open transaction on the shared pool.
pub type DbTransaction = sqlx::Transaction<'static, Db>;

/// How long a caller waits for a pooled connection.
const ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Database handle wrapping the shared connection pool.
///
/// Cloning is cheap; all clones share the same pool.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open the database described by the configuration and apply migrations.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        Self::connect(&config.url, config.max_connections).await
    }

    /// Connect to `url` with at most `max_connections` pooled connections and
    /// apply pending migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = connect_pool(url, max_connections).await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open an in-memory database for testing.
    ///
    /// The pool keeps a single connection alive for its whole lifetime,
    /// otherwise every new connection would see a fresh empty database.
    #[cfg(feature = "sqlite")]
    pub async fn open_in_memory() -> Result<Self> {
        use sqlx::sqlite::SqliteConnectOptions;
        use std::str::FromStr;

        debug!("Opening in-memory database");
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| NewsaggError::DatabaseConnection(e.to_string()))?
            .foreign_keys(true);

        let pool = PoolOptions::<Db>::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
            .connect_with(options)
            .await
            .map_err(|e| NewsaggError::DatabaseConnection(e.to_string()))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Begin a new transaction.
    pub async fn begin(&self) -> Result<DbTransaction> {
        Ok(self.pool.begin().await?)
    }

    /// Close the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Get the current schema version.
    pub async fn schema_version(&self) -> Result<i64> {
        sqlx::raw_sql(schema::SCHEMA_VERSION_TABLE)
            .execute(&self.pool)
            .await?;

        let version: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
                .fetch_one(&self.pool)
                .await?;
        Ok(version)
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        let current_version = self.schema_version().await?;

        if current_version as usize >= MIGRATIONS.len() {
            debug!("Database is up to date (version {})", current_version);
            return Ok(());
        }

        info!(
            "Migrating database from version {} to {}",
            current_version,
            MIGRATIONS.len()
        );

        for (i, migration) in MIGRATIONS.iter().enumerate().skip(current_version as usize) {
            let version = (i + 1) as i64;
            info!("Applying migration v{}", version);

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(migration).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES ($1, $2)")
                .bind(version)
                .bind(now_db_string())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            debug!("Migration v{} applied successfully", version);
        }

        info!(
            "Database migration complete (now at version {})",
            MIGRATIONS.len()
        );
        Ok(())
    }

    /// Check if a table exists.
    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        #[cfg(feature = "sqlite")]
        let sql = "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = $1)";
        #[cfg(feature = "postgres")]
        let sql = "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_name = $1)";

        let exists: bool = sqlx::query_scalar(sql)
            .bind(table_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

/// Open a pool for `url`, creating the SQLite file (and its directory) if needed.
#[cfg(feature = "sqlite")]
pub(crate) async fn connect_pool(url: &str, max_connections: u32) -> Result<DbPool> {
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
    use std::str::FromStr;

    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| NewsaggError::DatabaseConnection(format!("invalid URL {url}: {e}")))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    info!("Opening database at {:?}", options.get_filename());

    PoolOptions::<Db>::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
        .connect_with(options)
        .await
        .map_err(|e| NewsaggError::DatabaseConnection(e.to_string()))
}

/// Open a pool for `url`.
#[cfg(feature = "postgres")]
pub(crate) async fn connect_pool(url: &str, max_connections: u32) -> Result<DbPool> {
    info!("Connecting to PostgreSQL");

    PoolOptions::<Db>::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
        .connect(url)
        .await
        .map_err(|e| NewsaggError::DatabaseConnection(e.to_string()))
}
