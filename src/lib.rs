//! newsagg - RSS news ingestion pipeline
//!
//! Periodically fetches a fixed list of RSS feeds and stores their items in a
//! relational database, either through an in-process worker pool or through a
//! durable task queue.

#[cfg(all(feature = "sqlite", feature = "postgres"))]
compile_error!("features \"sqlite\" and \"postgres\" are mutually exclusive; build postgres with --no-default-features");

#[cfg(not(any(feature = "sqlite", feature = "postgres")))]
compile_error!("enable one database backend: \"sqlite\" or \"postgres\"");

pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod queue;
pub mod rss;
pub mod shutdown;

pub use config::{Config, IngestMode};
pub use db::{Database, FeedSource, FeedSourceRepository, NewsItem, NewsItemRepository};
pub use error::{NewsaggError, Result};
pub use ingest::{DirectIngestor, IngestContext, IngestStats, Poller};
pub use queue::{FeedWorker, QueueConsumer, QueueProducer, TaskQueue};
