//! RSS feed retrieval for newsagg.
//!
//! This module fetches RSS 2.0 documents over HTTP with bounded retries and
//! decodes them into [`ParsedFeed`] values.

pub mod fetcher;
pub mod types;

pub use fetcher::{normalize_url, validate_url, FeedFetcher, FetchError, RetryPolicy};
pub use types::{FeedItem, ParsedFeed, ParsedItem};
