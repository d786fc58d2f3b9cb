//! Feed ingestion pipeline: scheduling, fetching and storing.

pub mod context;
pub mod direct;
pub mod persist;
pub mod poller;

pub use context::IngestContext;
pub use direct::{DirectIngestor, FeedFailure};
pub use persist::{persist_feed, persist_item, IngestStats, ItemOutcome};
pub use poller::{Dispatch, Poller, PollerState};
