//! In-process fan-out/fan-in ingestion.
//!
//! A fixed pool of fetch workers pulls feed URLs from a bounded task channel.
//! Each worker fetches its feed, registers the feed source and forwards every
//! item to a single aggregator task, which is the only writer of news items.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::context::IngestContext;
use super::persist::{persist_item, IngestStats};
use super::poller::Dispatch;
use crate::db::FeedSourceRepository;
use crate::rss::FeedItem;
use crate::{NewsaggError, Result};

/// A feed that could not be fetched or registered.
#[derive(Debug)]
pub struct FeedFailure {
    /// Feed URL as submitted.
    pub url: String,
    /// What went wrong.
    pub error: NewsaggError,
}

/// Handle to a running worker pool and its aggregator.
pub struct DirectIngestor {
    tasks: mpsc::Sender<String>,
    workers: Vec<JoinHandle<()>>,
    aggregator: JoinHandle<IngestStats>,
}

impl DirectIngestor {
    /// Spawn `workers` fetch workers sharing a task channel of `capacity`
    /// slots, plus the aggregator.
    pub fn start(ctx: IngestContext, workers: usize, capacity: usize) -> Result<Self> {
        if workers == 0 {
            return Err(NewsaggError::Validation(
                "direct ingestion needs at least one worker".to_string(),
            ));
        }
        if capacity == 0 {
            return Err(NewsaggError::Validation(
                "direct ingestion task channel needs a capacity of at least 1".to_string(),
            ));
        }

        let (task_tx, task_rx) = mpsc::channel::<String>(capacity);
        let (item_tx, item_rx) = mpsc::unbounded_channel::<FeedItem>();
        let (err_tx, err_rx) = mpsc::unbounded_channel::<FeedFailure>();
        let task_rx = Arc::new(Mutex::new(task_rx));

        let handles = (0..workers)
            .map(|id| {
                let ctx = ctx.clone();
                let task_rx = Arc::clone(&task_rx);
                let item_tx = item_tx.clone();
                let err_tx = err_tx.clone();
                tokio::spawn(fetch_worker(id, ctx, task_rx, item_tx, err_tx))
            })
            .collect();

        // The workers own the only senders now; the aggregator ends once they exit.
        drop(item_tx);
        drop(err_tx);

        let aggregator = tokio::spawn(aggregate(ctx, item_rx, err_rx));

        info!(workers, capacity, "Direct ingestion started");

        Ok(Self {
            tasks: task_tx,
            workers: handles,
            aggregator,
        })
    }

    /// Queue one feed for fetching.
    ///
    /// Returns `false` without blocking when the task channel is full; the
    /// feed is picked up again on the next round.
    pub fn submit(&self, url: &str) -> bool {
        match self.tasks.try_send(url.to_string()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(url)) => {
                warn!(url = %url, "Task channel full, skipping feed this round");
                false
            }
            Err(mpsc::error::TrySendError::Closed(url)) => {
                error!(url = %url, "Task channel closed, dropping feed");
                false
            }
        }
    }

    /// Close the task channel, let the workers finish, and wait for the
    /// aggregator to store everything still in flight.
    pub async fn shutdown(self) -> IngestStats {
        let DirectIngestor {
            tasks,
            workers,
            aggregator,
        } = self;
        drop(tasks);

        for (id, handle) in workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker = id, error = %e, "Fetch worker panicked");
            }
        }

        match aggregator.await {
            Ok(stats) => {
                info!(
                    inserted = stats.inserted,
                    duplicates = stats.duplicates,
                    invalid_dates = stats.invalid_dates,
                    failed_writes = stats.failed_writes,
                    feed_errors = stats.feed_errors,
                    "Direct ingestion drained"
                );
                stats
            }
            Err(e) => {
                error!(error = %e, "Aggregator panicked");
                IngestStats::default()
            }
        }
    }
}

impl Dispatch for DirectIngestor {
    async fn dispatch(&self, feeds: &[String]) {
        let accepted = feeds.iter().filter(|url| self.submit(url)).count();
        debug!(accepted, total = feeds.len(), "Feeds submitted to fetch workers");
    }
}

async fn fetch_worker(
    id: usize,
    ctx: IngestContext,
    tasks: Arc<Mutex<mpsc::Receiver<String>>>,
    items: mpsc::UnboundedSender<FeedItem>,
    errors: mpsc::UnboundedSender<FeedFailure>,
) {
    loop {
        // Hold the lock only while waiting for the next URL.
        let next = tasks.lock().await.recv().await;
        let Some(url) = next else {
            break;
        };

        match fetch_feed(&ctx, &url).await {
            Ok(feed_items) => {
                debug!(worker = id, url = %url, items = feed_items.len(), "Feed fetched");
                for item in feed_items {
                    if items.send(item).is_err() {
                        error!(worker = id, "Aggregator gone, stopping worker");
                        return;
                    }
                }
            }
            Err(error) => {
                let _ = errors.send(FeedFailure { url, error });
            }
        }
    }
    debug!(worker = id, "Fetch worker stopped");
}

async fn fetch_feed(ctx: &IngestContext, url: &str) -> Result<Vec<FeedItem>> {
    let feed = ctx.fetcher.fetch(url).await?;
    let feed_id =
        FeedSourceRepository::upsert(ctx.db.pool(), url, Some(feed.title.as_str())).await?;

    Ok(feed
        .items
        .into_iter()
        .map(|item| FeedItem { feed_id, item })
        .collect())
}

async fn aggregate(
    ctx: IngestContext,
    mut items: mpsc::UnboundedReceiver<FeedItem>,
    mut errors: mpsc::UnboundedReceiver<FeedFailure>,
) -> IngestStats {
    let mut stats = IngestStats::default();
    let mut items_open = true;
    let mut errors_open = true;

    while items_open || errors_open {
        tokio::select! {
            item = items.recv(), if items_open => match item {
                Some(FeedItem { feed_id, item }) => {
                    match persist_item(ctx.db.pool(), &item, feed_id).await {
                        Ok(outcome) => stats.record(outcome),
                        Err(e) => {
                            stats.failed_writes += 1;
                            error!(
                                feed_id,
                                link = %item.link,
                                error = %e,
                                "Failed to store news item"
                            );
                        }
                    }
                }
                None => items_open = false,
            },
            failure = errors.recv(), if errors_open => match failure {
                Some(FeedFailure { url, error }) => {
                    stats.feed_errors += 1;
                    error!(url = %url, error = %error, "Feed ingestion failed");
                }
                None => errors_open = false,
            },
        }
    }

    stats
}
