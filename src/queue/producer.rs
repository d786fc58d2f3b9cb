//! Publishes one ingestion task per feed per polling round.

use tracing::{debug, error};

use super::broker::TaskQueue;
use crate::ingest::Dispatch;
use crate::Result;

/// Queue-backed dispatcher for the poller.
#[derive(Debug, Clone)]
pub struct QueueProducer {
    queue: TaskQueue,
}

impl QueueProducer {
    /// Declare the queue and return a producer publishing to it.
    pub async fn new(queue: TaskQueue) -> Result<Self> {
        queue.declare().await?;
        Ok(Self { queue })
    }

    /// The queue this producer publishes to.
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Publish every feed URL. A failed publish is logged and the remaining
    /// feeds are still published. Returns how many were published.
    pub async fn publish_all(&self, feeds: &[String]) -> usize {
        let mut published = 0;
        for url in feeds {
            match self.queue.publish(url).await {
                Ok(id) => {
                    debug!(url = %url, delivery = id, "Feed task published");
                    published += 1;
                }
                Err(e) => {
                    error!(
                        url = %url,
                        queue = %self.queue.name(),
                        error = %e,
                        "Failed to publish feed task"
                    );
                }
            }
        }
        published
    }
}

impl Dispatch for QueueProducer {
    async fn dispatch(&self, feeds: &[String]) {
        let published = self.publish_all(feeds).await;
        debug!(published, total = feeds.len(), "Feed tasks published");
    }
}
