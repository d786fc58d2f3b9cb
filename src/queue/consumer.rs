//! Worker pool consuming the durable task queue.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::broker::{Delivery, NackOutcome, TaskQueue};
use crate::shutdown::ShutdownSignal;
use crate::{NewsaggError, Result};

/// Counters for settled deliveries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Messages processed and removed.
    pub acked: u64,
    /// Messages given back after a failure.
    pub requeued: u64,
    /// Messages retired after exhausting their deliveries.
    pub dead_lettered: u64,
}

impl ConsumerStats {
    fn merge(&mut self, other: &ConsumerStats) {
        self.acked += other.acked;
        self.requeued += other.requeued;
        self.dead_lettered += other.dead_lettered;
    }
}

/// Pool of workers pulling from one queue.
#[derive(Debug)]
pub struct QueueConsumer {
    queue: TaskQueue,
    workers: usize,
    poll_interval: Duration,
}

impl QueueConsumer {
    /// Declare the queue and prepare a pool of `workers` consumers.
    pub async fn new(queue: TaskQueue, workers: usize, poll_interval: Duration) -> Result<Self> {
        if workers == 0 {
            return Err(NewsaggError::Validation(
                "queue consumer needs at least one worker".to_string(),
            ));
        }
        queue.declare().await?;
        Ok(Self {
            queue,
            workers,
            poll_interval,
        })
    }

    /// Spawn the workers. Each claimed message body is passed to `handler`;
    /// `Ok` acks the message, `Err` nacks it with requeue.
    ///
    /// Workers stop claiming once `shutdown` fires and finish the message in
    /// hand first.
    pub fn start<F, Fut>(self, handler: F, shutdown: ShutdownSignal) -> ConsumerHandle
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);

        info!(
            queue = %self.queue.name(),
            workers = self.workers,
            "Queue consumer started"
        );

        let workers = (0..self.workers)
            .map(|id| {
                let queue = self.queue.clone();
                let handler = Arc::clone(&handler);
                let shutdown = shutdown.clone();
                let poll_interval = self.poll_interval;
                tokio::spawn(async move {
                    consume(id, queue, handler, poll_interval, shutdown).await
                })
            })
            .collect();

        ConsumerHandle { workers }
    }
}

/// Running consumer workers.
pub struct ConsumerHandle {
    workers: Vec<JoinHandle<ConsumerStats>>,
}

impl ConsumerHandle {
    /// Wait for every worker to stop and sum their counters.
    pub async fn join(self) -> ConsumerStats {
        let mut total = ConsumerStats::default();
        for (id, result) in join_all(self.workers).await.into_iter().enumerate() {
            match result {
                Ok(stats) => total.merge(&stats),
                Err(e) => error!(worker = id, error = %e, "Consumer worker panicked"),
            }
        }
        info!(
            acked = total.acked,
            requeued = total.requeued,
            dead_lettered = total.dead_lettered,
            "Queue consumer stopped"
        );
        total
    }
}

async fn consume<F, Fut>(
    id: usize,
    queue: TaskQueue,
    handler: Arc<F>,
    poll_interval: Duration,
    mut shutdown: ShutdownSignal,
) -> ConsumerStats
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let mut stats = ConsumerStats::default();

    while !shutdown.is_cancelled() {
        match queue.claim().await {
            Ok(Some(delivery)) => settle(id, delivery, handler.as_ref(), &mut stats).await,
            Ok(None) => {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            Err(e) => {
                error!(worker = id, error = %e, "Failed to claim from queue");
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }
    }

    debug!(worker = id, "Consumer worker stopped");
    stats
}

async fn settle<F, Fut>(id: usize, delivery: Delivery, handler: &F, stats: &mut ConsumerStats)
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let delivery_id = delivery.id();
    debug!(
        worker = id,
        delivery = delivery_id,
        attempt = delivery.delivery_count(),
        "Processing message"
    );

    match handler(delivery.body().to_string()).await {
        Ok(()) => match delivery.ack().await {
            Ok(true) => stats.acked += 1,
            Ok(false) => {}
            Err(e) => {
                error!(worker = id, delivery = delivery_id, error = %e, "Failed to ack message")
            }
        },
        Err(e) => {
            warn!(worker = id, delivery = delivery_id, error = %e, "Task failed, requeueing");
            match delivery.nack(true).await {
                Ok(NackOutcome::Requeued) => stats.requeued += 1,
                Ok(NackOutcome::DeadLettered) => stats.dead_lettered += 1,
                Ok(NackOutcome::LeaseLost) => {}
                Err(e) => {
                    error!(worker = id, delivery = delivery_id, error = %e, "Failed to nack message")
                }
            }
        }
    }
}
