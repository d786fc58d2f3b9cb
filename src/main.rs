use std::time::Duration;

use tracing::{error, info, warn};

use newsagg::config::IngestMode;
use newsagg::queue::ConsumerHandle;
use newsagg::shutdown::{self, ShutdownSignal, ShutdownTrigger};
use newsagg::{
    Config, Database, DirectIngestor, FeedWorker, IngestContext, Poller, QueueConsumer,
    QueueProducer, TaskQueue,
};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    // Load configuration
    let config = match Config::load_with_env(&config_path).and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {config_path}: {e}");
            std::process::exit(1);
        }
    };

    // Initialize logging
    if let Err(e) = newsagg::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        newsagg::logging::init_console_only(&config.logging.level);
    }

    info!("newsagg - RSS news ingestion");
    info!(
        mode = ?config.ingest.mode,
        feeds = config.ingest.feeds.len(),
        interval_secs = config.ingest.poll_interval_secs,
        "Configuration loaded"
    );

    if let Err(e) = run(config).await {
        error!(error = %e, "Fatal error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> newsagg::Result<()> {
    let db = Database::open(&config.database).await?;
    let ctx = IngestContext::new(db.clone(), config)?;

    let (trigger, signal) = shutdown::channel();
    tokio::spawn(wait_for_ctrl_c(trigger));

    match ctx.config.ingest.mode {
        IngestMode::Direct => run_direct(ctx, signal).await?,
        IngestMode::Queue => run_queue(ctx, signal).await?,
    }

    db.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_ctrl_c(trigger: ShutdownTrigger) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
    }
    trigger.trigger();
}

async fn run_direct(ctx: IngestContext, signal: ShutdownSignal) -> newsagg::Result<()> {
    let ingest = &ctx.config.ingest;
    let ingestor = DirectIngestor::start(ctx.clone(), ingest.workers, ingest.queue_capacity)?;
    let poller = Poller::new(ingest.feeds.clone(), ingest.poll_interval(), ingestor)?;

    poller.run(signal).await;
    poller.into_dispatcher().shutdown().await;
    Ok(())
}

async fn run_queue(ctx: IngestContext, signal: ShutdownSignal) -> newsagg::Result<()> {
    let queue_config = &ctx.config.queue;
    let queue = TaskQueue::connect(queue_config).await?;

    let consumer = if queue_config.run_consumer {
        let consumer = QueueConsumer::new(
            queue.clone(),
            queue_config.workers,
            Duration::from_millis(queue_config.poll_interval_ms),
        )
        .await?;
        let worker = FeedWorker::new(ctx.clone());
        Some(consumer.start(
            move |body| {
                let worker = worker.clone();
                async move { worker.handle_task(&body).await.map(|_| ()) }
            },
            signal.clone(),
        ))
    } else {
        None
    };

    if queue_config.run_producer {
        let producer = QueueProducer::new(queue.clone()).await?;
        let ingest = &ctx.config.ingest;
        let poller = Poller::new(ingest.feeds.clone(), ingest.poll_interval(), producer)?;
        poller.run(signal.clone()).await;
    } else {
        warn!("Producer disabled, only consuming queued tasks");
        let mut signal = signal.clone();
        signal.cancelled().await;
    }

    drain_consumer(consumer).await;
    queue.close().await;
    Ok(())
}

async fn drain_consumer(consumer: Option<ConsumerHandle>) {
    if let Some(handle) = consumer {
        handle.join().await;
    }
}
