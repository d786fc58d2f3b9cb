//! Durable task queue ingestion.
//!
//! The producer publishes one message per feed per polling round; a pool of
//! consumer workers claims messages, runs [`FeedWorker::handle_task`] and acks
//! or requeues them.

pub mod broker;
pub mod consumer;
pub mod producer;
pub mod worker;

pub use broker::{Delivery, NackOutcome, TaskQueue};
pub use consumer::{ConsumerHandle, ConsumerStats, QueueConsumer};
pub use producer::QueueProducer;
pub use worker::FeedWorker;
