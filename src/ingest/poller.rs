//! Periodic ingestion scheduler.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::MIN_POLL_INTERVAL_SECS;
use crate::shutdown::ShutdownSignal;
use crate::{NewsaggError, Result};

/// Lifecycle of a [`Poller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Waiting for the next tick.
    Idle,
    /// Handing the feed list to the dispatcher.
    Ticking,
    /// Cancelled; no further rounds will start.
    Stopped,
}

/// Where a polling round sends its feeds.
///
/// Implementations must hand the work off and return without waiting for
/// the feeds to be ingested.
pub trait Dispatch: Send + Sync {
    /// Start one ingestion round over `feeds`.
    fn dispatch(&self, feeds: &[String]) -> impl Future<Output = ()> + Send;
}

/// Repeating timer that starts one ingestion round per tick.
///
/// The first round starts immediately; missed ticks are skipped.
pub struct Poller<D> {
    feeds: Vec<String>,
    interval: Duration,
    dispatcher: D,
    state: watch::Sender<PollerState>,
}

impl<D: Dispatch> Poller<D> {
    /// Create a poller. Intervals shorter than [`MIN_POLL_INTERVAL_SECS`] are rejected.
    pub fn new(feeds: Vec<String>, interval: Duration, dispatcher: D) -> Result<Self> {
        if interval < Duration::from_secs(MIN_POLL_INTERVAL_SECS) {
            return Err(NewsaggError::Validation(format!(
                "poll interval must be >= {} seconds (got {:?})",
                MIN_POLL_INTERVAL_SECS, interval
            )));
        }

        let (state, _) = watch::channel(PollerState::Idle);
        Ok(Self {
            feeds,
            interval,
            dispatcher,
            state,
        })
    }

    /// Current state.
    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }

    /// The configured feeds.
    pub fn feeds(&self) -> &[String] {
        &self.feeds
    }

    /// Give back the dispatcher, typically to drain it after [`run`](Self::run).
    pub fn into_dispatcher(self) -> D {
        self.dispatcher
    }

    /// Run rounds until `shutdown` fires. Returns the number of rounds started.
    pub async fn run(&self, mut shutdown: ShutdownSignal) -> u64 {
        let mut rounds = 0;

        if shutdown.is_cancelled() {
            self.state.send_replace(PollerState::Stopped);
            return rounds;
        }

        info!(
            feeds = self.feeds.len(),
            interval_secs = self.interval.as_secs(),
            "Poller started"
        );

        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {
                    self.state.send_replace(PollerState::Ticking);
                    rounds += 1;
                    info!(round = rounds, feeds = self.feeds.len(), "Starting polling round");
                    self.dispatcher.dispatch(&self.feeds).await;
                    debug!(round = rounds, "Polling round dispatched");
                    self.state.send_replace(PollerState::Idle);
                }
            }
        }

        self.state.send_replace(PollerState::Stopped);
        info!(rounds, "Poller stopped");
        rounds
    }
}
