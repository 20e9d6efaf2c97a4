//! Poll loop: one aggregation per tick, result published to the store.
//!
//! Overlapping cycles are impossible: a slow cycle delays the next tick.

use crate::aggregator::{Aggregator, SourcesMap};
use crate::health::HealthTracker;
use crate::state::SnapshotStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

#[derive(Clone)]
pub struct Poller {
    aggregator: Aggregator,
    sources: Arc<SourcesMap>,
    store: SnapshotStore,
    health: HealthTracker,
}

impl Poller {
    pub fn new(
        aggregator: Aggregator,
        sources: Arc<SourcesMap>,
        store: SnapshotStore,
        health: HealthTracker,
    ) -> Self {
        Self { aggregator, sources, store, health }
    }

    /// Runs a single cycle and publishes its snapshot.
    pub async fn poll_once(&self) {
        let started = Instant::now();
        let snapshot = self.aggregator.aggregate(&self.sources).await;
        let (finished_at, errors) = (snapshot.taken_at, snapshot.error_count());
        self.store.publish(snapshot);
        self.health.record_poll(finished_at, started.elapsed(), errors);
    }

    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        info!(
            "starting poller: {} instances every {}s",
            self.sources.len(),
            every.as_secs()
        );
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.poll_once().await;
            }
        })
    }
}
