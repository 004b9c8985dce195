//! Polling fallback
//!
//! Periodic request/response refresh of the grid state and the threat log.
//! A failed round leaves the previously stored value untouched; the next tick
//! simply tries again.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::reconcile::SnapshotStore;
use crate::threats::ThreatAggregator;
use crate::upstream::GridApi;

pub struct SnapshotPoller {
    api: Arc<dyn GridApi>,
    store: Arc<SnapshotStore>,
    every: Duration,
}

impl SnapshotPoller {
    pub fn new(api: Arc<dyn GridApi>, store: Arc<SnapshotStore>, every: Duration) -> Self {
        Self { api, store, every }
    }

    /// One poll round. Returns whether the polled slot was updated.
    pub async fn poll_once(&self) -> bool {
        match self.api.fetch_state().await {
            Ok(snapshot) => {
                self.store.set_polled(snapshot);
                true
            }
            Err(e) => {
                warn!(error = %e, "state poll failed, keeping previous snapshot");
                false
            }
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(every_secs = self.every.as_secs(), "state poller started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.poll_once().await;
                }
            }
        }
        debug!("state poller stopped");
    }
}

pub struct ThreatLogPoller {
    api: Arc<dyn GridApi>,
    feed: Arc<ThreatAggregator>,
    every: Duration,
    limit: usize,
}

impl ThreatLogPoller {
    pub fn new(
        api: Arc<dyn GridApi>,
        feed: Arc<ThreatAggregator>,
        every: Duration,
        limit: usize,
    ) -> Self {
        Self { api, feed, every, limit }
    }

    pub async fn poll_once(&self) -> bool {
        match self.api.fetch_threat_logs(self.limit).await {
            Ok(batch) => {
                self.feed.ingest_polled(batch);
                true
            }
            Err(e) => {
                warn!(error = %e, "threat log poll failed");
                false
            }
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(every_secs = self.every.as_secs(), limit = self.limit, "threat log poller started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.poll_once().await;
                }
            }
        }
        debug!("threat log poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Snapshot, ThreatEvent};
    use crate::threats::FEED_CAPACITY;
    use crate::upstream::{MockGridApi, UpstreamError};

    fn store() -> Arc<SnapshotStore> {
        Arc::new(SnapshotStore::new(Duration::from_secs(10)))
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_previous_snapshot() {
        let mut api = MockGridApi::new();
        let mut seq = mockall::Sequence::new();
        api.expect_fetch_state()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Snapshot { voltage: Some(231.0), ..Default::default() }));
        api.expect_fetch_state()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(UpstreamError::Status(500)));

        let store = store();
        let poller = SnapshotPoller::new(Arc::new(api), store.clone(), Duration::from_secs(5));
        assert!(poller.poll_once().await);
        assert!(!poller.poll_once().await);
        assert_eq!(store.polled_snapshot().unwrap().voltage, Some(231.0));
    }

    #[tokio::test]
    async fn test_threat_poll_feeds_aggregator() {
        let mut api = MockGridApi::new();
        api.expect_fetch_threat_logs()
            .withf(|limit| *limit == 100)
            .returning(|_| {
                Ok(vec![
                    ThreatEvent { id: 3, ..Default::default() },
                    ThreatEvent { id: 9, ..Default::default() },
                ])
            });

        let feed = Arc::new(ThreatAggregator::new(FEED_CAPACITY));
        let poller = ThreatLogPoller::new(Arc::new(api), feed.clone(), Duration::from_secs(10), 100);
        assert!(poller.poll_once().await);
        let ids: Vec<i64> = feed.events().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![9, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let mut api = MockGridApi::new();
        api.expect_fetch_state().returning(|| Ok(Snapshot::default()));
        let poller = SnapshotPoller::new(Arc::new(api), store(), Duration::from_secs(5));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poller.run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(12)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
