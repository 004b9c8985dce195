//! Threat event feed
//!
//! Merges push-delivered detections with polled threat logs into one feed,
//! ordered by id descending, never holding more than `capacity` entries or
//! two entries with the same id.

use itertools::Itertools;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::watch;
use tracing::debug;

use crate::domain::{EventSource, ThreatEvent};

/// Default number of retained events
pub const FEED_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct ThreatFeed {
    /// Sorted by id, descending
    events: Vec<ThreatEvent>,
    capacity: usize,
}

impl Default for ThreatFeed {
    fn default() -> Self {
        Self::new(FEED_CAPACITY)
    }
}

impl ThreatFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds a live detection. A known id is replaced by the push entry.
    pub fn ingest_push(&mut self, mut event: ThreatEvent) {
        event.source = EventSource::Push;
        if let Some(pos) = self.position(event.id) {
            self.events.remove(pos);
        }
        // Live ids come from a server counter, so this is the front in practice.
        let at = self.events.partition_point(|e| e.id > event.id);
        self.events.insert(at, event);
        self.events.truncate(self.capacity);
    }

    /// Merges a polled batch. Entries already known from push keep their
    /// push-derived fields; entries known only from polling are refreshed.
    pub fn ingest_polled(&mut self, batch: impl IntoIterator<Item = ThreatEvent>) {
        for mut event in batch {
            event.source = EventSource::Polled;
            match self.position(event.id) {
                Some(pos) if self.events[pos].source == EventSource::Push => {}
                Some(pos) => self.events[pos] = event,
                None => self.events.push(event),
            }
        }
        self.events.sort_by(|a, b| b.id.cmp(&a.id));
        self.events.truncate(self.capacity);
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn events(&self) -> &[ThreatEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn summary(&self) -> ThreatSummary {
        let by_category = self
            .events
            .iter()
            .counts_by(|e| e.threat_classification.category.clone())
            .into_iter()
            .collect();
        ThreatSummary {
            total: self.events.len(),
            critical: self.events.iter().filter(|e| e.is_critical()).count(),
            by_category,
        }
    }

    fn position(&self, id: i64) -> Option<usize> {
        self.events.iter().position(|e| e.id == id)
    }
}

/// Counts over the retained feed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThreatSummary {
    pub total: usize,
    pub critical: usize,
    pub by_category: BTreeMap<String, usize>,
}

/// Shared handle over a [`ThreatFeed`] with change notification
pub struct ThreatAggregator {
    feed: RwLock<ThreatFeed>,
    revision: watch::Sender<u64>,
}

impl ThreatAggregator {
    pub fn new(capacity: usize) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            feed: RwLock::new(ThreatFeed::new(capacity)),
            revision,
        }
    }

    pub fn ingest_push(&self, event: ThreatEvent) {
        debug!(id = event.id, layer = %event.layer, "threat pushed");
        self.feed.write().ingest_push(event);
        self.bump();
    }

    pub fn ingest_polled(&self, batch: Vec<ThreatEvent>) {
        let count = batch.len();
        self.feed.write().ingest_polled(batch);
        debug!(count, "threat log batch merged");
        self.bump();
    }

    pub fn clear(&self) {
        self.feed.write().clear();
        self.bump();
    }

    pub fn events(&self) -> Vec<ThreatEvent> {
        self.feed.read().events().to_vec()
    }

    pub fn len(&self) -> usize {
        self.feed.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.feed.read().is_empty()
    }

    pub fn summary(&self) -> ThreatSummary {
        self.feed.read().summary()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }
}
