//! Snapshot reconciliation
//!
//! Combines the push-fed transport snapshot, the polled fallback snapshot and
//! the dispatcher's pending overrides into the single snapshot shown to
//! operators.
//!
//! # Rules
//! - Base selection is [`transport_first`]: the transport slot wins whenever
//!   it holds a value, regardless of arrival time.
//! - Overrides shadow base fields until an authoritative base confirms the
//!   same value, a newer override replaces them, or they outlive the TTL.
//! - Retirement by confirmation never changes the effective snapshot, so
//!   confirmations cannot cause a flip-back.
//!
//! Each input slot has its own lock and exactly one writer. Locks are never
//! held across an `.await`. When more than one is taken, the order is
//! transport, polled, overrides.

pub mod overrides;

pub use overrides::{merge, Override, OverrideSet, PendingField};

use parking_lot::RwLock;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::{Snapshot, SnapshotField};

/// Feed that supplied the base snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseSource {
    Transport,
    Polling,
}

/// Precedence rule between the two feeds: transport if present, else polling.
pub fn transport_first<'a>(
    transport: Option<&'a Snapshot>,
    polled: Option<&'a Snapshot>,
) -> Option<(BaseSource, &'a Snapshot)> {
    transport
        .map(|s| (BaseSource::Transport, s))
        .or_else(|| polled.map(|s| (BaseSource::Polling, s)))
}

/// Display-ready view of the reconciled state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveView {
    pub revision: u64,
    pub source: Option<BaseSource>,
    pub snapshot: Option<Snapshot>,
    /// Fields currently shadowed by a pending override
    pub overridden: Vec<SnapshotField>,
}

pub struct SnapshotStore {
    transport: RwLock<Option<Snapshot>>,
    polled: RwLock<Option<Snapshot>>,
    overrides: RwLock<OverrideSet>,
    override_ttl: Duration,
    revision: watch::Sender<u64>,
}

impl SnapshotStore {
    pub fn new(override_ttl: Duration) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            transport: RwLock::new(None),
            polled: RwLock::new(None),
            overrides: RwLock::new(OverrideSet::new()),
            override_ttl,
            revision,
        }
    }

    /// Replaces the transport slot. Written only by the transport channel.
    pub fn set_transport(&self, snapshot: Snapshot) {
        *self.transport.write() = Some(snapshot);
        self.retire_confirmed();
        self.bump();
    }

    /// Replaces the polled slot. Written only by the polling client.
    pub fn set_polled(&self, snapshot: Snapshot) {
        *self.polled.write() = Some(snapshot);
        self.retire_confirmed();
        self.bump();
    }

    /// Installs a speculative override. Written only by the dispatcher.
    pub fn install_override(&self, ov: &Override) {
        self.install_override_at(ov, Instant::now());
    }

    pub fn install_override_at(&self, ov: &Override, now: Instant) {
        self.overrides.write().install(ov, now);
        self.retire_confirmed();
        self.bump();
    }

    /// Withdraws a pending field without installing a replacement value.
    pub fn retract_override(&self, field: SnapshotField, seq: u64) {
        if self.overrides.write().retract(field, seq) {
            self.bump();
        }
    }

    /// Base snapshot picked by [`transport_first`], without overrides.
    pub fn base_snapshot(&self) -> Option<Snapshot> {
        let transport = self.transport.read();
        let polled = self.polled.read();
        transport_first(transport.as_ref(), polled.as_ref()).map(|(_, s)| s.clone())
    }

    pub fn transport_snapshot(&self) -> Option<Snapshot> {
        self.transport.read().clone()
    }

    pub fn polled_snapshot(&self) -> Option<Snapshot> {
        self.polled.read().clone()
    }

    pub fn pending_overrides(&self) -> OverrideSet {
        self.overrides.read().clone()
    }

    pub fn effective_snapshot(&self) -> Option<Snapshot> {
        self.effective().snapshot
    }

    pub fn effective(&self) -> EffectiveView {
        self.effective_at(Instant::now())
    }

    /// Reconciled view as of `now`; overrides older than the TTL are dropped
    /// first.
    pub fn effective_at(&self, now: Instant) -> EffectiveView {
        let transport = self.transport.read();
        let polled = self.polled.read();
        let mut overrides = self.overrides.write();

        let expired = overrides.expire(now, self.override_ttl);
        if expired > 0 {
            debug!(expired, "override ttl elapsed");
            self.bump();
        }

        let base = transport_first(transport.as_ref(), polled.as_ref());
        EffectiveView {
            revision: *self.revision.borrow(),
            source: base.map(|(source, _)| source),
            snapshot: merge(base.map(|(_, s)| s), &overrides),
            overridden: overrides.fields().map(|(field, _)| field).collect(),
        }
    }

    /// Revision counter, bumped on every input change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn retire_confirmed(&self) {
        let transport = self.transport.read();
        let polled = self.polled.read();
        if let Some((source, base)) = transport_first(transport.as_ref(), polled.as_ref()) {
            let retired = self.overrides.write().retire_confirmed(base);
            if retired > 0 {
                debug!(retired, ?source, "overrides confirmed by authoritative snapshot");
            }
        }
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }
}
