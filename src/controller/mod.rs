use anyhow::Result;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatcher::CommandDispatcher;
use crate::polling::{SnapshotPoller, ThreatLogPoller};
use crate::reconcile::{EffectiveView, SnapshotStore};
use crate::threats::ThreatAggregator;
use crate::transport::{ConnectionState, ReconnectPolicy, TransportChannel};
use crate::upstream::{AuthSignal, GridApi, HttpGridApi};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub console: Arc<Console>,
}

impl AppState {
    pub fn new(cfg: Config) -> Result<Self> {
        let console = Arc::new(Console::new(&cfg)?);
        Ok(Self { cfg, console })
    }
}

/// Connectivity indicators shown next to the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Connectivity {
    pub transport: ConnectionState,
    /// Push channel gave up reconnecting
    pub transport_exhausted: bool,
    pub secondary: bool,
    pub authorized: bool,
}

/// Owns every reconciliation component and the background tasks feeding them.
pub struct Console {
    pub store: Arc<SnapshotStore>,
    pub threats: Arc<ThreatAggregator>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub transport: Arc<TransportChannel>,
    pub api: Arc<dyn GridApi>,
    pub auth: AuthSignal,
    state_every: Duration,
    threats_every: Duration,
    threat_batch_limit: usize,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Console {
    /// Builds a console talking to the configured upstream over HTTP.
    pub fn new(cfg: &Config) -> Result<Self> {
        let auth = AuthSignal::new();
        let api = Arc::new(HttpGridApi::new(&cfg.upstream, auth.clone())?);
        Ok(Self::with_api(cfg, api, auth))
    }

    pub fn with_api(cfg: &Config, api: Arc<dyn GridApi>, auth: AuthSignal) -> Self {
        let cancel = CancellationToken::new();
        let store = Arc::new(SnapshotStore::new(cfg.reconcile.override_ttl()));
        let threats = Arc::new(ThreatAggregator::new(cfg.reconcile.threat_feed_capacity));
        let dispatcher = Arc::new(CommandDispatcher::new(api.clone(), store.clone()));
        let transport = Arc::new(TransportChannel::new(
            cfg.upstream.push_url.clone(),
            ReconnectPolicy::from(&cfg.transport),
            store.clone(),
            threats.clone(),
            cancel.child_token(),
        ));

        Self {
            store,
            threats,
            dispatcher,
            transport,
            api,
            auth,
            state_every: Duration::from_secs(cfg.polling.state_interval_seconds),
            threats_every: Duration::from_secs(cfg.polling.threats_interval_seconds),
            threat_batch_limit: cfg.polling.threat_batch_limit,
            cancel,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Connects the push channel and starts both pollers. Idempotent.
    pub fn start(&self) {
        if self.cancel.is_cancelled() {
            warn!("console already shut down, not starting");
            return;
        }
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        self.transport.connect();

        let poller = SnapshotPoller::new(self.api.clone(), self.store.clone(), self.state_every);
        tasks.push(tokio::spawn(poller.run(self.cancel.child_token())));

        let poller = ThreatLogPoller::new(
            self.api.clone(),
            self.threats.clone(),
            self.threats_every,
            self.threat_batch_limit,
        );
        tasks.push(tokio::spawn(poller.run(self.cancel.child_token())));

        info!("console started");
    }

    /// Stops every background task and waits for them to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.transport.close().await;
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "console task ended abnormally");
            }
        }
        info!("console stopped");
    }

    pub fn effective(&self) -> EffectiveView {
        self.store.effective()
    }

    pub fn connectivity(&self) -> Connectivity {
        let reported = self
            .store
            .effective_snapshot()
            .and_then(|s| s.mqtt_connected)
            .unwrap_or(false);
        Connectivity {
            transport: self.transport.state(),
            transport_exhausted: self.transport.has_given_up(),
            secondary: self.transport.secondary_connected() || reported,
            authorized: self.auth.is_authorized(),
        }
    }

    /// Token cancelled on shutdown, for long-lived consumers such as streams
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.child_token()
    }
}
