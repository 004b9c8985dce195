//! Push transport channel
//!
//! Persistent WebSocket connection to the grid server's push endpoint.
//!
//! # Behaviour
//! - `state_update` frames replace the transport snapshot slot (last value
//!   wins, no buffering)
//! - `threat_detected` frames go straight to the threat feed
//! - `mqtt_status` frames update the secondary-connectivity flag
//! - Frames are handled in receipt order
//!
//! Reconnection uses a fixed delay and a bounded number of consecutive
//! attempts. Once they are used up the channel stays disconnected until a new
//! channel is created. Missed frames are never requested again; the next
//! update or the polling fallback covers the gap.

pub mod messages;

pub use messages::{PushMessage, SecondaryStatus, ThreatDetected};

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::TransportConfig;
use crate::domain::Snapshot;
use crate::reconcile::SnapshotStore;
use crate::threats::ThreatAggregator;

/// Push channel connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("connection closed by server")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts tolerated after a disconnect
    pub max_attempts: u32,
    pub delay: Duration,
}

impl From<&TransportConfig> for ReconnectPolicy {
    fn from(cfg: &TransportConfig) -> Self {
        Self {
            max_attempts: cfg.reconnect_attempts,
            delay: cfg.reconnect_delay(),
        }
    }
}

pub struct TransportChannel {
    url: String,
    policy: ReconnectPolicy,
    store: Arc<SnapshotStore>,
    threats: Arc<ThreatAggregator>,
    state: watch::Sender<ConnectionState>,
    secondary: watch::Sender<bool>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TransportChannel {
    pub fn new(
        url: impl Into<String>,
        policy: ReconnectPolicy,
        store: Arc<SnapshotStore>,
        threats: Arc<ThreatAggregator>,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (secondary, _) = watch::channel(false);
        Self {
            url: url.into(),
            policy,
            store,
            threats,
            state,
            secondary,
            cancel,
            task: Mutex::new(None),
        }
    }

    /// Starts the connection task. Calling it again is a no-op.
    pub fn connect(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let this = Arc::clone(self);
        *task = Some(tokio::spawn(async move { this.run().await }));
    }

    /// Closes the socket and stops reconnecting. The channel cannot be
    /// reconnected afterwards.
    pub async fn close(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "push channel task ended abnormally");
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Whether the connection task (including its reconnect loop) is alive
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Reconnect budget ran out; only a new channel connects again.
    pub fn has_given_up(&self) -> bool {
        !self.cancel.is_cancelled()
            && self
                .task
                .lock()
                .as_ref()
                .is_some_and(|handle| handle.is_finished())
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn secondary_connected(&self) -> bool {
        *self.secondary.borrow()
    }

    pub fn subscribe_secondary(&self) -> watch::Receiver<bool> {
        self.secondary.subscribe()
    }

    /// Applies one text frame.
    pub fn handle_frame(&self, text: &str) {
        let msg = match serde_json::from_str::<PushMessage>(text) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, "dropping undecodable push frame");
                return;
            }
        };

        match msg {
            PushMessage::StateUpdate(raw) => match Snapshot::from_value(raw) {
                Some(snapshot) => self.store.set_transport(snapshot),
                None => warn!("state_update payload is not an object"),
            },
            PushMessage::ThreatDetected(detected) => self.threats.ingest_push(detected.into()),
            PushMessage::MqttStatus(status) => {
                self.secondary.send_replace(status.connected);
            }
        }
    }

    async fn run(self: Arc<Self>) {
        let mut failures: u32 = 0;
        loop {
            self.set_state(ConnectionState::Connecting);
            let attempt = tokio::select! {
                _ = self.cancel.cancelled() => break,
                attempt = connect_async(self.url.as_str()) => attempt,
            };

            match attempt {
                Ok((ws, _)) => {
                    failures = 0;
                    self.set_state(ConnectionState::Connected);
                    info!(url = %self.url, "push channel connected");
                    if let Err(e) = self.pump(ws).await {
                        warn!(error = %e, "push channel lost");
                    }
                    self.set_state(ConnectionState::Disconnected);
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    warn!(url = %self.url, failures, error = %e, "push channel connect failed");
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }
            failures += 1;
            if failures > self.policy.max_attempts {
                error!(
                    attempts = self.policy.max_attempts,
                    "push channel reconnection attempts exhausted"
                );
                break;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.policy.delay) => {}
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Reads frames until the peer goes away (error) or the channel is
    /// cancelled (`Ok`).
    async fn pump<S>(&self, ws: WebSocketStream<S>) -> Result<(), TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut sink, mut stream) = ws.split();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        debug!(error = %e, "close frame not delivered");
                    }
                    return Ok(());
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                    Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!(state = ?next, "push channel state changed");
        }
    }
}
