//! Upstream SCADA server client
//!
//! Request/response access to the grid server: the polled state, control
//! commands and the read-only security collaborators. Authentication is owned
//! by an external collaborator; this module only reports whether requests are
//! currently being accepted through [`AuthSignal`].

pub mod http;

pub use http::HttpGridApi;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use crate::domain::{
    AuditEntry, ControlAck, ControlAction, HistoricalData, HistoryWindow, SecurityStatus,
    Snapshot, ThreatEvent, ThreatStats,
};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("upstream returned HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("response decode failed: {0}")]
    Decode(String),

    #[error("invalid upstream configuration: {0}")]
    Config(String),
}

impl UpstreamError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GridApi: Send + Sync {
    /// `GET /state`
    async fn fetch_state(&self) -> Result<Snapshot, UpstreamError>;

    /// `GET /get_logs?type=threats`
    async fn fetch_threat_logs(&self, limit: usize) -> Result<Vec<ThreatEvent>, UpstreamError>;

    /// `GET /get_logs?type=audit`
    async fn fetch_audit_logs(&self, limit: usize) -> Result<Vec<AuditEntry>, UpstreamError>;

    /// `GET /v1/security-status`
    async fn fetch_security_status(&self) -> Result<SecurityStatus, UpstreamError>;

    /// `GET /get_stats`
    async fn fetch_stats(&self) -> Result<ThreatStats, UpstreamError>;

    /// `GET /v1/historical-data`
    async fn fetch_historical(&self, window: HistoryWindow) -> Result<HistoricalData, UpstreamError>;

    /// `POST /control`
    async fn send_control(&self, action: ControlAction) -> Result<ControlAck, UpstreamError>;
}

/// Authorized/unauthorized as last observed from upstream responses
#[derive(Debug, Clone)]
pub struct AuthSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for AuthSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(true);
        Self { tx: Arc::new(tx) }
    }

    /// Folds a request outcome into the signal. Only 401 and success move it;
    /// other failures say nothing about authorization.
    pub fn observe<T>(&self, outcome: &Result<T, UpstreamError>) {
        let authorized = match outcome {
            Ok(_) => true,
            Err(UpstreamError::Unauthorized) => false,
            Err(_) => return,
        };
        self.tx.send_if_modified(|current| {
            if *current == authorized {
                return false;
            }
            *current = authorized;
            true
        });
    }

    pub fn is_authorized(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_signal_tracks_401() {
        let auth = AuthSignal::new();
        assert!(auth.is_authorized());

        auth.observe::<()>(&Err(UpstreamError::Unauthorized));
        assert!(!auth.is_authorized());

        auth.observe::<()>(&Err(UpstreamError::Status(502)));
        assert!(!auth.is_authorized());

        auth.observe(&Ok(()));
        assert!(auth.is_authorized());
    }

    #[test]
    fn test_auth_signal_notifies_only_on_change() {
        let auth = AuthSignal::new();
        let mut rx = auth.subscribe();
        auth.observe(&Ok(()));
        assert!(!rx.has_changed().unwrap());

        auth.observe::<()>(&Err(UpstreamError::Unauthorized));
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
    }
}
