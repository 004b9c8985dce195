#![allow(dead_code)]
use async_trait::async_trait;
use grid_console::config::Config;
use grid_console::controller::{AppState, Console};
use grid_console::domain::{
    AuditEntry, ControlAck, ControlAction, HistoricalData, HistoryWindow, SecurityLevel,
    SecurityStatus, Snapshot, ThreatEvent, ThreatStats,
};
use grid_console::upstream::{AuthSignal, GridApi, UpstreamError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const TOKEN: &str = "test-token";

/// Scripted grid server
#[derive(Default)]
pub struct FakeGridApi {
    pub state: Mutex<Option<Snapshot>>,
    pub threat_logs: Mutex<Vec<ThreatEvent>>,
    pub controls: Mutex<Vec<ControlAction>>,
    pub reject_controls: AtomicBool,
    pub unreachable: AtomicBool,
}

impl FakeGridApi {
    pub fn sent(&self) -> Vec<ControlAction> {
        self.controls.lock().clone()
    }

    pub fn go_offline(&self) {
        self.unreachable.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), UpstreamError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(UpstreamError::Status(503));
        }
        Ok(())
    }
}

#[async_trait]
impl GridApi for FakeGridApi {
    async fn fetch_state(&self) -> Result<Snapshot, UpstreamError> {
        self.check()?;
        self.state.lock().clone().ok_or(UpstreamError::Status(404))
    }

    async fn fetch_threat_logs(&self, limit: usize) -> Result<Vec<ThreatEvent>, UpstreamError> {
        self.check()?;
        Ok(self.threat_logs.lock().iter().take(limit).cloned().collect())
    }

    async fn fetch_audit_logs(&self, _limit: usize) -> Result<Vec<AuditEntry>, UpstreamError> {
        self.check()?;
        Ok(Vec::new())
    }

    async fn fetch_security_status(&self) -> Result<SecurityStatus, UpstreamError> {
        self.check()?;
        Ok(SecurityStatus {
            security_posture: SecurityLevel::Normal,
            attack_score: 0.1,
            stats: Default::default(),
            threat_intel: Default::default(),
            timestamp: "2024-03-01T10:00:00".to_string(),
        })
    }

    async fn fetch_stats(&self) -> Result<ThreatStats, UpstreamError> {
        self.check()?;
        Ok(ThreatStats::default())
    }

    async fn fetch_historical(&self, _window: HistoryWindow) -> Result<HistoricalData, UpstreamError> {
        Err(UpstreamError::Unauthorized)
    }

    async fn send_control(&self, action: ControlAction) -> Result<ControlAck, UpstreamError> {
        self.controls.lock().push(action);
        self.check()?;
        if self.reject_controls.load(Ordering::SeqCst) {
            return Ok(ControlAck {
                success: false,
                message: Some("rejected".to_string()),
            });
        }
        Ok(ControlAck {
            success: true,
            message: None,
        })
    }
}

pub fn config() -> Config {
    let mut cfg = Config::default();
    cfg.auth.token = TOKEN.to_string();
    // Nothing listens here; the channel gives up quickly.
    cfg.upstream.push_url = "ws://127.0.0.1:9/push".to_string();
    cfg.transport.reconnect_attempts = 0;
    cfg
}

pub fn console(api: Arc<FakeGridApi>) -> Arc<Console> {
    Arc::new(Console::with_api(&config(), api, AuthSignal::new()))
}

pub fn app_state(api: Arc<FakeGridApi>) -> AppState {
    AppState {
        cfg: config(),
        console: console(api),
    }
}
