use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, COOKIE, USER_AGENT};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::{AuthSignal, GridApi, UpstreamError};
use crate::config::UpstreamConfig;
use crate::domain::{
    AuditEntry, ControlAck, ControlAction, ControlRequest, HistoricalData, HistoryWindow,
    SecurityStatus, Snapshot, ThreatEvent, ThreatStats,
};

/// reqwest-backed [`GridApi`]
#[derive(Clone)]
pub struct HttpGridApi {
    base_url: String,
    client: reqwest::Client,
    auth: AuthSignal,
}

impl HttpGridApi {
    pub fn new(cfg: &UpstreamConfig, auth: AuthSignal) -> Result<Self, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("grid-console/0.2"));
        if let Some(token) = cfg.bearer_token.as_deref().filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| UpstreamError::Config(format!("bearer token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        if let Some(cookie) = cfg.session_cookie.as_deref().filter(|c| !c.is_empty()) {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| UpstreamError::Config(format!("session cookie: {e}")))?;
            headers.insert(COOKIE, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_seconds))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            client,
            auth,
        })
    }

    pub fn auth(&self) -> &AuthSignal {
        &self.auth
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let outcome = async {
            let resp = self.client.get(self.url(path)).query(query).send().await?;
            read_json(resp).await
        }
        .await;
        self.auth.observe(&outcome);
        outcome
    }
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, UpstreamError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(UpstreamError::Unauthorized);
    }
    if !status.is_success() {
        debug!(%status, "upstream non-success response");
        return Err(UpstreamError::Status(status.as_u16()));
    }
    let body = resp.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| UpstreamError::Decode(e.to_string()))
}

#[async_trait]
impl GridApi for HttpGridApi {
    async fn fetch_state(&self) -> Result<Snapshot, UpstreamError> {
        let raw: serde_json::Value = self.get_json("/state", &[]).await?;
        Snapshot::from_value(raw)
            .ok_or_else(|| UpstreamError::Decode("state payload is not an object".into()))
    }

    async fn fetch_threat_logs(&self, limit: usize) -> Result<Vec<ThreatEvent>, UpstreamError> {
        self.get_json(
            "/get_logs",
            &[("type", "threats".to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn fetch_audit_logs(&self, limit: usize) -> Result<Vec<AuditEntry>, UpstreamError> {
        self.get_json(
            "/get_logs",
            &[("type", "audit".to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn fetch_security_status(&self) -> Result<SecurityStatus, UpstreamError> {
        self.get_json("/v1/security-status", &[]).await
    }

    async fn fetch_stats(&self) -> Result<ThreatStats, UpstreamError> {
        self.get_json("/get_stats", &[]).await
    }

    async fn fetch_historical(&self, window: HistoryWindow) -> Result<HistoricalData, UpstreamError> {
        self.get_json("/v1/historical-data", &window.query()).await
    }

    async fn send_control(&self, action: ControlAction) -> Result<ControlAck, UpstreamError> {
        let outcome = async {
            let resp = self
                .client
                .post(self.url("/control"))
                .json(&ControlRequest { action })
                .send()
                .await?;
            read_json(resp).await
        }
        .await;
        self.auth.observe(&outcome);
        outcome
    }
}
