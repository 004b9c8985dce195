use anyhow::Result;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[validate(nested)]
    pub upstream: UpstreamConfig,
    #[validate(nested)]
    pub transport: TransportConfig,
    #[validate(nested)]
    pub polling: PollingConfig,
    #[validate(nested)]
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
    pub enable_cors: bool,
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            enable_cors: false,
            cors_origin: "http://localhost:3000".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// Bearer token operator clients present to the local API
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base of the REST API, e.g. `http://scada.local:5000/api`
    #[validate(length(min = 1))]
    pub base_url: String,
    /// Push channel endpoint (`ws://` or `wss://`)
    #[validate(length(min = 1))]
    pub push_url: String,
    #[validate(range(min = 1))]
    pub http_timeout_seconds: u64,
    /// Credentials issued by the external auth collaborator, attached as-is
    pub bearer_token: Option<String>,
    pub session_cookie: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000/api".to_string(),
            push_url: "ws://127.0.0.1:5000/push".to_string(),
            http_timeout_seconds: 10,
            bearer_token: None,
            session_cookie: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct TransportConfig {
    /// Consecutive reconnection attempts before the channel gives up
    pub reconnect_attempts: u32,
    #[validate(range(min = 1))]
    pub reconnect_delay_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
        }
    }
}

impl TransportConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct PollingConfig {
    #[validate(range(min = 1))]
    pub state_interval_seconds: u64,
    #[validate(range(min = 1))]
    pub threats_interval_seconds: u64,
    #[validate(range(min = 1, max = 1000))]
    pub threat_batch_limit: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            state_interval_seconds: 5,
            threats_interval_seconds: 10,
            threat_batch_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ReconcileConfig {
    #[validate(range(min = 1))]
    pub override_ttl_seconds: u64,
    #[validate(range(min = 1))]
    pub threat_feed_capacity: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            override_ttl_seconds: 10,
            threat_feed_capacity: crate::threats::FEED_CAPACITY,
        }
    }
}

impl ReconcileConfig {
    pub fn override_ttl(&self) -> Duration {
        Duration::from_secs(self.override_ttl_seconds)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("GRIDCON__").split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Self = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }
}
