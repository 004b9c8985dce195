//! Read-only collaborator payloads: security status, statistics, audit log
//! and historical grid samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::snapshot::or_default;
use super::SecurityLevel;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectionStats {
    pub total_inspected: u64,
    pub total_blocked: u64,
    pub threat_intel_blocks: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatIntelStatus {
    pub enabled: bool,
    pub total_indicators: u64,
    pub last_refresh: Option<String>,
}

/// `GET /v1/security-status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityStatus {
    pub security_posture: SecurityLevel,
    #[serde(default)]
    pub attack_score: f64,
    #[serde(default)]
    pub stats: InspectionStats,
    #[serde(default)]
    pub threat_intel: ThreatIntelStatus,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineStats {
    pub total_inspected: u64,
    pub total_blocked: u64,
    pub threat_intel_blocks: u64,
    pub attack_score: f64,
    pub security_posture: Option<SecurityLevel>,
}

/// `GET /get_stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatStats {
    pub total_threats: u64,
    pub critical_threats: u64,
    pub threats_by_category: BTreeMap<String, u64>,
    pub security_engine_stats: EngineStats,
}

/// One row of `GET /get_logs?type=audit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    #[serde(default, deserialize_with = "or_default")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "or_default")]
    pub action: String,
    #[serde(default, deserialize_with = "or_default")]
    pub username: String,
    #[serde(default, deserialize_with = "or_default")]
    pub details: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridDataPoint {
    pub id: i64,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub gen_mw: f64,
    #[serde(default)]
    pub load_mw: f64,
    #[serde(default)]
    pub voltage: f64,
    #[serde(default)]
    pub frequency: f64,
    pub security_level: Option<SecurityLevel>,
    #[serde(default)]
    pub attack_score: f64,
}

/// `GET /v1/historical-data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalData {
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub total_records: u64,
    #[serde(default)]
    pub data: Vec<GridDataPoint>,
}

/// Query window for historical samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl HistoryWindow {
    pub fn last_hours(now: DateTime<Utc>, hours: i64) -> Self {
        Self {
            start: now - chrono::Duration::hours(hours),
            end: now,
        }
    }

    pub fn query(&self) -> [(&'static str, String); 2] {
        [
            ("start", self.start.to_rfc3339()),
            ("end", self.end.to_rfc3339()),
        ]
    }
}
