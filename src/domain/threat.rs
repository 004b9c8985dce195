use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::snapshot::or_default;

/// Threat severity. Input is matched case-insensitively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
#[strum(ascii_case_insensitive)]
pub enum Severity {
    #[strum(serialize = "INFO")]
    Info,
    #[strum(serialize = "WARNING")]
    Warning,
    #[strum(serialize = "CRITICAL")]
    Critical,
    #[default]
    #[strum(serialize = "UNKNOWN")]
    Unknown,
}

impl From<String> for Severity {
    fn from(raw: String) -> Self {
        raw.trim().parse().unwrap_or(Self::Unknown)
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        severity.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreatClassification {
    #[serde(default, deserialize_with = "or_default")]
    pub category: String,
    #[serde(default, deserialize_with = "or_default")]
    pub subcategory: String,
    #[serde(default, deserialize_with = "or_default")]
    pub severity: Severity,
}

/// Where a feed entry was ingested from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Push,
    #[default]
    Polled,
}

/// A single security detection record.
///
/// Feed order is `id` descending; ids are unique across push and polled
/// events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreatEvent {
    pub id: i64,
    #[serde(default, deserialize_with = "or_default")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "or_default")]
    pub decision_id: String,
    #[serde(default, deserialize_with = "or_default")]
    pub action: String,
    #[serde(default, deserialize_with = "or_default")]
    pub layer: String,
    #[serde(default, deserialize_with = "or_default")]
    pub threat_classification: ThreatClassification,
    #[serde(default, deserialize_with = "or_default")]
    pub explanation: String,
    #[serde(default, deserialize_with = "or_default")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub source: EventSource,
}

impl ThreatEvent {
    pub fn severity(&self) -> Severity {
        self.threat_classification.severity
    }

    pub fn is_critical(&self) -> bool {
        self.severity() == Severity::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stored_threat_log_decodes() {
        let event: ThreatEvent = serde_json::from_value(json!({
            "id": 17,
            "timestamp": "2024-03-01T10:00:00",
            "decision_id": "DEC-17",
            "action": "BLOCK",
            "layer": "L7",
            "threat_classification": {
                "category": "injection",
                "subcategory": "command",
                "severity": "critical"
            },
            "explanation": "blocked control write",
            "metadata": { "src": "10.0.0.5" }
        }))
        .unwrap();

        assert_eq!(event.id, 17);
        assert!(event.is_critical());
        assert_eq!(event.source, EventSource::Polled);
        assert_eq!(event.metadata["src"], json!("10.0.0.5"));
    }

    #[test]
    fn test_sparse_threat_log_uses_defaults() {
        let event: ThreatEvent = serde_json::from_value(json!({ "id": 3 })).unwrap();
        assert_eq!(event.severity(), Severity::Unknown);
        assert!(event.metadata.is_empty());
    }

    #[test]
    fn test_null_columns_decode_to_defaults() {
        let batch: Vec<ThreatEvent> = serde_json::from_value(json!([
            {
                "id": 9,
                "decision_id": "DEC-9",
                "layer": "L7",
                "threat_classification": { "category": "dos", "subcategory": "flood", "severity": "CRITICAL" },
                "explanation": "burst"
            },
            {
                "id": 8,
                "timestamp": null,
                "decision_id": null,
                "action": null,
                "layer": null,
                "threat_classification": { "category": "scan", "subcategory": null, "severity": null },
                "explanation": null,
                "metadata": null
            },
            { "id": 7, "threat_classification": null, "metadata": "n/a" }
        ]))
        .unwrap();

        assert_eq!(batch.len(), 3);
        assert!(batch[0].is_critical());
        assert_eq!(batch[1].decision_id, "");
        assert_eq!(batch[1].threat_classification.category, "scan");
        assert_eq!(batch[1].threat_classification.subcategory, "");
        assert_eq!(batch[1].severity(), Severity::Unknown);
        assert!(batch[1].metadata.is_empty());
        assert_eq!(batch[2].threat_classification, ThreatClassification::default());
        assert!(batch[2].metadata.is_empty());
    }

    #[test]
    fn test_severity_names() {
        assert_eq!(Severity::from("warning".to_string()), Severity::Warning);
        assert_eq!(Severity::from("Info".to_string()), Severity::Info);
        assert_eq!(Severity::from("sev1".to_string()), Severity::Unknown);
        assert_eq!(String::from(Severity::Critical), "CRITICAL");
    }
}
