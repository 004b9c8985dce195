//! Push channel message definitions
//!
//! Frames are JSON text: `{"event": "<name>", "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::domain::snapshot::or_default;
use crate::domain::{EventSource, ThreatClassification, ThreatEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushMessage {
    /// Full or partial grid state; decoded leniently into a snapshot
    StateUpdate(serde_json::Value),
    ThreatDetected(ThreatDetected),
    MqttStatus(SecondaryStatus),
}

/// Live detection as emitted by the inspection engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatDetected {
    pub id: i64,
    #[serde(default, deserialize_with = "or_default")]
    pub layer: String,
    #[serde(default, deserialize_with = "or_default")]
    pub threat: ThreatClassification,
    #[serde(default, deserialize_with = "or_default")]
    pub explanation: String,
    #[serde(default, deserialize_with = "or_default")]
    pub timestamp: String,
}

impl From<ThreatDetected> for ThreatEvent {
    fn from(t: ThreatDetected) -> Self {
        Self {
            id: t.id,
            timestamp: t.timestamp,
            decision_id: format!("DEC-{}", t.id),
            action: "BLOCK".to_string(),
            layer: t.layer,
            threat_classification: t.threat,
            explanation: t.explanation,
            metadata: serde_json::Map::new(),
            source: EventSource::Push,
        }
    }
}

/// Secondary (MQTT) broker connectivity as seen by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryStatus {
    pub connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;
    use serde_json::json;

    #[test]
    fn test_state_update_frame() {
        let msg: PushMessage =
            serde_json::from_str(r#"{"event":"state_update","data":{"gen_mw":42.3}}"#).unwrap();
        assert_eq!(msg, PushMessage::StateUpdate(json!({ "gen_mw": 42.3 })));
    }

    #[test]
    fn test_threat_frame_derives_decision_id() {
        let msg: PushMessage = serde_json::from_value(json!({
            "event": "threat_detected",
            "data": {
                "id": 88,
                "layer": "protocol",
                "threat": { "category": "dos", "subcategory": "flood", "severity": "CRITICAL" },
                "explanation": "burst from 10.0.0.9",
                "timestamp": "2024-03-01T10:00:00"
            }
        }))
        .unwrap();

        let PushMessage::ThreatDetected(detected) = msg else {
            panic!("expected threat_detected");
        };
        let event = ThreatEvent::from(detected);
        assert_eq!(event.decision_id, "DEC-88");
        assert_eq!(event.action, "BLOCK");
        assert_eq!(event.source, EventSource::Push);
        assert_eq!(event.severity(), Severity::Critical);
        assert!(event.metadata.is_empty());
    }

    #[test]
    fn test_threat_frame_with_null_fields() {
        let msg: PushMessage = serde_json::from_str(
            r#"{"event":"threat_detected","data":{"id":5,"layer":null,"threat":{"category":"dos","subcategory":null,"severity":null},"explanation":null,"timestamp":"t"}}"#,
        )
        .unwrap();

        let PushMessage::ThreatDetected(detected) = msg else {
            panic!("expected threat_detected");
        };
        let event = ThreatEvent::from(detected);
        assert_eq!(event.id, 5);
        assert_eq!(event.severity(), Severity::Unknown);
        assert_eq!(event.threat_classification.category, "dos");
        assert_eq!(event.layer, "");
        assert_eq!(event.explanation, "");
    }

    #[test]
    fn test_mqtt_status_frame() {
        let msg: PushMessage =
            serde_json::from_str(r#"{"event":"mqtt_status","data":{"connected":true}}"#).unwrap();
        assert_eq!(msg, PushMessage::MqttStatus(SecondaryStatus { connected: true }));
    }

    #[test]
    fn test_unknown_event_is_an_error() {
        assert!(serde_json::from_str::<PushMessage>(r#"{"event":"chat","data":{}}"#).is_err());
    }
}
