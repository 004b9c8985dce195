use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Area breaker position as reported by the grid controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
#[strum(ascii_case_insensitive)]
pub enum AreaState {
    #[strum(serialize = "ON")]
    On,
    #[strum(serialize = "OFF")]
    Off,
    #[strum(serialize = "UNKNOWN")]
    Unknown,
}

impl AreaState {
    /// Breaker position after a toggle. Anything that is not `ON` toggles to `ON`.
    pub fn toggled(self) -> Self {
        match self {
            Self::On => Self::Off,
            Self::Off | Self::Unknown => Self::On,
        }
    }
}

impl From<String> for AreaState {
    fn from(raw: String) -> Self {
        raw.trim().parse().unwrap_or(Self::Unknown)
    }
}

impl From<AreaState> for String {
    fn from(state: AreaState) -> Self {
        state.to_string()
    }
}

/// Security posture published by the inspection engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
#[strum(ascii_case_insensitive)]
pub enum SecurityLevel {
    #[strum(serialize = "NORMAL")]
    Normal,
    #[strum(serialize = "WARNING")]
    Warning,
    #[strum(serialize = "CRITICAL")]
    Critical,
    #[strum(serialize = "UNKNOWN")]
    Unknown,
}

impl From<String> for SecurityLevel {
    fn from(raw: String) -> Self {
        raw.trim().parse().unwrap_or(Self::Unknown)
    }
}

impl From<SecurityLevel> for String {
    fn from(level: SecurityLevel) -> Self {
        level.to_string()
    }
}

/// Point-in-time grid telemetry.
///
/// Every field is optional: feeds may deliver partial records, and a field
/// carrying a value of the wrong JSON type is read as absent instead of
/// failing the whole record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    /// Generation output (MW)
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub gen_mw: Option<f64>,
    /// Rotor speed (RPM)
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub gen_rpm: Option<f64>,
    /// Operational status string from the plant (`OK`, `WAITING`, ...)
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Load (W). The wire name is historical.
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub load_mw: Option<f64>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub area1: Option<AreaState>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub area2: Option<AreaState>,
    /// Running billing total
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub calculated_bill: Option<f64>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub security_level: Option<SecurityLevel>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub system_locked: Option<bool>,
    /// Secondary (MQTT) channel connectivity as seen by the server
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub mqtt_connected: Option<bool>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub attack_score: Option<f64>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub threat_intel_active: Option<bool>,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub price_rate: Option<f64>,
    /// Server wall-clock of the last hardware update, opaque (`HH:MM:SS`)
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
}

/// Reads a field, mapping type mismatches to `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

/// Reads a field, mapping `null` and type mismatches to the default value.
pub(crate) fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    lenient(deserializer).map(Option::unwrap_or_default)
}

/// Name of a single [`Snapshot`] field
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SnapshotField {
    GenMw,
    GenRpm,
    Status,
    LoadMw,
    Voltage,
    Frequency,
    #[serde(rename = "area1")]
    #[strum(serialize = "area1")]
    Area1,
    #[serde(rename = "area2")]
    #[strum(serialize = "area2")]
    Area2,
    CalculatedBill,
    SecurityLevel,
    SystemLocked,
    MqttConnected,
    AttackScore,
    ThreatIntelActive,
    PriceRate,
    LastUpdate,
}

/// A single field value, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Flag(bool),
    Area(AreaState),
    Security(SecurityLevel),
}

impl Snapshot {
    /// Builds a snapshot from an arbitrary JSON payload.
    ///
    /// Returns `None` when the payload is not an object.
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    pub fn get(&self, field: SnapshotField) -> Option<FieldValue> {
        use FieldValue as V;
        use SnapshotField as F;
        match field {
            F::GenMw => self.gen_mw.map(V::Number),
            F::GenRpm => self.gen_rpm.map(V::Number),
            F::Status => self.status.clone().map(V::Text),
            F::LoadMw => self.load_mw.map(V::Number),
            F::Voltage => self.voltage.map(V::Number),
            F::Frequency => self.frequency.map(V::Number),
            F::Area1 => self.area1.map(V::Area),
            F::Area2 => self.area2.map(V::Area),
            F::CalculatedBill => self.calculated_bill.map(V::Number),
            F::SecurityLevel => self.security_level.map(V::Security),
            F::SystemLocked => self.system_locked.map(V::Flag),
            F::MqttConnected => self.mqtt_connected.map(V::Flag),
            F::AttackScore => self.attack_score.map(V::Number),
            F::ThreatIntelActive => self.threat_intel_active.map(V::Flag),
            F::PriceRate => self.price_rate.map(V::Number),
            F::LastUpdate => self.last_update.clone().map(V::Text),
        }
    }

    /// Writes `value` into `field`. Returns `false` (and leaves the snapshot
    /// untouched) when the value kind does not fit the field.
    pub fn set(&mut self, field: SnapshotField, value: FieldValue) -> bool {
        use FieldValue as V;
        use SnapshotField as F;
        match (field, value) {
            (F::GenMw, V::Number(n)) => self.gen_mw = Some(n),
            (F::GenRpm, V::Number(n)) => self.gen_rpm = Some(n),
            (F::Status, V::Text(s)) => self.status = Some(s),
            (F::LoadMw, V::Number(n)) => self.load_mw = Some(n),
            (F::Voltage, V::Number(n)) => self.voltage = Some(n),
            (F::Frequency, V::Number(n)) => self.frequency = Some(n),
            (F::Area1, V::Area(a)) => self.area1 = Some(a),
            (F::Area2, V::Area(a)) => self.area2 = Some(a),
            (F::CalculatedBill, V::Number(n)) => self.calculated_bill = Some(n),
            (F::SecurityLevel, V::Security(l)) => self.security_level = Some(l),
            (F::SystemLocked, V::Flag(b)) => self.system_locked = Some(b),
            (F::MqttConnected, V::Flag(b)) => self.mqtt_connected = Some(b),
            (F::AttackScore, V::Number(n)) => self.attack_score = Some(n),
            (F::ThreatIntelActive, V::Flag(b)) => self.threat_intel_active = Some(b),
            (F::PriceRate, V::Number(n)) => self.price_rate = Some(n),
            (F::LastUpdate, V::Text(s)) => self.last_update = Some(s),
            _ => return false,
        }
        true
    }

    pub fn area(&self, field: SnapshotField) -> Option<AreaState> {
        match self.get(field) {
            Some(FieldValue::Area(state)) => Some(state),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strum::IntoEnumIterator;

    #[test]
    fn test_full_state_payload() {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "gen_mw": 42.3,
            "gen_rpm": 1500,
            "status": "OK",
            "load_mw": 350.0,
            "voltage": 231.2,
            "frequency": 50.01,
            "area1": "ON",
            "area2": "OFF",
            "calculated_bill": 12.5,
            "security_level": "WARNING",
            "system_locked": false,
            "mqtt_connected": true,
            "attack_score": 0,
            "threat_intel_active": true,
            "price_rate": 0.25,
            "last_update": "12:00:01"
        }))
        .unwrap();

        assert_eq!(snapshot.gen_mw, Some(42.3));
        assert_eq!(snapshot.gen_rpm, Some(1500.0));
        assert_eq!(snapshot.area1, Some(AreaState::On));
        assert_eq!(snapshot.area2, Some(AreaState::Off));
        assert_eq!(snapshot.security_level, Some(SecurityLevel::Warning));
        assert_eq!(snapshot.attack_score, Some(0.0));
        assert_eq!(snapshot.last_update.as_deref(), Some("12:00:01"));
    }

    #[test]
    fn test_malformed_fields_read_as_absent() {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "gen_mw": "forty",
            "voltage": 230.0,
            "area1": 1,
            "system_locked": "yes",
            "unexpected": [1, 2, 3]
        }))
        .unwrap();

        assert_eq!(snapshot.gen_mw, None);
        assert_eq!(snapshot.voltage, Some(230.0));
        assert_eq!(snapshot.area1, None);
        assert_eq!(snapshot.system_locked, None);
    }

    #[test]
    fn test_unrecognised_enum_strings_map_to_unknown() {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "area1": "TRIPPED",
            "area2": "off",
            "security_level": "ELEVATED"
        }))
        .unwrap();

        assert_eq!(snapshot.area1, Some(AreaState::Unknown));
        assert_eq!(snapshot.area2, Some(AreaState::Off));
        assert_eq!(snapshot.security_level, Some(SecurityLevel::Unknown));
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Snapshot::from_value(json!([1, 2])).is_none());
        assert!(Snapshot::from_value(json!("state")).is_none());
        assert!(Snapshot::from_value(json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_serialization_skips_absent_fields() {
        let snapshot = Snapshot {
            price_rate: Some(50.0),
            security_level: Some(SecurityLevel::Critical),
            ..Default::default()
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value, json!({ "price_rate": 50.0, "security_level": "CRITICAL" }));
    }

    #[test]
    fn test_get_set_cover_every_field() {
        let mut snapshot = Snapshot::default();
        for field in SnapshotField::iter() {
            let value = match field {
                SnapshotField::Status | SnapshotField::LastUpdate => FieldValue::Text("x".into()),
                SnapshotField::Area1 | SnapshotField::Area2 => FieldValue::Area(AreaState::On),
                SnapshotField::SecurityLevel => FieldValue::Security(SecurityLevel::Normal),
                SnapshotField::SystemLocked
                | SnapshotField::MqttConnected
                | SnapshotField::ThreatIntelActive => FieldValue::Flag(true),
                _ => FieldValue::Number(1.0),
            };
            assert!(snapshot.set(field, value.clone()), "{field} rejected its own kind");
            assert_eq!(snapshot.get(field), Some(value));
        }
    }

    #[test]
    fn test_set_rejects_mismatched_kind() {
        let mut snapshot = Snapshot::default();
        assert!(!snapshot.set(SnapshotField::Voltage, FieldValue::Flag(true)));
        assert_eq!(snapshot.voltage, None);
    }

    #[test]
    fn test_toggle_from_unknown_turns_on() {
        assert_eq!(AreaState::On.toggled(), AreaState::Off);
        assert_eq!(AreaState::Off.toggled(), AreaState::On);
        assert_eq!(AreaState::Unknown.toggled(), AreaState::On);
    }

    #[test]
    fn test_field_names_match_wire_names() {
        assert_eq!(SnapshotField::Area1.to_string(), "area1");
        assert_eq!(SnapshotField::GenMw.to_string(), "gen_mw");
        assert_eq!(
            serde_json::to_value(SnapshotField::CalculatedBill).unwrap(),
            json!("calculated_bill")
        );
    }
}
