use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use super::SnapshotField;

/// Price rate the server applies while an attack is simulated
pub const ATTACK_PRICE_RATE: f64 = 50.0;
/// Attack score shown optimistically after `simulate_attack`
pub const ATTACK_SCORE: f64 = 0.95;
/// Baseline price rate restored by `reset_price`
pub const BASELINE_PRICE_RATE: f64 = 0.25;

/// Operator control intents accepted by `POST /control`
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
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
pub enum ControlAction {
    #[serde(rename = "toggle_area1")]
    #[strum(serialize = "toggle_area1")]
    ToggleArea1,
    #[serde(rename = "toggle_area2")]
    #[strum(serialize = "toggle_area2")]
    ToggleArea2,
    SimulateAttack,
    ResetPrice,
}

impl ControlAction {
    /// Breaker field flipped by a toggle action
    pub fn area_field(self) -> Option<SnapshotField> {
        match self {
            Self::ToggleArea1 => Some(SnapshotField::Area1),
            Self::ToggleArea2 => Some(SnapshotField::Area2),
            Self::SimulateAttack | Self::ResetPrice => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ControlRequest {
    pub action: ControlAction,
}

/// Actuator acknowledgement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
