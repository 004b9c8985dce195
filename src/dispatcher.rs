//! Control command dispatch with optimistic overrides
//!
//! A dispatched command first installs an override approximating its
//! expected effect, then goes to the actuator. Overrides are never rolled
//! back: a failed send is reported as a local-only confirmation and the
//! optimistic value stays until the reconciler retires it.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{
    AreaState, ControlAction, FieldValue, SecurityLevel, Snapshot, SnapshotField, ATTACK_PRICE_RATE,
    ATTACK_SCORE, BASELINE_PRICE_RATE,
};
use crate::reconcile::{Override, SnapshotStore};
use crate::upstream::GridApi;

/// How the actuator answered
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Delivery {
    /// Actuator accepted the command
    Acknowledged { message: Option<String> },
    /// Command not confirmed remotely; the optimistic value is shown anyway
    LocalOnly { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub action: ControlAction,
    pub seq: u64,
    #[serde(flatten)]
    pub delivery: Delivery,
}

impl DispatchOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self.delivery, Delivery::Acknowledged { .. })
    }
}

/// Fields a command is expected to change, given the current effective state.
pub fn speculate(action: ControlAction, effective: Option<&Snapshot>) -> Vec<(SnapshotField, FieldValue)> {
    match action {
        ControlAction::ToggleArea1 | ControlAction::ToggleArea2 => {
            let Some(field) = action.area_field() else {
                return Vec::new();
            };
            let current = effective.and_then(|s| s.area(field));
            let next = current.map(|a| a.toggled()).unwrap_or(AreaState::On);
            vec![(field, FieldValue::Area(next))]
        }
        ControlAction::SimulateAttack => vec![
            (SnapshotField::PriceRate, FieldValue::Number(ATTACK_PRICE_RATE)),
            (SnapshotField::SecurityLevel, FieldValue::Security(SecurityLevel::Critical)),
            (SnapshotField::AttackScore, FieldValue::Number(ATTACK_SCORE)),
        ],
        ControlAction::ResetPrice => vec![
            (SnapshotField::PriceRate, FieldValue::Number(BASELINE_PRICE_RATE)),
            (SnapshotField::SecurityLevel, FieldValue::Security(SecurityLevel::Normal)),
            (SnapshotField::AttackScore, FieldValue::Number(0.0)),
            (SnapshotField::CalculatedBill, FieldValue::Number(0.0)),
        ],
    }
}

pub struct CommandDispatcher {
    api: Arc<dyn GridApi>,
    store: Arc<SnapshotStore>,
    next_seq: AtomicU64,
    /// Newest in-flight sequence number per action
    in_flight: Mutex<HashMap<ControlAction, u64>>,
}

impl CommandDispatcher {
    pub fn new(api: Arc<dyn GridApi>, store: Arc<SnapshotStore>) -> Self {
        Self {
            api,
            store,
            next_seq: AtomicU64::new(1),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Installs the override and sends the command, waiting for the answer.
    /// Never fails: send errors become [`Delivery::LocalOnly`].
    pub async fn dispatch(&self, action: ControlAction) -> DispatchOutcome {
        let seq = self.install(action);
        self.deliver(action, seq).await
    }

    /// Installs the override now and sends the command in the background.
    pub fn submit(self: &Arc<Self>, action: ControlAction) -> JoinHandle<DispatchOutcome> {
        let seq = self.install(action);
        let this = Arc::clone(self);
        tokio::spawn(async move { this.deliver(action, seq).await })
    }

    pub fn is_in_flight(&self, action: ControlAction) -> bool {
        self.in_flight.lock().contains_key(&action)
    }

    pub fn in_flight(&self) -> Vec<ControlAction> {
        self.in_flight.lock().keys().copied().collect()
    }

    fn install(&self, action: ControlAction) -> u64 {
        // Held across read-then-install so concurrent toggles compose.
        let mut in_flight = self.in_flight.lock();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let effective = self.store.effective_snapshot();
        if let Some(field) = self.undoes_pending_toggle(action) {
            debug!(%action, seq, %field, "toggle returns field to absent base value");
            self.store.retract_override(field, seq);
        } else {
            let ov = Override {
                action,
                seq,
                fields: speculate(action, effective.as_ref()),
            };
            self.store.install_override(&ov);
        }
        in_flight.insert(action, seq);
        seq
    }

    /// A toggle of a pending area field whose base value is absent puts the
    /// field back where it started. A present base value needs no special
    /// case: the flipped override equals the base and is retired on install.
    fn undoes_pending_toggle(&self, action: ControlAction) -> Option<SnapshotField> {
        let field = action.area_field()?;
        self.store.pending_overrides().get(field)?;
        let base = self.store.base_snapshot();
        match base.as_ref().and_then(|s| s.area(field)) {
            Some(_) => None,
            None => Some(field),
        }
    }

    async fn deliver(&self, action: ControlAction, seq: u64) -> DispatchOutcome {
        let delivery = match self.api.send_control(action).await {
            Ok(ack) if ack.success => {
                info!(%action, seq, "control command acknowledged");
                Delivery::Acknowledged { message: ack.message }
            }
            Ok(ack) => {
                let reason = ack
                    .message
                    .unwrap_or_else(|| "actuator did not accept the command".to_string());
                warn!(%action, seq, %reason, "control command not accepted, keeping local state");
                Delivery::LocalOnly { reason }
            }
            Err(e) => {
                warn!(%action, seq, error = %e, "control command failed, keeping local state");
                Delivery::LocalOnly { reason: e.to_string() }
            }
        };

        let mut in_flight = self.in_flight.lock();
        if in_flight.get(&action) == Some(&seq) {
            in_flight.remove(&action);
        }
        drop(in_flight);

        DispatchOutcome { action, seq, delivery }
    }
}
