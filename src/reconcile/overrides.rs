use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::{ControlAction, FieldValue, Snapshot, SnapshotField};

/// Speculative field values produced by one dispatched command
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub action: ControlAction,
    /// Dispatch sequence number, strictly increasing per dispatcher
    pub seq: u64,
    pub fields: Vec<(SnapshotField, FieldValue)>,
}

/// One pending field value and the command that asserted it
#[derive(Debug, Clone, PartialEq)]
pub struct PendingField {
    pub value: FieldValue,
    pub action: ControlAction,
    pub seq: u64,
    pub installed_at: Instant,
}

/// Pending overrides keyed by field. At most one value per field: the one
/// with the highest sequence number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideSet {
    fields: BTreeMap<SnapshotField, PendingField>,
}

impl OverrideSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs every field of `ov` unless a newer override already holds it.
    pub fn install(&mut self, ov: &Override, now: Instant) {
        for (field, value) in &ov.fields {
            if matches!(self.fields.get(field), Some(existing) if existing.seq > ov.seq) {
                continue;
            }
            self.fields.insert(
                *field,
                PendingField {
                    value: value.clone(),
                    action: ov.action,
                    seq: ov.seq,
                    installed_at: now,
                },
            );
        }
    }

    /// Removes `field` if it was asserted by a command older than `seq`.
    pub fn retract(&mut self, field: SnapshotField, seq: u64) -> bool {
        match self.fields.get(&field) {
            Some(existing) if existing.seq < seq => self.fields.remove(&field).is_some(),
            _ => false,
        }
    }

    /// Drops overrides that `authoritative` already agrees with. Returns the
    /// number of fields retired.
    pub fn retire_confirmed(&mut self, authoritative: &Snapshot) -> usize {
        let before = self.fields.len();
        self.fields
            .retain(|field, pending| authoritative.get(*field).as_ref() != Some(&pending.value));
        before - self.fields.len()
    }

    /// Drops overrides installed at least `ttl` before `now`.
    pub fn expire(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.fields.len();
        self.fields
            .retain(|_, pending| now.saturating_duration_since(pending.installed_at) < ttl);
        before - self.fields.len()
    }

    pub fn get(&self, field: SnapshotField) -> Option<&PendingField> {
        self.fields.get(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (SnapshotField, &PendingField)> {
        self.fields.iter().map(|(field, pending)| (*field, pending))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Field-wise merge of a base snapshot with pending overrides.
///
/// Pure: the result depends only on the inputs. With no base and no
/// overrides there is nothing to show and the result is `None`; with no base
/// but some overrides the result carries only the overridden fields.
pub fn merge(base: Option<&Snapshot>, overrides: &OverrideSet) -> Option<Snapshot> {
    if base.is_none() && overrides.is_empty() {
        return None;
    }
    let mut effective = base.cloned().unwrap_or_default();
    for (field, pending) in overrides.fields() {
        effective.set(field, pending.value.clone());
    }
    Some(effective)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AreaState, SecurityLevel};
    use proptest::prelude::*;

    fn area_override(seq: u64, state: AreaState) -> Override {
        Override {
            action: ControlAction::ToggleArea1,
            seq,
            fields: vec![(SnapshotField::Area1, FieldValue::Area(state))],
        }
    }

    #[test]
    fn test_override_shadows_base() {
        let now = Instant::now();
        let base = Snapshot {
            area1: Some(AreaState::Off),
            voltage: Some(231.0),
            ..Default::default()
        };
        let mut set = OverrideSet::new();
        set.install(&area_override(1, AreaState::On), now);

        let effective = merge(Some(&base), &set).unwrap();
        assert_eq!(effective.area1, Some(AreaState::On));
        assert_eq!(effective.voltage, Some(231.0));
    }

    #[test]
    fn test_retract_respects_newer_commands() {
        let now = Instant::now();
        let mut set = OverrideSet::new();
        set.install(&area_override(3, AreaState::On), now);

        assert!(!set.retract(SnapshotField::Area1, 2));
        assert!(!set.retract(SnapshotField::Area2, 4));
        assert!(set.retract(SnapshotField::Area1, 4));
        assert!(set.is_empty());
    }

    #[test]
    fn test_merge_without_inputs_is_none() {
        assert!(merge(None, &OverrideSet::new()).is_none());
    }

    #[test]
    fn test_merge_without_base_yields_override_fields_only() {
        let mut set = OverrideSet::new();
        set.install(
            &Override {
                action: ControlAction::SimulateAttack,
                seq: 1,
                fields: vec![
                    (SnapshotField::PriceRate, FieldValue::Number(50.0)),
                    (SnapshotField::SecurityLevel, FieldValue::Security(SecurityLevel::Critical)),
                ],
            },
            Instant::now(),
        );
        let effective = merge(None, &set).unwrap();
        assert_eq!(effective.price_rate, Some(50.0));
        assert_eq!(effective.security_level, Some(SecurityLevel::Critical));
        assert_eq!(effective.gen_mw, None);
    }

    #[test]
    fn test_older_override_does_not_replace_newer() {
        let now = Instant::now();
        let mut set = OverrideSet::new();
        set.install(&area_override(5, AreaState::Off), now);
        set.install(&area_override(3, AreaState::On), now);
        assert_eq!(set.get(SnapshotField::Area1).unwrap().seq, 5);
        assert_eq!(
            set.get(SnapshotField::Area1).unwrap().value,
            FieldValue::Area(AreaState::Off)
        );
    }

    #[test]
    fn test_retire_only_confirmed_fields() {
        let now = Instant::now();
        let mut set = OverrideSet::new();
        set.install(
            &Override {
                action: ControlAction::ResetPrice,
                seq: 1,
                fields: vec![
                    (SnapshotField::PriceRate, FieldValue::Number(0.25)),
                    (SnapshotField::AttackScore, FieldValue::Number(0.0)),
                ],
            },
            now,
        );
        let authoritative = Snapshot {
            price_rate: Some(0.25),
            attack_score: Some(12.0),
            ..Default::default()
        };
        assert_eq!(set.retire_confirmed(&authoritative), 1);
        assert!(set.get(SnapshotField::PriceRate).is_none());
        assert!(set.get(SnapshotField::AttackScore).is_some());
    }

    #[test]
    fn test_expire_by_age() {
        let start = Instant::now();
        let mut set = OverrideSet::new();
        set.install(&area_override(1, AreaState::On), start);
        assert_eq!(set.expire(start + Duration::from_secs(9), Duration::from_secs(10)), 0);
        assert_eq!(set.expire(start + Duration::from_secs(10), Duration::from_secs(10)), 1);
        assert!(set.is_empty());
    }

    fn arb_area() -> impl Strategy<Value = AreaState> {
        prop_oneof![Just(AreaState::On), Just(AreaState::Off), Just(AreaState::Unknown)]
    }

    proptest! {
        #[test]
        fn prop_install_order_does_not_matter(
            states in proptest::collection::vec(arb_area(), 1..12),
            voltage in proptest::option::of(200.0f64..260.0),
        ) {
            let now = Instant::now();
            let overrides: Vec<Override> = states
                .iter()
                .enumerate()
                .map(|(i, state)| area_override(i as u64 + 1, *state))
                .collect();

            let mut forward = OverrideSet::new();
            for ov in &overrides {
                forward.install(ov, now);
            }
            let mut backward = OverrideSet::new();
            for ov in overrides.iter().rev() {
                backward.install(ov, now);
            }

            let base = Snapshot { voltage, area1: Some(AreaState::Off), ..Default::default() };
            prop_assert_eq!(&forward, &backward);
            prop_assert_eq!(merge(Some(&base), &forward), merge(Some(&base), &backward));

            let newest = *states.last().unwrap();
            let effective = merge(Some(&base), &forward).unwrap();
            prop_assert_eq!(effective.area1, Some(newest));
            prop_assert_eq!(effective.voltage, voltage);
        }
    }
}
