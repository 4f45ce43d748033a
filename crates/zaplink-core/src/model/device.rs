// Devices and their reconciling attribute maps.
//
// A device's host-facing value for a key is the last CONFIRMED server
// value, unless a command put an optimistic value in the pending shadow
// layer. Pending values are clearly separated, never merged into the
// confirmed layer, and die on the next confirmed observation for their
// key -- whether or not the server agreed with the guess.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::catalog::ConstantsCatalog;
use crate::modes::OperationMode;
use crate::poll::PollClass;

/// What kind of vendor entity a device is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum DeviceKind {
    Installation,
    Charger,
}

/// Attribute storage with a pending (optimistic) shadow layer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AttributeMap {
    confirmed: BTreeMap<String, Value>,
    pending: BTreeMap<String, Value>,
}

impl AttributeMap {
    /// Merge confirmed observations, returning the keys whose effective
    /// value changed. Idempotent: merging identical values again yields
    /// an empty set. Any pending entry for a merged key is cleared,
    /// agree or not -- the server's word is final.
    pub fn merge<I>(&mut self, observations: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut changed = BTreeSet::new();
        for (key, value) in observations {
            let before = self.effective(&key).cloned();
            self.pending.remove(&key);
            self.confirmed.insert(key.clone(), value.clone());
            if before.as_ref() != Some(&value) {
                changed.insert(key);
            }
        }
        changed
    }

    /// Record an optimistic value: visible to consumers immediately,
    /// flagged unconfirmed, superseded by the next confirmed merge.
    pub fn apply_optimistic(&mut self, key: impl Into<String>, value: Value) {
        self.pending.insert(key.into(), value);
    }

    /// The consumer-facing value: pending over confirmed.
    pub fn effective(&self, key: &str) -> Option<&Value> {
        self.pending.get(key).or_else(|| self.confirmed.get(key))
    }

    /// The last confirmed server value.
    pub fn confirmed(&self, key: &str) -> Option<&Value> {
        self.confirmed.get(key)
    }

    /// Whether the effective value for `key` is an unconfirmed guess.
    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.confirmed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty()
    }
}

/// One tracked vendor entity: an installation or a charger.
///
/// Installations are the root containers; chargers reference their
/// owner by uid (looked up, not nested).
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub uid: String,
    pub kind: DeviceKind,
    pub name: String,
    /// Owning installation (chargers only; standalone chargers have none).
    pub installation_id: Option<String>,
    pub device_type: Option<i64>,
    pub attributes: AttributeMap,
    /// Cleared after repeated poll failures, restored on success.
    pub available: bool,
    /// Wall-clock time of the last successful poll per class.
    pub last_polled: HashMap<PollClass, DateTime<Utc>>,
}

impl Device {
    pub fn new(uid: impl Into<String>, kind: DeviceKind, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            kind,
            name: name.into(),
            installation_id: None,
            device_type: None,
            attributes: AttributeMap::default(),
            available: true,
            last_polled: HashMap::new(),
        }
    }

    /// Effective operation mode (chargers; installations report `Unknown`).
    pub fn operation_mode(&self) -> OperationMode {
        self.attributes
            .effective("charger_operation_mode")
            .and_then(Value::as_str)
            .map(OperationMode::from_name)
            .unwrap_or_default()
    }

    /// Whether this charger currently draws power.
    pub fn is_charging(&self) -> bool {
        self.operation_mode().is_charging()
    }

    /// Whether the charger demands native authentication before a
    /// session may start (drives the resume→authorize followup).
    pub fn requires_authorization(&self) -> bool {
        self.attributes
            .effective("is_authorization_required")
            .or_else(|| self.attributes.effective("authentication_required"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Model name derived from the device serial prefix.
    pub fn model(&self) -> String {
        if self.kind == DeviceKind::Charger {
            let prefix: String = self
                .attributes
                .effective("device_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .chars()
                .take(3)
                .collect();
            if let Some(model) = ConstantsCatalog::charger_model(&prefix) {
                return model.to_owned();
            }
        }
        format!("Zaptec {}", self.kind)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn obs(pairs: &[(&str, Value)]) -> Vec<(String, Value)> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
    }

    #[test]
    fn merge_is_idempotent() {
        let mut attrs = AttributeMap::default();
        let changed = attrs.merge(obs(&[("total_charge_power", json!(2300.0))]));
        assert_eq!(changed.len(), 1);
        assert!(changed.contains("total_charge_power"));

        let changed = attrs.merge(obs(&[("total_charge_power", json!(2300.0))]));
        assert!(changed.is_empty(), "identical re-merge must change nothing");

        let changed = attrs.merge(obs(&[("total_charge_power", json!(0.0))]));
        assert_eq!(changed.len(), 1);
    }

    #[test]
    fn confirmed_merge_clears_pending_even_on_disagreement() {
        let mut attrs = AttributeMap::default();
        attrs.merge(obs(&[("charger_operation_mode", json!("Connected_Finished"))]));
        attrs.apply_optimistic("charger_operation_mode", json!("Connected_Requesting"));
        assert!(attrs.is_pending("charger_operation_mode"));
        assert_eq!(
            attrs.effective("charger_operation_mode").unwrap(),
            "Connected_Requesting"
        );

        // Server still reports the old mode: the guess dies anyway.
        let changed = attrs.merge(obs(&[("charger_operation_mode", json!("Connected_Finished"))]));
        assert!(!attrs.is_pending("charger_operation_mode"));
        assert_eq!(
            attrs.effective("charger_operation_mode").unwrap(),
            "Connected_Finished"
        );
        // The effective value moved back, so the key counts as changed.
        assert!(changed.contains("charger_operation_mode"));
    }

    #[test]
    fn pending_is_visible_but_never_promoted() {
        let mut attrs = AttributeMap::default();
        attrs.apply_optimistic("charge_current_set", json!(16.0));
        assert_eq!(attrs.effective("charge_current_set").unwrap(), &json!(16.0));
        assert_eq!(attrs.confirmed("charge_current_set"), None);
    }

    #[test]
    fn device_reads_mode_and_authorization() {
        let mut device = Device::new("chg1", DeviceKind::Charger, "Garage");
        device.attributes.merge(vec![
            (
                "charger_operation_mode".to_owned(),
                json!("Connected_Charging"),
            ),
            ("is_authorization_required".to_owned(), json!(true)),
        ]);
        assert!(device.is_charging());
        assert_eq!(device.operation_mode(), OperationMode::ConnectedCharging);
        assert!(device.requires_authorization());
    }

    #[test]
    fn model_from_serial_prefix() {
        let mut device = Device::new("chg1", DeviceKind::Charger, "Garage");
        device
            .attributes
            .merge(vec![("device_id".to_owned(), json!("ZAP123456"))]);
        assert_eq!(device.model(), "Zaptec Go");

        let plain = Device::new("inst1", DeviceKind::Installation, "Home");
        assert_eq!(plain.model(), "Zaptec Installation");
    }
}
