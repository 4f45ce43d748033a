// ── Reconciling device store ──
//
// Shared mutable cache of per-device state. Merges arrive from
// concurrent pollers in response-arrival order; last merge wins per
// key, which is safe because the attribute catalog is keyed and merges
// are idempotent. A watch channel carries a version counter so host
// consumers can react to changes without polling the store.

use std::collections::BTreeSet;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::error::CoreError;
use crate::model::{Device, DeviceKind};
use crate::poll::PollClass;

/// Keyed storage for every tracked installation and charger.
pub struct DeviceStore {
    devices: DashMap<String, Device>,
    version: watch::Sender<u64>,
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            devices: DashMap::new(),
            version,
        }
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Register a device, or refresh the metadata of one already known.
    /// Attributes of an existing device are left alone -- they belong
    /// to the merge path.
    pub fn register(&self, device: Device) {
        match self.devices.get_mut(&device.uid) {
            Some(mut existing) => {
                existing.name = device.name;
                existing.installation_id = device.installation_id;
                existing.device_type = device.device_type;
            }
            None => {
                debug!(uid = %device.uid, kind = %device.kind, "registering device");
                self.devices.insert(device.uid.clone(), device);
            }
        }
        self.bump();
    }

    pub fn remove(&self, uid: &str) -> Option<Device> {
        let removed = self.devices.remove(uid).map(|(_, d)| d);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn get(&self, uid: &str) -> Option<Device> {
        self.devices.get(uid).map(|d| d.value().clone())
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.devices.contains_key(uid)
    }

    pub fn uids(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.key().clone()).collect()
    }

    pub fn installations(&self) -> Vec<Device> {
        self.of_kind(DeviceKind::Installation)
    }

    pub fn chargers(&self) -> Vec<Device> {
        self.of_kind(DeviceKind::Charger)
    }

    /// Chargers owned by the given installation.
    pub fn chargers_of(&self, installation_uid: &str) -> Vec<Device> {
        self.devices
            .iter()
            .filter(|d| {
                d.kind == DeviceKind::Charger
                    && d.installation_id.as_deref() == Some(installation_uid)
            })
            .map(|d| d.value().clone())
            .collect()
    }

    fn of_kind(&self, kind: DeviceKind) -> Vec<Device> {
        self.devices
            .iter()
            .filter(|d| d.kind == kind)
            .map(|d| d.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// `true` while any tracked charger is actively charging. Drives
    /// the state-poll cadence.
    pub fn any_charging(&self) -> bool {
        self.devices.iter().any(|d| d.is_charging())
    }

    // ── Reconciliation ───────────────────────────────────────────────

    /// Merge confirmed observations into a device, returning the set of
    /// keys whose effective value changed.
    pub fn merge<I>(&self, uid: &str, observations: I) -> Result<BTreeSet<String>, CoreError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut device = self.devices.get_mut(uid).ok_or_else(|| {
            CoreError::DeviceNotFound {
                uid: uid.to_owned(),
            }
        })?;
        let changed = device.attributes.merge(observations);
        drop(device);
        if !changed.is_empty() {
            debug!(uid, changed = changed.len(), "merged observations");
            self.bump();
        }
        Ok(changed)
    }

    /// Record an optimistic value for a key after an accepted command.
    pub fn apply_optimistic(
        &self,
        uid: &str,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), CoreError> {
        let mut device = self.devices.get_mut(uid).ok_or_else(|| {
            CoreError::DeviceNotFound {
                uid: uid.to_owned(),
            }
        })?;
        device.attributes.apply_optimistic(key, value);
        drop(device);
        self.bump();
        Ok(())
    }

    /// Host read path: effective (pending-over-confirmed) value.
    pub fn get_value(&self, uid: &str, key: &str) -> Option<Value> {
        self.devices
            .get(uid)
            .and_then(|d| d.attributes.effective(key).cloned())
    }

    /// Whether the effective value for a key is an unconfirmed guess.
    pub fn is_pending(&self, uid: &str, key: &str) -> bool {
        self.devices
            .get(uid)
            .is_some_and(|d| d.attributes.is_pending(key))
    }

    // ── Poll bookkeeping ─────────────────────────────────────────────

    /// Flip a device's availability flag. Returns `true` on transition.
    pub fn set_available(&self, uid: &str, available: bool) -> bool {
        let Some(mut device) = self.devices.get_mut(uid) else {
            return false;
        };
        let transition = device.available != available;
        device.available = available;
        drop(device);
        if transition {
            debug!(uid, available, "device availability changed");
            self.bump();
        }
        transition
    }

    /// Stamp a successful poll for a device and class.
    pub fn record_poll(&self, uid: &str, class: PollClass) {
        if let Some(mut device) = self.devices.get_mut(uid) {
            device.last_polled.insert(class, chrono::Utc::now());
        }
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Subscribe to the store version counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Serializable snapshot of all cached device state, for external
    /// diagnostics packaging.
    pub fn snapshot(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .devices
            .iter()
            .map(|d| {
                let value = serde_json::to_value(d.value()).unwrap_or(Value::Null);
                (d.key().clone(), value)
            })
            .collect();
        Value::Object(map)
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn store_with_charger() -> DeviceStore {
        let store = DeviceStore::new();
        store.register(Device::new("chg1", DeviceKind::Charger, "Garage"));
        store
    }

    #[test]
    fn merge_reports_changes_then_goes_quiet() {
        let store = store_with_charger();
        let obs = vec![("total_charge_power".to_owned(), json!(2300.0))];

        let changed = store.merge("chg1", obs.clone()).unwrap();
        assert_eq!(changed, BTreeSet::from(["total_charge_power".to_owned()]));

        let changed = store.merge("chg1", obs).unwrap();
        assert!(changed.is_empty());
    }

    #[test]
    fn merge_unknown_device_fails() {
        let store = DeviceStore::new();
        assert!(matches!(
            store.merge("ghost", Vec::new()),
            Err(CoreError::DeviceNotFound { .. })
        ));
    }

    #[test]
    fn get_value_prefers_pending() {
        let store = store_with_charger();
        store
            .merge("chg1", vec![("charge_current_set".to_owned(), json!(10.0))])
            .unwrap();
        store
            .apply_optimistic("chg1", "charge_current_set", json!(16.0))
            .unwrap();

        assert_eq!(store.get_value("chg1", "charge_current_set"), Some(json!(16.0)));
        assert!(store.is_pending("chg1", "charge_current_set"));

        store
            .merge("chg1", vec![("charge_current_set".to_owned(), json!(16.0))])
            .unwrap();
        assert!(!store.is_pending("chg1", "charge_current_set"));
    }

    #[test]
    fn availability_transitions_bump_version() {
        let store = store_with_charger();
        let mut rx = store.subscribe();
        let before = *rx.borrow_and_update();

        assert!(store.set_available("chg1", false));
        assert!(!store.set_available("chg1", false), "no transition, no-op");
        assert!(*rx.borrow_and_update() > before);

        let device = store.get("chg1").unwrap();
        assert!(!device.available);
    }

    #[test]
    fn any_charging_reflects_modes() {
        let store = store_with_charger();
        assert!(!store.any_charging());
        store
            .merge(
                "chg1",
                vec![(
                    "charger_operation_mode".to_owned(),
                    json!("Connected_Charging"),
                )],
            )
            .unwrap();
        assert!(store.any_charging());
    }

    #[test]
    fn snapshot_serializes_confirmed_and_pending() {
        let store = store_with_charger();
        store
            .merge("chg1", vec![("is_online".to_owned(), json!(true))])
            .unwrap();
        store
            .apply_optimistic("chg1", "charger_operation_mode", json!("Connected_Requesting"))
            .unwrap();

        let snap = store.snapshot();
        let device = &snap["chg1"];
        assert_eq!(device["kind"], "Charger");
        assert_eq!(device["attributes"]["confirmed"]["is_online"], json!(true));
        assert_eq!(
            device["attributes"]["pending"]["charger_operation_mode"],
            json!("Connected_Requesting")
        );
        assert_eq!(device["available"], json!(true));
    }

    #[test]
    fn chargers_of_links_by_installation() {
        let store = DeviceStore::new();
        store.register(Device::new("inst1", DeviceKind::Installation, "Home"));
        let mut charger = Device::new("chg1", DeviceKind::Charger, "Garage");
        charger.installation_id = Some("inst1".to_owned());
        store.register(charger);
        store.register(Device::new("chg2", DeviceKind::Charger, "Lone"));

        let owned = store.chargers_of("inst1");
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].uid, "chg1");
    }
}
