// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Reactive in-memory mirror of the router's store.
//!
//! Built from two sources: full dumps streamed on
//! `system/response/<service>/devices|sensors|actuators/…` and incremental
//! deltas on `system/notify/<device>/announce|update`. Eventually
//! consistent; authoritative only for the in-process lifetime of the
//! service.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use serde_json::Value;

use domo_protocol::topic::ComponentKind;

/// One mirrored component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentRecord {
    pub device: String,
    pub id: u32,
    pub name: Option<String>,
    pub location: Option<String>,
    pub value: Option<Value>,
    pub unit: Option<String>,
    pub state: Option<i64>,
    pub enabled: Option<bool>,
    pub last_seen: Option<String>,
}

/// A resolved component reference, as handed to the command builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub device: String,
    pub kind: ComponentKind,
    pub id: u32,
    pub data: ComponentRecord,
}

#[derive(Debug, Default)]
struct DeviceEntry {
    sensors: BTreeMap<u32, ComponentRecord>,
    actuators: BTreeMap<u32, ComponentRecord>,
}

impl DeviceEntry {
    fn bucket(&mut self, kind: ComponentKind) -> &mut BTreeMap<u32, ComponentRecord> {
        match kind {
            ComponentKind::Sensor => &mut self.sensors,
            ComponentKind::Actuator => &mut self.actuators,
        }
    }
}

#[derive(Default)]
struct Mirror {
    devices: HashMap<String, DeviceEntry>,
    snapshot_ts: Option<String>,
    ready: bool,
}

/// The mirror plus its readiness latch. One mutex guards the whole
/// structure; both ingestion and queries are O(components), bounded by
/// hardware scale.
#[derive(Default)]
pub struct Snapshot {
    inner: Mutex<Mirror>,
}

impl Snapshot {
    /// Feed one router message into the mirror. Topics outside the two
    /// supported families are ignored.
    pub fn ingest(&self, topic: &str, payload: &Value) {
        let parts: Vec<&str> = topic.split('/').collect();
        if parts.len() < 3 || parts[0] != "system" {
            log::debug!("snapshot ignoring topic '{topic}'");
            return;
        }

        match parts[1] {
            "response" => self.ingest_response(&parts, payload),
            "notify" => self.ingest_notify(&parts, payload),
            _ => log::debug!("snapshot ignoring topic '{topic}'"),
        }
    }

    // system/response/<service>/<table>/…
    fn ingest_response(&self, parts: &[&str], payload: &Value) {
        if parts.len() < 5 {
            return;
        }
        match parts[3] {
            "devices" => self.load_device(payload),
            "sensors" => self.load_component(ComponentKind::Sensor, payload),
            "actuators" => self.load_component(ComponentKind::Actuator, payload),
            // alerts and sentinels carry nothing the resolver needs
            _ => {}
        }
    }

    // system/notify/<device>/<event>
    fn ingest_notify(&self, parts: &[&str], payload: &Value) {
        if parts.len() < 4 {
            return;
        }
        match parts[3] {
            "announce" => {
                self.apply_announce(payload);
                // A single registration can make the mirror usable.
                self.mark_ready("announce event");
            }
            "update" => self.apply_update(payload),
            _ => {}
        }
    }

    fn load_device(&self, payload: &Value) {
        let Some(device) = payload.get("device_name").and_then(Value::as_str) else {
            return;
        };
        let mut mirror = self.inner.lock().unwrap();
        mirror.devices.entry(device.to_string()).or_default();
        update_snapshot_ts(&mut mirror, payload);
    }

    fn load_component(&self, kind: ComponentKind, payload: &Value) {
        let Some(device) = payload.get("device_name").and_then(Value::as_str) else {
            return;
        };
        let Some(id) = coerce_id(payload.get("id")) else {
            return;
        };

        let record = ComponentRecord {
            device: device.to_string(),
            id,
            name: str_field(payload, "name"),
            location: str_field(payload, "location"),
            value: payload.get("value").filter(|v| !v.is_null()).cloned(),
            unit: str_field(payload, "unit"),
            state: payload.get("state").and_then(Value::as_i64),
            enabled: flag_field(payload.get("enabled")),
            last_seen: str_field(payload, "last_seen"),
        };

        let mut mirror = self.inner.lock().unwrap();
        mirror
            .devices
            .entry(device.to_string())
            .or_default()
            .bucket(kind)
            .insert(id, record);
        update_snapshot_ts(&mut mirror, payload);
        log::debug!("snapshot loaded {kind} {device}/{id}");
    }

    fn apply_announce(&self, payload: &Value) {
        let Some((device, kind, id)) = addressed(payload) else {
            return;
        };
        let status = payload
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("registered")
            .to_lowercase();

        let mut mirror = self.inner.lock().unwrap();
        let entry = mirror.devices.entry(device.clone()).or_default();
        let bucket = entry.bucket(kind);

        if status == "unregistered" {
            if bucket.remove(&id).is_some() {
                log::debug!("snapshot removed {kind} {device}/{id}");
            }
            return;
        }

        let record = bucket.entry(id).or_insert_with(|| ComponentRecord {
            device: device.clone(),
            id,
            ..ComponentRecord::default()
        });
        record.name = str_field(payload, "name").or(record.name.take());
        record.location = str_field(payload, "location").or(record.location.take());
        record.last_seen = str_field(payload, "timestamp").or(record.last_seen.take());
        log::debug!("snapshot upsert {kind} {device}/{id}");
    }

    fn apply_update(&self, payload: &Value) {
        let Some((device, kind, id)) = addressed(payload) else {
            return;
        };

        let mut mirror = self.inner.lock().unwrap();
        let Some(entry) = mirror.devices.get_mut(&device) else {
            return;
        };
        let Some(record) = entry.bucket(kind).get_mut(&id) else {
            return;
        };

        match kind {
            ComponentKind::Sensor => {
                if let Some(value) = payload.get("value").filter(|v| !v.is_null()) {
                    record.value = Some(value.clone());
                }
                if let Some(unit) = str_field(payload, "units") {
                    record.unit = Some(unit);
                }
            }
            ComponentKind::Actuator => {
                // A null state is a transitional report; the mirror keeps
                // the last terminal position, like the store does.
                if let Some(state) = payload.get("state").and_then(Value::as_i64) {
                    record.state = Some(state);
                }
            }
        }
        if let Some(ts) = str_field(payload, "timestamp") {
            record.last_seen = Some(ts);
        }
    }

    /// Whether the mirror can resolve anything at all: at least one device
    /// carrying at least one component.
    pub fn is_usable(&self) -> bool {
        let mirror = self.inner.lock().unwrap();
        mirror
            .devices
            .values()
            .any(|entry| !entry.sensors.is_empty() || !entry.actuators.is_empty())
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lock().unwrap().ready
    }

    /// Latch readiness once the mirror is usable. Not reversible.
    pub fn mark_ready(&self, reason: &str) {
        let mut mirror = self.inner.lock().unwrap();
        if mirror.ready {
            return;
        }
        let usable = mirror
            .devices
            .values()
            .any(|entry| !entry.sensors.is_empty() || !entry.actuators.is_empty());
        if !usable {
            return;
        }
        mirror.ready = true;
        log::info!("snapshot ready ({reason})");
    }

    /// Latch readiness unconditionally (deadline mode).
    pub fn force_ready(&self, reason: &str) {
        let mut mirror = self.inner.lock().unwrap();
        if !mirror.ready {
            mirror.ready = true;
            log::info!(
                "snapshot marked ready ({reason}); {} devices mirrored",
                mirror.devices.len()
            );
        }
    }

    pub fn snapshot_ts(&self) -> Option<String> {
        self.inner.lock().unwrap().snapshot_ts.clone()
    }

    pub fn device_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().devices.keys().cloned().collect()
    }

    /// All mirrored components of one kind, cloned out for scoring.
    pub fn components(&self, kind: ComponentKind) -> Vec<ComponentRecord> {
        let mirror = self.inner.lock().unwrap();
        mirror
            .devices
            .values()
            .flat_map(|entry| match kind {
                ComponentKind::Sensor => entry.sensors.values(),
                ComponentKind::Actuator => entry.actuators.values(),
            })
            .cloned()
            .collect()
    }

    /// First actuator whose lowercased name/location contain the given
    /// fragments. Exact-pass lookup only; fuzzy search lives in the
    /// resolver.
    pub fn find_actuator(&self, name: Option<&str>, location: Option<&str>) -> Option<Target> {
        self.find(ComponentKind::Actuator, name, location)
    }

    pub fn find_sensor(&self, name: Option<&str>, location: Option<&str>) -> Option<Target> {
        self.find(ComponentKind::Sensor, name, location)
    }

    fn find(
        &self,
        kind: ComponentKind,
        name: Option<&str>,
        location: Option<&str>,
    ) -> Option<Target> {
        let name = name.map(str::to_lowercase);
        let location = location.map(str::to_lowercase);
        self.components(kind)
            .into_iter()
            .find(|record| {
                let record_name = record.name.as_deref().unwrap_or_default().to_lowercase();
                let record_location = record
                    .location
                    .as_deref()
                    .unwrap_or_default()
                    .to_lowercase();
                name.as_deref().is_none_or(|n| record_name.contains(n))
                    && location
                        .as_deref()
                        .is_none_or(|l| record_location.contains(l))
            })
            .map(|record| Target {
                device: record.device.clone(),
                kind,
                id: record.id,
                data: record,
            })
    }
}

fn addressed(payload: &Value) -> Option<(String, ComponentKind, u32)> {
    let device = payload.get("device").and_then(Value::as_str)?;
    let kind = payload
        .get("type")
        .and_then(Value::as_str)
        .and_then(ComponentKind::parse)?;
    let id = coerce_id(payload.get("id"))?;
    Some((device.to_string(), kind, id))
}

fn coerce_id(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn str_field(payload: &Value, field: &str) -> Option<String> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn flag_field(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

fn update_snapshot_ts(mirror: &mut Mirror, payload: &Value) {
    if let Some(ts) = payload.get("snapshot_ts").and_then(Value::as_str) {
        mirror.snapshot_ts = Some(ts.to_string());
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn dump_sensor(snapshot: &Snapshot, device: &str, id: u32, name: &str, location: &str) {
        snapshot.ingest(
            &format!("system/response/intent-service/sensors/{device}/{id}"),
            &json!({
                "device_name": device, "id": id, "name": name, "location": location,
                "value": "21.5", "unit": "C", "enabled": true,
                "last_seen": "2025-03-09 18:00:00", "snapshot_ts": "2025-03-09 18:00:01",
            }),
        );
    }

    #[test]
    fn full_dump_populates_the_mirror() {
        let snapshot = Snapshot::default();
        snapshot.ingest(
            "system/response/intent-service/devices/esp_salon",
            &json!({"device_name": "esp_salon", "last_seen": "2025-03-09 18:00:00"}),
        );
        dump_sensor(&snapshot, "esp_salon", 3, "temperatura", "salon");

        assert_eq!(snapshot.device_names(), vec!["esp_salon"]);
        assert_eq!(snapshot.snapshot_ts().as_deref(), Some("2025-03-09 18:00:01"));

        let target = snapshot.find_sensor(Some("temperatura"), None).unwrap();
        assert_eq!(target.device, "esp_salon");
        assert_eq!(target.id, 3);
        assert_eq!(target.data.unit.as_deref(), Some("C"));
        assert_eq!(target.data.enabled, Some(true));
    }

    #[test]
    fn usable_and_ready_latch() {
        let snapshot = Snapshot::default();
        assert!(!snapshot.is_usable());

        // A bare device row is not usable.
        snapshot.ingest(
            "system/response/intent-service/devices/esp_salon",
            &json!({"device_name": "esp_salon"}),
        );
        snapshot.mark_ready("dump");
        assert!(!snapshot.is_ready());

        dump_sensor(&snapshot, "esp_salon", 3, "temperatura", "salon");
        assert!(snapshot.is_usable());
        snapshot.mark_ready("dump");
        assert!(snapshot.is_ready());
    }

    #[test]
    fn announce_event_upserts_and_latches_readiness() {
        let snapshot = Snapshot::default();
        snapshot.ingest(
            "system/notify/esp_salon/announce",
            &json!({
                "device": "esp_salon", "type": "actuator", "id": 1,
                "name": "lampara", "location": "salon",
                "status": "registered", "timestamp": "2025-03-09 18:00:02",
            }),
        );

        assert!(snapshot.is_ready());
        let target = snapshot.find_actuator(Some("lampara"), Some("salon")).unwrap();
        assert_eq!(target.id, 1);
    }

    #[test]
    fn unregistered_announce_removes_the_component() {
        let snapshot = Snapshot::default();
        snapshot.ingest(
            "system/notify/esp_salon/announce",
            &json!({"device": "esp_salon", "type": "actuator", "id": 1, "name": "lampara", "location": "salon"}),
        );
        snapshot.ingest(
            "system/notify/esp_salon/announce",
            &json!({"device": "esp_salon", "type": "actuator", "id": 1, "status": "unregistered"}),
        );

        assert!(snapshot.find_actuator(Some("lampara"), None).is_none());
        // Readiness is a latch; removal does not reverse it.
        assert!(snapshot.is_ready());
    }

    #[test]
    fn update_event_refreshes_values_but_keeps_terminal_state() {
        let snapshot = Snapshot::default();
        snapshot.ingest(
            "system/notify/esp_puerta/announce",
            &json!({"device": "esp_puerta", "type": "actuator", "id": 0, "name": "persiana", "location": "dormitorio"}),
        );

        snapshot.ingest(
            "system/notify/esp_puerta/update",
            &json!({"device": "esp_puerta", "type": "actuator", "id": 0, "state": 0}),
        );
        snapshot.ingest(
            "system/notify/esp_puerta/update",
            &json!({"device": "esp_puerta", "type": "actuator", "id": 0, "state": null, "state_text": "opening"}),
        );

        let target = snapshot.find_actuator(Some("persiana"), None).unwrap();
        assert_eq!(target.data.state, Some(0));
    }

    #[test]
    fn find_matches_are_case_insensitive_substrings() {
        let snapshot = Snapshot::default();
        dump_sensor(&snapshot, "esp_salon", 3, "Sensor Temperatura", "Salon Principal");

        assert!(snapshot.find_sensor(Some("temperatura"), None).is_some());
        assert!(snapshot.find_sensor(None, Some("salon")).is_some());
        assert!(snapshot.find_sensor(Some("temperatura"), Some("cocina")).is_none());
    }
}
