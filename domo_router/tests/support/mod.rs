// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory fakes for exercising the routing pipeline without a broker or
//! a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use rumqttc::QoS;
use serde_json::Value;

use domo_protocol::topic::ComponentKind;
use domo_router::publish::{PublishError, Publisher};
use domo_router::store::{
    ActuatorRow, AlertRow, AlertUpsert, ComponentMeta, DeviceRow, Inventory, SensorRow,
    StoreError,
};

/// Store fake with MySQL-equivalent upsert semantics and a deterministic,
/// strictly-increasing clock so `last_seen` progressions are observable.
#[derive(Default)]
pub struct MemoryInventory {
    inner: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    clock: i64,
    devices: HashMap<String, NaiveDateTime>,
    sensors: HashMap<(String, u32), SensorRow>,
    actuators: HashMap<(String, u32), ActuatorRow>,
    alerts: HashMap<(String, String, u32), AlertRow>,
}

impl Tables {
    fn tick(&mut self) -> NaiveDateTime {
        self.clock += 1;
        DateTime::from_timestamp(self.clock, 0)
            .expect("small epoch offsets are always representable")
            .naive_utc()
    }
}

impl MemoryInventory {
    pub fn sensor(&self, device: &str, id: u32) -> Option<SensorRow> {
        self.inner
            .lock()
            .unwrap()
            .sensors
            .get(&(device.to_string(), id))
            .cloned()
    }

    pub fn actuator(&self, device: &str, id: u32) -> Option<ActuatorRow> {
        self.inner
            .lock()
            .unwrap()
            .actuators
            .get(&(device.to_string(), id))
            .cloned()
    }

    pub fn alert(&self, device: &str, kind: ComponentKind, id: u32) -> Option<AlertRow> {
        self.inner
            .lock()
            .unwrap()
            .alerts
            .get(&(device.to_string(), kind.as_str().to_string(), id))
            .cloned()
    }

    pub fn alert_count(&self) -> usize {
        self.inner.lock().unwrap().alerts.len()
    }

    pub fn sensor_count(&self) -> usize {
        self.inner.lock().unwrap().sensors.len()
    }

    pub fn device_last_seen(&self, device: &str) -> Option<NaiveDateTime> {
        self.inner.lock().unwrap().devices.get(device).copied()
    }

    /// Seed an actuator row the way a prior announce would have.
    pub fn seed_actuator(&self, device: &str, id: u32, name: &str, location: &str) {
        let mut tables = self.inner.lock().unwrap();
        let last_seen = tables.tick();
        tables.devices.insert(device.to_string(), last_seen);
        tables.actuators.insert(
            (device.to_string(), id),
            ActuatorRow {
                id,
                device_name: device.to_string(),
                name: Some(name.to_string()),
                location: Some(location.to_string()),
                state: None,
                last_seen,
            },
        );
    }

    /// Seed a sensor row the way a prior announce would have.
    pub fn seed_sensor(&self, device: &str, id: u32, name: &str, location: &str) {
        let mut tables = self.inner.lock().unwrap();
        let last_seen = tables.tick();
        tables.devices.insert(device.to_string(), last_seen);
        tables.sensors.insert(
            (device.to_string(), id),
            SensorRow {
                id,
                device_name: device.to_string(),
                name: Some(name.to_string()),
                location: Some(location.to_string()),
                value: None,
                unit: None,
                enabled: None,
                last_seen,
            },
        );
    }
}

fn severity_rank(severity: &str) -> u8 {
    match severity {
        "high" => 3,
        "medium" => 2,
        "low" => 1,
        _ => 0,
    }
}

#[async_trait]
impl Inventory for MemoryInventory {
    async fn touch_device(&self, device: &str) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().unwrap();
        let now = tables.tick();
        tables.devices.insert(device.to_string(), now);
        Ok(())
    }

    async fn device_exists(&self, device: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().devices.contains_key(device))
    }

    async fn register_component(
        &self,
        kind: ComponentKind,
        device: &str,
        id: u32,
        name: &str,
        location: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().unwrap();
        let now = tables.tick();
        let key = (device.to_string(), id);
        match kind {
            ComponentKind::Sensor => {
                let row = tables.sensors.entry(key).or_insert_with(|| SensorRow {
                    id,
                    device_name: device.to_string(),
                    name: None,
                    location: None,
                    value: None,
                    unit: None,
                    enabled: None,
                    last_seen: now,
                });
                row.name = Some(name.to_string());
                row.location = Some(location.to_string());
                row.last_seen = now;
            }
            ComponentKind::Actuator => {
                let row = tables.actuators.entry(key).or_insert_with(|| ActuatorRow {
                    id,
                    device_name: device.to_string(),
                    name: None,
                    location: None,
                    state: None,
                    last_seen: now,
                });
                row.name = Some(name.to_string());
                row.location = Some(location.to_string());
                row.last_seen = now;
            }
        }
        Ok(())
    }

    async fn ensure_component(
        &self,
        kind: ComponentKind,
        device: &str,
        id: u32,
    ) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().unwrap();
        let now = tables.tick();
        let key = (device.to_string(), id);
        match kind {
            ComponentKind::Sensor => {
                tables
                    .sensors
                    .entry(key)
                    .and_modify(|row| row.last_seen = now)
                    .or_insert_with(|| SensorRow {
                        id,
                        device_name: device.to_string(),
                        name: None,
                        location: None,
                        value: None,
                        unit: None,
                        enabled: None,
                        last_seen: now,
                    });
            }
            ComponentKind::Actuator => {
                tables
                    .actuators
                    .entry(key)
                    .and_modify(|row| row.last_seen = now)
                    .or_insert_with(|| ActuatorRow {
                        id,
                        device_name: device.to_string(),
                        name: None,
                        location: None,
                        state: None,
                        last_seen: now,
                    });
            }
        }
        Ok(())
    }

    async fn touch_component(
        &self,
        kind: ComponentKind,
        device: &str,
        id: u32,
    ) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().unwrap();
        let now = tables.tick();
        let key = (device.to_string(), id);
        match kind {
            ComponentKind::Sensor => {
                if let Some(row) = tables.sensors.get_mut(&key) {
                    row.last_seen = now;
                }
            }
            ComponentKind::Actuator => {
                if let Some(row) = tables.actuators.get_mut(&key) {
                    row.last_seen = now;
                }
            }
        }
        Ok(())
    }

    async fn component_meta(
        &self,
        kind: ComponentKind,
        device: &str,
        id: u32,
    ) -> Result<Option<ComponentMeta>, StoreError> {
        let tables = self.inner.lock().unwrap();
        let key = (device.to_string(), id);
        Ok(match kind {
            ComponentKind::Sensor => tables.sensors.get(&key).map(|row| ComponentMeta {
                name: row.name.clone(),
                location: row.location.clone(),
            }),
            ComponentKind::Actuator => tables.actuators.get(&key).map(|row| ComponentMeta {
                name: row.name.clone(),
                location: row.location.clone(),
            }),
        })
    }

    async fn update_sensor_reading(
        &self,
        device: &str,
        id: u32,
        value: &str,
        unit: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().unwrap();
        let now = tables.tick();
        if let Some(row) = tables.sensors.get_mut(&(device.to_string(), id)) {
            row.value = Some(value.to_string());
            if let Some(unit) = unit {
                row.unit = Some(unit.to_string());
            }
            row.last_seen = now;
        }
        Ok(())
    }

    async fn update_sensor_enabled(
        &self,
        device: &str,
        id: u32,
        enabled: bool,
    ) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().unwrap();
        let now = tables.tick();
        if let Some(row) = tables.sensors.get_mut(&(device.to_string(), id)) {
            row.enabled = Some(enabled);
            row.last_seen = now;
        }
        Ok(())
    }

    async fn sensor_unit(&self, device: &str, id: u32) -> Result<Option<String>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .sensors
            .get(&(device.to_string(), id))
            .and_then(|row| row.unit.clone()))
    }

    async fn set_actuator_state(
        &self,
        device: &str,
        id: u32,
        state: i32,
    ) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().unwrap();
        let now = tables.tick();
        if let Some(row) = tables.actuators.get_mut(&(device.to_string(), id)) {
            row.state = Some(state);
            row.last_seen = now;
        }
        Ok(())
    }

    async fn upsert_alert(&self, alert: &AlertUpsert) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().unwrap();
        let now = tables.tick();
        tables.alerts.insert(
            (
                alert.device.clone(),
                alert.kind.as_str().to_string(),
                alert.id,
            ),
            AlertRow {
                device_name: alert.device.clone(),
                component_type: alert.kind.as_str().to_string(),
                component_id: alert.id,
                component_name: alert.name.clone(),
                location: alert.location.clone(),
                status: alert.status.clone(),
                message: alert.message.clone(),
                severity: alert.severity.clone(),
                code: alert.code.clone(),
                timestamp: now,
            },
        );
        Ok(())
    }

    async fn select_devices(&self) -> Result<Vec<DeviceRow>, StoreError> {
        let tables = self.inner.lock().unwrap();
        let mut rows: Vec<DeviceRow> = tables
            .devices
            .iter()
            .map(|(device_name, last_seen)| DeviceRow {
                device_name: device_name.clone(),
                last_seen: *last_seen,
            })
            .collect();
        rows.sort_by(|a, b| a.device_name.cmp(&b.device_name));
        Ok(rows)
    }

    async fn select_sensors(
        &self,
        device: Option<&str>,
        id: Option<u32>,
    ) -> Result<Vec<SensorRow>, StoreError> {
        let tables = self.inner.lock().unwrap();
        let mut rows: Vec<SensorRow> = tables
            .sensors
            .values()
            .filter(|row| device.is_none_or(|d| row.device_name == d))
            .filter(|row| id.is_none_or(|i| row.id == i))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (&a.device_name, a.id).cmp(&(&b.device_name, b.id)));
        Ok(rows)
    }

    async fn select_actuators(
        &self,
        device: Option<&str>,
        id: Option<u32>,
    ) -> Result<Vec<ActuatorRow>, StoreError> {
        let tables = self.inner.lock().unwrap();
        let mut rows: Vec<ActuatorRow> = tables
            .actuators
            .values()
            .filter(|row| device.is_none_or(|d| row.device_name == d))
            .filter(|row| id.is_none_or(|i| row.id == i))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (&a.device_name, a.id).cmp(&(&b.device_name, b.id)));
        Ok(rows)
    }

    async fn select_alerts(&self, limit: Option<u32>) -> Result<Vec<AlertRow>, StoreError> {
        let tables = self.inner.lock().unwrap();
        let mut rows: Vec<AlertRow> = tables.alerts.values().cloned().collect();
        rows.sort_by(|a, b| {
            severity_rank(&b.severity)
                .cmp(&severity_rank(&a.severity))
                .then(b.timestamp.cmp(&a.timestamp))
        });
        if let Some(limit) = limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }
}

/// A published message captured by [`RecordingPublisher`].
#[derive(Debug, Clone)]
pub struct Published {
    pub topic: String,
    pub qos: QoS,
    pub payload: Value,
}

/// Publisher fake that records everything it is handed.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<Published>>,
}

impl RecordingPublisher {
    pub fn all(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<Value> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.topic == topic)
            .map(|p| p.payload.clone())
            .collect()
    }

    pub fn topics(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.topic.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.published.lock().unwrap().clear();
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), PublishError> {
        let payload = serde_json::from_slice(&payload).unwrap_or(Value::Null);
        self.published.lock().unwrap().push(Published {
            topic: topic.to_string(),
            qos,
            payload,
        });
        Ok(())
    }
}
