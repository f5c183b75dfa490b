// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Persistence adapter.
//!
//! [`Inventory`] is the seam between handlers and the relational store. The
//! production implementation is [`MySqlInventory`]; tests run handlers
//! against an in-memory fake. Every mutation is keyed on `(device, id)`,
//! which is owned by a single publisher (the device itself), so no
//! cross-process locking exists anywhere in the adapter.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

use domo_protocol::timestamp;
use domo_protocol::topic::ComponentKind;

mod mysql;

pub use mysql::MySqlInventory;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct StoreError(#[from] StoreErrorKind);

#[derive(Debug, Error)]
pub enum StoreErrorKind {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn wire_time<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&timestamp::format(*ts))
}

/// A `devices` row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DeviceRow {
    pub device_name: String,
    #[serde(serialize_with = "wire_time")]
    pub last_seen: NaiveDateTime,
}

/// A `sensors` row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SensorRow {
    pub id: u32,
    pub device_name: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub value: Option<String>,
    pub unit: Option<String>,
    pub enabled: Option<bool>,
    #[serde(serialize_with = "wire_time")]
    pub last_seen: NaiveDateTime,
}

/// An `actuators` row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActuatorRow {
    pub id: u32,
    pub device_name: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub state: Option<i32>,
    #[serde(serialize_with = "wire_time")]
    pub last_seen: NaiveDateTime,
}

/// An `alerts` row. One row per component; each new alert overwrites it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AlertRow {
    pub device_name: String,
    pub component_type: String,
    pub component_id: u32,
    pub component_name: Option<String>,
    pub location: Option<String>,
    pub status: String,
    pub message: String,
    pub severity: String,
    pub code: Option<String>,
    #[serde(serialize_with = "wire_time")]
    pub timestamp: NaiveDateTime,
}

/// The canonical alert content written by the alert handler.
#[derive(Debug, Clone)]
pub struct AlertUpsert {
    pub device: String,
    pub kind: ComponentKind,
    pub id: u32,
    pub name: Option<String>,
    pub location: Option<String>,
    pub status: String,
    pub message: String,
    pub severity: String,
    pub code: Option<String>,
}

/// Registration metadata of a component row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentMeta {
    pub name: Option<String>,
    pub location: Option<String>,
}

/// Storage operations the handlers are written against.
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Insert the device or refresh its `last_seen`.
    async fn touch_device(&self, device: &str) -> Result<(), StoreError>;

    async fn device_exists(&self, device: &str) -> Result<bool, StoreError>;

    /// Announce-time upsert: `name`/`location` are overwritten, value and
    /// state columns are untouched.
    async fn register_component(
        &self,
        kind: ComponentKind,
        device: &str,
        id: u32,
        name: &str,
        location: &str,
    ) -> Result<(), StoreError>;

    /// Defensive upsert for messages that reference a component the router
    /// has never seen announced: creates the row if missing, preserves any
    /// existing `name`/`location`.
    async fn ensure_component(
        &self,
        kind: ComponentKind,
        device: &str,
        id: u32,
    ) -> Result<(), StoreError>;

    /// Refresh a component's `last_seen` without touching anything else.
    async fn touch_component(
        &self,
        kind: ComponentKind,
        device: &str,
        id: u32,
    ) -> Result<(), StoreError>;

    async fn component_meta(
        &self,
        kind: ComponentKind,
        device: &str,
        id: u32,
    ) -> Result<Option<ComponentMeta>, StoreError>;

    /// Persist a sensor reading. A missing unit keeps the last known one.
    async fn update_sensor_reading(
        &self,
        device: &str,
        id: u32,
        value: &str,
        unit: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn update_sensor_enabled(
        &self,
        device: &str,
        id: u32,
        enabled: bool,
    ) -> Result<(), StoreError>;

    async fn sensor_unit(&self, device: &str, id: u32) -> Result<Option<String>, StoreError>;

    /// Persist a terminal actuator position (0 or 1).
    async fn set_actuator_state(
        &self,
        device: &str,
        id: u32,
        state: i32,
    ) -> Result<(), StoreError>;

    /// Write the single alert row for the component, overwriting any
    /// previous alert.
    async fn upsert_alert(&self, alert: &AlertUpsert) -> Result<(), StoreError>;

    async fn select_devices(&self) -> Result<Vec<DeviceRow>, StoreError>;

    async fn select_sensors(
        &self,
        device: Option<&str>,
        id: Option<u32>,
    ) -> Result<Vec<SensorRow>, StoreError>;

    async fn select_actuators(
        &self,
        device: Option<&str>,
        id: Option<u32>,
    ) -> Result<Vec<ActuatorRow>, StoreError>;

    /// Alerts ordered severity-first, newest-first. `limit` of `None` means
    /// unbounded.
    async fn select_alerts(&self, limit: Option<u32>) -> Result<Vec<AlertRow>, StoreError>;
}
