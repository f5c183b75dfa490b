// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Validated payload types.
//!
//! Every payload boundary on the wire is an open JSON object. This module
//! checks each one strictly at the edge and hands handlers a typed shape;
//! handlers never look at raw JSON. Key aliases the fleet has historically
//! used (`unit`/`units`, `enable`/`enabled`) are resolved here.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::state::{self, MotionCommand};
use crate::topic::ComponentKind;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload is missing required field '{0}'")]
    MissingField(&'static str),
    #[error("payload field '{field}' is invalid: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

/// Parse raw payload bytes into a JSON value.
///
/// An empty (or whitespace-only) payload reads as an empty object, matching
/// devices that publish bare retained markers.
///
/// # Errors
/// [`PayloadError::Json`] when the bytes are not valid JSON.
pub fn parse_json(bytes: &[u8]) -> Result<Value, PayloadError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// `announce/<device>/<type>/<id>` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announce {
    pub name: String,
    pub location: String,
}

impl Announce {
    /// # Errors
    /// [`PayloadError`] when `name` or `location` is missing or empty.
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        let obj = as_object(value)?;
        Ok(Announce {
            name: required_str(obj, "name")?,
            location: required_str(obj, "location")?,
        })
    }
}

/// `update/<device>/<type>/<id>` payload. Which fields are required depends
/// on the component kind, so the checks live in the handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub value: Option<Value>,
    pub unit: Option<String>,
    pub state: Option<Value>,
}

impl Update {
    /// # Errors
    /// [`PayloadError::NotAnObject`] when the payload is not an object.
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        let obj = as_object(value)?;
        Ok(Update {
            value: obj.get("value").filter(|v| !v.is_null()).cloned(),
            unit: unit_of(obj),
            state: obj.get("state").filter(|v| !v.is_null()).cloned(),
        })
    }
}

/// `alert/<device>/<type>/<id>` payload. Everything is optional on the
/// wire; the handler applies defaults and back-fills from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub status: Option<String>,
    pub message: Option<String>,
    pub severity: Option<String>,
    pub code: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
}

impl Alert {
    /// # Errors
    /// [`PayloadError::NotAnObject`] when the payload is not an object.
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        let obj = as_object(value)?;
        Ok(Alert {
            status: optional_str(obj, "status"),
            message: optional_str(obj, "message"),
            severity: optional_str(obj, "severity"),
            code: obj.get("code").and_then(lossy_text),
            name: optional_str(obj, "name"),
            location: optional_str(obj, "location"),
        })
    }
}

/// `response/<device>/<type>/<id>` payload: a device's reply to a prior
/// forwarded get/set. `requester` is correlation metadata and is stripped
/// before any re-publication.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceResponse {
    pub requester: Option<String>,
    pub value: Option<Value>,
    pub unit: Option<String>,
    pub state: Option<Value>,
    pub enabled: Option<bool>,
}

impl DeviceResponse {
    /// # Errors
    /// [`PayloadError::NotAnObject`] when the payload is not an object.
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        let obj = as_object(value)?;
        let enabled = obj
            .get("enabled")
            .or_else(|| obj.get("enable"))
            .and_then(state::normalize_flag);
        Ok(DeviceResponse {
            requester: optional_str(obj, "requester"),
            value: obj.get("value").filter(|v| !v.is_null()).cloned(),
            unit: unit_of(obj),
            state: obj.get("state").filter(|v| !v.is_null()).cloned(),
            enabled,
        })
    }
}

/// `system/get/<service>` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysGet {
    pub device: String,
    pub kind: ComponentKind,
    pub id: u32,
}

impl SysGet {
    /// # Errors
    /// [`PayloadError`] when `device`, `type` or `id` is missing or invalid.
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        let obj = as_object(value)?;
        let (device, kind, id) = addressed_component(obj)?;
        Ok(SysGet { device, kind, id })
    }
}

/// `system/set/<service>` payload, one variant per accepted shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SysSet {
    /// Simple actuator: `{device, type:"actuator", id, state}`.
    Switch { device: String, id: u32, state: bool },
    /// Motion actuator: `{device, type:"actuator", id, command, speed?}`.
    Motion {
        device: String,
        id: u32,
        command: MotionCommand,
        speed: Option<u8>,
    },
    /// Sensor: `{device, type:"sensor", id, enable}`.
    SensorEnable { device: String, id: u32, enable: bool },
}

impl SysSet {
    /// # Errors
    /// [`PayloadError`] when the addressing fields are invalid or the
    /// command field for the addressed kind is missing or unusable.
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        let obj = as_object(value)?;
        let (device, kind, id) = addressed_component(obj)?;

        match kind {
            ComponentKind::Actuator => {
                if let Some(raw) = obj.get("command") {
                    let command = raw
                        .as_str()
                        .and_then(MotionCommand::parse)
                        .ok_or_else(|| PayloadError::InvalidField {
                            field: "command",
                            reason: format!("expected OPEN, CLOSE or STOP, got {raw}"),
                        })?;
                    let speed = clamped_speed(obj)?;
                    Ok(SysSet::Motion {
                        device,
                        id,
                        command,
                        speed,
                    })
                } else {
                    let raw = obj.get("state").ok_or(PayloadError::MissingField("state"))?;
                    let state =
                        state::normalize_flag(raw).ok_or_else(|| PayloadError::InvalidField {
                            field: "state",
                            reason: format!("cannot read {raw} as a switch state"),
                        })?;
                    Ok(SysSet::Switch { device, id, state })
                }
            }
            ComponentKind::Sensor => {
                let raw = obj
                    .get("enable")
                    .or_else(|| obj.get("enabled"))
                    .ok_or(PayloadError::MissingField("enable"))?;
                let enable =
                    state::normalize_flag(raw).ok_or_else(|| PayloadError::InvalidField {
                        field: "enable",
                        reason: format!("cannot read {raw} as a flag"),
                    })?;
                Ok(SysSet::SensorEnable { device, id, enable })
            }
        }
    }

    #[must_use]
    pub fn device(&self) -> &str {
        match self {
            SysSet::Switch { device, .. }
            | SysSet::Motion { device, .. }
            | SysSet::SensorEnable { device, .. } => device,
        }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        match self {
            SysSet::Switch { id, .. }
            | SysSet::Motion { id, .. }
            | SysSet::SensorEnable { id, .. } => *id,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ComponentKind {
        match self {
            SysSet::Switch { .. } | SysSet::Motion { .. } => ComponentKind::Actuator,
            SysSet::SensorEnable { .. } => ComponentKind::Sensor,
        }
    }
}

/// Tables addressable through `system/select`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectRequest {
    Devices,
    Sensors,
    Actuators,
    Alerts,
    All,
}

impl SelectRequest {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "devices" => Some(SelectRequest::Devices),
            "sensors" => Some(SelectRequest::Sensors),
            "actuators" => Some(SelectRequest::Actuators),
            "alerts" => Some(SelectRequest::Alerts),
            "all" => Some(SelectRequest::All),
            _ => None,
        }
    }
}

/// `system/select/<service>` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysSelect {
    pub request: SelectRequest,
    pub device: Option<String>,
    pub id: Option<u32>,
    pub limit: Option<u32>,
}

impl SysSelect {
    /// # Errors
    /// [`PayloadError`] when `request` is missing/unknown or a filter field
    /// does not parse.
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        let obj = as_object(value)?;
        let request = obj
            .get("request")
            .and_then(Value::as_str)
            .ok_or(PayloadError::MissingField("request"))?;
        let request = SelectRequest::parse(request).ok_or_else(|| PayloadError::InvalidField {
            field: "request",
            reason: format!("unknown selector '{request}'"),
        })?;

        let id = match obj.get("id") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(coerce_id(raw).ok_or_else(|| PayloadError::InvalidField {
                field: "id",
                reason: format!("cannot read {raw} as a component id"),
            })?),
        };
        let limit = match obj.get("limit") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(coerce_id(raw).ok_or_else(|| PayloadError::InvalidField {
                field: "limit",
                reason: format!("cannot read {raw} as a row limit"),
            })?),
        };

        Ok(SysSelect {
            request,
            device: optional_str(obj, "device"),
            id,
            limit,
        })
    }
}

/// Render a scalar JSON value as column text: strings verbatim, numbers and
/// booleans via their JSON spelling, null/compound as nothing.
#[must_use]
pub fn lossy_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) => Some(value.to_string()),
        _ => None,
    }
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, PayloadError> {
    value.as_object().ok_or(PayloadError::NotAnObject)
}

fn required_str(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<String, PayloadError> {
    match obj.get(field).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        _ => Err(PayloadError::MissingField(field)),
    }
}

fn optional_str(obj: &Map<String, Value>, field: &str) -> Option<String> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// The fleet publishes both `units` and `unit`; `units` wins when both are
/// present.
fn unit_of(obj: &Map<String, Value>) -> Option<String> {
    optional_str(obj, "units").or_else(|| optional_str(obj, "unit"))
}

fn coerce_id(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn addressed_component(
    obj: &Map<String, Value>,
) -> Result<(String, ComponentKind, u32), PayloadError> {
    let device = required_str(obj, "device")?;
    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .ok_or(PayloadError::MissingField("type"))?;
    let kind = ComponentKind::parse(&kind).ok_or_else(|| PayloadError::InvalidField {
        field: "type",
        reason: format!("unknown component type '{kind}'"),
    })?;
    let id = obj
        .get("id")
        .and_then(coerce_id)
        .ok_or(PayloadError::MissingField("id"))?;
    Ok((device, kind, id))
}

fn clamped_speed(obj: &Map<String, Value>) -> Result<Option<u8>, PayloadError> {
    match obj.get("speed") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            let speed = n.as_f64().unwrap_or(0.0).clamp(0.0, 100.0);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let clamped = speed.round() as u8;
            Ok(Some(clamped))
        }
        Some(other) => Err(PayloadError::InvalidField {
            field: "speed",
            reason: format!("cannot read {other} as a speed"),
        }),
    }
}
