// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `update/<device>/<type>/<id>`: unsolicited telemetry.

use serde_json::{Value, json};

use domo_protocol::payload::{self, Update};
use domo_protocol::state;
use domo_protocol::timestamp;
use domo_protocol::topic::ComponentKind;

use crate::publish::{self, Publisher};
use crate::store::Inventory;

use super::HandlerError;

/// Persist a sensor reading or a terminal actuator position, then fan the
/// event out on `system/notify/<device>/update`.
///
/// Transitional actuator reports ("opening", "moving") refresh `last_seen`
/// only: the stored `state` always reflects the latest *terminal* position.
/// The notify event carries `state: null` plus the device's own wording as
/// `state_text` so observers can still follow the motion.
///
/// # Errors
/// [`HandlerError`] on store failure.
pub async fn handle(
    store: &dyn Inventory,
    publisher: &dyn Publisher,
    device: &str,
    kind: ComponentKind,
    id: u32,
    update: &Update,
) -> Result<(), HandlerError> {
    // The component may be seen here before its announce ever arrived.
    store.touch_device(device).await?;
    store.ensure_component(kind, device, id).await?;

    let notice = match kind {
        ComponentKind::Sensor => {
            let Some(value) = &update.value else {
                log::warn!("sensor update without value from {device}/{id}");
                return Ok(());
            };
            sensor_update(store, device, id, value, update.unit.as_deref()).await?
        }
        ComponentKind::Actuator => {
            let Some(raw) = &update.state else {
                log::warn!("actuator update without state from {device}/{id}");
                return Ok(());
            };
            actuator_update(store, device, id, raw).await?
        }
    };

    publish::fan_out(publisher, &format!("system/notify/{device}/update"), &notice).await;

    Ok(())
}

async fn sensor_update(
    store: &dyn Inventory,
    device: &str,
    id: u32,
    value: &Value,
    unit: Option<&str>,
) -> Result<Value, HandlerError> {
    let text = payload::lossy_text(value).unwrap_or_else(|| value.to_string());
    store.update_sensor_reading(device, id, &text, unit).await?;

    // A reading without a unit keeps the last one the sensor reported.
    let units = match unit {
        Some(u) => Some(u.to_string()),
        None => store.sensor_unit(device, id).await?,
    };
    log::info!("sensor {device}/{id} = {text} {}", units.as_deref().unwrap_or_default());

    Ok(json!({
        "device": device,
        "type": ComponentKind::Sensor.as_str(),
        "id": id,
        "value": value,
        "units": units,
        "timestamp": timestamp::wall_clock(),
    }))
}

async fn actuator_update(
    store: &dyn Inventory,
    device: &str,
    id: u32,
    raw: &Value,
) -> Result<Value, HandlerError> {
    let report = state::normalize_actuator_state(raw);

    let mut notice = json!({
        "device": device,
        "type": ComponentKind::Actuator.as_str(),
        "id": id,
        "timestamp": timestamp::wall_clock(),
    });

    match report.persisted() {
        Some(persisted) => {
            store.set_actuator_state(device, id, persisted).await?;
            log::info!("actuator {device}/{id} = {persisted}");
            notice["state"] = json!(persisted);
        }
        None => {
            store
                .touch_component(ComponentKind::Actuator, device, id)
                .await?;
            if state::is_transitional(&report.text) {
                log::debug!("actuator {device}/{id} in transit: {}", report.text);
            } else {
                log::debug!(
                    "actuator {device}/{id} reported unrecognized state '{}'",
                    report.text
                );
            }
            notice["state"] = Value::Null;
            notice["state_text"] = json!(report.text);
        }
    }

    Ok(notice)
}
