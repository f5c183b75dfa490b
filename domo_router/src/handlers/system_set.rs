// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `system/set/<service>`: forward a command to a device.

use rumqttc::QoS;
use serde_json::json;

use domo_protocol::payload::SysSet;
use domo_protocol::timestamp;

use crate::publish::{self, Publisher};
use crate::store::Inventory;

use super::{HandlerError, component_not_found};

/// Validate, forward the command to the device, project it onto the store,
/// and fan out a `system/notify/set` event.
///
/// Switch states and sensor enables are normalized to booleans before
/// forwarding. Sensor commands never mutate the store here: the device acks
/// via `response/…` and that path persists. Motion commands project
/// `state ← 1` for OPEN/CLOSE (the component is being driven) and leave the
/// row untouched for STOP.
///
/// # Errors
/// [`HandlerError`] on store or publish failure.
pub async fn handle(
    store: &dyn Inventory,
    publisher: &dyn Publisher,
    service: &str,
    set: &SysSet,
) -> Result<(), HandlerError> {
    let device = set.device();
    let kind = set.kind();
    let id = set.id();

    let meta = if store.device_exists(device).await? {
        store.component_meta(kind, device, id).await?
    } else {
        None
    };
    let Some(meta) = meta else {
        log::warn!("set from {service} for unknown {kind} {device}/{id}");
        return component_not_found(publisher, service, device, kind, id).await;
    };

    let (forward, notify_value, projected_state) = match set {
        SysSet::Switch { state, .. } => (
            json!({ "requester": service, "state": state }),
            json!(state),
            Some(i32::from(*state)),
        ),
        SysSet::Motion { command, speed, .. } => {
            let mut forward = json!({ "requester": service, "command": command.as_str() });
            if let Some(speed) = speed {
                forward["speed"] = json!(speed);
            }
            (
                forward,
                json!(command.as_str()),
                command.drives().then_some(1),
            )
        }
        SysSet::SensorEnable { enable, .. } => (
            json!({ "requester": service, "enable": enable }),
            json!(enable),
            None,
        ),
    };

    let forward_topic = format!("set/{device}/{}/{id}", kind.as_str());
    publish::publish_json(publisher, &forward_topic, QoS::AtLeastOnce, &forward).await?;
    log::info!("set from {service} forwarded to {forward_topic}");

    if let Some(state) = projected_state {
        store.set_actuator_state(device, id, state).await?;
    }
    store.touch_device(device).await?;

    let notice = json!({
        "device": device,
        "type": kind.as_str(),
        "id": id,
        "name": meta.name,
        "location": meta.location,
        "value": notify_value,
        "timestamp": timestamp::wall_clock(),
        "source": service,
    });
    publish::fan_out(publisher, "system/notify/set", &notice).await;

    Ok(())
}
