// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `response/<device>/<type>/<id>`: device replies to forwarded get/set.

use rumqttc::QoS;
use serde_json::{Value, json};

use domo_protocol::payload::{self, DeviceResponse};
use domo_protocol::state;
use domo_protocol::topic::ComponentKind;

use crate::publish::{self, Publisher};
use crate::store::Inventory;

use super::HandlerError;

/// The presentation client that mirrors every device change.
pub const TAP_SERVICE: &str = "telegram-service";

/// Persist the reply, then route it back to whoever asked.
///
/// The `requester` key is correlation metadata: it is stripped before any
/// re-publication so downstream subscribers never see it. Every correlated
/// reply is additionally duplicated to the telegram tap unless the
/// requester *is* the tap, letting the presentation client mirror device
/// changes regardless of who asked.
///
/// # Errors
/// [`HandlerError`] on store or publish failure.
pub async fn handle(
    store: &dyn Inventory,
    publisher: &dyn Publisher,
    device: &str,
    kind: ComponentKind,
    id: u32,
    response: &DeviceResponse,
) -> Result<(), HandlerError> {
    // Replies can arrive for components the router never saw announced.
    store.touch_device(device).await?;
    store.ensure_component(kind, device, id).await?;

    match kind {
        ComponentKind::Sensor => {
            if let Some(value) = &response.value {
                let text = payload::lossy_text(value).unwrap_or_else(|| value.to_string());
                store
                    .update_sensor_reading(device, id, &text, response.unit.as_deref())
                    .await?;
            }
            if let Some(enabled) = response.enabled {
                store.update_sensor_enabled(device, id, enabled).await?;
            }
        }
        ComponentKind::Actuator => {
            if let Some(raw) = &response.state {
                let report = state::normalize_actuator_state(raw);
                match report.persisted() {
                    Some(persisted) => {
                        store.set_actuator_state(device, id, persisted).await?;
                    }
                    None => {
                        store.touch_component(kind, device, id).await?;
                        log::debug!(
                            "actuator {device}/{id} replied non-terminal state '{}'",
                            report.text
                        );
                    }
                }
            }
        }
    }

    let Some(requester) = &response.requester else {
        log::debug!("response from {device}/{id} carried no requester");
        return Ok(());
    };

    let cleaned = cleaned_payload(device, kind, id, response);
    let reply_topic = format!("system/response/{requester}/{}/{device}/{id}", kind.as_str());
    publish::publish_json(publisher, &reply_topic, QoS::AtLeastOnce, &cleaned).await?;
    log::info!("response from {device}/{id} forwarded to {requester}");

    if requester != TAP_SERVICE {
        let tap_topic = format!(
            "system/response/{TAP_SERVICE}/{}/{device}/{id}",
            kind.as_str()
        );
        publish::publish_json(publisher, &tap_topic, QoS::AtLeastOnce, &cleaned).await?;
    }

    Ok(())
}

fn cleaned_payload(
    device: &str,
    kind: ComponentKind,
    id: u32,
    response: &DeviceResponse,
) -> Value {
    let mut cleaned = json!({
        "device": device,
        "type": kind.as_str(),
        "id": id,
    });
    match kind {
        ComponentKind::Sensor => {
            cleaned["value"] = response.value.clone().unwrap_or(Value::Null);
            cleaned["units"] = response.unit.clone().map_or(Value::Null, Value::String);
            if let Some(enabled) = response.enabled {
                cleaned["enabled"] = json!(i32::from(enabled));
            }
        }
        ComponentKind::Actuator => {
            cleaned["state"] = response.state.clone().unwrap_or(Value::Null);
        }
    }
    cleaned
}
