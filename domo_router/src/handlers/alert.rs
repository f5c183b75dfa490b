// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `alert/<device>/<type>/<id>`: component alerts, latest-only.

use serde_json::json;

use domo_protocol::payload::Alert;
use domo_protocol::timestamp;
use domo_protocol::topic::ComponentKind;

use crate::publish::{self, Publisher};
use crate::store::{AlertUpsert, Inventory};

use super::HandlerError;

const DEFAULT_STATUS: &str = "ALERT";
const DEFAULT_SEVERITY: &str = "medium";
const DEFAULT_MESSAGE: &str = "Sin mensaje";

/// Upsert the single alert row for the component and fan the canonical
/// alert object out on `system/notify/alert`.
///
/// Each new alert replaces the previous one for that component. Missing
/// `name`/`location` are back-filled from the store; the timestamp is the
/// router's wall clock, since device clocks are unsynchronized.
///
/// # Errors
/// [`HandlerError`] on store failure.
pub async fn handle(
    store: &dyn Inventory,
    publisher: &dyn Publisher,
    device: &str,
    kind: ComponentKind,
    id: u32,
    alert: &Alert,
) -> Result<(), HandlerError> {
    store.touch_device(device).await?;
    store.ensure_component(kind, device, id).await?;

    let mut name = alert.name.clone();
    let mut location = alert.location.clone();
    if name.is_none() || location.is_none() {
        if let Some(meta) = store.component_meta(kind, device, id).await? {
            name = name.or(meta.name);
            location = location.or(meta.location);
        }
    }

    let status = alert.status.clone().unwrap_or_else(|| DEFAULT_STATUS.to_string());
    let severity = alert
        .severity
        .clone()
        .unwrap_or_else(|| DEFAULT_SEVERITY.to_string());
    let message = alert
        .message
        .clone()
        .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());
    let stamp = timestamp::wall_clock();

    store
        .upsert_alert(&AlertUpsert {
            device: device.to_string(),
            kind,
            id,
            name: name.clone(),
            location: location.clone(),
            status: status.clone(),
            message: message.clone(),
            severity: severity.clone(),
            code: alert.code.clone(),
        })
        .await?;
    log::info!("alert on {kind} {device}/{id} [{severity}]: {message}");

    let notice = json!({
        "device": device,
        "type": kind.as_str(),
        "id": id,
        "name": name,
        "location": location,
        "status": status,
        "severity": severity,
        "message": message,
        "code": alert.code,
        "timestamp": stamp,
    });
    publish::fan_out(publisher, "system/notify/alert", &notice).await;

    Ok(())
}
