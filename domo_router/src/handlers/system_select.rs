// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `system/select/<service>`: the read surface over the store.
//!
//! Pure reads; no device is ever contacted. Rows go out one message per
//! row so subscribers can stream them into their mirrors; an empty result
//! is answered with a single sentinel on `…/<table>/empty`.

use rumqttc::QoS;
use serde::Serialize;
use serde_json::{Value, json};

use domo_protocol::payload::{SelectRequest, SysSelect};
use domo_protocol::timestamp;

use crate::publish::{self, PublishError, Publisher};
use crate::store::Inventory;

use super::HandlerError;

const DEFAULT_ALERT_LIMIT: u32 = 10;

/// Answer a select request with one message per row.
///
/// `request:"all"` dumps devices, sensors and actuators, stamping every row
/// with the same `snapshot_ts` so mirror consumers can anchor the dump.
///
/// # Errors
/// [`HandlerError`] on store or publish failure.
pub async fn handle(
    store: &dyn Inventory,
    publisher: &dyn Publisher,
    service: &str,
    select: &SysSelect,
) -> Result<(), HandlerError> {
    match select.request {
        SelectRequest::Devices => emit_devices(store, publisher, service, None).await,
        SelectRequest::Sensors => emit_sensors(store, publisher, service, select, None).await,
        SelectRequest::Actuators => emit_actuators(store, publisher, service, select, None).await,
        SelectRequest::Alerts => emit_alerts(store, publisher, service, select).await,
        SelectRequest::All => {
            // One timestamp anchors the whole dump.
            let snapshot_ts = timestamp::wall_clock();
            emit_devices(store, publisher, service, Some(&snapshot_ts)).await?;
            emit_sensors(store, publisher, service, select, Some(&snapshot_ts)).await?;
            emit_actuators(store, publisher, service, select, Some(&snapshot_ts)).await?;
            log::info!("full dump sent to {service}");
            Ok(())
        }
    }
}

async fn emit_devices(
    store: &dyn Inventory,
    publisher: &dyn Publisher,
    service: &str,
    snapshot_ts: Option<&str>,
) -> Result<(), HandlerError> {
    let rows = store.select_devices().await?;
    emit_rows(
        publisher,
        service,
        "devices",
        &rows,
        |row| format!("system/response/{service}/devices/{}", row.device_name),
        snapshot_ts,
    )
    .await
}

async fn emit_sensors(
    store: &dyn Inventory,
    publisher: &dyn Publisher,
    service: &str,
    select: &SysSelect,
    snapshot_ts: Option<&str>,
) -> Result<(), HandlerError> {
    let rows = store
        .select_sensors(select.device.as_deref(), select.id)
        .await?;
    emit_rows(
        publisher,
        service,
        "sensors",
        &rows,
        |row| format!("system/response/{service}/sensors/{}/{}", row.device_name, row.id),
        snapshot_ts,
    )
    .await
}

async fn emit_actuators(
    store: &dyn Inventory,
    publisher: &dyn Publisher,
    service: &str,
    select: &SysSelect,
    snapshot_ts: Option<&str>,
) -> Result<(), HandlerError> {
    let rows = store
        .select_actuators(select.device.as_deref(), select.id)
        .await?;
    emit_rows(
        publisher,
        service,
        "actuators",
        &rows,
        |row| {
            format!(
                "system/response/{service}/actuators/{}/{}",
                row.device_name, row.id
            )
        },
        snapshot_ts,
    )
    .await
}

async fn emit_alerts(
    store: &dyn Inventory,
    publisher: &dyn Publisher,
    service: &str,
    select: &SysSelect,
) -> Result<(), HandlerError> {
    // Default to the 10 most pressing; an explicit 0 lifts the cap.
    let limit = match select.limit.unwrap_or(DEFAULT_ALERT_LIMIT) {
        0 => None,
        n => Some(n),
    };
    let rows = store.select_alerts(limit).await?;
    emit_rows(
        publisher,
        service,
        "alerts",
        &rows,
        |row| {
            format!(
                "system/response/{service}/alerts/{}/{}/{}",
                row.device_name, row.component_type, row.component_id
            )
        },
        None,
    )
    .await
}

async fn emit_rows<T, F>(
    publisher: &dyn Publisher,
    service: &str,
    table: &str,
    rows: &[T],
    topic_of: F,
    snapshot_ts: Option<&str>,
) -> Result<(), HandlerError>
where
    T: Serialize,
    F: Fn(&T) -> String,
{
    if rows.is_empty() {
        let sentinel = format!("system/response/{service}/{table}/empty");
        publish::publish_json(
            publisher,
            &sentinel,
            QoS::AtLeastOnce,
            &json!({ "status": "no_results" }),
        )
        .await?;
        return Ok(());
    }

    for row in rows {
        let mut body = serde_json::to_value(row).map_err(PublishError::from)?;
        if let Some(ts) = snapshot_ts {
            body["snapshot_ts"] = Value::String(ts.to_string());
        }
        publish::publish_json(publisher, &topic_of(row), QoS::AtLeastOnce, &body).await?;
    }
    log::debug!("sent {} {table} rows to {service}", rows.len());

    Ok(())
}
