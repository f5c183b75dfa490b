// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `system/get/<service>`: forward a read request to a device.

use rumqttc::QoS;
use serde_json::json;

use domo_protocol::payload::SysGet;

use crate::publish::{self, Publisher};
use crate::store::Inventory;

use super::{HandlerError, component_not_found};

/// Validate the addressed component against the store and forward the GET.
///
/// On success exactly one message goes out, on
/// `get/<device>/<type>/<id>` with `{requester}`; the device answers on
/// `response/…`, which the response handler correlates back. A missing
/// device or component produces a `component_not_found` error reply to the
/// requesting service instead.
///
/// # Errors
/// [`HandlerError`] on store or publish failure.
pub async fn handle(
    store: &dyn Inventory,
    publisher: &dyn Publisher,
    service: &str,
    get: &SysGet,
) -> Result<(), HandlerError> {
    let known = store.device_exists(&get.device).await?
        && store
            .component_meta(get.kind, &get.device, get.id)
            .await?
            .is_some();
    if !known {
        log::warn!(
            "get from {service} for unknown {} {}/{}",
            get.kind,
            get.device,
            get.id
        );
        return component_not_found(publisher, service, &get.device, get.kind, get.id).await;
    }

    let forward_topic = format!("get/{}/{}/{}", get.device, get.kind.as_str(), get.id);
    publish::publish_json(
        publisher,
        &forward_topic,
        QoS::AtLeastOnce,
        &json!({ "requester": service }),
    )
    .await?;
    log::info!("get from {service} forwarded to {forward_topic}");

    Ok(())
}
