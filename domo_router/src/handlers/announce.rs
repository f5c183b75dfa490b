// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `announce/<device>/<type>/<id>`: component discovery.

use serde_json::json;

use domo_protocol::payload::Announce;
use domo_protocol::timestamp;
use domo_protocol::topic::ComponentKind;

use crate::publish::{self, Publisher};
use crate::store::Inventory;

use super::HandlerError;

/// Register (or re-register) a component and confirm it to the system.
///
/// The registration overwrites `name` and `location`; value and state
/// columns keep whatever the component last reported, so re-announcing
/// after a device reboot loses nothing. A DB failure aborts before any
/// publication.
///
/// # Errors
/// [`HandlerError`] on store failure.
pub async fn handle(
    store: &dyn Inventory,
    publisher: &dyn Publisher,
    device: &str,
    kind: ComponentKind,
    id: u32,
    announce: &Announce,
) -> Result<(), HandlerError> {
    store.touch_device(device).await?;
    store
        .register_component(kind, device, id, &announce.name, &announce.location)
        .await?;
    log::info!(
        "registered {kind} {device}/{id}: '{}' @ '{}'",
        announce.name,
        announce.location
    );

    let notice = json!({
        "device": device,
        "type": kind.as_str(),
        "id": id,
        "name": announce.name,
        "location": announce.location,
        "status": "registered",
        "timestamp": timestamp::wall_clock(),
    });
    publish::fan_out(publisher, &format!("system/notify/{device}/announce"), &notice).await;

    Ok(())
}
