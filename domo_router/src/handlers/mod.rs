// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! One handler per inbound channel.
//!
//! Handlers are stateless free functions over the long-lived collaborators
//! ([`Inventory`](crate::store::Inventory),
//! [`Publisher`](crate::publish::Publisher)); they never share mutable state
//! with each other. All coordination is through the store or through
//! published messages.

use rumqttc::QoS;
use serde_json::json;
use thiserror::Error;

use domo_protocol::topic::ComponentKind;

use crate::publish::{self, PublishError, Publisher};
use crate::store::StoreError;

pub mod alert;
pub mod announce;
pub mod response;
pub mod system_get;
pub mod system_notify;
pub mod system_select;
pub mod system_set;
pub mod update;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Referential-failure reply shared by the get and set paths: the request
/// is answered with an error object on the requester's response topic and
/// never forwarded to any device.
async fn component_not_found(
    publisher: &dyn Publisher,
    service: &str,
    device: &str,
    kind: ComponentKind,
    id: u32,
) -> Result<(), HandlerError> {
    let topic = format!("system/response/{service}/{}/{device}/{id}", kind.as_str());
    publish::publish_json(
        publisher,
        &topic,
        QoS::AtLeastOnce,
        &json!({
            "error": "component_not_found",
            "device": device,
            "type": kind.as_str(),
            "id": id,
        }),
    )
    .await?;
    Ok(())
}
