// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Outbound publication seam.
//!
//! Handlers publish through [`Publisher`] rather than through the broker
//! client directly, so the whole routing pipeline runs against a recording
//! fake in tests. The production implementation is
//! [`rumqttc::AsyncClient`].

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("broker publish failed: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a raw payload.
    ///
    /// # Errors
    /// [`PublishError`] when the broker client rejects the publish.
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), PublishError>;
}

#[async_trait]
impl Publisher for AsyncClient {
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), PublishError> {
        AsyncClient::publish(self, topic, qos, false, payload).await?;
        Ok(())
    }
}

/// Serialize and publish a JSON body.
///
/// # Errors
/// [`PublishError`] on serialization or broker failure.
pub async fn publish_json<T: Serialize + Sync>(
    publisher: &dyn Publisher,
    topic: &str,
    qos: QoS,
    body: &T,
) -> Result<(), PublishError> {
    let payload = serde_json::to_vec(body)?;
    publisher.publish(topic, qos, payload).await
}

/// Fire-and-forget fan-out for `system/notify/*` events: failures are
/// logged, never retried, and never fail the handler.
pub async fn fan_out<T: Serialize + Sync>(publisher: &dyn Publisher, topic: &str, body: &T) {
    if let Err(e) = publish_json(publisher, topic, QoS::AtLeastOnce, body).await {
        log::warn!("notify publish on '{topic}' dropped: {e}");
    }
}
