// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Dispatch and the broker session loop.
//!
//! The router is single-threaded with respect to inbound dispatch: the
//! session loop is the only consumer of broker deliveries and runs each
//! handler to completion before polling the next event, so handlers are
//! free of inter-message races. Fan-out happens after the store mutation
//! inside the same handler invocation; a subscriber reacting to a notify
//! and immediately re-querying the store sees the updated row.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, Packet, QoS};
use serde_json::Value;
use thiserror::Error;

use domo_protocol::payload::{
    self, Alert, Announce, DeviceResponse, PayloadError, SysGet, SysSelect, SysSet, Update,
};
use domo_protocol::topic::{DeviceChannel, Route, ServiceVerb};

use crate::config::MqttSettings;
use crate::handlers::{self, HandlerError};
use crate::publish::Publisher;
use crate::store::Inventory;

/// The full subscription set, and nothing else. Telemetry channels tolerate
/// loss; everything carrying state or requests rides QoS 1.
const SUBSCRIPTIONS: [(&str, QoS); 8] = [
    ("announce/#", QoS::AtMostOnce),
    ("update/#", QoS::AtMostOnce),
    ("alert/#", QoS::AtLeastOnce),
    ("response/#", QoS::AtLeastOnce),
    ("system/get/#", QoS::AtLeastOnce),
    ("system/set/#", QoS::AtLeastOnce),
    ("system/select/#", QoS::AtLeastOnce),
    ("system/notify/#", QoS::AtLeastOnce),
];

#[derive(Debug, Error)]
enum DispatchError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] PayloadError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// The message pipeline: topic canonicalization, payload validation, and
/// handler invocation over the long-lived collaborators.
pub struct Router<'a> {
    store: &'a dyn Inventory,
    publisher: &'a dyn Publisher,
}

impl<'a> Router<'a> {
    pub fn new(store: &'a dyn Inventory, publisher: &'a dyn Publisher) -> Self {
        Router { store, publisher }
    }

    /// Process one inbound message to completion.
    ///
    /// Never panics and never aborts the loop: out-of-grammar topics drop
    /// at debug level, malformed topics/payloads drop with a warning, and
    /// handler failures are logged with the processing loop unaffected.
    pub async fn dispatch(&self, topic: &str, raw_payload: &[u8]) {
        let route = match Route::parse(topic) {
            Ok(Some(route)) => route,
            Ok(None) => {
                log::debug!("no handler for topic '{topic}'");
                return;
            }
            Err(e) => {
                log::warn!("dropping message: {e}");
                return;
            }
        };

        let value = match payload::parse_json(raw_payload) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("dropping message on '{topic}': {e}");
                return;
            }
        };

        match self.route(route, &value).await {
            Ok(()) => {}
            Err(DispatchError::Malformed(e)) => {
                log::warn!("dropping message on '{topic}': {e}");
            }
            Err(DispatchError::Handler(e)) => {
                log::error!("handler for '{topic}' failed: {e}");
            }
        }
    }

    async fn route(&self, route: Route, value: &Value) -> Result<(), DispatchError> {
        let store = self.store;
        let publisher = self.publisher;

        match route {
            Route::Device {
                channel,
                device,
                kind,
                id,
            } => match channel {
                DeviceChannel::Announce => {
                    let announce = Announce::from_value(value)?;
                    handlers::announce::handle(store, publisher, &device, kind, id, &announce)
                        .await?;
                }
                DeviceChannel::Update => {
                    let update = Update::from_value(value)?;
                    handlers::update::handle(store, publisher, &device, kind, id, &update).await?;
                }
                DeviceChannel::Alert => {
                    let alert = Alert::from_value(value)?;
                    handlers::alert::handle(store, publisher, &device, kind, id, &alert).await?;
                }
                DeviceChannel::Response => {
                    let response = DeviceResponse::from_value(value)?;
                    handlers::response::handle(store, publisher, &device, kind, id, &response)
                        .await?;
                }
            },
            Route::Service { verb, service } => match verb {
                ServiceVerb::Get => {
                    let get = SysGet::from_value(value)?;
                    handlers::system_get::handle(store, publisher, &service, &get).await?;
                }
                ServiceVerb::Set => {
                    let set = SysSet::from_value(value)?;
                    handlers::system_set::handle(store, publisher, &service, &set).await?;
                }
                ServiceVerb::Select => {
                    let select = SysSelect::from_value(value)?;
                    handlers::system_select::handle(store, publisher, &service, &select).await?;
                }
            },
            Route::Notify { device, event } => {
                handlers::system_notify::handle(device.as_deref(), &event, value);
            }
        }

        Ok(())
    }
}

/// Linear-then-capped reconnect delay: 5s per prior attempt, capped at 60s.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectDelay {
    step: Duration,
    max: Duration,
}

impl ReconnectDelay {
    #[must_use]
    pub fn for_attempt(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.max)
    }
}

impl Default for ReconnectDelay {
    fn default() -> Self {
        ReconnectDelay {
            step: Duration::from_secs(5),
            max: Duration::from_secs(60),
        }
    }
}

/// Run the router session: connect, subscribe, and consume deliveries
/// serially until the process is killed.
pub async fn run<S: Inventory>(settings: &MqttSettings, store: S) {
    let (client, mut event_loop) = AsyncClient::new(settings.options(), 64);
    let router = Router::new(&store, &client);
    let reconnect = ReconnectDelay::default();
    let mut failed_attempts: u32 = 0;

    log::info!(
        "router session starting against {}:{}",
        settings.host,
        settings.port
    );

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                failed_attempts = 0;
                log::info!("connected to broker");
                subscribe_all(&client).await;
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                router.dispatch(&publish.topic, &publish.payload).await;
            }
            Ok(_) => {}
            Err(e) => {
                failed_attempts = failed_attempts.saturating_add(1);
                let delay = reconnect.for_attempt(failed_attempts);
                log::error!(
                    "broker connection error ({e}); reconnecting in {}s",
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn subscribe_all(client: &AsyncClient) {
    for (topic, qos) in SUBSCRIPTIONS {
        match client.subscribe(topic, qos).await {
            Ok(()) => log::info!("subscribed to {topic}"),
            Err(e) => log::error!("subscribe to {topic} failed: {e}"),
        }
    }
}
