// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The service loop: broker session, snapshot feeding, and the
//! transcription → command pipeline.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, Packet, QoS};
use serde_json::{Value, json};

use crate::builder;
use crate::config::ServiceSettings;
use crate::intent::{self, Intent};
use crate::resolver::TargetResolver;
use crate::snapshot::Snapshot;

const RECONNECT_STEP: Duration = Duration::from_secs(5);
const RECONNECT_CAP: Duration = Duration::from_secs(60);

/// The intent service: one broker session feeding the snapshot mirror and
/// running the three-stage pipeline per transcription.
pub struct IntentService {
    settings: ServiceSettings,
    snapshot: Arc<Snapshot>,
}

impl IntentService {
    #[must_use]
    pub fn new(settings: ServiceSettings) -> Self {
        IntentService {
            settings,
            snapshot: Arc::new(Snapshot::default()),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Connect and process messages until the process is killed.
    pub async fn run(&self) {
        let (client, mut event_loop) = AsyncClient::new(self.settings.mqtt_options(), 64);

        self.arm_snapshot_deadline();

        let mut failed_attempts: u32 = 0;
        log::info!(
            "intent service '{}' starting against {}:{}",
            self.settings.service_name,
            self.settings.host,
            self.settings.port
        );

        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    failed_attempts = 0;
                    log::info!("connected to broker");
                    self.on_connect(&client).await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.on_message(&client, &publish.topic, &publish.payload).await;
                }
                Ok(_) => {}
                Err(e) => {
                    failed_attempts = failed_attempts.saturating_add(1);
                    let delay = RECONNECT_STEP
                        .saturating_mul(failed_attempts)
                        .min(RECONNECT_CAP);
                    log::error!(
                        "broker connection error ({e}); reconnecting in {}s",
                        delay.as_secs()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Deadline readiness mode: after the configured wait the snapshot is
    /// declared ready with whatever it holds.
    fn arm_snapshot_deadline(&self) {
        let timeout = self.settings.snapshot_timeout_secs;
        if timeout == 0 {
            return;
        }
        let snapshot = Arc::clone(&self.snapshot);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(timeout)).await;
            snapshot.force_ready("deadline expired");
        });
    }

    async fn on_connect(&self, client: &AsyncClient) {
        let subscriptions = [
            (self.settings.transcription_topic.clone(), QoS::AtLeastOnce),
            (self.settings.response_filter(), QoS::AtLeastOnce),
            ("system/notify/#".to_string(), QoS::AtLeastOnce),
        ];
        for (topic, qos) in subscriptions {
            match client.subscribe(&topic, qos).await {
                Ok(()) => log::info!("subscribed to {topic}"),
                Err(e) => log::error!("subscribe to {topic} failed: {e}"),
            }
        }

        // Ask the router for the full dump that seeds the mirror.
        let select_topic = format!("system/select/{}", self.settings.service_name);
        let request = json!({ "request": "all" });
        match client
            .publish(
                &select_topic,
                QoS::AtLeastOnce,
                false,
                serde_json::to_vec(&request).expect("static request body serializes"),
            )
            .await
        {
            Ok(()) => log::info!("snapshot requested on {select_topic}"),
            Err(e) => log::error!("snapshot request failed: {e}"),
        }
    }

    async fn on_message(&self, client: &AsyncClient, topic: &str, payload: &[u8]) {
        let value: Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("dropping non-JSON payload on '{topic}': {e}");
                return;
            }
        };

        if topic == self.settings.transcription_topic {
            self.on_transcription(client, &value).await;
            return;
        }

        if topic.starts_with(&self.settings.response_prefix())
            || topic.starts_with("system/notify/")
        {
            self.snapshot.ingest(topic, &value);
            if !self.snapshot.is_ready() && self.snapshot.is_usable() {
                self.snapshot.mark_ready("mirror usable");
            }
            return;
        }

        log::debug!("ignoring message on '{topic}'");
    }

    async fn on_transcription(&self, client: &AsyncClient, payload: &Value) {
        let Some(text) = payload.get("text").and_then(Value::as_str) else {
            log::warn!("transcription without text: {payload}");
            return;
        };

        if self.settings.require_snapshot && !self.snapshot.is_ready() {
            log::warn!("transcription ignored, snapshot not ready: '{text}'");
            return;
        }

        let parsed = intent::parse_intent(text);
        log::info!("utterance '{text}' -> intent '{parsed}'");
        if parsed == Intent::Unknown {
            return;
        }

        let resolver = TargetResolver::new(&self.snapshot);
        let Some(target) = resolver.resolve(text, parsed) else {
            log::warn!("no target for utterance '{text}'");
            return;
        };

        let Some(command) = builder::build(parsed, &target) else {
            return;
        };

        let set_topic = format!("system/set/{}", self.settings.service_name);
        let body = match serde_json::to_vec(&command) {
            Ok(body) => body,
            Err(e) => {
                log::error!("command serialization failed: {e}");
                return;
            }
        };
        match client.publish(&set_topic, QoS::AtLeastOnce, false, body).await {
            Ok(()) => log::info!("command published on {set_topic}: {command}"),
            Err(e) => log::error!("command publish failed: {e}"),
        }
    }
}
