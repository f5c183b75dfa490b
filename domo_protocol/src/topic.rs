// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Topic grammar and dispatch keys.
//!
//! Every inbound topic is canonicalized into a [`Route`] before any payload
//! is looked at. Topics outside the grammar resolve to `Ok(None)` and are
//! dropped at debug level by the dispatcher; topics inside the grammar with
//! structural violations (non-integer id, unknown component type) return a
//! typed error and are dropped with a warning.

use std::fmt;

use thiserror::Error;

/// The two component tables a device can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Sensor,
    Actuator,
}

impl ComponentKind {
    /// The topic segment / payload `type` spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Sensor => "sensor",
            ComponentKind::Actuator => "actuator",
        }
    }

    /// The persistence table backing this kind.
    #[must_use]
    pub fn table(self) -> &'static str {
        match self {
            ComponentKind::Sensor => "sensors",
            ComponentKind::Actuator => "actuators",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sensor" => Some(ComponentKind::Sensor),
            "actuator" => Some(ComponentKind::Actuator),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channels published by field devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChannel {
    Announce,
    Update,
    Alert,
    Response,
}

impl DeviceChannel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceChannel::Announce => "announce",
            DeviceChannel::Update => "update",
            DeviceChannel::Alert => "alert",
            DeviceChannel::Response => "response",
        }
    }
}

/// Verbs accepted on `system/<verb>/<service>` from internal services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceVerb {
    Get,
    Set,
    Select,
}

/// A canonicalized inbound topic.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// `announce|update|alert|response / <device> / <type> / <id>`.
    Device {
        channel: DeviceChannel,
        device: String,
        kind: ComponentKind,
        id: u32,
    },
    /// `system/get|set|select/<service>`.
    Service { verb: ServiceVerb, service: String },
    /// `system/notify/<event>` or `system/notify/<device>/<event>`.
    Notify {
        device: Option<String>,
        event: String,
    },
}

#[derive(Debug, Error)]
pub enum TopicError {
    #[error("topic '{0}' has too few segments for its channel")]
    TooShort(String),
    #[error("topic '{topic}' names unknown component type '{kind}'")]
    UnknownKind { topic: String, kind: String },
    #[error("topic '{topic}' carries non-integer component id '{id}'")]
    InvalidId { topic: String, id: String },
    #[error("topic '{0}' has an empty device segment")]
    EmptyDevice(String),
}

impl Route {
    /// Canonicalize an inbound topic into a dispatch key.
    ///
    /// First-token match on the device channels, otherwise two-token match
    /// on `system/<verb>`. `get/…` and `set/…` are router *outputs* and
    /// never dispatch.
    ///
    /// # Errors
    /// [`TopicError`] when a topic inside the grammar is structurally
    /// invalid; such messages are dropped with a warning.
    pub fn parse(topic: &str) -> Result<Option<Route>, TopicError> {
        let segments: Vec<&str> = topic.split('/').collect();

        let channel = match segments.first().copied() {
            Some("announce") => Some(DeviceChannel::Announce),
            Some("update") => Some(DeviceChannel::Update),
            Some("alert") => Some(DeviceChannel::Alert),
            Some("response") => Some(DeviceChannel::Response),
            _ => None,
        };

        if let Some(channel) = channel {
            return Self::parse_device(channel, topic, &segments).map(Some);
        }

        match segments.first().copied() {
            // Device-facing channels the router publishes, never consumes.
            Some("get" | "set") => Ok(None),
            Some("system") => Self::parse_system(topic, &segments),
            _ => Ok(None),
        }
    }

    fn parse_device(
        channel: DeviceChannel,
        topic: &str,
        segments: &[&str],
    ) -> Result<Route, TopicError> {
        if segments.len() < 4 {
            return Err(TopicError::TooShort(topic.to_string()));
        }

        let device = segments[1];
        if device.is_empty() {
            return Err(TopicError::EmptyDevice(topic.to_string()));
        }

        let kind = ComponentKind::parse(segments[2]).ok_or_else(|| TopicError::UnknownKind {
            topic: topic.to_string(),
            kind: segments[2].to_string(),
        })?;

        let id = segments[3]
            .parse::<u32>()
            .map_err(|_| TopicError::InvalidId {
                topic: topic.to_string(),
                id: segments[3].to_string(),
            })?;

        Ok(Route::Device {
            channel,
            device: device.to_string(),
            kind,
            id,
        })
    }

    fn parse_system(topic: &str, segments: &[&str]) -> Result<Option<Route>, TopicError> {
        let verb = match segments.get(1).copied() {
            Some("get") => ServiceVerb::Get,
            Some("set") => ServiceVerb::Set,
            Some("select") => ServiceVerb::Select,
            Some("notify") => {
                return Self::parse_notify(topic, segments).map(Some);
            }
            _ => return Ok(None),
        };

        let service = match segments.get(2).copied() {
            Some(s) if !s.is_empty() => s,
            _ => return Err(TopicError::TooShort(topic.to_string())),
        };

        Ok(Some(Route::Service {
            verb,
            service: service.to_string(),
        }))
    }

    fn parse_notify(topic: &str, segments: &[&str]) -> Result<Route, TopicError> {
        match segments.len() {
            // system/notify/<event>
            3 if !segments[2].is_empty() => Ok(Route::Notify {
                device: None,
                event: segments[2].to_string(),
            }),
            // system/notify/<device>/<event>
            n if n >= 4 && !segments[2].is_empty() && !segments[3].is_empty() => {
                Ok(Route::Notify {
                    device: Some(segments[2].to_string()),
                    event: segments[3].to_string(),
                })
            }
            _ => Err(TopicError::TooShort(topic.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("announce/esp_salon/sensor/3", DeviceChannel::Announce, "esp_salon", ComponentKind::Sensor, 3; "announce sensor")]
    #[test_case("update/esp_puerta/actuator/0", DeviceChannel::Update, "esp_puerta", ComponentKind::Actuator, 0; "update actuator id zero")]
    #[test_case("alert/esp1/sensor/12", DeviceChannel::Alert, "esp1", ComponentKind::Sensor, 12; "alert sensor")]
    #[test_case("response/esp_salon/actuator/1", DeviceChannel::Response, "esp_salon", ComponentKind::Actuator, 1; "response actuator")]
    fn parses_device_channels(
        topic: &str,
        channel: DeviceChannel,
        device: &str,
        kind: ComponentKind,
        id: u32,
    ) {
        let route = Route::parse(topic).unwrap().unwrap();
        assert_eq!(
            route,
            Route::Device {
                channel,
                device: device.to_string(),
                kind,
                id,
            }
        );
    }

    #[test_case("system/get/intent-service", ServiceVerb::Get; "get")]
    #[test_case("system/set/telegram-service", ServiceVerb::Set; "set")]
    #[test_case("system/select/intent-service", ServiceVerb::Select; "select")]
    fn parses_service_verbs(topic: &str, verb: ServiceVerb) {
        let route = Route::parse(topic).unwrap().unwrap();
        match route {
            Route::Service { verb: v, service } => {
                assert_eq!(v, verb);
                assert!(!service.is_empty());
            }
            other => panic!("expected service route, got {other:?}"),
        }
    }

    #[test]
    fn parses_notify_with_device() {
        let route = Route::parse("system/notify/esp_salon/announce").unwrap().unwrap();
        assert_eq!(
            route,
            Route::Notify {
                device: Some("esp_salon".to_string()),
                event: "announce".to_string(),
            }
        );
    }

    #[test]
    fn parses_notify_without_device() {
        let route = Route::parse("system/notify/alert").unwrap().unwrap();
        assert_eq!(
            route,
            Route::Notify {
                device: None,
                event: "alert".to_string(),
            }
        );
    }

    #[test_case("get/esp_salon/sensor/3"; "device facing get")]
    #[test_case("set/esp_salon/actuator/1"; "device facing set")]
    #[test_case("transcriptions/text"; "foreign topic")]
    #[test_case("system/request/foo"; "unknown system verb")]
    #[test_case(""; "empty topic")]
    fn out_of_grammar_topics_resolve_to_none(topic: &str) {
        assert_eq!(Route::parse(topic).unwrap(), None);
    }

    #[test_case("announce/esp_salon/sensor"; "missing id")]
    #[test_case("update/esp_salon"; "missing type and id")]
    #[test_case("system/get"; "service verb without service")]
    #[test_case("system/notify"; "notify without event")]
    fn short_topics_are_errors(topic: &str) {
        assert!(matches!(
            Route::parse(topic),
            Err(TopicError::TooShort(_))
        ));
    }

    #[test]
    fn unknown_component_kind_is_an_error() {
        assert!(matches!(
            Route::parse("announce/esp_salon/camera/3"),
            Err(TopicError::UnknownKind { .. })
        ));
    }

    #[test_case("announce/esp_salon/sensor/abc"; "alphabetic id")]
    #[test_case("update/esp_salon/sensor/-1"; "negative id")]
    #[test_case("update/esp_salon/sensor/3.5"; "fractional id")]
    fn non_integer_ids_are_errors(topic: &str) {
        assert!(matches!(
            Route::parse(topic),
            Err(TopicError::InvalidId { .. })
        ));
    }
}
