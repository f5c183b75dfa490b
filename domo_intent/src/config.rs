// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Intent service configuration from the environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use derive_builder::Builder;
use rumqttc::MqttOptions;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable '{0}' is not valid unicode")]
    EnvVarInvalid(&'static str),
    #[error("environment variable '{key}' has malformed value '{value}'")]
    EnvVarMalformed { key: &'static str, value: String },
    #[error("incomplete settings: {0}")]
    Incomplete(String),
}

/// Everything the service needs: broker connection, its own service name
/// (the `<requester>` topic segment), and the readiness gates.
#[derive(Builder, Clone, Debug)]
#[builder(setter(into), build_fn(error = "ConfigBuildError"))]
pub struct ServiceSettings {
    #[builder(default = "String::from(\"localhost\")")]
    pub host: String,
    #[builder(default = "1883")]
    pub port: u16,
    #[builder(default)]
    pub username: Option<String>,
    #[builder(default)]
    pub password: Option<String>,
    #[builder(default = "60")]
    pub keep_alive_secs: u64,
    #[builder(default = "String::from(\"intent-service\")")]
    pub service_name: String,
    /// Drop transcriptions until the snapshot is ready.
    #[builder(default = "false")]
    pub require_snapshot: bool,
    /// Deadline readiness mode: force-mark the snapshot ready after this
    /// many seconds. Zero keeps the canonical reactive mode.
    #[builder(default = "0")]
    pub snapshot_timeout_secs: u64,
    #[builder(default = "String::from(\"transcriptions/text\")")]
    pub transcription_topic: String,
}

impl ServiceSettings {
    #[must_use]
    pub fn mqtt_options(&self) -> MqttOptions {
        let mut options =
            MqttOptions::new(self.service_name.clone(), self.host.clone(), self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs));
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            options.set_credentials(username.clone(), password.clone());
        }
        options
    }

    /// The wildcard filter for this service's correlated responses.
    #[must_use]
    pub fn response_filter(&self) -> String {
        format!("system/response/{}/#", self.service_name)
    }

    /// The topic prefix those responses share.
    #[must_use]
    pub fn response_prefix(&self) -> String {
        format!("system/response/{}/", self.service_name)
    }
}

impl ServiceSettingsBuilder {
    /// Populate a builder from the environment.
    ///
    /// # Errors
    /// [`ConfigError`] when a variable is present but unusable.
    pub fn from_environment() -> Result<Self, ConfigError> {
        let mut builder = Self::default();
        if let Some(host) = string_from_environment("MQTT_HOST")? {
            builder.host(host);
        }
        if let Some(port) = parse_from_environment::<u16>("MQTT_PORT")? {
            builder.port(port);
        }
        if let Some(user) = string_from_environment("MQTT_USER")? {
            builder.username(Some(user));
        }
        if let Some(pass) = string_from_environment("MQTT_PASS")? {
            builder.password(Some(pass));
        }
        if let Some(keep_alive) = parse_from_environment::<u64>("MQTT_KEEPALIVE")? {
            builder.keep_alive_secs(keep_alive);
        }
        if let Some(name) = string_from_environment("SERVICE_NAME")? {
            builder.service_name(name);
        }
        if let Some(require) = flag_from_environment("REQUIRE_SNAPSHOT")? {
            builder.require_snapshot(require);
        }
        if let Some(timeout) = parse_from_environment::<u64>("SNAPSHOT_TIMEOUT")? {
            builder.snapshot_timeout_secs(timeout);
        }
        if let Some(topic) = string_from_environment("TRANSCRIPTION_TOPIC")? {
            builder.transcription_topic(topic);
        }
        Ok(builder)
    }
}

/// Error type `derive_builder` reports when a required field is unset.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConfigBuildError(String);

impl From<derive_builder::UninitializedFieldError> for ConfigBuildError {
    fn from(e: derive_builder::UninitializedFieldError) -> Self {
        ConfigBuildError(e.to_string())
    }
}

impl From<ConfigBuildError> for ConfigError {
    fn from(e: ConfigBuildError) -> Self {
        ConfigError::Incomplete(e.to_string())
    }
}

fn string_from_environment(key: &'static str) -> Result<Option<String>, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Ok(Some(value)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::EnvVarInvalid(key)),
    }
}

fn parse_from_environment<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    string_from_environment(key)?
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|_| ConfigError::EnvVarMalformed { key, value })
        })
        .transpose()
}

fn flag_from_environment(key: &'static str) -> Result<Option<bool>, ConfigError> {
    Ok(string_from_environment(key)?.map(|value| {
        matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    }))
}
