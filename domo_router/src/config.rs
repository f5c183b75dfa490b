// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Router configuration from the environment.

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

/// Broker connection settings.
#[derive(Builder, Clone, Debug)]
#[builder(setter(into), build_fn(error = "ConfigBuildError"))]
pub struct MqttSettings {
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
    #[builder(default = "String::from(\"domo-router\")")]
    pub client_id: String,
}

impl MqttSettings {
    /// Render these settings as client options for the broker session.
    #[must_use]
    pub fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs));
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            options.set_credentials(username.clone(), password.clone());
        }
        options
    }
}

impl MqttSettingsBuilder {
    /// Populate a builder from the `MQTT_*` environment variables.
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
        Ok(builder)
    }
}

/// Relational store settings.
#[derive(Builder, Clone, Debug)]
#[builder(setter(into), build_fn(error = "ConfigBuildError"))]
pub struct DbSettings {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl DbSettings {
    /// The connection URL the adapter dials.
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "mysql://{}:{}@{}/{}",
            self.user, self.password, self.host, self.database
        )
    }
}

impl DbSettingsBuilder {
    /// Populate a builder from the `DB_*` environment variables.
    ///
    /// # Errors
    /// [`ConfigError`] when a variable is present but unusable.
    pub fn from_environment() -> Result<Self, ConfigError> {
        let mut builder = Self::default();
        if let Some(host) = string_from_environment("DB_HOST")? {
            builder.host(host);
        }
        if let Some(user) = string_from_environment("DB_USER")? {
            builder.user(user);
        }
        if let Some(password) = string_from_environment("DB_PASS")? {
            builder.password(password);
        }
        if let Some(database) = string_from_environment("DB_NAME")? {
            builder.database(database);
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

pub(crate) fn string_from_environment(
    key: &'static str,
) -> Result<Option<String>, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Ok(Some(value)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::EnvVarInvalid(key)),
    }
}

pub(crate) fn parse_from_environment<T: FromStr>(
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    string_from_environment(key)?
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|_| ConfigError::EnvVarMalformed { key, value })
        })
        .transpose()
}
