// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Intent service binary.

use std::process::ExitCode;

use domo_intent::config::ServiceSettingsBuilder;
use domo_intent::service::IntentService;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::new()
        .parse_filters(&level)
        .filter_module("rumqttc", log::LevelFilter::Warn)
        .init();

    let settings = match ServiceSettingsBuilder::from_environment()
        .map_err(|e| e.to_string())
        .and_then(|builder| builder.build().map_err(|e| e.to_string()))
    {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("configuration invalid: {e}");
            return ExitCode::FAILURE;
        }
    };

    IntentService::new(settings).run().await;
    ExitCode::SUCCESS
}
