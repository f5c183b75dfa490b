// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Router binary: configuration, logging, healthcheck, session.

use std::process::ExitCode;

use domo_router::config::{
    ConfigError, DbSettings, DbSettingsBuilder, MqttSettings, MqttSettingsBuilder,
};
use domo_router::router;
use domo_router::store::MySqlInventory;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging();

    let db = match load_db_settings() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("database configuration invalid: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Container orchestration probe: prove the store is reachable and exit.
    if std::env::args().any(|arg| arg == "--healthcheck") {
        return healthcheck(&db).await;
    }

    let mqtt = match load_mqtt_settings() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("broker configuration invalid: {e}");
            return ExitCode::FAILURE;
        }
    };

    let store = match MySqlInventory::connect(&db.url()).await {
        Ok(store) => store,
        Err(e) => {
            log::error!("database connection failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    router::run(&mqtt, store).await;
    ExitCode::SUCCESS
}

fn load_db_settings() -> Result<DbSettings, ConfigError> {
    Ok(DbSettingsBuilder::from_environment()?.build()?)
}

fn load_mqtt_settings() -> Result<MqttSettings, ConfigError> {
    Ok(MqttSettingsBuilder::from_environment()?.build()?)
}

async fn healthcheck(db: &DbSettings) -> ExitCode {
    let probe = async {
        let store = MySqlInventory::connect(&db.url()).await?;
        store.ping().await
    };
    match probe.await {
        Ok(()) => {
            log::info!("healthcheck ok");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("healthcheck failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::new()
        .parse_filters(&level)
        .filter_module("rumqttc", log::LevelFilter::Warn)
        .init();
}
