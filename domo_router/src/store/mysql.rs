// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! MySQL implementation of the [`Inventory`] adapter.
//!
//! One connection per router process, 5 second acquire timeout, and a
//! one-shot retry on transient failures: the pool re-establishes the
//! connection on the next acquire, so a single retry after a dropped link is
//! enough. Anything still failing after that propagates to the handler.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::mysql::{MySql, MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::{Query, QueryAs};

use domo_protocol::topic::ComponentKind;

use super::{
    ActuatorRow, AlertRow, AlertUpsert, ComponentMeta, DeviceRow, Inventory, SensorRow,
    StoreError, StoreErrorKind,
};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MySqlInventory {
    pool: MySqlPool,
}

impl MySqlInventory {
    /// Connect to the store.
    ///
    /// # Errors
    /// [`StoreError`] when the initial connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await
            .map_err(StoreErrorKind::Database)?;
        log::info!("connected to database");
        Ok(MySqlInventory { pool })
    }

    /// Round-trip liveness probe, used by the `--healthcheck` entrypoint.
    ///
    /// # Errors
    /// [`StoreError`] when the store is unreachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StoreErrorKind::Database)?;
        Ok(())
    }

    async fn execute<'a, F>(&self, build: F) -> Result<(), StoreError>
    where
        F: Fn() -> Query<'a, MySql, MySqlArguments> + Send + Sync,
    {
        match build().execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) if is_transient(&e) => {
                log::warn!("transient database failure, retrying once: {e}");
                build()
                    .execute(&self.pool)
                    .await
                    .map(|_| ())
                    .map_err(|e| StoreErrorKind::Database(e).into())
            }
            Err(e) => Err(StoreErrorKind::Database(e).into()),
        }
    }

    async fn fetch_all_as<'a, T, F>(&self, build: F) -> Result<Vec<T>, StoreError>
    where
        F: Fn() -> QueryAs<'a, MySql, T, MySqlArguments> + Send + Sync,
        T: for<'r> sqlx::FromRow<'r, MySqlRow> + Send + Unpin,
    {
        match build().fetch_all(&self.pool).await {
            Ok(rows) => Ok(rows),
            Err(e) if is_transient(&e) => {
                log::warn!("transient database failure, retrying once: {e}");
                build()
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| StoreErrorKind::Database(e).into())
            }
            Err(e) => Err(StoreErrorKind::Database(e).into()),
        }
    }

    async fn fetch_optional_row<'a, F>(&self, build: F) -> Result<Option<MySqlRow>, StoreError>
    where
        F: Fn() -> Query<'a, MySql, MySqlArguments> + Send + Sync,
    {
        match build().fetch_optional(&self.pool).await {
            Ok(row) => Ok(row),
            Err(e) if is_transient(&e) => {
                log::warn!("transient database failure, retrying once: {e}");
                build()
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| StoreErrorKind::Database(e).into())
            }
            Err(e) => Err(StoreErrorKind::Database(e).into()),
        }
    }
}

fn is_transient(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

#[async_trait]
impl Inventory for MySqlInventory {
    async fn touch_device(&self, device: &str) -> Result<(), StoreError> {
        self.execute(|| {
            sqlx::query(
                "INSERT INTO devices (device_name, last_seen) VALUES (?, NOW()) \
                 ON DUPLICATE KEY UPDATE last_seen = NOW()",
            )
            .bind(device)
        })
        .await
    }

    async fn device_exists(&self, device: &str) -> Result<bool, StoreError> {
        let row = self
            .fetch_optional_row(|| {
                sqlx::query("SELECT 1 FROM devices WHERE device_name = ?").bind(device)
            })
            .await?;
        Ok(row.is_some())
    }

    async fn register_component(
        &self,
        kind: ComponentKind,
        device: &str,
        id: u32,
        name: &str,
        location: &str,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, device_name, name, location, last_seen) \
             VALUES (?, ?, ?, ?, NOW()) \
             ON DUPLICATE KEY UPDATE \
                 name = VALUES(name), \
                 location = VALUES(location), \
                 last_seen = NOW()",
            kind.table()
        );
        self.execute(|| {
            sqlx::query(&sql)
                .bind(id)
                .bind(device)
                .bind(name)
                .bind(location)
        })
        .await
    }

    async fn ensure_component(
        &self,
        kind: ComponentKind,
        device: &str,
        id: u32,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, device_name, last_seen) VALUES (?, ?, NOW()) \
             ON DUPLICATE KEY UPDATE last_seen = NOW()",
            kind.table()
        );
        self.execute(|| sqlx::query(&sql).bind(id).bind(device)).await
    }

    async fn touch_component(
        &self,
        kind: ComponentKind,
        device: &str,
        id: u32,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET last_seen = NOW() WHERE device_name = ? AND id = ?",
            kind.table()
        );
        self.execute(|| sqlx::query(&sql).bind(device).bind(id)).await
    }

    async fn component_meta(
        &self,
        kind: ComponentKind,
        device: &str,
        id: u32,
    ) -> Result<Option<ComponentMeta>, StoreError> {
        let sql = format!(
            "SELECT name, location FROM {} WHERE device_name = ? AND id = ?",
            kind.table()
        );
        let row = self
            .fetch_optional_row(|| sqlx::query(&sql).bind(device).bind(id))
            .await?;
        row.map(|row| -> Result<ComponentMeta, StoreError> {
            Ok(ComponentMeta {
                name: row
                    .try_get("name")
                    .map_err(|e| StoreError::from(StoreErrorKind::Database(e)))?,
                location: row
                    .try_get("location")
                    .map_err(|e| StoreError::from(StoreErrorKind::Database(e)))?,
            })
        })
        .transpose()
    }

    async fn update_sensor_reading(
        &self,
        device: &str,
        id: u32,
        value: &str,
        unit: Option<&str>,
    ) -> Result<(), StoreError> {
        self.execute(|| {
            sqlx::query(
                "UPDATE sensors \
                 SET value = ?, unit = COALESCE(?, unit), last_seen = NOW() \
                 WHERE device_name = ? AND id = ?",
            )
            .bind(value)
            .bind(unit)
            .bind(device)
            .bind(id)
        })
        .await
    }

    async fn update_sensor_enabled(
        &self,
        device: &str,
        id: u32,
        enabled: bool,
    ) -> Result<(), StoreError> {
        self.execute(|| {
            sqlx::query(
                "UPDATE sensors SET enabled = ?, last_seen = NOW() \
                 WHERE device_name = ? AND id = ?",
            )
            .bind(enabled)
            .bind(device)
            .bind(id)
        })
        .await
    }

    async fn sensor_unit(&self, device: &str, id: u32) -> Result<Option<String>, StoreError> {
        let row = self
            .fetch_optional_row(|| {
                sqlx::query("SELECT unit FROM sensors WHERE device_name = ? AND id = ?")
                    .bind(device)
                    .bind(id)
            })
            .await?;
        row.map(|row| row.try_get("unit").map_err(|e| StoreErrorKind::Database(e).into()))
            .transpose()
            .map(Option::flatten)
    }

    async fn set_actuator_state(
        &self,
        device: &str,
        id: u32,
        state: i32,
    ) -> Result<(), StoreError> {
        self.execute(|| {
            sqlx::query(
                "UPDATE actuators SET state = ?, last_seen = NOW() \
                 WHERE device_name = ? AND id = ?",
            )
            .bind(state)
            .bind(device)
            .bind(id)
        })
        .await
    }

    async fn upsert_alert(&self, alert: &AlertUpsert) -> Result<(), StoreError> {
        self.execute(|| {
            sqlx::query(
                "INSERT INTO alerts (device_name, component_type, component_id, \
                     component_name, location, status, message, severity, code, timestamp) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NOW()) \
                 ON DUPLICATE KEY UPDATE \
                     component_name = VALUES(component_name), \
                     location = VALUES(location), \
                     status = VALUES(status), \
                     message = VALUES(message), \
                     severity = VALUES(severity), \
                     code = VALUES(code), \
                     timestamp = NOW()",
            )
            .bind(&alert.device)
            .bind(alert.kind.as_str())
            .bind(alert.id)
            .bind(&alert.name)
            .bind(&alert.location)
            .bind(&alert.status)
            .bind(&alert.message)
            .bind(&alert.severity)
            .bind(&alert.code)
        })
        .await
    }

    async fn select_devices(&self) -> Result<Vec<DeviceRow>, StoreError> {
        self.fetch_all_as(|| sqlx::query_as("SELECT * FROM devices ORDER BY device_name"))
            .await
    }

    async fn select_sensors(
        &self,
        device: Option<&str>,
        id: Option<u32>,
    ) -> Result<Vec<SensorRow>, StoreError> {
        self.select_components(ComponentKind::Sensor, device, id).await
    }

    async fn select_actuators(
        &self,
        device: Option<&str>,
        id: Option<u32>,
    ) -> Result<Vec<ActuatorRow>, StoreError> {
        self.select_components(ComponentKind::Actuator, device, id).await
    }

    async fn select_alerts(&self, limit: Option<u32>) -> Result<Vec<AlertRow>, StoreError> {
        match limit {
            Some(limit) => {
                self.fetch_all_as(|| {
                    sqlx::query_as(
                        "SELECT * FROM alerts \
                         ORDER BY severity DESC, timestamp DESC LIMIT ?",
                    )
                    .bind(limit)
                })
                .await
            }
            None => {
                self.fetch_all_as(|| {
                    sqlx::query_as("SELECT * FROM alerts ORDER BY severity DESC, timestamp DESC")
                })
                .await
            }
        }
    }
}

impl MySqlInventory {
    async fn select_components<T>(
        &self,
        kind: ComponentKind,
        device: Option<&str>,
        id: Option<u32>,
    ) -> Result<Vec<T>, StoreError>
    where
        T: for<'r> sqlx::FromRow<'r, MySqlRow> + Send + Unpin,
    {
        match (device, id) {
            (Some(device), Some(id)) => {
                let sql = format!(
                    "SELECT * FROM {} WHERE device_name = ? AND id = ?",
                    kind.table()
                );
                self.fetch_all_as(|| sqlx::query_as(&sql).bind(device).bind(id))
                    .await
            }
            (Some(device), None) => {
                let sql = format!(
                    "SELECT * FROM {} WHERE device_name = ? ORDER BY id",
                    kind.table()
                );
                self.fetch_all_as(|| sqlx::query_as(&sql).bind(device)).await
            }
            _ => {
                let sql = format!(
                    "SELECT * FROM {} ORDER BY device_name, id",
                    kind.table()
                );
                self.fetch_all_as(|| sqlx::query_as(&sql)).await
            }
        }
    }
}
