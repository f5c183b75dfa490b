// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `system/notify/…`: observer of the router's own fan-out.

use serde_json::Value;

/// Log a notify event.
///
/// Notify traffic is fan-out only: it is never an input to the store, even
/// when it looks like one (an `update` event mirrors a write that already
/// happened in the handler that produced it).
pub fn handle(device: Option<&str>, event: &str, payload: &Value) {
    match device {
        Some(device) => log::debug!("notify [{event}] from {device}: {payload}"),
        None => log::debug!("notify [{event}]: {payload}"),
    }
}
