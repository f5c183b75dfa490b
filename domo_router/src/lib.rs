// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The domo router: the central process between field devices and internal
//! services.
//!
//! Devices publish discovery, telemetry, alerts and command acknowledgments;
//! services issue queries and commands. The router validates every message
//! at the edge, persists the result, and reshapes it back onto the broker:
//! correlated replies on `system/response/…` and fan-out events on
//! `system/notify/…`.

pub mod config;
pub mod handlers;
pub mod publish;
pub mod router;
pub mod store;
