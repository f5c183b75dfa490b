// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Wire protocol shared by the domo router and its services.
//!
//! Everything that crosses the broker is defined here: the topic grammar and
//! its dispatch keys ([`topic`]), the validated payload types handlers
//! receive ([`payload`]), the actuator state normalization policy
//! ([`state`]), and the wall-clock timestamp format ([`timestamp`]).

pub mod payload;
pub mod state;
pub mod timestamp;
pub mod topic;
