// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Stage C: build the `system/set` payload for a resolved target.

use serde_json::{Value, json};

use domo_protocol::state::MotionCommand;
use domo_protocol::topic::ComponentKind;

use crate::intent::Intent;
use crate::snapshot::Target;

/// Motion commands drive at full speed unless the utterance pipeline ever
/// learns to extract one.
const DEFAULT_SPEED: u8 = 100;

/// Translate `(intent, target)` into a payload for `system/set/<service>`,
/// or nothing when the intent cannot apply to the target's kind.
#[must_use]
pub fn build(intent: Intent, target: &Target) -> Option<Value> {
    match target.kind {
        ComponentKind::Actuator => build_actuator(intent, target),
        ComponentKind::Sensor => build_sensor(intent, target),
    }
}

fn build_actuator(intent: Intent, target: &Target) -> Option<Value> {
    match intent {
        Intent::On | Intent::Off => Some(json!({
            "device": target.device,
            "type": ComponentKind::Actuator.as_str(),
            "id": target.id,
            "state": intent == Intent::On,
        })),
        Intent::Forward | Intent::Backward => {
            let command = if intent == Intent::Forward {
                MotionCommand::Open
            } else {
                MotionCommand::Close
            };
            Some(json!({
                "device": target.device,
                "type": ComponentKind::Actuator.as_str(),
                "id": target.id,
                "command": command.as_str(),
                "speed": DEFAULT_SPEED,
            }))
        }
        Intent::Stop => Some(json!({
            "device": target.device,
            "type": ComponentKind::Actuator.as_str(),
            "id": target.id,
            "command": MotionCommand::Stop.as_str(),
        })),
        Intent::Enable | Intent::Disable | Intent::Unknown => {
            log::warn!("intent '{intent}' does not apply to an actuator");
            None
        }
    }
}

fn build_sensor(intent: Intent, target: &Target) -> Option<Value> {
    match intent {
        Intent::Enable | Intent::Disable => Some(json!({
            "device": target.device,
            "type": ComponentKind::Sensor.as_str(),
            "id": target.id,
            "enable": intent == Intent::Enable,
        })),
        _ => {
            log::warn!("intent '{intent}' does not apply to a sensor");
            None
        }
    }
}
