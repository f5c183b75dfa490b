// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Actuator state normalization.
//!
//! This module is the single source of truth consulted by both the `update`
//! and `response` paths: only *terminal* positions (ON/OFF, OPEN/CLOSED) are
//! ever persisted; transitional reports ("opening", "moving") refresh
//! `last_seen` and surface as `state_text` telemetry, never as a stored
//! state. Persisting a transitional report as 0 would falsely read as
//! "closed" to any later consumer of the row.

use std::fmt;

use serde_json::Value;

/// Outcome of normalizing a raw actuator state report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateReport {
    /// The terminal position, when the report names one.
    pub terminal: Option<bool>,
    /// The report as the device phrased it.
    pub text: String,
}

impl StateReport {
    /// The value persisted for this report, if any.
    #[must_use]
    pub fn persisted(&self) -> Option<i32> {
        self.terminal.map(i32::from)
    }
}

const ON_WORDS: [&str; 9] = [
    "true", "on", "1", "yes", "active", "enabled", "open", "opened", "abierto",
];
const OFF_WORDS: [&str; 9] = [
    "false", "off", "0", "no", "disabled", "inactive", "close", "closed", "cerrado",
];
const TRANSIENT_WORDS: [&str; 7] = [
    "opening", "closing", "stop", "stopped", "moving", "forward", "backward",
];

/// Normalize a raw actuator state report from an `update` or `response`
/// payload.
///
/// Accepts booleans, the numbers 0/1, the word lists of the stability
/// policy, and `"OPEN:<n>"` / `"CLOSE:<n>"` forms whose left token is
/// normalized on its own. Anything else is preserved as text but carries no
/// terminal position.
#[must_use]
pub fn normalize_actuator_state(raw: &Value) -> StateReport {
    match raw {
        Value::Bool(b) => StateReport {
            terminal: Some(*b),
            text: raw.to_string(),
        },
        Value::Number(n) => {
            let terminal = match n.as_i64() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            };
            StateReport {
                terminal,
                text: n.to_string(),
            }
        }
        Value::String(s) => StateReport {
            terminal: classify_word(s),
            text: s.clone(),
        },
        other => StateReport {
            terminal: None,
            text: other.to_string(),
        },
    }
}

fn classify_word(raw: &str) -> Option<bool> {
    let lowered = raw.trim().to_lowercase();

    // "OPEN:<n>" / "CLOSE:<n>" forms: the position suffix is advisory, the
    // left token decides.
    let word = lowered.split(':').next().unwrap_or(&lowered);

    if ON_WORDS.contains(&word) {
        Some(true)
    } else if OFF_WORDS.contains(&word) {
        Some(false)
    } else {
        None
    }
}

/// Whether a report names a known transitional state rather than an
/// unrecognized one. Both go unpersisted; only the log level differs.
#[must_use]
pub fn is_transitional(raw: &str) -> bool {
    let lowered = raw.trim().to_lowercase();
    TRANSIENT_WORDS.contains(&lowered.as_str())
}

/// Normalize a set/enable command flag from a service payload.
///
/// Booleans pass through, numbers read as zero/non-zero, and strings use the
/// terminal word lists; unrecognized strings read as `false`. Returns `None`
/// only for payload values that cannot carry a flag at all (null, arrays,
/// objects).
#[must_use]
pub fn normalize_flag(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::String(s) => {
            let lowered = s.trim().to_lowercase();
            Some(ON_WORDS.contains(&lowered.as_str()))
        }
        _ => None,
    }
}

/// Motion commands accepted for blind/door style actuators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionCommand {
    Open,
    Close,
    Stop,
}

impl MotionCommand {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "OPEN" => Some(MotionCommand::Open),
            "CLOSE" => Some(MotionCommand::Close),
            "STOP" => Some(MotionCommand::Stop),
            _ => None,
        }
    }

    /// The wire spelling forwarded to devices.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MotionCommand::Open => "OPEN",
            MotionCommand::Close => "CLOSE",
            MotionCommand::Stop => "STOP",
        }
    }

    /// Whether the command drives the actuator toward a position, for the
    /// compatibility projection onto the stored `state` column.
    #[must_use]
    pub fn drives(self) -> bool {
        !matches!(self, MotionCommand::Stop)
    }
}

impl fmt::Display for MotionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
