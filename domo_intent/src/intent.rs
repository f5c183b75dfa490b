// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Stage A: rule-based utterance → intent.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Intents the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    On,
    Off,
    Enable,
    Disable,
    /// Open/raise (blind, door).
    Forward,
    /// Close/lower.
    Backward,
    Stop,
    Unknown,
}

impl Intent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::On => "on",
            Intent::Off => "off",
            Intent::Enable => "enable",
            Intent::Disable => "disable",
            Intent::Forward => "forward",
            Intent::Backward => "backward",
            Intent::Stop => "stop",
            Intent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Verb stems (\w*) cover the usual Spanish conjugations: "levanta",
// "levantar", "levantan", … Priority order matters: STOP outranks
// FORWARD/BACKWARD so "para de abrir" resolves to STOP.
static INTENT_PATTERNS: LazyLock<Vec<(Intent, Vec<Regex>)>> = LazyLock::new(|| {
    let compile = |patterns: &[&str]| {
        patterns
            .iter()
            .map(|p| Regex::new(p).expect("intent patterns are static and valid"))
            .collect::<Vec<_>>()
    };
    vec![
        (
            Intent::Stop,
            compile(&[r"\bpar\w*\b", r"\bdeten\w*\b", r"\balto\b", r"\bstop\b"]),
        ),
        (
            Intent::Forward,
            compile(&[r"\babr\w*\b", r"\blevant\w*\b", r"\bsub\w*\b"]),
        ),
        (
            Intent::Backward,
            compile(&[r"\bcierr\w*\b", r"\bcerr\w*\b", r"\bbaj\w*\b"]),
        ),
        (
            Intent::On,
            compile(&[r"\benciend\w*\b", r"\bactiv\w*\b", r"\bprend\w*\b"]),
        ),
        (
            Intent::Off,
            compile(&[r"\bapag\w*\b", r"\bdesactiv\w*\b"]),
        ),
        (Intent::Enable, compile(&[r"\bhabilit\w*\b"])),
        (
            Intent::Disable,
            compile(&[r"\bdeshabilit\w*\b", r"\bin\w*habilit\w*\b"]),
        ),
    ]
});

/// Parse an utterance into the first matching intent, in priority order.
#[must_use]
pub fn parse_intent(text: &str) -> Intent {
    if text.trim().is_empty() {
        return Intent::Unknown;
    }
    let normalized = text.to_lowercase();

    for (intent, patterns) in INTENT_PATTERNS.iter() {
        for pattern in patterns {
            if pattern.is_match(&normalized) {
                log::debug!("intent '{intent}' matched by pattern '{pattern}'");
                return *intent;
            }
        }
    }

    log::debug!("no intent in utterance '{normalized}'");
    Intent::Unknown
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("enciende la lampara del salon", Intent::On; "enciende")]
    #[test_case("activa el ventilador", Intent::On; "activa")]
    #[test_case("prende la luz", Intent::On; "prende")]
    #[test_case("apaga la lampara", Intent::Off; "apaga")]
    #[test_case("desactiva el ventilador", Intent::Off; "desactiva")]
    #[test_case("abre la persiana", Intent::Forward; "abre")]
    #[test_case("sube la persiana del dormitorio", Intent::Forward; "sube")]
    #[test_case("levanta la persiana", Intent::Forward; "levanta")]
    #[test_case("cierra la puerta", Intent::Backward; "cierra")]
    #[test_case("baja la persiana", Intent::Backward; "baja")]
    #[test_case("detener la persiana", Intent::Stop; "detener")]
    #[test_case("alto", Intent::Stop; "alto")]
    #[test_case("stop", Intent::Stop; "stop")]
    #[test_case("habilita el sensor de humedad", Intent::Enable; "habilita")]
    #[test_case("deshabilita el sensor", Intent::Disable; "deshabilita")]
    #[test_case("inhabilita el sensor", Intent::Disable; "inhabilita")]
    #[test_case("hola que tal", Intent::Unknown; "no intent")]
    #[test_case("", Intent::Unknown; "empty")]
    fn parses_utterances(text: &str, intent: Intent) {
        assert_eq!(parse_intent(text), intent);
    }

    // STOP must outrank the motion intents when both match.
    #[test_case("para de abrir la persiana"; "para de abrir")]
    #[test_case("detenga la subida"; "detenga la subida")]
    fn stop_wins_over_motion(text: &str) {
        assert_eq!(parse_intent(text), Intent::Stop);
    }

    #[test]
    fn uppercase_input_is_normalized() {
        assert_eq!(parse_intent("ENCIENDE LA LAMPARA"), Intent::On);
    }
}
