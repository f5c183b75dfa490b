// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Stage B: resolve the target component for an intent.

use rapidfuzz::fuzz;

use domo_protocol::topic::ComponentKind;

use crate::intent::Intent;
use crate::snapshot::{ComponentRecord, Snapshot, Target};

/// The minimum fuzzy score a lone winner must strictly exceed.
const FUZZY_THRESHOLD: f64 = 85.0;

/// Resolves utterance text to a mirrored component.
///
/// Search order, short-circuiting on the first hit:
/// 1. name and location both contained in the text
/// 2. name only
/// 3. location only
/// 4. global fuzzy match, accepted only with a single clear winner
pub struct TargetResolver<'a> {
    snapshot: &'a Snapshot,
}

impl<'a> TargetResolver<'a> {
    #[must_use]
    pub fn new(snapshot: &'a Snapshot) -> Self {
        TargetResolver { snapshot }
    }

    /// Resolve the component the utterance refers to, or nothing when the
    /// mirror holds no defensible match.
    #[must_use]
    pub fn resolve(&self, text: &str, intent: Intent) -> Option<Target> {
        if text.trim().is_empty() {
            return None;
        }
        let kind = match intent {
            Intent::On | Intent::Off | Intent::Forward | Intent::Backward | Intent::Stop => {
                ComponentKind::Actuator
            }
            Intent::Enable | Intent::Disable => ComponentKind::Sensor,
            Intent::Unknown => return None,
        };

        let text = text.to_lowercase();
        let candidates = self.snapshot.components(kind);

        let exact = candidates
            .iter()
            .find(|record| {
                let (name, location) = lowered(record);
                !name.is_empty()
                    && !location.is_empty()
                    && text.contains(&name)
                    && text.contains(&location)
            })
            .or_else(|| {
                candidates.iter().find(|record| {
                    let (name, _) = lowered(record);
                    !name.is_empty() && text.contains(&name)
                })
            })
            .or_else(|| {
                candidates.iter().find(|record| {
                    let (_, location) = lowered(record);
                    !location.is_empty() && text.contains(&location)
                })
            });

        if let Some(record) = exact {
            log::info!("resolved {kind} {}/{}", record.device, record.id);
            return Some(target_of(kind, record));
        }

        let fuzzy = fuzzy_match(&text, &candidates);
        match &fuzzy {
            Some(record) => log::info!("fuzzy match {kind} {}/{}", record.device, record.id),
            None => log::warn!("no {kind} resolved for utterance '{text}'"),
        }
        fuzzy.map(|record| target_of(kind, record))
    }
}

/// Global fuzzy pass: score every candidate by the better of its name and
/// location partial ratios; accept only a strict winner strictly above the
/// threshold. Ties mean ambiguity, and ambiguity means no match.
#[allow(clippy::float_cmp)]
fn fuzzy_match<'r>(text: &str, candidates: &'r [ComponentRecord]) -> Option<&'r ComponentRecord> {
    let mut best: Option<&ComponentRecord> = None;
    let mut best_score = FUZZY_THRESHOLD;
    let mut tied = false;

    for record in candidates {
        let (name, location) = lowered(record);
        let name_score = if name.is_empty() {
            0.0
        } else {
            fuzz::partial_ratio(text.chars(), name.chars())
        };
        let location_score = if location.is_empty() {
            0.0
        } else {
            fuzz::partial_ratio(text.chars(), location.chars())
        };
        let score = name_score.max(location_score);

        if score > best_score {
            best = Some(record);
            best_score = score;
            tied = false;
        } else if score == best_score {
            tied = true;
        }
    }

    if tied { None } else { best }
}

fn lowered(record: &ComponentRecord) -> (String, String) {
    (
        record.name.as_deref().unwrap_or_default().to_lowercase(),
        record.location.as_deref().unwrap_or_default().to_lowercase(),
    )
}

fn target_of(kind: ComponentKind, record: &ComponentRecord) -> Target {
    Target {
        device: record.device.clone(),
        kind,
        id: record.id,
        data: record.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn announce(snapshot: &Snapshot, device: &str, kind: &str, id: u32, name: &str, location: &str) {
        snapshot.ingest(
            &format!("system/notify/{device}/announce"),
            &json!({"device": device, "type": kind, "id": id, "name": name, "location": location}),
        );
    }

    fn fixture() -> Snapshot {
        let snapshot = Snapshot::default();
        announce(&snapshot, "esp_salon", "actuator", 1, "lampara", "salon");
        announce(&snapshot, "esp_dormitorio", "actuator", 2, "lampara", "dormitorio");
        announce(&snapshot, "esp_puerta", "actuator", 0, "persiana", "dormitorio");
        announce(&snapshot, "esp_salon", "sensor", 3, "temperatura", "salon");
        snapshot
    }

    #[test]
    fn name_and_location_beats_name_alone() {
        let snapshot = fixture();
        let resolver = TargetResolver::new(&snapshot);

        // Two "lampara" actuators exist; the location disambiguates.
        let target = resolver
            .resolve("enciende la lampara del dormitorio", Intent::On)
            .unwrap();
        assert_eq!(target.device, "esp_dormitorio");
        assert_eq!(target.id, 2);
    }

    #[test]
    fn name_only_match() {
        let snapshot = fixture();
        let resolver = TargetResolver::new(&snapshot);

        let target = resolver.resolve("abre la persiana", Intent::Forward).unwrap();
        assert_eq!(target.device, "esp_puerta");
        assert_eq!(target.id, 0);
        assert_eq!(target.kind, ComponentKind::Actuator);
    }

    #[test]
    fn location_only_match() {
        let snapshot = fixture();
        let resolver = TargetResolver::new(&snapshot);

        let target = resolver.resolve("enciende la luz del salon", Intent::On).unwrap();
        assert_eq!(target.device, "esp_salon");
    }

    #[test]
    fn enable_intents_search_sensors() {
        let snapshot = fixture();
        let resolver = TargetResolver::new(&snapshot);

        let target = resolver
            .resolve("habilita la temperatura", Intent::Enable)
            .unwrap();
        assert_eq!(target.kind, ComponentKind::Sensor);
        assert_eq!(target.id, 3);
    }

    #[test]
    fn fuzzy_match_tolerates_misspellings() {
        let snapshot = Snapshot::default();
        announce(&snapshot, "esp_puerta", "actuator", 0, "persiana", "dormitorio");
        let resolver = TargetResolver::new(&snapshot);

        // "persianna" is no substring of anything, but scores high.
        let target = resolver.resolve("abre la persianna", Intent::Forward).unwrap();
        assert_eq!(target.device, "esp_puerta");
    }

    // Property 8: two equally good candidates above the threshold mean no
    // match at all.
    #[test]
    fn fuzzy_tie_resolves_to_nothing() {
        let snapshot = Snapshot::default();
        announce(&snapshot, "esp_a", "actuator", 1, "persiana", "cocina");
        announce(&snapshot, "esp_b", "actuator", 2, "persiana", "bano");
        let resolver = TargetResolver::new(&snapshot);

        assert!(resolver.resolve("abre la persianna", Intent::Forward).is_none());
    }

    #[test]
    fn unknown_intent_resolves_to_nothing() {
        let snapshot = fixture();
        let resolver = TargetResolver::new(&snapshot);
        assert!(resolver.resolve("enciende la lampara", Intent::Unknown).is_none());
    }

    #[test]
    fn unrelated_text_resolves_to_nothing() {
        let snapshot = fixture();
        let resolver = TargetResolver::new(&snapshot);
        assert!(resolver.resolve("pon musica en la cocina", Intent::On).is_none());
    }
}
