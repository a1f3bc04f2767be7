//! Inversion Engine - deterministic guidance selection
//!
//! 1. Crisis: an open SEDA protocol replaces all personalized guidance.
//! 2. Otherwise each consulted gate is resolved to a protocol for the
//!    event's severity band (lower-band fallback per policy). The first
//!    resolved gate supplies the script; the others add personalization
//!    sentences when the event text hits one of their keywords.
//! 3. Experiments from every resolved gate are deduplicated, scored and
//!    the best few returned in stable order.
//! 4. Nothing resolved: the fixed per-band fallback table.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use super::fallback;
use super::script::{GuidancePreferences, InversionScript, ScriptSource};
use crate::event::ValidatedEvent;
use crate::physics::state::VectorState;
use crate::reference::{BandFallback, GateEntry, GateProtocol};
use crate::seda::SedaProtocol;
use crate::severity::SeverityBand;

/// Displacement above which the strained axis is called out
const AXIS_NOTE_DISPLACEMENT: f64 = 1.0;

/// Guidance settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InversionConfig {
    pub band_fallback: BandFallback,
    pub max_experiments: usize,
    /// Score per strong keyword found in an experiment
    pub strong_keyword_weight: u32,
    /// Score per preferred experiment type an experiment matches
    pub preference_weight: u32,
}

impl Default for InversionConfig {
    fn default() -> Self {
        Self {
            band_fallback: BandFallback::ClosestLower,
            max_experiments: 3,
            strong_keyword_weight: 3,
            preference_weight: 2,
        }
    }
}

/// Everything guidance selection looks at
#[derive(Debug, Clone)]
pub struct GuidanceRequest<'a> {
    pub event: &'a ValidatedEvent,
    pub state: &'a VectorState,
    pub band: SeverityBand,
    /// Gates selected upstream, in priority order
    pub gates: Vec<&'a GateEntry>,
    pub preferences: &'a GuidancePreferences,
}

struct Resolved<'a> {
    gate: &'a GateEntry,
    protocol: &'a GateProtocol,
}

/// Deterministic guidance generator
#[derive(Debug, Clone, Default)]
pub struct InversionEngine {
    config: InversionConfig,
}

impl InversionEngine {
    pub fn new(config: InversionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InversionConfig {
        &self.config
    }

    /// Fixed SEDA guidance; overrides anything gate-derived
    pub fn crisis(&self, protocol: &SedaProtocol, band: SeverityBand) -> InversionScript {
        let text = protocol.display_text();
        InversionScript {
            script: text.clone(),
            deterministic_script: text,
            experiments: protocol
                .immediate_actions
                .iter()
                .take(self.config.max_experiments)
                .cloned()
                .collect(),
            source: ScriptSource::Deterministic,
            band,
            gates_consulted: Vec::new(),
            personalizations: vec![protocol.stabilization.clone()],
        }
    }

    /// Gate-derived guidance, or the per-band fallback
    pub fn generate(&self, request: &GuidanceRequest<'_>) -> InversionScript {
        let text = request.event.text();
        let gates_consulted: Vec<u16> = request.gates.iter().map(|g| g.number).collect();

        let resolved: Vec<Resolved<'_>> = request
            .gates
            .iter()
            .copied()
            .filter_map(|gate| {
                gate.protocol_for(request.band, self.config.band_fallback)
                    .map(|(_, protocol)| Resolved { gate, protocol })
            })
            .collect();

        let mut personalizations = Vec::new();
        if request.state.displacement() > AXIS_NOTE_DISPLACEMENT {
            personalizations.push(format!(
                "Most of the strain is landing on your {}.",
                request.state.primary_stress_axis()
            ));
        }

        let Some(primary) = resolved.first() else {
            debug!(band = %request.band, "no gate protocol resolved, using fallback");
            return InversionScript {
                script: fallback::script(request.band).to_string(),
                deterministic_script: fallback::script(request.band).to_string(),
                experiments: fallback::experiments(request.band)
                    .iter()
                    .take(self.config.max_experiments)
                    .map(|e| e.to_string())
                    .collect(),
                source: ScriptSource::Deterministic,
                band: request.band,
                gates_consulted,
                personalizations,
            };
        };

        for other in &resolved[1..] {
            if let Some(sentence) = &other.protocol.personalization {
                if other.gate.matches(&text) {
                    personalizations.push(sentence.clone());
                }
            }
        }

        let strong = strong_keywords(request.event, &resolved, &text);
        let candidates = dedupe(resolved.iter().flat_map(|r| r.protocol.experiments.iter()));
        let mut experiments = self.rank(candidates, &strong, request.preferences);
        if experiments.is_empty() {
            experiments = fallback::experiments(request.band)
                .iter()
                .take(self.config.max_experiments)
                .map(|e| e.to_string())
                .collect();
        }

        debug!(primary_gate = primary.gate.number, experiments = experiments.len(), "guidance selected");

        InversionScript {
            script: primary.protocol.script.clone(),
            deterministic_script: primary.protocol.script.clone(),
            experiments,
            source: ScriptSource::Deterministic,
            band: request.band,
            gates_consulted,
            personalizations,
        }
    }

    /// Score and keep the best, ties in original order
    fn rank(
        &self,
        candidates: Vec<String>,
        strong: &[String],
        preferences: &GuidancePreferences,
    ) -> Vec<String> {
        let mut scored: Vec<(u32, String)> = candidates
            .into_iter()
            .map(|experiment| {
                let lower = experiment.to_lowercase();
                let keyword_hits = strong.iter().filter(|k| lower.contains(k.as_str())).count() as u32;
                let preference_hits = preferences
                    .experiment_types
                    .iter()
                    .filter(|t| t.matches(&lower))
                    .count() as u32;
                let score = keyword_hits * self.config.strong_keyword_weight
                    + preference_hits * self.config.preference_weight;
                (score, experiment)
            })
            .collect();

        // sort_by is stable
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(self.config.max_experiments)
            .map(|(_, e)| e)
            .collect()
    }
}

/// Category keywords plus any resolved-gate keyword present in the event
fn strong_keywords(event: &ValidatedEvent, resolved: &[Resolved<'_>], text: &str) -> Vec<String> {
    let text = text.to_lowercase();
    let mut keywords: Vec<String> = event
        .category
        .strong_keywords()
        .iter()
        .map(|k| k.to_string())
        .collect();
    for r in resolved {
        for k in &r.gate.keywords {
            let k = k.to_lowercase();
            if text.contains(&k) && !keywords.contains(&k) {
                keywords.push(k);
            }
        }
    }
    keywords
}

/// First occurrence wins, compared case-insensitively
fn dedupe<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .filter(|e| seen.insert(e.trim().to_lowercase()))
        .map(|e| e.trim().to_string())
        .collect()
}
