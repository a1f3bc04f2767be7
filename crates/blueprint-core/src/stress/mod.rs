//! Stress Mapper - turns a logged event into a Force Vector
//!
//! ```text
//! base      = severity
//! magnitude = min(10, base * type_multiplier * category_modifier)
//! direction = resistance  if magnitude > 7
//!           | momentum    if 4 <= magnitude <= 7 and category is momentum-eligible
//!           | resistance  otherwise
//! duration  = ceil(severity / 2) days
//! ```
//!
//! Missing reference data never blocks an event: an unknown category or a
//! type without a multiplier falls back to a neutral 1.0.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::event::{EventCategory, ValidatedEvent};
use crate::physics::force::{Direction, ForceVector};
use crate::profile::ProfileType;
use crate::reference::ReferenceTable;

/// Upper bound of a force magnitude
pub const MAX_MAGNITUDE: f64 = 10.0;

/// Multiplier used whenever reference data is missing
pub const NEUTRAL_MULTIPLIER: f64 = 1.0;

/// How magnitude and category pick a direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionPolicy {
    /// Magnitudes strictly above this are always resistance
    pub resistance_above: f64,
    /// Lower edge of the momentum window
    pub momentum_floor: f64,
    /// Restrict the momentum window to `momentum_categories`
    pub category_gated: bool,
    pub momentum_categories: Vec<String>,
}

impl Default for DirectionPolicy {
    fn default() -> Self {
        Self {
            resistance_above: 7.0,
            momentum_floor: 4.0,
            category_gated: true,
            momentum_categories: vec!["work".to_string(), "personal".to_string()],
        }
    }
}

impl DirectionPolicy {
    pub fn direction(&self, magnitude: f64, category: &EventCategory) -> Direction {
        if magnitude > self.resistance_above {
            return Direction::Resistance;
        }
        let eligible = !self.category_gated
            || self
                .momentum_categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(category.key()));
        if magnitude >= self.momentum_floor && eligible {
            Direction::Momentum
        } else {
            Direction::Resistance
        }
    }
}

/// Stress mapper settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    pub category_modifiers: BTreeMap<String, f64>,
    pub direction: DirectionPolicy,
}

impl Default for StressConfig {
    fn default() -> Self {
        let category_modifiers = [
            ("work", 1.2),
            ("relationship", 1.3),
            ("health", 1.5),
            ("finance", 1.1),
            ("personal", 1.0),
            ("family", 1.2),
            ("other", 1.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            category_modifiers,
            direction: DirectionPolicy::default(),
        }
    }
}

/// Record of how a force was computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForceAnalysis {
    pub base_impact: f64,
    pub type_multiplier: f64,
    pub category_modifier: f64,
    pub final_magnitude: f64,
    pub direction: Direction,
    pub duration: u32,
    /// Blueprint gates whose keywords occur in the event text
    pub resonant_gates: Vec<u16>,
    /// Reference entries that were missing and replaced by 1.0
    pub fallbacks: Vec<String>,
}

/// Converts events into forces
#[derive(Debug, Clone, Default)]
pub struct StressMapper {
    config: StressConfig,
}

impl StressMapper {
    pub fn new(config: StressConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    /// `min(10, severity * type multiplier * category modifier)`
    pub fn magnitude(&self, severity: f64, type_multiplier: f64, category_modifier: f64) -> f64 {
        (severity * type_multiplier * category_modifier).min(MAX_MAGNITUDE)
    }

    /// Map an event to its force and the analysis behind it
    pub fn map(
        &self,
        event: &ValidatedEvent,
        profile_type: ProfileType,
        activated_gates: &[u16],
        reference: &ReferenceTable,
    ) -> (ForceVector, ForceAnalysis) {
        let mut fallbacks = Vec::new();

        let type_multiplier = match reference.exhaustion_multiplier(profile_type) {
            Some(m) if m.is_finite() && m > 0.0 => m,
            _ => {
                warn!(profile_type = %profile_type, "no exhaustion multiplier, using neutral");
                fallbacks.push(format!("type:{}", profile_type.key()));
                NEUTRAL_MULTIPLIER
            }
        };

        let category_modifier = match self.config.category_modifiers.get(event.category.key()) {
            Some(&m) if m.is_finite() && m > 0.0 => m,
            _ => {
                warn!(category = %event.category, "unknown category, using neutral modifier");
                fallbacks.push(format!("category:{}", event.category));
                NEUTRAL_MULTIPLIER
            }
        };

        let base_impact = event.severity.as_f64();
        let final_magnitude = self.magnitude(base_impact, type_multiplier, category_modifier);
        let direction = self.config.direction.direction(final_magnitude, &event.category);
        let duration = u32::from(event.severity.value()).div_ceil(2);

        let text = event.text();
        let resonant_gates = activated_gates
            .iter()
            .copied()
            .filter(|g| reference.gate(*g).is_some_and(|gate| gate.matches(&text)))
            .collect();

        let force = ForceVector::new(final_magnitude, direction, duration)
            .with_distribution(event.category.axis_distribution());

        debug!(
            magnitude = final_magnitude,
            direction = %direction,
            duration,
            "mapped event to force"
        );

        let analysis = ForceAnalysis {
            base_impact,
            type_multiplier,
            category_modifier,
            final_magnitude,
            direction,
            duration,
            resonant_gates,
            fallbacks,
        };
        (force, analysis)
    }
}
