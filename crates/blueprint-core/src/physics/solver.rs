//! Vector State Solver - single damped-spring step
//!
//! First-order by construction: no velocity is carried between events, each
//! update sees only the immediately preceding state.
//!
//! ```text
//! effective = component * permeability / mass
//! raw       = axis + effective * duration
//! next      = raw + (BASELINE - raw) * elasticity * impulse_coefficient
//! ```

use serde::{Deserialize, Serialize};

use super::force::ForceVector;
use super::state::{VectorState, BASELINE};

/// Solver coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Elastic pull per unit elasticity after an event
    pub impulse_coefficient: f64,
    /// Elastic pull per unit elasticity per elapsed time unit without events
    pub recovery_coefficient: f64,
    /// Step duration when the caller gives none
    pub default_duration: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            impulse_coefficient: 0.1,
            recovery_coefficient: 0.05,
            default_duration: 1.0,
        }
    }
}

/// Applies forces and natural recovery to states
#[derive(Debug, Clone, Default)]
pub struct VectorStateSolver {
    config: SolverConfig,
}

impl VectorStateSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Apply a force for `duration` time units (default from config)
    pub fn apply(&self, state: &VectorState, force: &ForceVector, duration: Option<f64>) -> VectorState {
        let duration = duration.unwrap_or(self.config.default_duration).max(0.0);
        let ratio = state.permeability / state.mass;
        let pull = pull_factor(state.elasticity * self.config.impulse_coefficient);

        let axes = state.axes();
        let components = force.components();
        let mut next = [0.0; 3];
        for i in 0..3 {
            let effective = components[i] * ratio;
            let raw = axes[i] + effective * duration;
            next[i] = raw + (BASELINE - raw) * pull;
        }
        state.with_axes(next)
    }

    /// Drift toward baseline over `elapsed` time units with no force
    pub fn recover(&self, state: &VectorState, elapsed: f64) -> VectorState {
        let pull = pull_factor(state.elasticity * self.config.recovery_coefficient * elapsed.max(0.0));
        state.with_axes(state.axes().map(|v| v + (BASELINE - v) * pull))
    }
}

/// A pull above 1 would overshoot baseline
fn pull_factor(raw: f64) -> f64 {
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::force::{AxisDistribution, Direction};
    use proptest::prelude::*;

    fn state(axes: [f64; 3]) -> VectorState {
        VectorState::new(axes, 5.0, 5.0, 5.0)
    }

    #[test]
    fn test_resistance_lowers_axes() {
        let solver = VectorStateSolver::default();
        let force = ForceVector::new(3.0, Direction::Resistance, 2);
        let next = solver.apply(&state([5.0; 3]), &force, None);

        // -1 per axis, then half of the gap pulled back
        for v in next.axes() {
            assert!((v - 4.5).abs() < 1e-12, "got {v}");
        }
        assert_eq!(next.mass, 5.0);
    }

    #[test]
    fn test_fragile_profile_moves_further() {
        let solver = VectorStateSolver::default();
        let force = ForceVector::new(4.0, Direction::Resistance, 2)
            .with_distribution(AxisDistribution::new(1.0, 0.0, 0.0));

        let sturdy = VectorState::new([5.0; 3], 9.0, 5.5, 5.0);
        let fragile = VectorState::new([5.0; 3], 5.0, 9.5, 5.0);

        let sturdy_next = solver.apply(&sturdy, &force, None);
        let fragile_next = solver.apply(&fragile, &force, None);
        assert!(fragile_next.x_resilience < sturdy_next.x_resilience);
    }

    #[test]
    fn test_explicit_duration_scales_force() {
        let solver = VectorStateSolver::default();
        let force = ForceVector::new(1.0, Direction::Momentum, 1);
        let short = solver.apply(&state([5.0; 3]), &force, Some(1.0));
        let long = solver.apply(&state([5.0; 3]), &force, Some(3.0));
        assert!(long.x_resilience > short.x_resilience);
    }

    #[test]
    fn test_recovery_drifts_to_baseline() {
        let solver = VectorStateSolver::default();
        let start = state([2.0, 8.0, 5.0]);
        let after = solver.recover(&start, 2.0);

        // elasticity 5 * 0.05 * 2 = 0.5
        assert_eq!(after.axes(), [3.5, 6.5, 5.0]);
        assert_eq!(solver.recover(&start, 0.0), start);
        // long gaps land on baseline, never past it
        assert_eq!(solver.recover(&start, 100.0).axes(), [5.0; 3]);
    }

    proptest! {
        #[test]
        fn prop_update_respects_bounds(
            axes in prop::array::uniform3(0.0f64..=10.0),
            mass in 1.0f64..=10.0,
            permeability in 1.0f64..=10.0,
            elasticity in 1.0f64..=10.0,
            magnitude in 0.0f64..=10.0,
            momentum in any::<bool>(),
            duration in 0.0f64..=5.0,
        ) {
            let solver = VectorStateSolver::default();
            let direction = if momentum { Direction::Momentum } else { Direction::Resistance };
            let start = VectorState::new(axes, mass, permeability, elasticity);
            let next = solver.apply(&start, &ForceVector::new(magnitude, direction, 1), Some(duration));

            for v in next.axes() {
                prop_assert!((0.0..=10.0).contains(&v));
            }
            for c in [next.mass, next.permeability, next.elasticity] {
                prop_assert!((1.0..=10.0).contains(&c));
            }
        }

        #[test]
        fn prop_zero_force_never_moves_away_from_baseline(
            axes in prop::array::uniform3(0.0f64..=10.0),
            elasticity in 1.0f64..=10.0,
        ) {
            let solver = VectorStateSolver::default();
            let start = VectorState::new(axes, 5.0, 5.0, elasticity);
            let next = solver.apply(&start, &ForceVector::zero(), None);

            for (before, after) in start.axes().iter().zip(next.axes()) {
                prop_assert!((after - BASELINE).abs() <= (before - BASELINE).abs() + 1e-12);
            }
        }
    }
}
