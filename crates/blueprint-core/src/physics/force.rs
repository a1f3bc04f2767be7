//! Force Vector - the push an event applies to a state
//!
//! Ephemeral: produced by the stress mapper, consumed immediately by the
//! solver, recorded only as part of an event's force analysis.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a force builds the person up or wears them down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Momentum,
    Resistance,
}

impl Direction {
    /// +1 for momentum, -1 for resistance
    pub fn sign(self) -> f64 {
        match self {
            Direction::Momentum => 1.0,
            Direction::Resistance => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Momentum => f.write_str("momentum"),
            Direction::Resistance => f.write_str("resistance"),
        }
    }
}

/// Share of a force landing on each axis; weights sum to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisDistribution {
    pub resilience: f64,
    pub autonomy: f64,
    pub connectivity: f64,
}

impl AxisDistribution {
    /// Normalize arbitrary non-negative weights; all-zero becomes even
    pub fn new(resilience: f64, autonomy: f64, connectivity: f64) -> Self {
        let weights = [resilience, autonomy, connectivity].map(|w| w.max(0.0));
        let total: f64 = weights.iter().sum();
        if total <= f64::EPSILON {
            return Self::even();
        }
        Self {
            resilience: weights[0] / total,
            autonomy: weights[1] / total,
            connectivity: weights[2] / total,
        }
    }

    pub fn even() -> Self {
        Self {
            resilience: 1.0 / 3.0,
            autonomy: 1.0 / 3.0,
            connectivity: 1.0 / 3.0,
        }
    }

    pub fn weights(&self) -> [f64; 3] {
        [self.resilience, self.autonomy, self.connectivity]
    }
}

/// A directional, bounded magnitude computed from an event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForceVector {
    /// Typically within [0, 10]
    pub magnitude: f64,
    pub direction: Direction,
    /// Estimated days of effect
    pub duration: u32,
    pub distribution: AxisDistribution,
}

impl ForceVector {
    pub fn new(magnitude: f64, direction: Direction, duration: u32) -> Self {
        Self {
            magnitude: magnitude.max(0.0),
            direction,
            duration: duration.max(1),
            distribution: AxisDistribution::even(),
        }
    }

    pub fn with_distribution(mut self, distribution: AxisDistribution) -> Self {
        self.distribution = distribution;
        self
    }

    /// No push at all
    pub fn zero() -> Self {
        Self::new(0.0, Direction::Resistance, 1)
    }

    /// Signed per-axis components
    pub fn components(&self) -> [f64; 3] {
        let signed = self.magnitude * self.direction.sign();
        self.distribution.weights().map(|w| w * signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_normalizes() {
        let d = AxisDistribution::new(2.0, 1.0, 1.0);
        assert!((d.weights().iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(d.resilience, 0.5);

        assert_eq!(AxisDistribution::new(0.0, 0.0, 0.0), AxisDistribution::even());
    }

    #[test]
    fn test_components_follow_direction() {
        let push = ForceVector::new(6.0, Direction::Momentum, 2)
            .with_distribution(AxisDistribution::new(1.0, 1.0, 0.0));
        assert_eq!(push.components(), [3.0, 3.0, 0.0]);

        let drag = ForceVector::new(6.0, Direction::Resistance, 2)
            .with_distribution(AxisDistribution::new(1.0, 1.0, 0.0));
        assert_eq!(drag.components(), [-3.0, -3.0, 0.0]);
    }

    #[test]
    fn test_zero_force_has_no_components() {
        assert_eq!(ForceVector::zero().components(), [0.0, 0.0, 0.0]);
    }
}
