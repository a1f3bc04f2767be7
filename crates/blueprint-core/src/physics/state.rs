//! Vector State - a point-in-time position on the three stress axes
//!
//! A [`VectorState`] pairs the three bounded axes with the profile-derived
//! physical constants. States are never edited: every update yields a new
//! value, and persisted states are wrapped in an append-only
//! [`StateSnapshot`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BlueprintError, Result};
use crate::types::{now, Blake3Hash, BlueprintId, EventId, SnapshotId, Timestamp};

/// Resting value of every axis
pub const BASELINE: f64 = 5.0;

/// Bounds of the state axes
pub const AXIS_MIN: f64 = 0.0;
pub const AXIS_MAX: f64 = 10.0;

/// Bounds of the physical constants
pub const CONSTANT_MIN: f64 = 1.0;
pub const CONSTANT_MAX: f64 = 10.0;

/// Displacement from baseline beyond which a state is critical
const CRITICAL_DISPLACEMENT: f64 = 5.0;

/// One of the three state axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Resilience,
    Autonomy,
    Connectivity,
}

impl Axis {
    /// Fixed order, also the tie-break order for the primary stress axis
    pub const ALL: [Axis; 3] = [Axis::Resilience, Axis::Autonomy, Axis::Connectivity];

    fn index(self) -> usize {
        match self {
            Axis::Resilience => 0,
            Axis::Autonomy => 1,
            Axis::Connectivity => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::Resilience => "resilience",
            Axis::Autonomy => "autonomy",
            Axis::Connectivity => "connectivity",
        };
        f.write_str(name)
    }
}

/// Three bounded axes plus the constants that govern how they move
///
/// # Examples
///
/// ```
/// use blueprint_core::physics::state::{Axis, VectorState};
///
/// let state = VectorState::new([5.0, 2.0, 6.0], 5.0, 5.0, 5.0);
/// assert_eq!(state.primary_stress_axis(), Axis::Autonomy);
/// assert!(!state.is_critical());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorState {
    pub x_resilience: f64,
    pub y_autonomy: f64,
    pub z_connectivity: f64,
    /// Resistance to change
    pub mass: f64,
    /// Openness to force
    pub permeability: f64,
    /// Pull-to-baseline strength
    pub elasticity: f64,
}

impl VectorState {
    /// Create a state, clamping every component into its range
    pub fn new(axes: [f64; 3], mass: f64, permeability: f64, elasticity: f64) -> Self {
        Self {
            x_resilience: axes[0],
            y_autonomy: axes[1],
            z_connectivity: axes[2],
            mass,
            permeability,
            elasticity,
        }
        .clamped()
    }

    /// All axes at baseline with the given constants
    pub fn at_baseline(mass: f64, permeability: f64, elasticity: f64) -> Self {
        Self::new([BASELINE; 3], mass, permeability, elasticity)
    }

    pub fn axes(&self) -> [f64; 3] {
        [self.x_resilience, self.y_autonomy, self.z_connectivity]
    }

    pub fn axis(&self, axis: Axis) -> f64 {
        self.axes()[axis.index()]
    }

    /// Same constants, new axes (clamped)
    pub fn with_axes(&self, axes: [f64; 3]) -> Self {
        Self::new(axes, self.mass, self.permeability, self.elasticity)
    }

    /// Force every component back into range
    pub fn clamped(self) -> Self {
        let axis = |v: f64| clamp_or(v, AXIS_MIN, AXIS_MAX, BASELINE);
        let constant = |v: f64| clamp_or(v, CONSTANT_MIN, CONSTANT_MAX, CONSTANT_MIN);
        Self {
            x_resilience: axis(self.x_resilience),
            y_autonomy: axis(self.y_autonomy),
            z_connectivity: axis(self.z_connectivity),
            mass: constant(self.mass),
            permeability: constant(self.permeability),
            elasticity: constant(self.elasticity),
        }
    }

    /// Euclidean distance between the axes of two states
    pub fn distance(&self, other: &VectorState) -> f64 {
        self.axes()
            .iter()
            .zip(other.axes())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Distance from the all-baseline point
    pub fn displacement(&self) -> f64 {
        self.axes()
            .iter()
            .map(|v| (v - BASELINE).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Axis with the largest absolute deviation from baseline
    pub fn primary_stress_axis(&self) -> Axis {
        let mut primary = Axis::Resilience;
        let mut largest = (self.x_resilience - BASELINE).abs();
        for axis in [Axis::Autonomy, Axis::Connectivity] {
            let deviation = (self.axis(axis) - BASELINE).abs();
            // strict: earlier axes win ties
            if deviation > largest {
                primary = axis;
                largest = deviation;
            }
        }
        primary
    }

    /// Any axis outside [2, 8] or displacement above 5
    pub fn is_critical(&self) -> bool {
        self.axes().iter().any(|v| !(2.0..=8.0).contains(v))
            || self.displacement() > CRITICAL_DISPLACEMENT
    }
}

fn clamp_or(value: f64, min: f64, max: f64, nan_default: f64) -> f64 {
    if value.is_nan() {
        nan_default
    } else {
        value.clamp(min, max)
    }
}

/// What produced a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotSource {
    /// Derived from the Blueprint at creation
    Baseline,
    /// Result of applying an event's force
    Event { event_id: EventId },
    /// Time-only drift toward baseline
    Recovery,
}

/// Immutable, persisted VectorState chained per Blueprint by timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub id: SnapshotId,
    pub blueprint_id: BlueprintId,
    pub state: VectorState,
    pub source: SnapshotSource,
    pub recorded_at: Timestamp,
    pub integrity_hash: Blake3Hash,
}

#[derive(Serialize)]
struct HashedFields<'a> {
    blueprint_id: &'a BlueprintId,
    state: &'a VectorState,
    source: &'a SnapshotSource,
    recorded_at: &'a Timestamp,
}

impl StateSnapshot {
    pub fn new(
        blueprint_id: BlueprintId,
        state: VectorState,
        source: SnapshotSource,
        recorded_at: Timestamp,
    ) -> Result<Self> {
        let integrity_hash = Self::compute_hash(&blueprint_id, &state, &source, &recorded_at)?;
        Ok(Self {
            id: SnapshotId::new(),
            blueprint_id,
            state,
            source,
            recorded_at,
            integrity_hash,
        })
    }

    /// Baseline snapshot recorded now
    pub fn baseline(blueprint_id: BlueprintId, state: VectorState) -> Result<Self> {
        Self::new(blueprint_id, state, SnapshotSource::Baseline, now())
    }

    fn compute_hash(
        blueprint_id: &BlueprintId,
        state: &VectorState,
        source: &SnapshotSource,
        recorded_at: &Timestamp,
    ) -> Result<Blake3Hash> {
        let bytes = serde_json::to_vec(&HashedFields {
            blueprint_id,
            state,
            source,
            recorded_at,
        })?;
        Ok(Blake3Hash::digest(&bytes))
    }

    /// Recompute the hash and compare it with the stored one
    pub fn verify_integrity(&self) -> Result<()> {
        let actual = Self::compute_hash(
            &self.blueprint_id,
            &self.state,
            &self.source,
            &self.recorded_at,
        )?;
        if actual != self.integrity_hash {
            return Err(BlueprintError::StateInvariant(format!(
                "snapshot {} integrity mismatch: expected {}, found {}",
                self.id,
                self.integrity_hash.to_hex(),
                actual.to_hex()
            )));
        }
        Ok(())
    }
}
