//! Physics layer - states, forces and the damped-spring solver
//!
//! ```text
//!   ForceVector ──┐
//!                 v
//!   VectorState ──> VectorStateSolver::apply() ──> next VectorState
//!                 │
//!                 └─> VectorStateSolver::recover() (time only, no force)
//! ```
//!
//! States are values: the solver never mutates its input, and persisted
//! states are append-only [`StateSnapshot`]s.

pub mod force;
pub mod solver;
pub mod state;

pub use force::{AxisDistribution, Direction, ForceVector};
pub use solver::{SolverConfig, VectorStateSolver};
pub use state::{Axis, SnapshotSource, StateSnapshot, VectorState, BASELINE};
