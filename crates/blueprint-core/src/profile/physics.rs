//! Profile Physics Deriver
//!
//! Static constants and the baseline state for a Blueprint. Pure and total
//! over the enumerated profile types.

use super::blueprint::{Blueprint, Center};
use crate::physics::state::{VectorState, BASELINE};

/// Axis bonus per defined anchor center
const CENTER_BONUS: f64 = 2.0;

/// Constant step per defined (or undefined) center
const CENTER_STEP: f64 = 0.5;

/// Number of centers
const CENTER_COUNT: usize = 9;

/// Baseline state of a Blueprint
///
/// ```text
/// x = 5 + 2*[root]   + 2*[spleen]
/// y = 5 + 2*[g]      + 2*[sacral]
/// z = 5 + 2*[throat] + 2*[solar plexus]
/// mass         = 5 + 0.5 * defined
/// permeability = 5 + 0.5 * (9 - defined)
/// elasticity   = per-type table
/// ```
pub fn derive_baseline(blueprint: &Blueprint) -> VectorState {
    let bonus = |center: Center| if blueprint.is_defined(center) { CENTER_BONUS } else { 0.0 };
    let defined = blueprint.defined_count().min(CENTER_COUNT) as f64;

    VectorState::new(
        [
            BASELINE + bonus(Center::Root) + bonus(Center::Spleen),
            BASELINE + bonus(Center::G) + bonus(Center::Sacral),
            BASELINE + bonus(Center::Throat) + bonus(Center::SolarPlexus),
        ],
        5.0 + CENTER_STEP * defined,
        5.0 + CENTER_STEP * (CENTER_COUNT as f64 - defined),
        blueprint.profile_type.elasticity(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::blueprint::ProfileType;
    use crate::types::UserId;

    #[test]
    fn test_undefined_reflector_sits_at_baseline() {
        let blueprint = Blueprint::builder(UserId::new("u"), ProfileType::Reflector)
            .build()
            .unwrap();
        let state = derive_baseline(&blueprint);

        assert_eq!(state.axes(), [5.0, 5.0, 5.0]);
        assert_eq!(state.elasticity, 4.0);
        assert_eq!(state.mass, 5.0);
        assert_eq!(state.permeability, 9.5);
    }

    #[test]
    fn test_defined_centers_raise_axes() {
        // 34-20 defines sacral + throat, 18-58 defines spleen + root
        let blueprint = Blueprint::builder(UserId::new("u"), ProfileType::Generator)
            .gates([34, 20, 18, 58])
            .build()
            .unwrap();
        let state = derive_baseline(&blueprint);

        assert_eq!(state.x_resilience, 9.0);
        assert_eq!(state.y_autonomy, 7.0);
        assert_eq!(state.z_connectivity, 7.0);
        assert_eq!(state.mass, 7.0);
        assert_eq!(state.permeability, 7.5);
        assert_eq!(state.elasticity, 8.0);
    }

    #[test]
    fn test_fully_defined_clamps_axes() {
        let mut builder = Blueprint::builder(UserId::new("u"), ProfileType::Manifestor);
        for center in Center::ALL {
            builder = builder.defined_center(center);
        }
        let state = derive_baseline(&builder.build().unwrap());

        assert_eq!(state.axes(), [9.0, 9.0, 9.0]);
        assert_eq!(state.mass, 9.5);
        assert_eq!(state.permeability, 5.0);
    }
}
