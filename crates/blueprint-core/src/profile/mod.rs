//! Profile layer - the Blueprint and the physics it implies
//!
//! - [`blueprint`]: the immutable profile, its channels and definition
//! - [`physics`]: the Profile Physics Deriver (constants + baseline state)

pub mod blueprint;
pub mod physics;

pub use blueprint::{
    Authority, Blueprint, BlueprintBuilder, BlueprintMetadata, Center, Channel, Definition,
    ProfileLines, ProfileType,
};
pub use physics::derive_baseline;
