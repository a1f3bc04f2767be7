//! Blueprint Core - the event-to-state pipeline
//!
//! Tracks a user's psychological state as a bounded three-axis vector that
//! starts from a static profile (the Blueprint) and is pushed around by
//! logged life events.
//!
//! # Architecture
//!
//! Leaf-first:
//!
//! 1. **Profile Physics** (`profile`): constants and baseline state from a Blueprint
//! 2. **Stress Mapper** (`stress`): event + profile -> force vector
//! 3. **Vector State Solver** (`physics`): one damped-spring step per force
//! 4. **Crisis Monitor** (`seda`): opens, escalates and resolves SEDA protocols
//! 5. **Inversion Engine** (`inversion`): deterministic guidance, optional enrichment
//! 6. **Pipeline** (`pipeline`): sequences the above per event under a per-Blueprint lock
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use blueprint_core::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> blueprint_core::Result<()> {
//! let pipeline = PipelineOrchestrator::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(ReferenceTable::builtin()?),
//!     EngineConfig::default(),
//! );
//!
//! let owner = UserId::new("user-1");
//! let blueprint = Blueprint::builder(owner.clone(), ProfileType::Generator)
//!     .gates([34, 20])
//!     .build()?;
//! pipeline.register_blueprint(&blueprint).await?;
//!
//! let outcome = pipeline
//!     .process_event(
//!         &owner,
//!         blueprint.id,
//!         EventInput::new("Deadline moved up", "boss wants it Friday", 5, "work"),
//!         &GuidancePreferences::default(),
//!     )
//!     .await?;
//!
//! assert!(!outcome.script.script.is_empty());
//! assert!(outcome.seda_protocol.is_none());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, clippy::all)]

pub mod config;
pub mod entitlement;
pub mod error;
pub mod event;
pub mod inversion;
pub mod physics;
pub mod pipeline;
pub mod profile;
pub mod reference;
pub mod seda;
pub mod severity;
pub mod store;
pub mod stress;
pub mod types;

pub use config::EngineConfig;
pub use error::{BlueprintError, Result, ResultExt, ValidationError};
pub use pipeline::{DeEscalationOutcome, EventOutcome, PipelineOrchestrator};

/// Commonly used items
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::entitlement::{Entitlement, EntitlementGate, QuotaEntitlements, Unlimited};
    pub use crate::error::{BlueprintError, Result, ValidationError};
    pub use crate::event::{EventCategory, EventInput, EventRecord};
    pub use crate::inversion::{
        CommunicationStyle, ExperimentType, GuidancePreferences, InversionScript, ScriptSource,
        TextEnricher,
    };
    pub use crate::physics::{Axis, StateSnapshot, VectorState};
    pub use crate::pipeline::{EventOutcome, PipelineOrchestrator};
    pub use crate::profile::{Authority, Blueprint, Center, ProfileType};
    pub use crate::reference::ReferenceTable;
    pub use crate::seda::{SedaProtocol, SedaStatus};
    pub use crate::severity::{Severity, SeverityBand};
    pub use crate::store::{BlueprintStore, InMemoryStore, SqliteStore};
    pub use crate::types::{BlueprintId, UserId};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
