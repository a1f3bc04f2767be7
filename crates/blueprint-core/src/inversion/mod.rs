//! Inversion Guidance - turning a stress reading into something to try
//!
//! Deterministic selection lives in [`engine`]; [`enrichment`] may
//! rephrase the result but can never make it worse than the
//! deterministic text.

pub mod engine;
pub mod enrichment;
pub mod fallback;
pub mod script;

pub use engine::{GuidanceRequest, InversionConfig, InversionEngine};
pub use enrichment::{
    enrich_with_timeout, EnrichmentConfig, EnrichmentContext, HttpEnricher, TextEnricher,
};
pub use script::{
    CommunicationStyle, ExperimentType, GuidancePreferences, InversionScript, ScriptSource,
};
