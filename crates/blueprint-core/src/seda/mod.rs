//! SEDA - crisis detection and escalation
//!
//! Every event's force is evaluated against fixed magnitude bands:
//!
//! | magnitude    | level |
//! |--------------|-------|
//! | < 7          | 0     |
//! | [7, 7.5)     | 1     |
//! | [7.5, 8.5)   | 2     |
//! | [8.5, 9.5)   | 3     |
//! | >= 9.5       | 4     |
//!
//! Health events below level 3 are bumped one level. Any level of 1 or
//! more opens a protocol, or escalates the Blueprint's open one.

pub mod monitor;
pub mod protocol;

pub use monitor::{magnitude_level, CrisisMonitor, DeEscalationDecision, SedaConfig, TriggerEvaluation};
pub use protocol::{
    level_label, CheckInCadence, SedaProtocol, SedaStatus, StatusTransition, TriggerCondition,
    MAX_LEVEL,
};
