//! SEDA protocol - lifecycle object for one crisis episode

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BlueprintError, Result};
use crate::event::EventCategory;
use crate::types::{BlueprintId, EventId, ProtocolId, Timestamp};

/// Highest crisis level
pub const MAX_LEVEL: u8 = 4;

/// Protocol status
///
/// ```text
///            re-trigger
///   ┌──────────────────────────────┐
///   v                              │
/// Active ──calm──> Stabilizing ──blocked──> Monitoring
///   │                  │                       │
///   │ (level <= 1)     │ eligible              │ eligible
///   └──────────────> Resolved <────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SedaStatus {
    Monitoring,
    Active,
    Stabilizing,
    Resolved,
}

impl SedaStatus {
    pub fn can_transition_to(self, next: SedaStatus) -> bool {
        use SedaStatus::*;
        match (self, next) {
            (Resolved, _) => false,
            (Active, Active) => true,
            (Active, Stabilizing) | (Active, Resolved) => true,
            (Stabilizing, Monitoring) | (Stabilizing, Resolved) | (Stabilizing, Active) => true,
            (Monitoring, Monitoring) | (Monitoring, Resolved) | (Monitoring, Active) => true,
            _ => false,
        }
    }

    pub fn is_open(self) -> bool {
        self != SedaStatus::Resolved
    }
}

impl fmt::Display for SedaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SedaStatus::Monitoring => "monitoring",
            SedaStatus::Active => "active",
            SedaStatus::Stabilizing => "stabilizing",
            SedaStatus::Resolved => "resolved",
        };
        f.write_str(s)
    }
}

/// How often the user should be checked on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInCadence {
    Daily,
    TwiceDaily,
    EveryFourToSixHours,
    EveryTwoToFourHours,
}

impl CheckInCadence {
    pub fn for_level(level: u8) -> Self {
        match level {
            0 | 1 => CheckInCadence::Daily,
            2 => CheckInCadence::TwiceDaily,
            3 => CheckInCadence::EveryFourToSixHours,
            _ => CheckInCadence::EveryTwoToFourHours,
        }
    }

    /// Longest gap allowed between check-ins
    pub fn max_interval_hours(self) -> u32 {
        match self {
            CheckInCadence::Daily => 24,
            CheckInCadence::TwiceDaily => 12,
            CheckInCadence::EveryFourToSixHours => 6,
            CheckInCadence::EveryTwoToFourHours => 4,
        }
    }
}

impl fmt::Display for CheckInCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckInCadence::Daily => "daily",
            CheckInCadence::TwiceDaily => "twice daily",
            CheckInCadence::EveryFourToSixHours => "every 4-6 hours",
            CheckInCadence::EveryTwoToFourHours => "every 2-4 hours",
        };
        f.write_str(s)
    }
}

/// Human label of a level
pub fn level_label(level: u8) -> &'static str {
    match level {
        0 => "none",
        1 => "elevated",
        2 => "high",
        3 => "severe",
        _ => "critical",
    }
}

/// The event condition that (re)triggered a protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerCondition {
    pub event_id: EventId,
    pub magnitude: f64,
    pub category: EventCategory,
    pub level: u8,
    pub health_bumped: bool,
    pub at: Timestamp,
}

/// One recorded status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: SedaStatus,
    pub to: SedaStatus,
    pub level: u8,
    pub at: Timestamp,
    pub reason: String,
}

/// A crisis episode; never deleted, only moved to `resolved`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SedaProtocol {
    pub id: ProtocolId,
    pub blueprint_id: BlueprintId,
    /// 0 = none, 4 = critical
    pub level: u8,
    pub status: SedaStatus,
    pub triggers: Vec<TriggerCondition>,
    pub immediate_actions: Vec<String>,
    pub stabilization: String,
    pub escalation_criteria: Vec<String>,
    pub de_escalation_criteria: Vec<String>,
    pub check_in: CheckInCadence,
    pub opened_at: Timestamp,
    pub updated_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    pub transitions: Vec<StatusTransition>,
}

impl SedaProtocol {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Move to `to`, refusing illegal transitions
    pub fn transition(&mut self, to: SedaStatus, at: Timestamp, reason: impl Into<String>) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(BlueprintError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.transitions.push(StatusTransition {
            from: self.status,
            to,
            level: self.level,
            at,
            reason: reason.into(),
        });
        self.status = to;
        self.updated_at = at;
        if to == SedaStatus::Resolved {
            self.resolved_at = Some(at);
        }
        Ok(())
    }

    /// Fixed guidance text shown instead of personalized guidance
    pub fn display_text(&self) -> String {
        let mut text = format!(
            "SEDA protocol {} (level {}: {}). Set everything else aside and stabilize first.",
            self.status,
            self.level,
            level_label(self.level)
        );
        for (i, action) in self.immediate_actions.iter().enumerate() {
            text.push_str(&format!(" {}. {}.", i + 1, action.trim_end_matches('.')));
        }
        text.push_str(&format!(" Check in {}.", self.check_in));
        text
    }
}
