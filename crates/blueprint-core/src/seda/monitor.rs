//! Crisis Threshold Monitor
//!
//! Decides whether an event opens, escalates or calms a SEDA protocol, and
//! materializes the actions each level requires. At most one protocol per
//! Blueprint is open at a time: re-triggers escalate the open one.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::protocol::{
    CheckInCadence, SedaProtocol, SedaStatus, TriggerCondition, MAX_LEVEL,
};
use crate::error::Result;
use crate::event::EventCategory;
use crate::profile::ProfileType;
use crate::severity::Severity;
use crate::types::{BlueprintId, ProtocolId, Timestamp};

/// Monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SedaConfig {
    /// Trailing window in which a severe event blocks de-escalation
    pub de_escalation_window_hours: i64,
    /// Events at or above this severity count as severe
    pub severe_severity: u8,
}

impl Default for SedaConfig {
    fn default() -> Self {
        Self {
            de_escalation_window_hours: 48,
            severe_severity: 7,
        }
    }
}

/// Result of evaluating one force against the thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvaluation {
    pub magnitude: f64,
    pub category: EventCategory,
    /// Level from magnitude alone
    pub magnitude_level: u8,
    /// Level after the health bump
    pub level: u8,
    pub health_bumped: bool,
}

impl TriggerEvaluation {
    pub fn triggered(&self) -> bool {
        self.level >= 1
    }
}

/// Whether a protocol may move toward `resolved`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeEscalationDecision {
    pub eligible: bool,
    pub reason: Option<String>,
}

impl DeEscalationDecision {
    fn allowed() -> Self {
        Self {
            eligible: true,
            reason: None,
        }
    }

    fn blocked(reason: impl Into<String>) -> Self {
        Self {
            eligible: false,
            reason: Some(reason.into()),
        }
    }
}

/// Level from force magnitude alone
pub fn magnitude_level(magnitude: f64) -> u8 {
    match magnitude {
        m if m >= 9.5 => 4,
        m if m >= 8.5 => 3,
        m if m >= 7.5 => 2,
        m if m >= 7.0 => 1,
        _ => 0,
    }
}

/// Crisis threshold monitor
#[derive(Debug, Clone, Default)]
pub struct CrisisMonitor {
    config: SedaConfig,
}

impl CrisisMonitor {
    pub fn new(config: SedaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SedaConfig {
        &self.config
    }

    /// Level for a force; health events below 3 are bumped by one, so even
    /// a sub-threshold health event opens a level 1 protocol
    pub fn evaluate(&self, magnitude: f64, category: &EventCategory) -> TriggerEvaluation {
        let base = magnitude_level(magnitude);
        let health_bumped = *category == EventCategory::Health && base < 3;
        let level = if health_bumped {
            (base + 1).min(MAX_LEVEL)
        } else {
            base
        };
        TriggerEvaluation {
            magnitude,
            category: category.clone(),
            magnitude_level: base,
            level,
            health_bumped,
        }
    }

    /// Open a new protocol in `active` status
    pub fn activate(
        &self,
        blueprint_id: BlueprintId,
        profile_type: ProfileType,
        trigger: TriggerCondition,
    ) -> SedaProtocol {
        let level = trigger.level.clamp(1, MAX_LEVEL);
        let at = trigger.at;
        info!(%blueprint_id, level, "opening SEDA protocol");

        SedaProtocol {
            id: ProtocolId::new(),
            blueprint_id,
            level,
            status: SedaStatus::Active,
            triggers: vec![trigger],
            immediate_actions: immediate_actions(level),
            stabilization: stabilization_narrative(profile_type, level),
            escalation_criteria: escalation_criteria(),
            de_escalation_criteria: self.de_escalation_criteria(),
            check_in: CheckInCadence::for_level(level),
            opened_at: at,
            updated_at: at,
            resolved_at: None,
            transitions: Vec::new(),
        }
    }

    /// Re-trigger an open protocol: `level = min(4, max(current + 1, evaluated))`
    pub fn escalate(
        &self,
        protocol: &mut SedaProtocol,
        profile_type: ProfileType,
        trigger: TriggerCondition,
    ) -> Result<()> {
        let level = (protocol.level + 1).max(trigger.level).min(MAX_LEVEL);
        let at = trigger.at;
        let reason = format!(
            "re-triggered at magnitude {:.1}, level {} -> {}",
            trigger.magnitude, protocol.level, level
        );
        protocol.transition(SedaStatus::Active, at, reason)?;
        info!(protocol = %protocol.id, from = protocol.level, to = level, "escalating SEDA protocol");

        protocol.level = level;
        protocol.triggers.push(trigger);
        self.refresh_materials(protocol, profile_type);
        Ok(())
    }

    /// Active -> stabilizing, one level down (floor 1)
    pub fn stabilize(&self, protocol: &mut SedaProtocol, profile_type: ProfileType, at: Timestamp) -> Result<()> {
        protocol.transition(SedaStatus::Stabilizing, at, "calm event after activation")?;
        protocol.level = protocol.level.saturating_sub(1).max(1);
        self.refresh_materials(protocol, profile_type);
        Ok(())
    }

    /// Level <= 1 or already stabilizing, and no severe event in the window
    pub fn check_de_escalation(
        &self,
        protocol: &SedaProtocol,
        recent: impl IntoIterator<Item = (Severity, Timestamp)>,
        now: Timestamp,
    ) -> DeEscalationDecision {
        if !protocol.is_open() {
            return DeEscalationDecision::blocked("protocol is already resolved");
        }
        if protocol.level > 1 && protocol.status != SedaStatus::Stabilizing {
            return DeEscalationDecision::blocked(format!(
                "level {} is above 1 and the protocol is {}, not stabilizing",
                protocol.level, protocol.status
            ));
        }

        let window_start = now - Duration::hours(self.config.de_escalation_window_hours);
        let severe = recent
            .into_iter()
            .filter(|(s, at)| s.value() >= self.config.severe_severity && *at >= window_start)
            .max_by_key(|(_, at)| *at);
        if let Some((severity, at)) = severe {
            return DeEscalationDecision::blocked(format!(
                "severity {} event at {} is within the last {} hours",
                severity,
                at.to_rfc3339(),
                self.config.de_escalation_window_hours
            ));
        }
        DeEscalationDecision::allowed()
    }

    /// Resolve if eligible; otherwise leave the protocol untouched
    pub fn try_resolve(
        &self,
        protocol: &mut SedaProtocol,
        recent: impl IntoIterator<Item = (Severity, Timestamp)>,
        now: Timestamp,
    ) -> Result<DeEscalationDecision> {
        let decision = self.check_de_escalation(protocol, recent, now);
        if decision.eligible {
            protocol.transition(SedaStatus::Resolved, now, "de-escalation criteria met")?;
            protocol.level = 0;
            info!(protocol = %protocol.id, "SEDA protocol resolved");
        } else if let Some(reason) = &decision.reason {
            warn!(protocol = %protocol.id, %reason, "de-escalation blocked");
        }
        Ok(decision)
    }

    /// Move an open protocol one step toward resolution after a calm event
    pub fn review_calm(
        &self,
        protocol: &mut SedaProtocol,
        profile_type: ProfileType,
        recent: impl IntoIterator<Item = (Severity, Timestamp)>,
        now: Timestamp,
    ) -> Result<DeEscalationDecision> {
        match protocol.status {
            SedaStatus::Active => {
                self.stabilize(protocol, profile_type, now)?;
                Ok(DeEscalationDecision::blocked("stabilizing after activation"))
            }
            SedaStatus::Stabilizing | SedaStatus::Monitoring => {
                let decision = self.try_resolve(protocol, recent, now)?;
                if !decision.eligible {
                    let reason = decision.reason.clone().unwrap_or_default();
                    protocol.transition(SedaStatus::Monitoring, now, reason)?;
                    protocol.level = protocol.level.saturating_sub(1).max(1);
                    self.refresh_materials(protocol, profile_type);
                }
                Ok(decision)
            }
            SedaStatus::Resolved => Ok(DeEscalationDecision::blocked("protocol is already resolved")),
        }
    }

    fn refresh_materials(&self, protocol: &mut SedaProtocol, profile_type: ProfileType) {
        protocol.immediate_actions = immediate_actions(protocol.level);
        protocol.stabilization = stabilization_narrative(profile_type, protocol.level);
        protocol.check_in = CheckInCadence::for_level(protocol.level);
    }

    fn de_escalation_criteria(&self) -> Vec<String> {
        vec![
            format!(
                "No event of severity {} or higher in the last {} hours",
                self.config.severe_severity, self.config.de_escalation_window_hours
            ),
            "Protocol level at 1, or the protocol is already stabilizing".to_string(),
            "Check-ins kept at the required cadence".to_string(),
        ]
    }
}

fn immediate_actions(level: u8) -> Vec<String> {
    let actions: &[&str] = match level {
        0 | 1 => &[
            "Pause and take three slow breaths before responding to anything else",
            "Write down what happened in two sentences",
            "Reduce today's commitments to the essentials",
        ],
        2 => &[
            "Tell one trusted person what is going on today",
            "Avoid major decisions for the next 24 hours",
            "Eat, hydrate and rest before anything else",
            "Write down what happened in two sentences",
        ],
        3 => &[
            "Contact a trusted person now and stay in touch through the day",
            "Remove yourself from the source of stress if you safely can",
            "Cancel non-essential obligations for the next 48 hours",
            "Book a conversation with a counselor, therapist or doctor",
        ],
        _ => &[
            "If you are in danger or thinking about harming yourself, call your local emergency number now",
            "Contact a crisis line (988 in the US, 116 123 in the UK and EU) or a mental health professional",
            "Do not stay alone: ask someone to be with you",
            "Put distance between yourself and anything you could use to hurt yourself",
        ],
    };
    actions.iter().map(|a| a.to_string()).collect()
}

fn stabilization_narrative(profile_type: ProfileType, level: u8) -> String {
    let anchor = match profile_type {
        ProfileType::Generator | ProfileType::ManifestingGenerator => {
            "stop pushing and let your body's yes and no decide the next small step"
        }
        ProfileType::Projector => "withdraw from demands and rest until someone invites you back in",
        ProfileType::Manifestor => "tell the people around you what you need, then take space to cool down",
        ProfileType::Reflector => "find an environment that feels safe and give yourself time before deciding anything",
    };
    format!(
        "As a {profile_type}, stabilizing at level {level} means you {anchor}. Nothing needs to be solved today."
    )
}

fn escalation_criteria() -> Vec<String> {
    vec![
        "Another event reaching force magnitude 7 or more".to_string(),
        "A health event of any severity that triggers the monitor".to_string(),
        "Thoughts of self-harm or feeling unsafe: go straight to level 4 actions".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{now, EventId};

    fn trigger(eval: &TriggerEvaluation, at: Timestamp) -> TriggerCondition {
        TriggerCondition {
            event_id: EventId::new(),
            magnitude: eval.magnitude,
            category: eval.category.clone(),
            level: eval.level,
            health_bumped: eval.health_bumped,
            at,
        }
    }

    fn severity(v: i64) -> Severity {
        Severity::new(v).unwrap()
    }

    #[test]
    fn test_magnitude_levels() {
        assert_eq!(magnitude_level(6.99), 0);
        assert_eq!(magnitude_level(7.0), 1);
        assert_eq!(magnitude_level(7.49), 1);
        assert_eq!(magnitude_level(7.5), 2);
        assert_eq!(magnitude_level(8.5), 3);
        assert_eq!(magnitude_level(9.49), 3);
        assert_eq!(magnitude_level(9.5), 4);
        assert_eq!(magnitude_level(10.0), 4);
    }

    #[test]
    fn test_health_bump() {
        let monitor = CrisisMonitor::default();

        let eval = monitor.evaluate(7.6, &EventCategory::Health);
        assert_eq!(eval.level, 3);
        assert!(eval.health_bumped);

        // below threshold still triggers for health
        let eval = monitor.evaluate(5.0, &EventCategory::Health);
        assert_eq!(eval.level, 1);
        assert!(eval.triggered());

        // level 3 is not bumped
        let eval = monitor.evaluate(9.0, &EventCategory::Health);
        assert_eq!(eval.level, 3);
        assert!(!eval.health_bumped);

        let eval = monitor.evaluate(10.0, &EventCategory::Health);
        assert_eq!(eval.level, 4);

        let eval = monitor.evaluate(5.0, &EventCategory::Work);
        assert!(!eval.triggered());
    }

    #[test]
    fn test_activation_materials_by_level() {
        let monitor = CrisisMonitor::default();
        let t = now();

        let mild = monitor.activate(
            BlueprintId::new(),
            ProfileType::Projector,
            trigger(&monitor.evaluate(7.2, &EventCategory::Work), t),
        );
        assert_eq!(mild.level, 1);
        assert_eq!(mild.status, SedaStatus::Active);
        assert_eq!(mild.check_in, CheckInCadence::Daily);
        assert!(mild.stabilization.contains("Projector"));

        let critical = monitor.activate(
            BlueprintId::new(),
            ProfileType::Generator,
            trigger(&monitor.evaluate(10.0, &EventCategory::Finance), t),
        );
        assert_eq!(critical.level, 4);
        assert_eq!(critical.check_in, CheckInCadence::EveryTwoToFourHours);
        assert!(critical
            .immediate_actions
            .iter()
            .any(|a| a.contains("emergency")));
        assert!(critical.display_text().contains("level 4"));
    }

    #[test]
    fn test_retrigger_escalates() {
        let monitor = CrisisMonitor::default();
        let t = now();
        let eval = monitor.evaluate(7.2, &EventCategory::Work);
        let mut protocol = monitor.activate(BlueprintId::new(), ProfileType::Generator, trigger(&eval, t));

        monitor
            .escalate(&mut protocol, ProfileType::Generator, trigger(&eval, t))
            .unwrap();
        assert_eq!(protocol.level, 2);
        assert_eq!(protocol.triggers.len(), 2);

        let big = monitor.evaluate(10.0, &EventCategory::Work);
        monitor
            .escalate(&mut protocol, ProfileType::Generator, trigger(&big, t))
            .unwrap();
        assert_eq!(protocol.level, 4);
        assert_eq!(protocol.check_in, CheckInCadence::EveryTwoToFourHours);
    }

    #[test]
    fn test_de_escalation_blocked_by_recent_severe_event() {
        let monitor = CrisisMonitor::default();
        let t = now();
        let eval = monitor.evaluate(7.2, &EventCategory::Work);
        let protocol = monitor.activate(BlueprintId::new(), ProfileType::Generator, trigger(&eval, t));

        let recent = vec![(severity(8), t - Duration::hours(47))];
        let decision = monitor.check_de_escalation(&protocol, recent, t);
        assert!(!decision.eligible);
        assert!(decision.reason.unwrap().contains("48 hours"));

        let old = vec![(severity(9), t - Duration::hours(49)), (severity(3), t)];
        assert!(monitor.check_de_escalation(&protocol, old, t).eligible);
    }

    #[test]
    fn test_de_escalation_requires_low_level_or_stabilizing() {
        let monitor = CrisisMonitor::default();
        let t = now();
        let eval = monitor.evaluate(9.0, &EventCategory::Work);
        let mut protocol = monitor.activate(BlueprintId::new(), ProfileType::Generator, trigger(&eval, t));

        let decision = monitor.check_de_escalation(&protocol, vec![], t);
        assert!(!decision.eligible);
        assert!(decision.reason.unwrap().contains("not stabilizing"));

        monitor.stabilize(&mut protocol, ProfileType::Generator, t).unwrap();
        assert_eq!(protocol.level, 2);
        let decision = monitor.try_resolve(&mut protocol, vec![], t).unwrap();
        assert!(decision.eligible);
        assert_eq!(protocol.status, SedaStatus::Resolved);
        assert_eq!(protocol.resolved_at, Some(t));
        assert_eq!(protocol.transitions.len(), 2);
    }

    #[test]
    fn test_review_calm_walks_toward_resolution() {
        let monitor = CrisisMonitor::default();
        let t = now();
        let eval = monitor.evaluate(9.0, &EventCategory::Work);
        let mut protocol = monitor.activate(BlueprintId::new(), ProfileType::Reflector, trigger(&eval, t));
        let severe_recently = vec![(severity(9), t)];

        monitor
            .review_calm(&mut protocol, ProfileType::Reflector, severe_recently.clone(), t)
            .unwrap();
        assert_eq!(protocol.status, SedaStatus::Stabilizing);

        let decision = monitor
            .review_calm(&mut protocol, ProfileType::Reflector, severe_recently.clone(), t)
            .unwrap();
        assert!(!decision.eligible);
        assert_eq!(protocol.status, SedaStatus::Monitoring);
        assert_eq!(protocol.level, 1);

        let later = t + Duration::hours(72);
        let decision = monitor
            .review_calm(&mut protocol, ProfileType::Reflector, severe_recently, later)
            .unwrap();
        assert!(decision.eligible);
        assert_eq!(protocol.status, SedaStatus::Resolved);
    }

    #[test]
    fn test_resolved_protocol_rejects_transitions() {
        let monitor = CrisisMonitor::default();
        let t = now();
        let eval = monitor.evaluate(7.0, &EventCategory::Work);
        let mut protocol = monitor.activate(BlueprintId::new(), ProfileType::Generator, trigger(&eval, t));
        assert!(monitor.try_resolve(&mut protocol, vec![], t).unwrap().eligible);

        assert!(monitor
            .escalate(&mut protocol, ProfileType::Generator, trigger(&eval, t))
            .is_err());
        assert!(!monitor.check_de_escalation(&protocol, vec![], t).eligible);
    }
}
