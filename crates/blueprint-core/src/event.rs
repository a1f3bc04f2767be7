//! Events - logged occurrences that push a Blueprint's state
//!
//! [`EventInput`] is what callers submit. [`EventInput::validate`] turns it
//! into a [`ValidatedEvent`] or rejects it before anything is written.
//! [`EventRecord`] is the immutable persisted form.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, ValidationError};
use crate::inversion::InversionScript;
use crate::physics::force::AxisDistribution;
use crate::severity::Severity;
use crate::stress::ForceAnalysis;
use crate::types::{BlueprintId, EventId, ProtocolId, SnapshotId, Timestamp};

/// Life area an event belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventCategory {
    Work,
    Relationship,
    Health,
    Finance,
    Personal,
    Family,
    /// Anything outside the known table; treated neutrally
    Other(String),
}

impl EventCategory {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "work" => EventCategory::Work,
            "relationship" | "relationships" => EventCategory::Relationship,
            "health" => EventCategory::Health,
            "finance" | "financial" | "money" => EventCategory::Finance,
            "personal" => EventCategory::Personal,
            "family" => EventCategory::Family,
            other => EventCategory::Other(other.to_string()),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            EventCategory::Work => "work",
            EventCategory::Relationship => "relationship",
            EventCategory::Health => "health",
            EventCategory::Finance => "finance",
            EventCategory::Personal => "personal",
            EventCategory::Family => "family",
            EventCategory::Other(s) => s,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EventCategory::Other(_))
    }

    /// How a force in this category spreads over the three axes
    pub fn axis_distribution(&self) -> AxisDistribution {
        match self {
            EventCategory::Work => AxisDistribution::new(0.5, 0.3, 0.2),
            EventCategory::Relationship => AxisDistribution::new(0.2, 0.2, 0.6),
            EventCategory::Health => AxisDistribution::new(0.6, 0.2, 0.2),
            EventCategory::Finance => AxisDistribution::new(0.4, 0.4, 0.2),
            EventCategory::Personal => AxisDistribution::new(0.3, 0.5, 0.2),
            EventCategory::Family => AxisDistribution::new(0.2, 0.3, 0.5),
            EventCategory::Other(_) => AxisDistribution::even(),
        }
    }

    /// Words that strongly signal this category
    pub fn strong_keywords(&self) -> &'static [&'static str] {
        match self {
            EventCategory::Work => &[
                "work", "job", "boss", "colleague", "deadline", "meeting", "career", "project",
            ],
            EventCategory::Relationship => {
                &["partner", "relationship", "friend", "conversation", "date", "love"]
            }
            EventCategory::Health => &["health", "body", "sleep", "doctor", "pain", "rest", "walk"],
            EventCategory::Finance => &["money", "budget", "debt", "bill", "income", "finance"],
            EventCategory::Personal => &["habit", "routine", "journal", "goal", "joy", "time"],
            EventCategory::Family => &["family", "parent", "child", "children", "home", "sibling"],
            EventCategory::Other(_) => &[],
        }
    }
}

impl From<String> for EventCategory {
    fn from(s: String) -> Self {
        EventCategory::parse(&s)
    }
}

impl From<EventCategory> for String {
    fn from(c: EventCategory) -> Self {
        c.key().to_string()
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Raw event as submitted by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub severity: i64,
    pub category: String,
    /// Defaults to the time of processing
    #[serde(default)]
    pub occurred_at: Option<Timestamp>,
}

impl EventInput {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        severity: i64,
        category: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity,
            category: category.into(),
            occurred_at: None,
        }
    }

    pub fn at(mut self, occurred_at: Timestamp) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// Reject malformed input
    pub fn validate(&self, fallback_time: Timestamp) -> Result<ValidatedEvent> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingTitle.into());
        }
        if self.category.trim().is_empty() {
            return Err(ValidationError::MissingCategory.into());
        }
        let severity = Severity::new(self.severity)?;

        Ok(ValidatedEvent {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            severity,
            category: EventCategory::parse(&self.category),
            occurred_at: self.occurred_at.unwrap_or(fallback_time),
        })
    }
}

/// An event that passed validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedEvent {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub category: EventCategory,
    pub occurred_at: Timestamp,
}

impl ValidatedEvent {
    /// Title and description, for keyword matching
    pub fn text(&self) -> String {
        if self.description.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.description)
        }
    }
}

/// Persisted, immutable event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub blueprint_id: BlueprintId,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub category: EventCategory,
    pub force_analysis: ForceAnalysis,
    /// Snapshot this event produced
    pub resulting_snapshot: SnapshotId,
    pub script: InversionScript,
    pub protocol_id: Option<ProtocolId>,
    pub occurred_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BlueprintError;
    use crate::types::now;

    #[test]
    fn test_category_parsing() {
        assert_eq!(EventCategory::parse(" Work "), EventCategory::Work);
        assert_eq!(EventCategory::parse("money"), EventCategory::Finance);
        assert_eq!(
            EventCategory::parse("hobby"),
            EventCategory::Other("hobby".into())
        );
        assert!(!EventCategory::parse("hobby").is_known());
    }

    #[test]
    fn test_category_serde_as_string() {
        let json = serde_json::to_string(&EventCategory::Health).unwrap();
        assert_eq!(json, "\"health\"");
        let back: EventCategory = serde_json::from_str("\"family\"").unwrap();
        assert_eq!(back, EventCategory::Family);
    }

    #[test]
    fn test_validation_rejects_bad_input() {
        let t = now();
        let err = EventInput::new("x", "", 11, "work").validate(t).unwrap_err();
        assert!(matches!(
            err,
            BlueprintError::Validation(ValidationError::SeverityOutOfRange(11))
        ));

        let err = EventInput::new("x", "", 5, "  ").validate(t).unwrap_err();
        assert!(matches!(
            err,
            BlueprintError::Validation(ValidationError::MissingCategory)
        ));

        let err = EventInput::new("", "", 5, "work").validate(t).unwrap_err();
        assert!(matches!(
            err,
            BlueprintError::Validation(ValidationError::MissingTitle)
        ));
    }

    #[test]
    fn test_validation_defaults_time() {
        let t = now();
        let event = EventInput::new("Review", "Tough review at work", 5, "work")
            .validate(t)
            .unwrap();
        assert_eq!(event.occurred_at, t);
        assert_eq!(event.text(), "Review Tough review at work");
    }
}
