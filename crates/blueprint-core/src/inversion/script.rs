//! Guidance results and caller preferences

use serde::{Deserialize, Serialize};

use crate::severity::SeverityBand;

/// Where a script's final text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptSource {
    Deterministic,
    AiGenerated,
}

/// Guidance produced fresh for one event; never mutated afterwards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InversionScript {
    /// Text shown to the user
    pub script: String,
    /// Gate or crisis text exactly as generated; enrichment never touches it
    pub deterministic_script: String,
    /// Ranked, at most three
    pub experiments: Vec<String>,
    pub source: ScriptSource,
    pub band: SeverityBand,
    /// Reference gates that were consulted
    pub gates_consulted: Vec<u16>,
    pub personalizations: Vec<String>,
}

/// Tone the caller wants guidance delivered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationStyle {
    #[default]
    Warm,
    Direct,
    Analytical,
    Gentle,
}

/// Kinds of experiment a caller prefers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentType {
    Journaling,
    Movement,
    Social,
    Rest,
    Planning,
    Mindfulness,
}

impl ExperimentType {
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            ExperimentType::Journaling => &["write", "journal", "list", "note", "draft"],
            ExperimentType::Movement => &["walk", "move", "fitness", "body", "exercise"],
            ExperimentType::Social => &["call", "talk", "friend", "conversation", "ask", "share", "message"],
            ExperimentType::Rest => &["rest", "sleep", "bed", "evening off", "break", "alone"],
            ExperimentType::Planning => &["schedule", "plan", "block", "postpone", "cancel", "deadline"],
            ExperimentType::Mindfulness => &["notice", "breath", "pause", "listen", "sit "],
        }
    }

    /// Case-insensitive keyword hit in `text`
    pub fn matches(self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords().iter().any(|k| text.contains(k))
    }
}

/// Declared caller preferences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuidancePreferences {
    #[serde(default)]
    pub experiment_types: Vec<ExperimentType>,
    #[serde(default)]
    pub communication_style: CommunicationStyle,
}
