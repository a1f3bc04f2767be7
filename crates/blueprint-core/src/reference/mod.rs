//! Reference Table - read-only per-type and per-gate lookup data
//!
//! Loaded and validated once at process start, then shared by reference
//! (`Arc<ReferenceTable>`) into every pipeline invocation. Content changes
//! require a reload, never runtime mutation.
//!
//! The on-disk format is TOML:
//!
//! ```toml
//! [types.generator]
//! strategy = "To respond"
//! exhaustion_multiplier = 1.0
//! authority_options = ["sacral", "emotional"]
//!
//! [gates.34]
//! name = "Power"
//! keywords = ["energy", "busy"]
//!
//! [gates.34.protocols.friction]
//! script = "..."
//! personalization = "..."
//! experiments = ["..."]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{BlueprintError, Result};
use crate::profile::{Authority, ProfileType};
use crate::severity::SeverityBand;

const BUILTIN_TABLE: &str = include_str!("../../data/reference.toml");

/// What a missing gate protocol band falls back to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandFallback {
    /// Nearest band below the requested one; never upward
    #[default]
    ClosestLower,
    /// Only the exact band counts
    ExactOnly,
}

/// Per-type reference entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeEntry {
    pub strategy: String,
    pub exhaustion_multiplier: f64,
    #[serde(default)]
    pub authority_options: Vec<Authority>,
}

/// Guidance a gate offers for one severity band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateProtocol {
    pub script: String,
    #[serde(default)]
    pub personalization: Option<String>,
    #[serde(default)]
    pub experiments: Vec<String>,
}

/// Per-gate reference entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateEntry {
    pub number: u16,
    pub name: String,
    pub keywords: Vec<String>,
    pub protocols: BTreeMap<SeverityBand, GateProtocol>,
}

impl GateEntry {
    /// Case-insensitive substring match of any keyword
    pub fn matches(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords
            .iter()
            .any(|k| !k.is_empty() && text.contains(&k.to_lowercase()))
    }

    /// Protocol for `band`, honoring the fallback policy
    pub fn protocol_for(
        &self,
        band: SeverityBand,
        fallback: BandFallback,
    ) -> Option<(SeverityBand, &GateProtocol)> {
        if let Some(protocol) = self.protocols.get(&band) {
            return Some((band, protocol));
        }
        match fallback {
            BandFallback::ExactOnly => None,
            BandFallback::ClosestLower => band
                .lower_bands()
                .find_map(|b| self.protocols.get(&b).map(|p| (b, p))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTable {
    #[serde(default)]
    types: BTreeMap<String, TypeEntry>,
    #[serde(default)]
    gates: BTreeMap<String, RawGate>,
}

#[derive(Debug, Deserialize)]
struct RawGate {
    name: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    protocols: BTreeMap<String, GateProtocol>,
}

/// Validated reference data
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTable {
    types: BTreeMap<ProfileType, TypeEntry>,
    gates: BTreeMap<u16, GateEntry>,
}

impl ReferenceTable {
    /// The table compiled into the crate
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_TABLE)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| e.context(format!("Loading reference table '{}'", path.display())))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawTable = toml::from_str(content)?;

        let mut types = BTreeMap::new();
        for (key, entry) in raw.types {
            let profile_type: ProfileType = key
                .parse()
                .map_err(|e| BlueprintError::Config(format!("type '{key}': {e}")))?;
            if !(entry.exhaustion_multiplier.is_finite() && entry.exhaustion_multiplier > 0.0) {
                return Err(BlueprintError::Config(format!(
                    "type '{key}': exhaustion_multiplier must be positive, got {}",
                    entry.exhaustion_multiplier
                )));
            }
            types.insert(profile_type, entry);
        }
        if let Some(missing) = ProfileType::ALL.iter().find(|t| !types.contains_key(t)) {
            return Err(BlueprintError::Config(format!(
                "reference table has no entry for type '{}'",
                missing.key()
            )));
        }

        let mut gates = BTreeMap::new();
        for (key, raw_gate) in raw.gates {
            let number: u16 = key
                .parse()
                .ok()
                .filter(|n| (1..=64).contains(n))
                .ok_or_else(|| BlueprintError::Config(format!("invalid gate number '{key}'")))?;
            if raw_gate.protocols.is_empty() {
                return Err(BlueprintError::Config(format!(
                    "gate {number} defines no protocols"
                )));
            }

            let mut protocols = BTreeMap::new();
            for (band_key, protocol) in raw_gate.protocols {
                let band: SeverityBand = band_key
                    .parse()
                    .map_err(|e| BlueprintError::Config(format!("gate {number}: {e}")))?;
                if protocol.script.trim().is_empty() {
                    return Err(BlueprintError::Config(format!(
                        "gate {number} band {band}: empty script"
                    )));
                }
                protocols.insert(band, protocol);
            }

            gates.insert(
                number,
                GateEntry {
                    number,
                    name: raw_gate.name,
                    keywords: raw_gate.keywords,
                    protocols,
                },
            );
        }

        Ok(Self { types, gates })
    }

    pub fn type_entry(&self, profile_type: ProfileType) -> Option<&TypeEntry> {
        self.types.get(&profile_type)
    }

    pub fn exhaustion_multiplier(&self, profile_type: ProfileType) -> Option<f64> {
        self.type_entry(profile_type).map(|e| e.exhaustion_multiplier)
    }

    pub fn gate(&self, number: u16) -> Option<&GateEntry> {
        self.gates.get(&number)
    }

    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    pub fn gates(&self) -> impl Iterator<Item = &GateEntry> {
        self.gates.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_TYPES: &str = r#"
[types.generator]
strategy = "To respond"
exhaustion_multiplier = 1.0
[types.manifesting_generator]
strategy = "To respond, then inform"
exhaustion_multiplier = 1.0
[types.projector]
strategy = "Wait for the invitation"
exhaustion_multiplier = 1.3
[types.manifestor]
strategy = "To inform"
exhaustion_multiplier = 1.1
[types.reflector]
strategy = "Wait a lunar cycle"
exhaustion_multiplier = 1.2
"#;

    #[test]
    fn test_builtin_table_loads() {
        let table = ReferenceTable::builtin().unwrap();
        for t in ProfileType::ALL {
            assert!(table.exhaustion_multiplier(t).unwrap() > 0.0);
        }
        assert!(table.gate_count() > 0);
    }

    #[test]
    fn test_missing_type_rejected() {
        let content = r#"
[types.generator]
strategy = "To respond"
exhaustion_multiplier = 1.0
"#;
        let err = ReferenceTable::from_toml_str(content).unwrap_err();
        assert!(err.to_string().contains("no entry for type"));
    }

    #[test]
    fn test_invalid_gate_rejected() {
        let content = format!(
            "{MINIMAL_TYPES}\n[gates.99]\nname = \"Nope\"\n[gates.99.protocols.signal]\nscript = \"x\"\n"
        );
        assert!(ReferenceTable::from_toml_str(&content).is_err());
    }

    #[test]
    fn test_band_fallback_never_goes_up() {
        let content = format!(
            r#"{MINIMAL_TYPES}
[gates.5]
name = "Fixed Rhythms"
keywords = ["Routine"]
[gates.5.protocols.friction]
script = "Return to one anchor habit."
[gates.5.protocols.anomaly]
script = "Strip the day to essentials."
"#
        );
        let table = ReferenceTable::from_toml_str(&content).unwrap();
        let gate = table.gate(5).unwrap();

        let (band, _) = gate
            .protocol_for(SeverityBand::Distortion, BandFallback::ClosestLower)
            .unwrap();
        assert_eq!(band, SeverityBand::Friction);

        assert!(gate
            .protocol_for(SeverityBand::Signal, BandFallback::ClosestLower)
            .is_none());
        assert!(gate
            .protocol_for(SeverityBand::Distortion, BandFallback::ExactOnly)
            .is_none());
        assert!(gate.matches("my routine fell apart"));
        assert!(!gate.matches("nothing relevant"));
    }
}
