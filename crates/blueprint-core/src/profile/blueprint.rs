//! Blueprint - the static personal profile every physics constant derives from
//!
//! A Blueprint is built once from its activations and never changes
//! afterwards, apart from its display metadata.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ValidationError};
use crate::types::{now, BlueprintId, Timestamp, UserId};

/// Profile type, a fixed enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileType {
    Generator,
    ManifestingGenerator,
    Projector,
    Manifestor,
    Reflector,
}

impl ProfileType {
    /// All enumerated types, in table order
    pub const ALL: [ProfileType; 5] = [
        ProfileType::Generator,
        ProfileType::ManifestingGenerator,
        ProfileType::Projector,
        ProfileType::Manifestor,
        ProfileType::Reflector,
    ];

    /// Pull-to-baseline strength of this type
    pub fn elasticity(self) -> f64 {
        match self {
            ProfileType::Generator | ProfileType::ManifestingGenerator => 8.0,
            ProfileType::Manifestor => 6.0,
            ProfileType::Projector => 5.0,
            ProfileType::Reflector => 4.0,
        }
    }

    /// Stable key used in the reference table and the store
    pub fn key(self) -> &'static str {
        match self {
            ProfileType::Generator => "generator",
            ProfileType::ManifestingGenerator => "manifesting_generator",
            ProfileType::Projector => "projector",
            ProfileType::Manifestor => "manifestor",
            ProfileType::Reflector => "reflector",
        }
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProfileType::Generator => "Generator",
            ProfileType::ManifestingGenerator => "Manifesting Generator",
            ProfileType::Projector => "Projector",
            ProfileType::Manifestor => "Manifestor",
            ProfileType::Reflector => "Reflector",
        };
        f.write_str(label)
    }
}

impl FromStr for ProfileType {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        ProfileType::ALL
            .into_iter()
            .find(|t| t.key() == normalized)
            .ok_or_else(|| ValidationError::UnknownType(s.to_string()))
    }
}

/// The nine energy centers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Center {
    Head,
    Ajna,
    Throat,
    G,
    Heart,
    Sacral,
    SolarPlexus,
    Spleen,
    Root,
}

impl Center {
    pub const ALL: [Center; 9] = [
        Center::Head,
        Center::Ajna,
        Center::Throat,
        Center::G,
        Center::Heart,
        Center::Sacral,
        Center::SolarPlexus,
        Center::Spleen,
        Center::Root,
    ];
}

/// Decision-making authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    Emotional,
    Sacral,
    Splenic,
    Ego,
    SelfProjected,
    Mental,
    Lunar,
}

/// Profile: conscious and unconscious line numbers, each 1-6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileLines {
    pub conscious: u8,
    pub unconscious: u8,
}

impl ProfileLines {
    pub fn new(conscious: u8, unconscious: u8) -> Result<Self> {
        for line in [conscious, unconscious] {
            if !(1..=6).contains(&line) {
                return Err(ValidationError::InvalidProfileLine(line).into());
            }
        }
        Ok(Self {
            conscious,
            unconscious,
        })
    }
}

impl fmt::Display for ProfileLines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.conscious, self.unconscious)
    }
}

/// A channel joins two gates in two centers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub gates: (u16, u16),
    pub centers: (Center, Center),
}

use Center::*;

/// The 36 channels
const CHANNELS: [(u16, u16, Center, Center); 36] = [
    (1, 8, G, Throat),
    (2, 14, G, Sacral),
    (3, 60, Sacral, Root),
    (4, 63, Ajna, Head),
    (5, 15, Sacral, G),
    (6, 59, SolarPlexus, Sacral),
    (7, 31, G, Throat),
    (9, 52, Sacral, Root),
    (10, 20, G, Throat),
    (10, 34, G, Sacral),
    (10, 57, G, Spleen),
    (11, 56, Ajna, Throat),
    (12, 22, Throat, SolarPlexus),
    (13, 33, G, Throat),
    (16, 48, Throat, Spleen),
    (17, 62, Ajna, Throat),
    (18, 58, Spleen, Root),
    (19, 49, Root, SolarPlexus),
    (20, 34, Throat, Sacral),
    (20, 57, Throat, Spleen),
    (21, 45, Heart, Throat),
    (23, 43, Throat, Ajna),
    (24, 61, Ajna, Head),
    (25, 51, G, Heart),
    (26, 44, Heart, Spleen),
    (27, 50, Sacral, Spleen),
    (28, 38, Spleen, Root),
    (29, 46, Sacral, G),
    (30, 41, SolarPlexus, Root),
    (32, 54, Spleen, Root),
    (34, 57, Sacral, Spleen),
    (35, 36, Throat, SolarPlexus),
    (37, 40, SolarPlexus, Heart),
    (39, 55, Root, SolarPlexus),
    (42, 53, Sacral, Root),
    (47, 64, Ajna, Head),
];

/// Channels fully activated by a gate set, in table order
pub fn derive_channels(gates: &BTreeSet<u16>) -> Vec<Channel> {
    CHANNELS
        .iter()
        .filter(|(a, b, _, _)| gates.contains(a) && gates.contains(b))
        .map(|&(a, b, ca, cb)| Channel {
            gates: (a, b),
            centers: (ca, cb),
        })
        .collect()
}

/// Definition class, computed from channel count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Definition {
    None,
    Single,
    Split,
    TripleSplit,
    QuadrupleSplit,
}

impl Definition {
    pub fn from_channel_count(count: usize) -> Self {
        match count {
            0 => Definition::None,
            1..=3 => Definition::Single,
            4..=5 => Definition::Split,
            6..=7 => Definition::TripleSplit,
            _ => Definition::QuadrupleSplit,
        }
    }
}

/// The only mutable part of a Blueprint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlueprintMetadata {
    pub display_name: Option<String>,
    pub notes: Option<String>,
}

/// Immutable-after-creation profile owned by one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: BlueprintId,
    pub owner: UserId,
    pub profile_type: ProfileType,
    pub profile: ProfileLines,
    pub authority: Authority,
    /// Defined/undefined flag for each of the nine centers
    pub centers: BTreeMap<Center, bool>,
    pub gates: BTreeSet<u16>,
    pub channels: Vec<Channel>,
    pub definition: Definition,
    pub metadata: BlueprintMetadata,
    pub created_at: Timestamp,
}

impl Blueprint {
    /// Create a builder
    pub fn builder(owner: UserId, profile_type: ProfileType) -> BlueprintBuilder {
        BlueprintBuilder::new(owner, profile_type)
    }

    pub fn is_defined(&self, center: Center) -> bool {
        self.centers.get(&center).copied().unwrap_or(false)
    }

    pub fn defined_count(&self) -> usize {
        self.centers.values().filter(|&&d| d).count()
    }

    /// Replace the display metadata
    pub fn update_metadata(&mut self, metadata: BlueprintMetadata) {
        self.metadata = metadata;
    }
}

/// Builder for [`Blueprint`]
#[derive(Debug, Clone)]
pub struct BlueprintBuilder {
    owner: UserId,
    profile_type: ProfileType,
    profile: (u8, u8),
    authority: Option<Authority>,
    gates: BTreeSet<u16>,
    defined: BTreeSet<Center>,
    metadata: BlueprintMetadata,
}

impl BlueprintBuilder {
    pub fn new(owner: UserId, profile_type: ProfileType) -> Self {
        Self {
            owner,
            profile_type,
            profile: (1, 3),
            authority: None,
            gates: BTreeSet::new(),
            defined: BTreeSet::new(),
            metadata: BlueprintMetadata::default(),
        }
    }

    pub fn profile(mut self, conscious: u8, unconscious: u8) -> Self {
        self.profile = (conscious, unconscious);
        self
    }

    pub fn authority(mut self, authority: Authority) -> Self {
        self.authority = Some(authority);
        self
    }

    pub fn gate(mut self, gate: u16) -> Self {
        self.gates.insert(gate);
        self
    }

    pub fn gates(mut self, gates: impl IntoIterator<Item = u16>) -> Self {
        self.gates.extend(gates);
        self
    }

    /// Mark a center defined even when no channel reaches it
    pub fn defined_center(mut self, center: Center) -> Self {
        self.defined.insert(center);
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.display_name = Some(name.into());
        self
    }

    pub fn build(self) -> Result<Blueprint> {
        let profile = ProfileLines::new(self.profile.0, self.profile.1)?;
        if let Some(&bad) = self.gates.iter().find(|g| !(1..=64).contains(*g)) {
            return Err(ValidationError::InvalidGate(bad).into());
        }

        let channels = derive_channels(&self.gates);
        let mut defined = self.defined;
        for channel in &channels {
            defined.insert(channel.centers.0);
            defined.insert(channel.centers.1);
        }
        let centers = Center::ALL
            .into_iter()
            .map(|c| (c, defined.contains(&c)))
            .collect();

        let authority = self.authority.unwrap_or(match self.profile_type {
            ProfileType::Reflector => Authority::Lunar,
            ProfileType::Projector => Authority::SelfProjected,
            ProfileType::Manifestor => Authority::Ego,
            _ => Authority::Sacral,
        });

        Ok(Blueprint {
            id: BlueprintId::new(),
            owner: self.owner,
            profile_type: self.profile_type,
            profile,
            authority,
            centers,
            gates: self.gates,
            definition: Definition::from_channel_count(channels.len()),
            channels,
            metadata: self.metadata,
            created_at: now(),
        })
    }
}
