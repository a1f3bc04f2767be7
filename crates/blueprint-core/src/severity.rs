//! Severity ratings and their five ordered bands

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// A validated severity rating in [1, 10]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Severity(u8);

impl Severity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ValidationError::SeverityOutOfRange(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0)
    }

    pub fn band(self) -> SeverityBand {
        SeverityBand::from_severity(self)
    }
}

impl TryFrom<i64> for Severity {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Severity> for i64 {
    fn from(s: Severity) -> Self {
        i64::from(s.0)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotone bucketing of severity, breakpoints at 2, 4, 6, 8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityBand {
    Signal,
    Friction,
    Breakpoint,
    Distortion,
    Anomaly,
}

impl SeverityBand {
    /// Ascending order
    pub const ALL: [SeverityBand; 5] = [
        SeverityBand::Signal,
        SeverityBand::Friction,
        SeverityBand::Breakpoint,
        SeverityBand::Distortion,
        SeverityBand::Anomaly,
    ];

    pub fn from_severity(severity: Severity) -> Self {
        match severity.value() {
            0..=2 => SeverityBand::Signal,
            3..=4 => SeverityBand::Friction,
            5..=6 => SeverityBand::Breakpoint,
            7..=8 => SeverityBand::Distortion,
            _ => SeverityBand::Anomaly,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            SeverityBand::Signal => "signal",
            SeverityBand::Friction => "friction",
            SeverityBand::Breakpoint => "breakpoint",
            SeverityBand::Distortion => "distortion",
            SeverityBand::Anomaly => "anomaly",
        }
    }

    /// Bands strictly below this one, nearest first
    pub fn lower_bands(self) -> impl Iterator<Item = SeverityBand> {
        Self::ALL.into_iter().rev().filter(move |b| *b < self)
    }
}

impl fmt::Display for SeverityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SeverityBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|b| b.key() == s)
            .ok_or_else(|| format!("unknown severity band '{s}'"))
    }
}
