//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, ResultExt};
use crate::inversion::{EnrichmentConfig, InversionConfig};
use crate::physics::SolverConfig;
use crate::seda::SedaConfig;
use crate::stress::StressConfig;

/// Settings for every pipeline stage
///
/// Every section is optional in TOML; missing sections take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Category modifiers and direction policy
    pub stress: StressConfig,

    /// Spring coefficients
    pub solver: SolverConfig,

    /// Crisis de-escalation window
    pub seda: SedaConfig,

    /// Guidance selection
    pub inversion: InversionConfig,

    /// Optional AI rewrite
    pub enrichment: EnrichmentConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stress(mut self, stress: StressConfig) -> Self {
        self.stress = stress;
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_seda(mut self, seda: SedaConfig) -> Self {
        self.seda = seda;
        self
    }

    pub fn with_inversion(mut self, inversion: InversionConfig) -> Self {
        self.inversion = inversion;
        self
    }

    pub fn with_enrichment(mut self, enrichment: EnrichmentConfig) -> Self {
        self.enrichment = enrichment;
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::BandFallback;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.stress.category_modifiers["health"], 1.5);
        assert_eq!(config.solver.impulse_coefficient, 0.1);
        assert_eq!(config.seda.de_escalation_window_hours, 48);
        assert_eq!(config.inversion.max_experiments, 3);
        assert!(!config.enrichment.enabled);
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            [inversion]
            band_fallback = "exact_only"

            [stress.direction]
            category_gated = false
            "#,
        )
        .unwrap();
        assert_eq!(config.inversion.band_fallback, BandFallback::ExactOnly);
        assert!(!config.stress.direction.category_gated);
        assert_eq!(config.inversion.max_experiments, 3);
        assert_eq!(config.solver, SolverConfig::default());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        let config = EngineConfig::new().with_seda(SedaConfig {
            de_escalation_window_hours: 72,
            ..SedaConfig::default()
        });
        config.to_file(&path).unwrap();
        assert_eq!(EngineConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = EngineConfig::from_toml_str("[solver]\nimpulse_coefficient = \"x\"").unwrap_err();
        assert!(matches!(err, crate::error::BlueprintError::Config(_)));
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = EngineConfig::from_file("/nonexistent/engine.toml").unwrap_err();
        assert!(err.to_string().contains("reading config"));
    }
}
