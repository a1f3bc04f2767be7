//! Error types for Blueprint Core
//!
//! Every failure the event pipeline can report maps onto one of these
//! variants. Reference-data gaps are deliberately absent: they are resolved
//! through fallbacks and never surface as errors.

use thiserror::Error;

/// Result type alias for Blueprint operations
pub type Result<T> = std::result::Result<T, BlueprintError>;

/// Main error type for Blueprint operations
#[derive(Error, Debug)]
pub enum BlueprintError {
    /// Malformed input, rejected before any state mutation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Usage limit exceeded for the calling user
    #[error("Event limit reached ({limit} per period); upgrade or wait for the next period")]
    Entitlement {
        /// The limit the user ran into
        limit: u32,
    },

    /// Stored history contradicts itself; aborts without writing
    #[error("State invariant violation: {0}")]
    StateInvariant(String),

    /// The optional text-enrichment collaborator failed
    #[error("Enrichment failed: {0}")]
    Enrichment(String),

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Illegal crisis protocol status transition
    #[error("Invalid protocol transition from {from} to {to}")]
    InvalidTransition {
        /// Status before
        from: String,
        /// Requested status
        to: String,
    },

    /// Persistence errors
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration or reference-table errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        /// What was being attempted
        context: String,
        /// Underlying error
        source: Box<BlueprintError>,
    },
}

/// Input validation failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Severity must be in [1, 10], got {0}")]
    SeverityOutOfRange(i64),

    #[error("Event category is required")]
    MissingCategory,

    #[error("Event title is required")]
    MissingTitle,

    #[error("Unknown profile type: {0}")]
    UnknownType(String),

    #[error("Profile line must be in [1, 6], got {0}")]
    InvalidProfileLine(u8),

    #[error("Gate number must be in [1, 64], got {0}")]
    InvalidGate(u16),
}

impl From<toml::de::Error> for BlueprintError {
    fn from(e: toml::de::Error) -> Self {
        BlueprintError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for BlueprintError {
    fn from(e: toml::ser::Error) -> Self {
        BlueprintError::Config(e.to_string())
    }
}

impl BlueprintError {
    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True for errors raised before any write was attempted
    pub fn is_rejection(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Entitlement { .. } => true,
            Self::WithContext { source, .. } => source.is_rejection(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<BlueprintError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context() {
        let err = BlueprintError::from(ValidationError::SeverityOutOfRange(11));
        let err = err.context("Failed to log event");

        assert!(err.to_string().contains("Failed to log event"));
        assert!(err.is_rejection());
    }

    #[test]
    fn test_result_ext() {
        let result: Result<()> = Err(BlueprintError::StateInvariant("no history".into()));
        let result = result.with_context(|| "Loading latest state".to_string());

        let err = result.unwrap_err();
        assert!(err.to_string().contains("Loading latest state"));
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_entitlement_message_is_distinct() {
        let err = BlueprintError::Entitlement { limit: 10 };
        assert!(err.to_string().contains("limit"));
        assert!(err.is_rejection());
    }
}
