//! Core error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, BenchError>;

/// Errors that abort a run
///
/// Per-item upload failures never surface here; they are recovered at the
/// pool boundary and turned into outcomes.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Missing or invalid destination / run parameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// Not enough file assets to run
    #[error("Discovery error: found {found} file(s), need {required}")]
    Discovery { found: usize, required: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BenchError {
    /// Configuration and discovery errors are the user's to fix; everything
    /// else is unexpected.
    pub fn is_setup_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Discovery { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_error_classification() {
        assert!(BenchError::Config("missing cloud name".into()).is_setup_error());
        assert!(BenchError::Discovery { found: 2, required: 5 }.is_setup_error());

        let io = BenchError::from(std::io::Error::other("disk full"));
        assert!(!io.is_setup_error());
    }

    #[test]
    fn test_discovery_message() {
        let err = BenchError::Discovery { found: 3, required: 5 };
        assert_eq!(err.to_string(), "Discovery error: found 3 file(s), need 5");
    }
}
