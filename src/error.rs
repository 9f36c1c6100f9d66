//! Error types for the did-lab library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum DidError {
    /// A parameter set or option violates one of its invariants.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The panel cannot identify the DiD contrast (empty cell or singular design).
    #[error("Insufficient variation: {0}")]
    InsufficientVariation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, DidError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DidError::InvalidParameter("n_units must be >= 1".into());
        assert_eq!(err.to_string(), "Invalid parameter: n_units must be >= 1");

        let err = DidError::InsufficientVariation("no treated units".into());
        assert!(err.to_string().starts_with("Insufficient variation"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: DidError = io.into();
        assert!(matches!(err, DidError::Io(_)));
    }
}
