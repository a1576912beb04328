use thiserror::Error;

/// Top-level error type for the sqlpilot system.
///
/// Each variant wraps a subsystem-specific error. Subsystem crates define
/// their own error types and implement `From<SubsystemError> for PilotError`
/// so that the `?` operator works seamlessly across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for PilotError {
    fn from(err: toml::de::Error) -> Self {
        PilotError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PilotError {
    fn from(err: toml::ser::Error) -> Self {
        PilotError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PilotError {
    fn from(err: serde_json::Error) -> Self {
        PilotError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for sqlpilot operations.
pub type Result<T> = std::result::Result<T, PilotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PilotError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = PilotError::Session("no token".to_string());
        assert_eq!(err.to_string(), "Session error: no token");

        let err = PilotError::Generation("stream closed".to_string());
        assert_eq!(err.to_string(), "Generation error: stream closed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let pilot_err: PilotError = io_err.into();
        assert!(matches!(pilot_err, PilotError::Io(_)));
        assert!(pilot_err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let pilot_err: PilotError = json_err.into();
        assert!(matches!(pilot_err, PilotError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let pilot_err: PilotError = toml_err.into();
        assert!(matches!(pilot_err, PilotError::Config(_)));
    }
}
