use thiserror::Error;

/// Top-level error type for Aula.
///
/// Subsystem crates define their own error enums and implement
/// `From<SubsystemError> for AssistError` so the composition root can use `?`
/// across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AssistError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Ingest error: {0}")]
    Ingest(String),
}

impl From<toml::de::Error> for AssistError {
    fn from(err: toml::de::Error) -> Self {
        AssistError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AssistError {
    fn from(err: serde_json::Error) -> Self {
        AssistError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Aula operations.
pub type Result<T> = std::result::Result<T, AssistError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(AssistError, &str)> = vec![
            (
                AssistError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                AssistError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
            (
                AssistError::Stream("connection reset".to_string()),
                "Stream error: connection reset",
            ),
            (
                AssistError::Ingest("no text".to_string()),
                "Ingest error: no text",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AssistError = io_err.into();
        assert!(matches!(err, AssistError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: AssistError = err.unwrap_err().into();
        assert!(matches!(err, AssistError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: AssistError = err.unwrap_err().into();
        assert!(matches!(err, AssistError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
