use thiserror::Error;

/// Top-level error type for the Kwararru engine.
///
/// Subsystem crates define their own error types and implement
/// `From<KwararruError>` so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KwararruError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),
}

impl From<toml::de::Error> for KwararruError {
    fn from(err: toml::de::Error) -> Self {
        KwararruError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for KwararruError {
    fn from(err: toml::ser::Error) -> Self {
        KwararruError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for KwararruError {
    fn from(err: serde_json::Error) -> Self {
        KwararruError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Kwararru operations.
pub type Result<T> = std::result::Result<T, KwararruError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(KwararruError, &str)> = vec![
            (
                KwararruError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                KwararruError::Storage("quota exceeded".to_string()),
                "Storage error: quota exceeded",
            ),
            (
                KwararruError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
            (
                KwararruError::Upstream("speech synthesis failed".to_string()),
                "Upstream service error: speech synthesis failed",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: KwararruError = io_err.into();
        assert!(matches!(err, KwararruError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let kw_err: KwararruError = err.unwrap_err().into();
        assert!(matches!(kw_err, KwararruError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let kw_err: KwararruError = err.unwrap_err().into();
        assert!(matches!(kw_err, KwararruError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<u32> {
            let value: u32 = serde_json::from_str("42")?;
            Ok(value)
        }

        assert_eq!(inner().unwrap(), 42);
    }
}
