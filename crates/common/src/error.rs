//! Unified error type for the spot advisor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream fetch failed: {0}")]
    Upstream(String),

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for errors that describe the caller's input rather than a
    /// failing data source.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedProvider(_) | Error::NotFound(_) | Error::Validation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_provider_names_id() {
        let err = Error::UnsupportedProvider("oracle".into());
        assert!(err.to_string().contains("oracle"), "message should name the provider");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_validation_message() {
        let err = Error::validation("min_vcpu", "must be greater than 0");
        assert_eq!(err.to_string(), "Invalid min_vcpu: must be greater than 0");
    }

    #[test]
    fn test_upstream_is_not_client_error() {
        assert!(!Error::Upstream("503".into()).is_client_error());
    }
}
