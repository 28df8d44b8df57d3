//! Adapter error types.
//!
//! Read-family adapter operations never surface these errors to the protocol
//! engine; they are logged and collapsed into "not found". Write-family
//! operations propagate them unchanged.

use std::fmt;

use crate::model::ModelName;

/// Errors that can occur while resolving models or persisting protocol records.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The adapter was configured with something it cannot serve, most
    /// commonly an unknown model name.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the misconfiguration.
        message: String,
    },

    /// A model-specific operation was called on an adapter for another model.
    #[error("{operation} is not supported for model {model}")]
    UnsupportedOperation {
        /// The operation that was invoked.
        operation: &'static str,
        /// The model the adapter was created for.
        model: ModelName,
    },

    /// A write targeted a row that does not exist.
    #[error("Not found: {message}")]
    NotFound {
        /// Description of the missing row.
        message: String,
    },

    /// The backing store failed (connectivity, query, constraint).
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// A payload or row could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AdapterError {
    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedOperation` error.
    #[must_use]
    pub fn unsupported(operation: &'static str, model: ModelName) -> Self {
        Self::UnsupportedOperation { operation, model }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if a read operation may swallow this error and report
    /// "not found" instead.
    ///
    /// Programming errors (unknown model, wrong model for an operation) are
    /// never degraded.
    #[must_use]
    pub fn is_read_degradable(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Serialization(_) | Self::NotFound { .. }
        )
    }

    /// Returns `true` if this error stems from misuse of the adapter rather
    /// than from the environment.
    #[must_use]
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::UnsupportedOperation { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        !matches!(self, Self::NotFound { .. })
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } | Self::UnsupportedOperation { .. } => {
                ErrorCategory::Configuration
            }
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Serialization(_) => ErrorCategory::Data,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of adapter errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Misconfiguration or misuse of the adapter.
    Configuration,
    /// A write targeted a missing row.
    NotFound,
    /// Storage backend failures.
    Infrastructure,
    /// Malformed payloads or rows.
    Data,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::NotFound => write!(f, "not_found"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Data => write!(f, "data"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AdapterError::configuration("unknown model: Foo");
        assert_eq!(err.to_string(), "Configuration error: unknown model: Foo");

        let err = AdapterError::unsupported("findByUserCode", ModelName::AccessToken);
        assert_eq!(
            err.to_string(),
            "findByUserCode is not supported for model AccessToken"
        );

        let err = AdapterError::storage("connection refused");
        assert_eq!(err.to_string(), "Storage error: connection refused");
    }

    #[test]
    fn test_read_degradation() {
        assert!(AdapterError::storage("down").is_read_degradable());
        assert!(AdapterError::not_found("AccessToken abc").is_read_degradable());
        assert!(!AdapterError::configuration("bad").is_read_degradable());
        assert!(
            !AdapterError::unsupported("findByUid", ModelName::Client).is_read_degradable()
        );
    }

    #[test]
    fn test_error_predicates() {
        let err = AdapterError::unsupported("findSessionByUserId", ModelName::Grant);
        assert!(err.is_programming_error());
        assert!(err.is_server_error());

        let err = AdapterError::not_found("row");
        assert!(!err.is_programming_error());
        assert!(!err.is_server_error());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AdapterError::storage("x").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(
            AdapterError::configuration("x").category(),
            ErrorCategory::Configuration
        );
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(AdapterError::from(json_err).category(), ErrorCategory::Data);
        assert_eq!(ErrorCategory::Infrastructure.to_string(), "infrastructure");
    }
}
