//! Error types for the exrate service.

use std::fmt;
use thiserror::Error;

/// Boxed cause carried by storage and provider failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed currency code or date.
    Validation,
    /// Credential rejected.
    Auth,
    /// Cache read or write failure.
    Storage,
    /// Upstream quote provider failure.
    Provider,
}

impl ErrorKind {
    /// Get the kind as a static string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Auth => "auth",
            ErrorKind::Storage => "storage",
            ErrorKind::Provider => "provider",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for rate operations.
///
/// Every variant names the operation that produced it; storage and provider
/// failures keep the underlying cause reachable through `source()`.
#[derive(Debug, Error)]
pub enum RateError {
    /// Invalid client input.
    #[error("{operation}: {message}")]
    Validation {
        operation: &'static str,
        message: String,
    },

    /// Credential rejected.
    #[error("{operation}: {message}")]
    Auth {
        operation: &'static str,
        message: String,
    },

    /// Cache read or write failed.
    #[error("{operation}: storage failure: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    /// Quote provider failed or returned no data.
    #[error("{operation}: provider failure: {source}")]
    Provider {
        operation: &'static str,
        #[source]
        source: BoxError,
    },
}

impl RateError {
    /// Create a validation error.
    pub fn validation(operation: &'static str, message: impl Into<String>) -> Self {
        RateError::Validation {
            operation,
            message: message.into(),
        }
    }

    /// Create an auth error.
    pub fn auth(operation: &'static str, message: impl Into<String>) -> Self {
        RateError::Auth {
            operation,
            message: message.into(),
        }
    }

    /// Create a storage error wrapping its cause.
    pub fn storage(operation: &'static str, source: impl Into<BoxError>) -> Self {
        RateError::Storage {
            operation,
            source: source.into(),
        }
    }

    /// Create a provider error wrapping its cause.
    pub fn provider(operation: &'static str, source: impl Into<BoxError>) -> Self {
        RateError::Provider {
            operation,
            source: source.into(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RateError::Validation { .. } => ErrorKind::Validation,
            RateError::Auth { .. } => ErrorKind::Auth,
            RateError::Storage { .. } => ErrorKind::Storage,
            RateError::Provider { .. } => ErrorKind::Provider,
        }
    }

    /// Get the operation that produced this error.
    pub fn operation(&self) -> &'static str {
        match self {
            RateError::Validation { operation, .. }
            | RateError::Auth { operation, .. }
            | RateError::Storage { operation, .. }
            | RateError::Provider { operation, .. } => operation,
        }
    }

    /// Check if the error was caused by the caller's input or credential.
    pub fn is_client_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::Auth)
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Auth => "AUTH_ERROR",
            ErrorKind::Storage => "STORAGE_ERROR",
            ErrorKind::Provider => "PROVIDER_ERROR",
        }
    }
}

/// Result type alias for rate operations.
pub type RateResult<T> = std::result::Result<T, RateError>;
