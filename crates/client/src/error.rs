//! API pipeline error types
//!
//! `ApiError` is the typed error the pipeline stages pass among themselves.
//! It carries enough classification to drive the retry loop; the executor
//! converts it exactly once, through the `ErrorReporter`, into the
//! sanitized `ErrorRecord` callers receive.

use std::time::Duration;

use aegis_common::error::{ErrorCategory, ErrorClassification, ErrorReport, ErrorSeverity};
use thiserror::Error;

use crate::token::TokenValidationError;

/// API operation errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("security violation: {0}")]
    Security(#[from] TokenValidationError),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("rate limit exceeded: {0}")]
    LimitExceeded(String),
}

impl ApiError {
    /// The error category this variant belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth(_) => ErrorCategory::Authentication,
            Self::Connection(_) => ErrorCategory::Connection,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::NotFound(_) => ErrorCategory::ResourceNotFound,
            Self::Timeout(_) => ErrorCategory::OperationTimeout,
            Self::Security(_) => ErrorCategory::Security,
            Self::InvalidOperation(_) => ErrorCategory::InvalidOperation,
            Self::LimitExceeded(_) => ErrorCategory::LimitExceeded,
        }
    }

    /// The numeric code, always inside the category's declared range
    pub fn code(&self) -> u32 {
        match self {
            Self::Auth(_) => 1001,
            Self::Connection(_) => 2001,
            Self::Validation(_) => 3001,
            Self::NotFound(_) => 4004,
            Self::Timeout(_) => 5001,
            Self::Security(violation) => violation.code(),
            Self::InvalidOperation(_) => 7001,
            Self::LimitExceeded(_) => 8001,
        }
    }

    /// Start an `ErrorReport` for this failure
    pub fn to_report(&self, correlation_id: &str) -> ErrorReport {
        ErrorReport::new(self.category(), self.code(), self.to_string())
            .correlation_id(correlation_id)
    }
}

impl ErrorClassification for ApiError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_) | Self::LimitExceeded(_))
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotFound(_) => ErrorSeverity::Info,
            Self::LimitExceeded(_) => ErrorSeverity::Warning,
            Self::Auth(_) | Self::Connection(_) | Self::Validation(_) | Self::Timeout(_) => {
                ErrorSeverity::Error
            }
            Self::Security(_) | Self::InvalidOperation(_) => ErrorSeverity::Critical,
        }
    }
}
