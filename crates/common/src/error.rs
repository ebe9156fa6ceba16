//! Error taxonomy and structured error reporting
//!
//! Every failure surfaced to a caller goes through this module:
//!
//! 1. **`ErrorCategory`**: the eight failure categories, each owning a
//!    1000-wide numeric code range
//! 2. **`ErrorRecord`**: the structured, redacted, correlation-stamped
//!    record callers receive instead of raw transport errors
//! 3. **`ErrorReporter`**: validates codes against their category range,
//!    redacts sensitive detail keys, stamps correlation ID and timestamp,
//!    and logs according to the caller-selected propagation mode
//!
//! A `(category, code)` pair where the code falls outside the category's
//! declared range is itself an internal consistency fault and is escalated
//! as `InvalidOperation` with code [`CONSISTENCY_FAULT_CODE`].

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// Marker substituted for redacted detail values
pub const REDACTION_MARKER: &str = "***REDACTED***";

/// Code used when a report violates its category's code range
pub const CONSISTENCY_FAULT_CODE: u32 = 7999;

/// Detail keys containing any of these fragments are redacted
static SENSITIVE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(password|secret|key|token|credential)").expect("valid regex"));

/// Failure categories, each owning a 1000-wide code range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Credential or token failure (1000-1999)
    Authentication,
    /// Network, transport, or 5xx failure (2000-2999)
    Connection,
    /// Malformed input or request (3000-3999)
    Validation,
    /// Missing resource (4000-4999)
    ResourceNotFound,
    /// Operation deadline exceeded (5000-5999)
    OperationTimeout,
    /// Token signature or claims violation (6000-6999)
    Security,
    /// Unexpected or internal failure (7000-7999)
    InvalidOperation,
    /// Rate limit or quota exhausted (8000-8999)
    LimitExceeded,
}

impl ErrorCategory {
    /// The numeric code range this category owns
    pub fn code_range(&self) -> RangeInclusive<u32> {
        match self {
            Self::Authentication => 1000..=1999,
            Self::Connection => 2000..=2999,
            Self::Validation => 3000..=3999,
            Self::ResourceNotFound => 4000..=4999,
            Self::OperationTimeout => 5000..=5999,
            Self::Security => 6000..=6999,
            Self::InvalidOperation => 7000..=7999,
            Self::LimitExceeded => 8000..=8999,
        }
    }

    /// Whether `code` lies within this category's declared range
    pub fn contains(&self, code: u32) -> bool {
        self.code_range().contains(&code)
    }

    /// Stable string form used in logs and records
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "AuthenticationError",
            Self::Connection => "ConnectionError",
            Self::Validation => "ValidationError",
            Self::ResourceNotFound => "ResourceNotFound",
            Self::OperationTimeout => "OperationTimeout",
            Self::Security => "SecurityError",
            Self::InvalidOperation => "InvalidOperation",
            Self::LimitExceeded => "LimitExceeded",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Informational, expected conditions
    Info,
    /// Degraded but operational
    Warning,
    /// Failure requiring attention
    Error,
    /// System integrity at risk
    Critical,
}

/// Standard interface for classifying errors by their characteristics
pub trait ErrorClassification {
    /// Can the failed operation be retried?
    fn is_retryable(&self) -> bool;

    /// How serious is this error?
    fn severity(&self) -> ErrorSeverity;

    /// Does this require immediate attention?
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Suggested delay before retrying, if applicable
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// How a reported error propagates to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropagationMode {
    /// Abort the call chain; the record becomes the call's error
    #[default]
    Stop,
    /// Emit as a recoverable error and proceed
    Continue,
    /// Swallow after logging
    Silent,
}

/// Structured, sanitized error surfaced to callers
///
/// Details are already redacted by the time a record exists; the original
/// diagnostic message is preserved under the `error` detail key where the
/// producer supplied one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub category: ErrorCategory,
    pub code: u32,
    pub correlation_id: String,
    pub message: String,
    pub details: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}:{}] {} (correlation_id={})",
            self.category, self.code, self.message, self.correlation_id
        )
    }
}

impl std::error::Error for ErrorRecord {}

impl ErrorClassification for ErrorRecord {
    fn is_retryable(&self) -> bool {
        matches!(
            self.category,
            ErrorCategory::Connection | ErrorCategory::OperationTimeout | ErrorCategory::LimitExceeded
        )
    }

    fn severity(&self) -> ErrorSeverity {
        match self.category {
            ErrorCategory::ResourceNotFound => ErrorSeverity::Info,
            ErrorCategory::LimitExceeded => ErrorSeverity::Warning,
            ErrorCategory::Connection
            | ErrorCategory::Validation
            | ErrorCategory::OperationTimeout
            | ErrorCategory::Authentication => ErrorSeverity::Error,
            ErrorCategory::Security | ErrorCategory::InvalidOperation => ErrorSeverity::Critical,
        }
    }
}

/// A failure being handed to the reporter
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub category: ErrorCategory,
    pub code: u32,
    pub message: String,
    pub correlation_id: Option<String>,
    pub details: BTreeMap<String, String>,
    pub mode: PropagationMode,
}

impl ErrorReport {
    /// Start a report for a `(category, code)` pair
    pub fn new(category: ErrorCategory, code: u32, message: impl Into<String>) -> Self {
        Self {
            category,
            code,
            message: message.into(),
            correlation_id: None,
            details: BTreeMap::new(),
            mode: PropagationMode::Stop,
        }
    }

    /// Attach the correlation ID of the originating call
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Attach one diagnostic detail
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Select the propagation mode
    pub fn mode(mut self, mode: PropagationMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Maps `(category, code, details)` reports to sanitized error records
///
/// Stateless by design: a single instance is shared by reference across the
/// pipeline so every surfaced failure takes the same path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn new() -> Self {
        Self
    }

    /// Produce the final record for a report
    ///
    /// Validates the code against the category range (out-of-range input is
    /// escalated to an internal consistency fault), redacts sensitive detail
    /// keys, stamps correlation ID and UTC timestamp, and logs at the level
    /// implied by the propagation mode.
    pub fn report(&self, report: ErrorReport) -> ErrorRecord {
        let correlation_id = report
            .correlation_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let record = if report.category.contains(report.code) {
            ErrorRecord {
                category: report.category,
                code: report.code,
                correlation_id,
                message: report.message,
                details: redact_details(report.details),
                timestamp: Utc::now(),
            }
        } else {
            // Out-of-range code: the report itself is defective
            let mut details = redact_details(report.details);
            details.insert("declared_category".to_string(), report.category.as_str().to_string());
            details.insert("declared_code".to_string(), report.code.to_string());
            ErrorRecord {
                category: ErrorCategory::InvalidOperation,
                code: CONSISTENCY_FAULT_CODE,
                correlation_id,
                message: format!(
                    "error code {} outside declared range for {}: {}",
                    report.code, report.category, report.message
                ),
                details,
                timestamp: Utc::now(),
            }
        };

        match report.mode {
            PropagationMode::Stop => {
                error!(
                    category = %record.category,
                    code = record.code,
                    correlation_id = %record.correlation_id,
                    "{}",
                    record.message
                );
            }
            PropagationMode::Continue => {
                warn!(
                    category = %record.category,
                    code = record.code,
                    correlation_id = %record.correlation_id,
                    "{}",
                    record.message
                );
            }
            PropagationMode::Silent => {
                debug!(
                    category = %record.category,
                    code = record.code,
                    correlation_id = %record.correlation_id,
                    "{}",
                    record.message
                );
            }
        }

        record
    }
}

/// Whether a detail key names secret material
pub fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEY.is_match(key)
}

/// Replace values of sensitive keys with the redaction marker
fn redact_details(details: BTreeMap<String, String>) -> BTreeMap<String, String> {
    details
        .into_iter()
        .map(|(k, v)| if is_sensitive_key(&k) { (k, REDACTION_MARKER.to_string()) } else { (k, v) })
        .collect()
}
