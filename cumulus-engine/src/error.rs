//! Error types for reconciliation.
//!
//! Remote failures arrive as [`ApiError`] and are classified into a
//! [`ReconcileError`] at the call site, before they reach a resource's
//! orchestration code.

use std::time::Duration;

use thiserror::Error;

use crate::identity::IdentityError;
use crate::schema::ValidationError;
use crate::value::TypeMismatch;

/// Raw error returned by a remote API call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// True if the error code is one of `codes`.
    pub fn code_equals(&self, codes: &[&str]) -> bool {
        codes.iter().any(|c| self.code == *c)
    }

    /// True if the error has `code` and its message contains `fragment`.
    pub fn message_contains(&self, code: &str, fragment: &str) -> bool {
        self.code == code && self.message.contains(fragment)
    }
}

/// Coarse classification of a [`ReconcileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Retryable,
    Terminal,
    TimedOut,
    MalformedIdentity,
    PartitionUnsupported,
}

/// Errors surfaced by finders, waiters and resource reconcilers.
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// Confirmed absence.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transient remote condition, such as throttling.
    #[error(transparent)]
    Retryable(ApiError),

    /// Non-retryable failure determined locally.
    #[error("{0}")]
    Terminal(String),

    /// Non-retryable remote rejection.
    #[error(transparent)]
    Remote(#[from] ApiError),

    /// Budget exhausted before a terminal outcome.
    #[error("timeout while waiting for {target} (last state: '{last_state}', timeout: {timeout:?})")]
    TimedOut {
        target: String,
        last_state: String,
        timeout: Duration,
    },

    #[error(transparent)]
    MalformedIdentity(#[from] IdentityError),

    /// Capability rejected by the current partition.
    #[error("{capability} unsupported in partition {partition}: {source}")]
    PartitionUnsupported {
        partition: String,
        capability: String,
        source: ApiError,
    },

    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatch),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ReconcileError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn terminal(reason: impl Into<String>) -> Self {
        Self::Terminal(reason.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Retryable(_) => ErrorKind::Retryable,
            Self::Terminal(_) | Self::Remote(_) | Self::TypeMismatch(_) | Self::Validation(_) => {
                ErrorKind::Terminal
            }
            Self::TimedOut { .. } => ErrorKind::TimedOut,
            Self::MalformedIdentity(_) => ErrorKind::MalformedIdentity,
            Self::PartitionUnsupported { .. } => ErrorKind::PartitionUnsupported,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// The underlying remote error, if this error carries one.
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Self::Remote(e) | Self::Retryable(e) => Some(e),
            Self::PartitionUnsupported { source, .. } => Some(source),
            _ => None,
        }
    }

    /// True if this error carries a remote error with one of `codes`.
    pub fn code_equals(&self, codes: &[&str]) -> bool {
        self.api().is_some_and(|e| e.code_equals(codes))
    }
}

/// Remote error codes that signal throttling.
pub const DEFAULT_RETRYABLE_CODES: &[&str] = &[
    "ThrottlingException",
    "Throttling",
    "TooManyRequestsException",
    "RequestLimitExceeded",
];

/// Classify a remote result: codes in `not_found_codes` become [`ReconcileError::NotFound`],
/// codes in `retryable_codes` become [`ReconcileError::Retryable`], everything
/// else stays a terminal remote error.
pub fn classify<T>(
    result: std::result::Result<T, ApiError>,
    not_found_codes: &[&str],
    retryable_codes: &[String],
) -> Result<T> {
    result.map_err(|e| {
        if e.code_equals(not_found_codes) {
            ReconcileError::NotFound(e.to_string())
        } else if retryable_codes.iter().any(|c| *c == e.code) {
            ReconcileError::Retryable(e)
        } else {
            ReconcileError::Remote(e)
        }
    })
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_matching() {
        let err = ApiError::new(
            "InvalidParameterException",
            "The service does not have an associated load balancer.",
        );
        assert!(err.code_equals(&["ClusterNotFoundException", "InvalidParameterException"]));
        assert!(!err.code_equals(&["ClusterNotFoundException"]));
        assert!(err.message_contains(
            "InvalidParameterException",
            "does not have an associated load balancer"
        ));
        assert!(!err.message_contains("ValidationException", "load balancer"));
    }

    #[test]
    fn test_classify_not_found() {
        let res: std::result::Result<(), _> =
            Err(ApiError::new("RepositoryNotFoundException", "repository gone"));
        let err = classify(res, &["RepositoryNotFoundException"], &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let res: std::result::Result<(), _> = Err(ApiError::new("ValidationException", "bad"));
        let err = classify(res, &["RepositoryNotFoundException"], &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Terminal);
        assert_eq!(err.to_string(), "ValidationException: bad");
    }

    #[test]
    fn test_classify_throttling_is_retryable() {
        let retryable: Vec<String> = DEFAULT_RETRYABLE_CODES.iter().map(|c| c.to_string()).collect();

        let res: std::result::Result<(), _> = Err(ApiError::new("ThrottlingException", "slow"));
        let err = classify(res, &["RepositoryNotFoundException"], &retryable).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Retryable);
        assert!(err.code_equals(&["ThrottlingException"]));
        assert_eq!(err.to_string(), "ThrottlingException: slow");

        let res: std::result::Result<(), _> = Err(ApiError::new("ThrottlingException", "slow"));
        let err = classify(res, &[], &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Terminal);
    }
}
