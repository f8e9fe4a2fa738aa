//! Unified error types for docrepo.
//!
//! All crates map their internal errors into [`AppError`] for consistent
//! propagation through the ? operator.

use std::fmt;
use thiserror::Error;

use crate::types::batch::BatchFailureReport;

/// Top-level error kind categorization used across the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The requested entity was not found.
    NotFound,
    /// The target entity is soft-deleted and the caller did not bypass the check.
    SoftDeleted,
    /// Input validation failed.
    Validation,
    /// A stored document could not be mapped to the typed entity.
    Decode,
    /// Some operations of a multi-chunk batch failed while others committed.
    PartialBatchFailure,
    /// The backing store reported a failure (network, permission, quota).
    BackingStore,
    /// The entity version did not match the caller's expected version.
    VersionConflict,
    /// A transaction lost a race with a concurrent writer and may be retried.
    Contention,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// A configuration error occurred.
    Configuration,
    /// The requested primitive is not supported by the backing store.
    NotImplemented,
    /// An internal error occurred.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::SoftDeleted => write!(f, "SOFT_DELETED"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::Decode => write!(f, "DECODE"),
            Self::PartialBatchFailure => write!(f, "PARTIAL_BATCH_FAILURE"),
            Self::BackingStore => write!(f, "BACKING_STORE"),
            Self::VersionConflict => write!(f, "VERSION_CONFLICT"),
            Self::Contention => write!(f, "CONTENTION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::NotImplemented => write!(f, "NOT_IMPLEMENTED"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The unified error used throughout docrepo.
///
/// Store and codec failures are mapped into `AppError` using `From` impls
/// or explicit `.map_err()` calls. Batch failures additionally carry a
/// [`BatchFailureReport`] describing every failed item.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Per-item failure report for batch operations.
    pub batch: Option<Box<BatchFailureReport>>,
}

impl AppError {
    /// Create a new error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            batch: None,
        }
    }

    /// Create a new error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
            batch: None,
        }
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a soft-deleted conflict error.
    pub fn soft_deleted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SoftDeleted, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a backing store error.
    pub fn backing_store(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackingStore, message)
    }

    /// Create a version conflict error.
    pub fn version_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::VersionConflict, message)
    }

    /// Create a transaction contention error.
    pub fn contention(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Contention, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a not-implemented error.
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Build the aggregated error for a batch with at least one failure.
    ///
    /// If any chunk committed the kind is [`ErrorKind::PartialBatchFailure`].
    /// If nothing committed, the first failure's own kind is kept so that
    /// callers can tell the two situations apart.
    pub fn from_batch_report(report: BatchFailureReport) -> Self {
        let (kind, first) = match report.failures.first() {
            Some(first) if report.nothing_committed() => (first.error.kind, first.error.message.clone()),
            Some(first) => (ErrorKind::PartialBatchFailure, first.error.message.clone()),
            None => (ErrorKind::Internal, "batch report without failures".to_string()),
        };
        let message = format!(
            "{} of {} batch operations failed ({} written): {first}",
            report.failures.len(),
            report.attempted,
            report.written_count,
        );
        Self {
            kind,
            message,
            source: None,
            batch: Some(Box::new(report)),
        }
    }

    /// Return the batch failure report, if this error came from a batch.
    pub fn batch_report(&self) -> Option<&BatchFailureReport> {
        self.batch.as_deref()
    }

    /// Whether a transaction failing with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Contention
    }

    /// Whether this error is a not-found error.
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
            batch: self.batch.clone(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
