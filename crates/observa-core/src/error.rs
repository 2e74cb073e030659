//! Error types for `Observa`.
//!
//! Every public entry point of the engine returns [`Result`], so callers
//! can pattern-match the outcome kind instead of catching panics. Error
//! codes follow the pattern `OBS-XXX`.

use thiserror::Error;

use crate::model::SubjectId;
use crate::time_period::InvalidRangeError;

/// Result type alias for `Observa` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], used by callers to map failures
/// onto their own response types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The requested subject does not exist.
    NotFound,
    /// The query is malformed and was rejected before touching storage.
    Validation,
    /// The caller is not allowed to run the query.
    Forbidden,
    /// The query was cancelled by the caller.
    Cancelled,
    /// Storage, IO or other infrastructure failure.
    Infrastructure,
}

/// Errors that can occur in `Observa` operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Subject not found (OBS-001).
    #[error("[OBS-001] Subject '{0}' not found")]
    SubjectNotFound(SubjectId),

    /// Malformed time period range (OBS-002).
    #[error("[OBS-002] Invalid time period range: {0}")]
    InvalidTimePeriodRange(#[from] InvalidRangeError),

    /// Malformed query (OBS-003).
    #[error("[OBS-003] Invalid query: {0}")]
    InvalidQuery(String),

    /// Caller-side authorization failure (OBS-004).
    #[error("[OBS-004] Forbidden: {0}")]
    Forbidden(String),

    /// Query still exceeds the cell budget after cropping (OBS-005).
    #[error("[OBS-005] Query too large: estimated {estimate} cells exceeds maximum of {max}")]
    QueryTooLarge {
        /// Estimated number of result cells after cropping.
        estimate: u64,
        /// Configured ceiling.
        max: u64,
    },

    /// Query cancelled (OBS-006).
    #[error("[OBS-006] Query cancelled during {0}")]
    Cancelled(String),

    /// Storage error (OBS-007).
    #[error("[OBS-007] Storage error: {0}")]
    Storage(String),

    /// Data violating the observation schema (OBS-008).
    #[error("[OBS-008] Invalid data: {0}")]
    InvalidData(String),

    /// Configuration error (OBS-009).
    #[error("[OBS-009] Configuration error: {0}")]
    Config(String),

    /// IO error (OBS-010).
    #[error("[OBS-010] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (OBS-011).
    #[error("[OBS-011] Serialization error: {0}")]
    Serialization(String),

    /// Internal error (OBS-012).
    ///
    /// Indicates an unexpected internal error such as a panicked blocking task.
    #[error("[OBS-012] Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code (e.g., "OBS-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SubjectNotFound(_) => "OBS-001",
            Self::InvalidTimePeriodRange(_) => "OBS-002",
            Self::InvalidQuery(_) => "OBS-003",
            Self::Forbidden(_) => "OBS-004",
            Self::QueryTooLarge { .. } => "OBS-005",
            Self::Cancelled(_) => "OBS-006",
            Self::Storage(_) => "OBS-007",
            Self::InvalidData(_) => "OBS-008",
            Self::Config(_) => "OBS-009",
            Self::Io(_) => "OBS-010",
            Self::Serialization(_) => "OBS-011",
            Self::Internal(_) => "OBS-012",
        }
    }

    /// Returns the outcome kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::SubjectNotFound(_) => ErrorKind::NotFound,
            Self::InvalidTimePeriodRange(_) | Self::InvalidQuery(_) | Self::QueryTooLarge { .. } => {
                ErrorKind::Validation
            }
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Storage(_)
            | Self::InvalidData(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Internal(_) => ErrorKind::Infrastructure,
        }
    }

    /// Returns true if this error is recoverable by the caller.
    ///
    /// Validation failures can be fixed by changing the query; internal
    /// errors cannot.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Internal(_) | Self::InvalidData(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(err: uuid::Error) -> Self {
        Self::Storage(format!("malformed identifier: {err}"))
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
