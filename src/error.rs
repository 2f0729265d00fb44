//! Error type shared by every tsvbeam operation.
//!
//! Reconciliation, construction, and scheduling failures are never recovered
//! locally; they surface to the caller as an [`Error`] and abort the whole
//! operation. Use [`Error::kind`] to branch on the failure category without
//! matching on payloads.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad failure categories, independent of the variant payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EmptyInput,
    SchemaMismatch,
    InvalidDefaultColumn,
    TimeoutExceeded,
    ArityViolation,
    InvalidSchema,
    EmptyArgument,
    InvalidArgument,
    Cancelled,
    TaskFailed,
    WarningLimitExceeded,
    Io,
    Internal,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Merge or reconcile was called with no usable datasets.
    #[error("{context}: no usable datasets")]
    EmptyInput { context: String },

    /// Headers diverge and no reconciliation strategy applies.
    #[error("{context}: schema mismatch, expected {expected:?}, found {found:?}")]
    SchemaMismatch {
        context: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// A default value was supplied for a column that no input carries.
    #[error("default value given for unknown column: {column}")]
    InvalidDefaultColumn { column: String },

    /// The scheduler deadline was reached with work outstanding.
    #[error("timeout of {timeout:?} reached with {completed}/{total} tasks complete")]
    TimeoutExceeded {
        timeout: Duration,
        completed: usize,
        total: usize,
    },

    /// A row's field count disagrees with its header.
    #[error("row {row}: expected {expected} fields, found {found}")]
    ArityViolation {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("duplicate column in header: {column}")]
    DuplicateColumn { column: String },

    #[error("column not found: {column}")]
    MissingColumn { column: String },

    /// An explicitly empty collection was passed where one or more items are required.
    #[error("{context}: empty argument list")]
    EmptyArgument { context: String },

    /// A malformed argument, such as an unparseable date or a reversed date range.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("cancelled with {completed}/{total} tasks complete")]
    Cancelled { completed: usize, total: usize },

    #[error("task #{index} failed: {source}")]
    TaskFailed {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("{message} (repeated {count} times)")]
    WarningLimitExceeded { message: String, count: usize },

    #[error("worker pool: {0}")]
    Pool(String),

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl Error {
    /// The category this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput { .. } => ErrorKind::EmptyInput,
            Self::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Self::InvalidDefaultColumn { .. } => ErrorKind::InvalidDefaultColumn,
            Self::TimeoutExceeded { .. } => ErrorKind::TimeoutExceeded,
            Self::ArityViolation { .. } => ErrorKind::ArityViolation,
            Self::DuplicateColumn { .. } | Self::MissingColumn { .. } => ErrorKind::InvalidSchema,
            Self::EmptyArgument { .. } => ErrorKind::EmptyArgument,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::TaskFailed { .. } => ErrorKind::TaskFailed,
            Self::WarningLimitExceeded { .. } => ErrorKind::WarningLimitExceeded,
            Self::Io(_) => ErrorKind::Io,
            Self::Pool(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn empty_input(context: impl Into<String>) -> Self {
        Self::EmptyInput {
            context: context.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn schema_mismatch(
        context: impl Into<String>,
        expected: &[String],
        found: &[String],
    ) -> Self {
        Self::SchemaMismatch {
            context: context.into(),
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_groups_schema_errors() {
        let dup = Error::DuplicateColumn { column: "a".into() };
        let missing = Error::MissingColumn { column: "b".into() };
        assert_eq!(dup.kind(), ErrorKind::InvalidSchema);
        assert_eq!(missing.kind(), ErrorKind::InvalidSchema);
    }

    #[test]
    fn task_failure_keeps_source_in_message() {
        let err = Error::TaskFailed {
            index: 3,
            source: anyhow::anyhow!("disk on fire"),
        };
        assert_eq!(err.kind(), ErrorKind::TaskFailed);
        assert_eq!(err.to_string(), "task #3 failed: disk on fire");
    }

    #[test]
    fn anyhow_converts_to_io() {
        let err: Error = anyhow::anyhow!("open x.tsv").into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
