//! Error taxonomy for the analysis engine.
//!
//! Pipelines never fail on empty inputs; they return zero-filled reports.
//! Everything that can fail maps onto one of the kinds below so the CLI can
//! pick the right exit code (1 for user errors, 2 for internal ones).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum XraysError {
    /// Invalid window spec, unknown ref, non-repo path. Surfaced verbatim.
    #[error("{0}")]
    Input(String),

    /// Git adapter failure after one retry; carries the failing path or ref.
    #[error("git adapter error: {0}")]
    Adapter(String),

    /// Analysis could not proceed; distinct from the empty-window case,
    /// which degrades to a zero-filled report instead.
    #[error("analysis error: {0}")]
    Analysis(String),

    /// Run store failure. Fatal; nothing is partially persisted.
    #[error("store error: {0}")]
    Store(String),

    /// Run id lookup miss, returned as a typed result to callers.
    #[error("run not found: {0}")]
    NotFound(String),

    /// Cooperative cancellation between pipeline stages.
    #[error("analysis cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, XraysError>;

impl XraysError {
    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            XraysError::Input(_) => 1,
            _ => 2,
        }
    }
}

impl From<redb::Error> for XraysError {
    fn from(e: redb::Error) -> Self {
        XraysError::Store(e.to_string())
    }
}

impl From<redb::DatabaseError> for XraysError {
    fn from(e: redb::DatabaseError) -> Self {
        XraysError::Store(e.to_string())
    }
}

impl From<redb::TransactionError> for XraysError {
    fn from(e: redb::TransactionError) -> Self {
        XraysError::Store(e.to_string())
    }
}

impl From<redb::TableError> for XraysError {
    fn from(e: redb::TableError) -> Self {
        XraysError::Store(e.to_string())
    }
}

impl From<redb::StorageError> for XraysError {
    fn from(e: redb::StorageError) -> Self {
        XraysError::Store(e.to_string())
    }
}

impl From<redb::CommitError> for XraysError {
    fn from(e: redb::CommitError) -> Self {
        XraysError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for XraysError {
    fn from(e: serde_json::Error) -> Self {
        XraysError::Store(format!("serialization: {e}"))
    }
}
