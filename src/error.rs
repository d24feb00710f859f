use chrono::{DateTime, Utc};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LimitError {
    /// The name has no public-suffix match, so its registrable domain is unknown.
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    /// `from` is after `to`, or the window does not fit the timestamp range.
    #[error("Invalid window: from {from}, to {to}")]
    InvalidWindow {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("Storage error during {context}: {source}")]
    Storage {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

impl LimitError {
    /// Wrap a storage failure, turning SQLite interrupts into `Cancelled`.
    pub fn storage(context: &'static str, source: rusqlite::Error) -> Self {
        match source.sqlite_error_code() {
            Some(ErrorCode::OperationInterrupted) => LimitError::Cancelled,
            _ => LimitError::Storage { context, source },
        }
    }

    /// Whether retrying the same call could succeed. Malformed input and
    /// cancellation never become valid by retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            LimitError::Storage { source, .. } => matches!(
                source.sqlite_error_code(),
                Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
            ),
            LimitError::Pool(_) => true,
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for LimitError {
    fn from(e: rusqlite::Error) -> Self {
        LimitError::storage("query", e)
    }
}

pub type Result<T> = std::result::Result<T, LimitError>;
