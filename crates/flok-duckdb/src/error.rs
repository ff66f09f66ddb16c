//! Error types for flok-duckdb

use flok_core::CoreError;
use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DuckDbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// Stored record could not be read or written (D003)
    #[error("[D003] Invalid record in {table}: {message}")]
    RecordError { table: String, message: String },

    /// Mutex poisoned (D006)
    #[error("[D006] Database mutex poisoned: {0}")]
    MutexPoisoned(String),
}

/// Result type alias for DuckDbError
pub type DuckDbResult<T> = Result<T, DuckDbError>;

impl From<duckdb::Error> for DuckDbError {
    fn from(err: duckdb::Error) -> Self {
        DuckDbError::ExecutionError(err.to_string())
    }
}

impl From<DuckDbError> for CoreError {
    fn from(err: DuckDbError) -> Self {
        CoreError::Persistence {
            message: err.to_string(),
        }
    }
}
