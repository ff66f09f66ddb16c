//! Error types for flok-core

use std::path::PathBuf;
use thiserror::Error;

use crate::status::{RunMethod, StatusError};

/// Core error type for flok
#[derive(Error, Debug)]
pub enum CoreError {
    /// E001: Configuration file not found
    #[error("[E001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// E002: Invalid configuration value
    #[error("[E002] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// E003: Migrations directory not found
    #[error("[E003] no directory found at {path}")]
    MigrationsDirNotFound { path: String },

    /// E004: Migrations directory has no migration definitions
    #[error("[E004] no migrations found in {path}")]
    NoMigrations { path: String },

    /// E005: Malformed migration unit
    #[error("[E005] invalid migration {migration}: {reason}")]
    Validation { migration: String, reason: String },

    /// E006: Circular dependency between migrations
    #[error("[E006] Circular dependency detected: {cycle}")]
    Cycle { cycle: String },

    /// L001: Another invocation holds the lock
    #[error("[L001] lock already exists{}", held_by(.holder))]
    AlreadyLocked { holder: Option<String> },

    /// L002: Release requested but no lock is present
    #[error("[L002] lock does not exist to be removed")]
    NotLocked,

    /// M001: Migrations whose source changed after they were run
    #[error("[M001] found changed migrations: {}", .ids.join(", "))]
    ChangedMigrations { ids: Vec<String> },

    /// M002: Migrations with an unresolved prior failure
    #[error("[M002] found blocked migrations: {}", .ids.join(", "))]
    BlockedMigrations { ids: Vec<String> },

    /// M003: The migration's own operation failed
    #[error("[M003] error executing {method} on [{title}]: {}", .error.message)]
    Execution {
        id: String,
        title: String,
        method: RunMethod,
        error: StatusError,
    },

    /// P001: Lock or status backend I/O failed
    #[error("[P001] persistence failed: {message}")]
    Persistence { message: String },

    /// P002: The outcome of an executed migration could not be recorded
    #[error("[P002] unable to save result of migration {id}: {message}; manual status reconciliation required{}", dumped_to(.dump_path))]
    StatusNotRecorded {
        id: String,
        message: String,
        dump_path: Option<PathBuf>,
        execution: Option<StatusError>,
    },

    /// P003: IO error with file path context
    #[error("[P003] Failed to access '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// P004: IO error
    #[error("[P004] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// P005: YAML parse error
    #[error("[P005] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Stable kind name, recorded as `name` when the error lands in a status record.
    pub fn name(&self) -> &'static str {
        match self {
            CoreError::ConfigNotFound { .. } | CoreError::ConfigInvalid { .. } => "ConfigError",
            CoreError::MigrationsDirNotFound { .. } | CoreError::NoMigrations { .. } => {
                "LoadError"
            }
            CoreError::Validation { .. } => "ValidationError",
            CoreError::Cycle { .. } => "CycleError",
            CoreError::AlreadyLocked { .. } => "AlreadyLocked",
            CoreError::NotLocked => "NotLocked",
            CoreError::ChangedMigrations { .. } => "ChangedMigrationError",
            CoreError::BlockedMigrations { .. } => "BlockedMigrationError",
            CoreError::Execution { .. } => "ExecutionError",
            CoreError::Persistence { .. }
            | CoreError::StatusNotRecorded { .. }
            | CoreError::IoWithPath { .. }
            | CoreError::Io(_)
            | CoreError::YamlParse(_)
            | CoreError::Json(_) => "PersistenceError",
        }
    }

    /// Shorthand for a [`CoreError::Validation`].
    pub fn validation(migration: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::Validation {
            migration: migration.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`CoreError::Persistence`].
    pub fn persistence(message: impl Into<String>) -> Self {
        CoreError::Persistence {
            message: message.into(),
        }
    }
}

fn held_by(holder: &Option<String>) -> String {
    holder
        .as_ref()
        .map(|h| format!(" (held by {h})"))
        .unwrap_or_default()
}

fn dumped_to(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" (status dumped to {})", p.display()))
        .unwrap_or_default()
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
