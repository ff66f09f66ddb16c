//! Persisted migration status records and the structured errors they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::CoreError;

/// Version of the engine stamped into every saved status record
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Direction a migration was last run in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMethod {
    /// Forward operation
    Up,
    /// Reverse operation
    Down,
}

impl fmt::Display for RunMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMethod::Up => write!(f, "up"),
            RunMethod::Down => write!(f, "down"),
        }
    }
}

/// Lifecycle state derived from a migration's status and live signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationState {
    /// Errored or changed since it last ran
    Blocked,
    /// Not yet applied (or reverted)
    Pending,
    /// Applied with `up` and healthy
    Done,
    /// None of the above
    Unknown,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationState::Blocked => write!(f, "blocked"),
            MigrationState::Pending => write!(f, "pending"),
            MigrationState::Done => write!(f, "done"),
            MigrationState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Outcome of the most recent execution attempt for one migration id.
///
/// Field names follow the on-disk JSON record format
/// (`id, title, runMethod, signature, runTime, error, engineVersion`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    /// Migration id this record belongs to
    pub id: String,

    /// Human label at the time of the run
    #[serde(default)]
    pub title: String,

    /// Direction of the last run
    #[serde(default)]
    pub run_method: Option<RunMethod>,

    /// Signature captured when the last run started
    #[serde(default)]
    pub signature: Option<String>,

    /// When the last run started
    #[serde(default)]
    pub run_time: Option<DateTime<Utc>>,

    /// Error of the last run, if it failed
    #[serde(default)]
    pub error: Option<StatusError>,

    /// Engine version that wrote the record
    #[serde(default, alias = "flokVersion")]
    pub engine_version: Option<String>,
}

impl MigrationStatus {
    /// Create the empty status of a migration that has never run
    pub fn empty(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            run_method: None,
            signature: None,
            run_time: None,
            error: None,
            engine_version: None,
        }
    }
}

/// A serializable error: message, trace, kind name and arbitrary extra fields.
///
/// Migrations may return a `StatusError` directly to attach fields
/// (exit codes, row counts, ...) that should survive into the status record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusError {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    #[serde(default = "default_error_name")]
    pub name: String,

    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

fn default_error_name() -> String {
    "Error".to_string()
}

impl StatusError {
    /// Create an error with a kind name and message
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Attach an extra field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Convert any error into a structured one.
    ///
    /// A `StatusError` passes through unchanged; a [`CoreError`] keeps its kind
    /// name; anything else becomes an `ExecutionError`. The source chain is
    /// recorded as the trace.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        if let Some(status) = err.downcast_ref::<StatusError>() {
            return status.clone();
        }
        let name = err
            .downcast_ref::<CoreError>()
            .map(CoreError::name)
            .unwrap_or("ExecutionError");

        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {cause}"));
            source = cause.source();
        }

        Self {
            message: err.to_string(),
            stack: (!chain.is_empty()).then(|| chain.join("\n")),
            name: name.to_string(),
            fields: BTreeMap::new(),
        }
    }
}

impl From<&CoreError> for StatusError {
    fn from(err: &CoreError) -> Self {
        StatusError::from_error(err)
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for StatusError {}

#[cfg(test)]
#[path = "status_test.rs"]
mod tests;
