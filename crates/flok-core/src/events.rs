//! Notifications broadcast by the engine as pipeline stages complete

use serde::Serialize;

use crate::status::RunMethod;

/// Default capacity of the event channel
pub const EVENT_CAPACITY: usize = 64;

/// One completed pipeline stage or operation. Failed stages emit nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Locked,
    MigrationsLoaded { count: usize },
    StatusLoaded { count: usize },
    Sorted { order: Vec<String> },
    ChangedChecked,
    BlockedChecked,
    MigrationCompleted { id: String, method: RunMethod },
    StatusSaved { id: String },
    Executed { method: RunMethod, count: usize },
    StatusCleared { id: String },
    Unlocked,
}
