//! flok-core - Core library for flok
//!
//! This crate provides the migration entity and its status model, the
//! dependency sorter, the lock and status store contracts with their file
//! backends, YAML migration loading, configuration parsing, and the
//! orchestration engine that drives `up` and `down` runs.

pub mod checksum;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod loader;
pub mod lock;
pub mod logger;
pub mod middleware;
pub mod migration;
pub mod script;
pub mod sorter;
pub mod status;
pub mod store;

#[cfg(test)]
mod test_utils;

pub use checksum::compute_checksum;
pub use config::{Backend, Config, DatabaseConfig};
pub use engine::{Engine, EngineBuilder, RunReport};
pub use error::{CoreError, CoreResult};
pub use events::EngineEvent;
pub use graph::DependencyGraph;
pub use loader::{DirectorySource, MigrationSource, StaticSource};
pub use lock::{FileLock, LockProvider, LockRecord, LOCK_ID};
pub use logger::{EngineLogger, NopLogger};
pub use middleware::Middleware;
pub use migration::{BoxError, Extensions, Migration, MigrationContext, MigrationUnit, SourceRef};
pub use script::{Operation, ScriptEnv, ScriptMigration, SqlConnection, SqlExecutor};
pub use sorter::{sort_down, sort_up};
pub use status::{MigrationState, MigrationStatus, RunMethod, StatusError, ENGINE_VERSION};
pub use store::{slugify, FileStatusStore, StatusStore};
