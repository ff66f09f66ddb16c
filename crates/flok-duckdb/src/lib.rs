//! flok-duckdb - DuckDB persistence backend for flok
//!
//! This crate keeps the run lock and the migration status records in a DuckDB
//! database, and provides a middleware that hands each migration a
//! connection to that database.

mod database;
pub mod duckdb;
pub mod error;
pub mod middleware;

pub use self::duckdb::DuckDbBackend;
pub use error::{DuckDbError, DuckDbResult};
pub use middleware::{DuckDbHandle, DuckDbMiddleware};
