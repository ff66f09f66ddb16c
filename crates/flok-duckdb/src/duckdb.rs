//! DuckDB persistence backend
//!
//! Keeps the run lock and the migration status records in two tables of one
//! database:
//!
//! - `flok_lock`: at most one row, keyed by [`LOCK_ID`]
//! - `flok_status`: one row per migration id
//!
//! Records are stored as JSON text in the same format the file backend uses.

use async_trait::async_trait;
use duckdb::params;
use flok_core::lock::hostname;
use flok_core::{
    CoreError, CoreResult, EngineLogger, LockProvider, LockRecord, MigrationStatus, StatusStore,
    LOCK_ID,
};
use log::Level;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::database::Database;
use crate::error::{DuckDbError, DuckDbResult};

const LOCK_TABLE: &str = "flok_lock";
const STATUS_TABLE: &str = "flok_status";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS flok_lock (
    id VARCHAR PRIMARY KEY,
    record VARCHAR NOT NULL,
    created_at TIMESTAMP DEFAULT current_timestamp
);
CREATE TABLE IF NOT EXISTS flok_status (
    id VARCHAR PRIMARY KEY,
    record VARCHAR NOT NULL,
    updated_at TIMESTAMP DEFAULT current_timestamp
);
";

/// Lock provider and status store backed by DuckDB
pub struct DuckDbBackend {
    db: Database,
    lease: Option<Duration>,
    logger: EngineLogger,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB backend
    pub fn in_memory() -> DuckDbResult<Self> {
        Self::with_database(Database::in_memory()?)
    }

    /// Use (or create) a database file.
    ///
    /// The file is opened only while a statement runs.
    pub fn from_path(path: &Path) -> DuckDbResult<Self> {
        Self::with_database(Database::file(path)?)
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DuckDbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn with_database(db: Database) -> DuckDbResult<Self> {
        db.with_conn(|conn| {
            conn.execute_batch(SCHEMA)
                .map_err(|e| DuckDbError::ExecutionError(format!("creating flok tables: {}", e)))
        })?;
        Ok(Self {
            db,
            lease: None,
            logger: EngineLogger::discard(),
        })
    }

    /// Treat locks older than `lease` as stale and take them over
    pub fn with_lease(mut self, lease: Option<Duration>) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_logger(mut self, logger: EngineLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Database location, `:memory:` for in-memory databases
    pub fn path(&self) -> String {
        self.db.location()
    }

    /// Connection source shared with [`crate::DuckDbMiddleware`]
    pub(crate) fn database(&self) -> Database {
        self.db.clone()
    }

    fn fetch_lock_sync(&self) -> DuckDbResult<Option<LockRecord>> {
        let raw = self.db.with_conn(|conn| {
            match conn.query_row(
                "SELECT record FROM flok_lock WHERE id = ?",
                params![LOCK_ID],
                |row| row.get::<_, String>(0),
            ) {
                Ok(raw) => Ok(Some(raw)),
                Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })?;
        raw.map(|raw| parse_record(LOCK_TABLE, &raw)).transpose()
    }

    /// Insert the lock row unless one exists. Returns whether it was inserted.
    fn insert_lock_sync(&self, record: &LockRecord) -> DuckDbResult<bool> {
        let json = to_json(LOCK_TABLE, record)?;
        let inserted = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "INSERT INTO flok_lock (id, record) VALUES (?, ?) ON CONFLICT DO NOTHING",
                params![LOCK_ID, json],
            )?)
        })?;
        Ok(inserted > 0)
    }

    fn delete_lock_sync(&self) -> DuckDbResult<Option<LockRecord>> {
        let removed = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("DELETE FROM flok_lock WHERE id = ? RETURNING record")?;
            let rows = stmt
                .query_map(params![LOCK_ID], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        removed
            .first()
            .map(|raw| parse_record(LOCK_TABLE, raw))
            .transpose()
    }

    /// Remove the existing lock if the lease says it is stale
    fn expire_stale_sync(&self, existing: &LockRecord) -> DuckDbResult<bool> {
        let Some(lease) = self.lease else {
            return Ok(false);
        };
        if existing.age() <= lease {
            return Ok(false);
        }
        self.logger.log(
            Level::Warn,
            format_args!(
                "lock held by {} since {} exceeded its lease of {}s; taking it over",
                existing.holder(),
                existing.date.to_rfc3339(),
                lease.as_secs()
            ),
        );
        Ok(self.delete_lock_sync()?.is_some())
    }

    fn load_statuses_sync(&self) -> DuckDbResult<HashMap<String, MigrationStatus>> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, record FROM flok_status")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(id, raw)| parse_record(STATUS_TABLE, &raw).map(|status| (id, status)))
            .collect()
    }

    fn save_status_sync(&self, status: &MigrationStatus) -> DuckDbResult<()> {
        let json = to_json(STATUS_TABLE, status)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO flok_status (id, record, updated_at) VALUES (?, ?, current_timestamp)",
                params![status.id, json],
            )?;
            Ok(())
        })
    }

    fn clear_status_sync(&self, id: &str) -> DuckDbResult<bool> {
        let deleted = self
            .db
            .with_conn(|conn| Ok(conn.execute("DELETE FROM flok_status WHERE id = ?", params![id])?))?;
        Ok(deleted > 0)
    }
}

fn parse_record<T: serde::de::DeserializeOwned>(table: &str, raw: &str) -> DuckDbResult<T> {
    serde_json::from_str(raw).map_err(|e| DuckDbError::RecordError {
        table: table.to_string(),
        message: e.to_string(),
    })
}

fn to_json<T: serde::Serialize>(table: &str, value: &T) -> DuckDbResult<String> {
    serde_json::to_string(value).map_err(|e| DuckDbError::RecordError {
        table: table.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl LockProvider for DuckDbBackend {
    async fn acquire(&self) -> CoreResult<LockRecord> {
        let record = LockRecord::current();
        if self.insert_lock_sync(&record)? {
            self.logger
                .log(Level::Info, format_args!("locked with pid {}", record.pid));
            return Ok(record);
        }

        let existing = self.fetch_lock_sync()?;
        if let Some(existing) = &existing {
            self.logger.log(
                Level::Warn,
                format_args!(
                    "lock already held by {} ({}) since {}",
                    existing.holder(),
                    existing.username,
                    existing.date.to_rfc3339()
                ),
            );
            if self.expire_stale_sync(existing)? && self.insert_lock_sync(&record)? {
                return Ok(record);
            }
        }
        Err(CoreError::AlreadyLocked {
            holder: existing.map(|r| r.holder()),
        })
    }

    async fn release(&self) -> CoreResult<Option<LockRecord>> {
        let removed = self.delete_lock_sync()?;
        match &removed {
            None => self
                .logger
                .log(Level::Warn, format_args!("no lock present to remove")),
            Some(record) if record.hostname != hostname() => self.logger.log(
                Level::Warn,
                format_args!(
                    "removed lock taken by another host ({})",
                    record.holder()
                ),
            ),
            Some(_) => {}
        }
        Ok(removed)
    }

    async fn inspect(&self) -> CoreResult<Option<LockRecord>> {
        Ok(self.fetch_lock_sync()?)
    }

    fn describe(&self) -> String {
        format!("duckdb lock table in {}", self.db.location())
    }
}

#[async_trait]
impl StatusStore for DuckDbBackend {
    async fn load_all(&self) -> CoreResult<HashMap<String, MigrationStatus>> {
        Ok(self.load_statuses_sync()?)
    }

    async fn save(&self, status: &MigrationStatus) -> CoreResult<()> {
        Ok(self.save_status_sync(status)?)
    }

    async fn clear(&self, id: &str) -> CoreResult<bool> {
        Ok(self.clear_status_sync(id)?)
    }

    fn describe(&self) -> String {
        format!("duckdb status table in {}", self.db.location())
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
