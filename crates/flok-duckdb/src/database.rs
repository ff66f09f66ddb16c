//! Connections to the database holding the flok tables.
//!
//! DuckDB lets one process at a time open a database file for writing. A
//! file database is therefore opened for each unit of work and closed right
//! after it, so a concurrent flok run reaches the lock table (and sees the
//! lock) and tools started by a migration can open the file in between. An
//! in-memory database lives only as long as its connection and is shared.

use duckdb::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{DuckDbError, DuckDbResult};

/// How long to wait for another process to close the database file
const OPEN_ATTEMPTS: u32 = 100;
const OPEN_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Source of connections to one database
#[derive(Clone)]
pub(crate) enum Database {
    /// Shared connection to an in-memory database
    Memory(Arc<Mutex<Connection>>),
    /// Database file, opened per unit of work
    File(PathBuf),
}

impl Database {
    pub(crate) fn in_memory() -> DuckDbResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DuckDbError::ConnectionError(e.to_string()))?;
        Ok(Database::Memory(Arc::new(Mutex::new(conn))))
    }

    /// Use a database file, creating its parent directory.
    ///
    /// Relative paths are made absolute so the location stays valid for
    /// migrations running in another directory.
    pub(crate) fn file(path: &Path) -> DuckDbResult<Self> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| DuckDbError::ConnectionError(format!("{}: {}", path.display(), e)))?
                .join(path)
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DuckDbError::ConnectionError(format!("{}: {}", parent.display(), e))
            })?;
        }
        Ok(Database::File(path))
    }

    /// `:memory:` or the file path
    pub(crate) fn location(&self) -> String {
        match self {
            Database::Memory(_) => ":memory:".to_string(),
            Database::File(path) => path.display().to_string(),
        }
    }

    /// Run `f` with a connection. File connections are closed when `f` returns.
    pub(crate) fn with_conn<R>(
        &self,
        f: impl FnOnce(&Connection) -> DuckDbResult<R>,
    ) -> DuckDbResult<R> {
        match self {
            Database::Memory(conn) => {
                let conn = conn
                    .lock()
                    .map_err(|e| DuckDbError::MutexPoisoned(e.to_string()))?;
                f(&conn)
            }
            Database::File(path) => {
                let conn = open_file(path)?;
                f(&conn)
            }
        }
    }
}

/// Open a database file, waiting while another process has it open
fn open_file(path: &Path) -> DuckDbResult<Connection> {
    let mut attempts = 0;
    loop {
        match Connection::open(path) {
            Ok(conn) => return Ok(conn),
            Err(e) if is_file_lock_conflict(&e) && attempts < OPEN_ATTEMPTS => {
                attempts += 1;
                std::thread::sleep(OPEN_RETRY_DELAY);
            }
            Err(e) => {
                return Err(DuckDbError::ConnectionError(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }
}

fn is_file_lock_conflict(err: &duckdb::Error) -> bool {
    err.to_string().contains("Could not set lock on file")
}
