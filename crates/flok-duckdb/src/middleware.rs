//! Attaches a DuckDB connection to every migration before it runs

use async_trait::async_trait;
use duckdb::Connection;
use flok_core::{BoxError, MigrationContext, Middleware, ScriptEnv, SqlConnection, SqlExecutor};
use log::Level;
use std::sync::Arc;

use crate::database::Database;
use crate::error::DuckDbResult;

/// Access to the database for one migration run.
///
/// Code-defined migrations fetch it with `ctx.extension::<DuckDbHandle>()`;
/// `sql:` operations of YAML migrations use it through [`SqlConnection`].
/// With a database file every call gets its own connection, so statements
/// that must share a transaction belong in one call.
#[derive(Clone)]
pub struct DuckDbHandle {
    db: Database,
}

impl DuckDbHandle {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    /// Run `f` with a connection
    pub fn with<R>(&self, f: impl FnOnce(&Connection) -> duckdb::Result<R>) -> DuckDbResult<R> {
        self.db.with_conn(|conn| Ok(f(conn)?))
    }
}

#[async_trait]
impl SqlExecutor for DuckDbHandle {
    async fn execute_batch(&self, sql: &str) -> Result<(), BoxError> {
        Ok(self.with(|conn| conn.execute_batch(sql))?)
    }
}

/// Middleware giving each migration access to the database holding the flok
/// tables.
///
/// Shell operations get its location as `FLOK_DATABASE_PATH`; the file is not
/// held open while a migration runs, so their own tools can open it.
pub struct DuckDbMiddleware {
    db: Database,
}

impl DuckDbMiddleware {
    /// Share the database of `backend`
    pub fn new(backend: &crate::DuckDbBackend) -> Self {
        Self {
            db: backend.database(),
        }
    }
}

#[async_trait]
impl Middleware for DuckDbMiddleware {
    fn name(&self) -> &str {
        "duckdb"
    }

    async fn before(&self, ctx: &mut MigrationContext) -> Result<(), BoxError> {
        let handle = DuckDbHandle::new(self.db.clone());
        ctx.logger().log(
            Level::Debug,
            format_args!(
                "[{}] attached duckdb database {}",
                ctx.id(),
                self.db.location()
            ),
        );

        let extensions = ctx.extensions_mut();
        extensions.insert(SqlConnection(Arc::new(handle.clone())));
        extensions.insert(handle);

        let mut env = extensions.remove::<ScriptEnv>().unwrap_or_default();
        env.set("FLOK_DATABASE_PATH", self.db.location());
        extensions.insert(env);
        Ok(())
    }
}
