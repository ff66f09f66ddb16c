//! The orchestration engine.
//!
//! Every pipeline is a fixed sequence of stages, each gated on the previous:
//!
//! ```text
//! lock -> load migrations -> load status -> sort -> check changed
//!      -> check blocked -> execute -> unlock
//! ```
//!
//! Execution is strictly sequential and fail-fast. The status of each
//! migration is persisted before the next one starts. Once the lock is held
//! it is always released, whatever happened in between.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::error::{CoreError, CoreResult};
use crate::events::{EngineEvent, EVENT_CAPACITY};
use crate::loader::MigrationSource;
use crate::lock::{FileLock, LockProvider, LockRecord};
use crate::logger::{emit, EngineLogger};
use crate::middleware::Middleware;
use crate::migration::Migration;
use crate::sorter::{sort_down, sort_up};
use crate::status::{RunMethod, StatusError, ENGINE_VERSION};
use crate::store::{FileStatusStore, StatusStore};

/// Summary of one `up` or `down` invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Ids executed, in execution order
    pub executed: Vec<String>,
    /// Migrations that were pending before execution started
    pub pending: usize,
    /// Migrations in the loaded set
    pub total: usize,
}

/// Drives migrations through the lock/load/sort/execute/record pipeline
pub struct Engine {
    source: Arc<dyn MigrationSource>,
    lock: Arc<dyn LockProvider>,
    store: Arc<dyn StatusStore>,
    middleware: Vec<Arc<dyn Middleware>>,
    logger: EngineLogger,
    events: broadcast::Sender<EngineEvent>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("source", &self.source.describe())
            .field("lock", &self.lock.describe())
            .field("store", &self.store.describe())
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Receive an [`EngineEvent`] for every completed stage
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn logger(&self) -> &EngineLogger {
        &self.logger
    }

    /// Apply every pending migration in dependency order
    pub async fn up(&self) -> CoreResult<RunReport> {
        self.migrate(RunMethod::Up).await
    }

    /// Revert the most recently applied migration
    pub async fn down(&self) -> CoreResult<RunReport> {
        self.migrate(RunMethod::Down).await
    }

    /// Load migrations with their status in `up` order, without locking
    pub async fn load(&self) -> CoreResult<Vec<Migration>> {
        self.load_sorted(RunMethod::Up).await
    }

    /// Remove the recorded status of `id` so a changed or errored migration
    /// can run again. Returns whether a record existed.
    pub async fn clear(&self, id: &str) -> CoreResult<bool> {
        self.with_lock(async {
            let existed = self.store.clear(id).await?;
            if existed {
                emit!(self.logger, Info, "cleared status of {}", id);
            } else {
                emit!(self.logger, Warn, "no status recorded for {}", id);
            }
            self.notify(EngineEvent::StatusCleared { id: id.to_string() });
            Ok(existed)
        })
        .await
    }

    /// Current lock holder, if any
    pub async fn lock_status(&self) -> CoreResult<Option<LockRecord>> {
        self.lock.inspect().await
    }

    /// Remove a lock left behind by a crashed run
    pub async fn force_unlock(&self) -> CoreResult<Option<LockRecord>> {
        let removed = self.lock.release().await?;
        if let Some(record) = &removed {
            emit!(
                self.logger,
                Warn,
                "removed lock held by {} since {}",
                record.holder(),
                record.date.to_rfc3339()
            );
        }
        self.notify(EngineEvent::Unlocked);
        Ok(removed)
    }

    async fn migrate(&self, method: RunMethod) -> CoreResult<RunReport> {
        self.with_lock(self.migrate_locked(method)).await
    }

    /// Run `work` under the lock, releasing it afterwards even on failure.
    ///
    /// The work's error wins over an unlock error; the latter is logged.
    async fn with_lock<T, F>(&self, work: F) -> CoreResult<T>
    where
        F: std::future::Future<Output = CoreResult<T>>,
    {
        self.lock.acquire().await?;
        emit!(self.logger, Debug, "acquired {}", self.lock.describe());
        self.notify(EngineEvent::Locked);

        let outcome = work.await;

        match (outcome, self.unlock().await) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(unlock_err)) => Err(unlock_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(unlock_err)) => {
                emit!(self.logger, Error, "unable to release lock: {}", unlock_err);
                Err(e)
            }
        }
    }

    async fn unlock(&self) -> CoreResult<()> {
        self.lock.release().await?;
        emit!(self.logger, Debug, "released {}", self.lock.describe());
        self.notify(EngineEvent::Unlocked);
        Ok(())
    }

    async fn migrate_locked(&self, method: RunMethod) -> CoreResult<RunReport> {
        let mut migrations = self.load_sorted(method).await?;

        check_changed(&migrations)?;
        self.notify(EngineEvent::ChangedChecked);
        check_blocked(&migrations)?;
        self.notify(EngineEvent::BlockedChecked);

        let queue: Vec<usize> = match method {
            RunMethod::Up => (0..migrations.len())
                .filter(|&i| migrations[i].is_pending())
                .collect(),
            RunMethod::Down => migrations
                .iter()
                .position(Migration::is_done)
                .into_iter()
                .collect(),
        };

        let mut report = RunReport {
            executed: Vec::with_capacity(queue.len()),
            pending: queue.len(),
            total: migrations.len(),
        };
        emit!(
            self.logger,
            Info,
            "{} of {} migrations pending {} execution",
            report.pending,
            report.total,
            method
        );

        for idx in queue {
            let migration = &mut migrations[idx];
            self.execute(migration, method).await?;
            report.executed.push(migration.id().to_string());
        }

        self.notify(EngineEvent::Executed {
            method,
            count: report.executed.len(),
        });
        Ok(report)
    }

    async fn load_sorted(&self, method: RunMethod) -> CoreResult<Vec<Migration>> {
        let units = self.source.load(&self.logger).await?;

        let mut seen = HashSet::with_capacity(units.len());
        let mut migrations = Vec::with_capacity(units.len());
        for unit in units {
            let migration = Migration::new(unit, self.logger.clone())?;
            if !seen.insert(migration.id().to_string()) {
                return Err(CoreError::validation(
                    migration.id(),
                    format!("duplicate migration id (defined again in {})", migration.source()),
                ));
            }
            migrations.push(migration);
        }
        emit!(
            self.logger,
            Debug,
            "loaded {} migrations from {}",
            migrations.len(),
            self.source.describe()
        );
        self.notify(EngineEvent::MigrationsLoaded {
            count: migrations.len(),
        });

        let mut statuses = self.store.load_all().await?;
        let recorded = statuses.len();
        for migration in &mut migrations {
            if let Some(status) = statuses.remove(migration.id()) {
                migration.set_status(status);
            }
        }
        for orphan in statuses.keys() {
            emit!(self.logger, Debug, "status recorded for unknown migration {}", orphan);
        }
        self.notify(EngineEvent::StatusLoaded { count: recorded });

        let sorted = match method {
            RunMethod::Up => sort_up(migrations)?,
            RunMethod::Down => sort_down(migrations),
        };
        self.notify(EngineEvent::Sorted {
            order: sorted.iter().map(|m| m.id().to_string()).collect(),
        });
        Ok(sorted)
    }

    /// Middleware, then the operation, then the status write.
    async fn execute(&self, migration: &mut Migration, method: RunMethod) -> CoreResult<()> {
        let available = match method {
            RunMethod::Up => migration.has_up(),
            RunMethod::Down => migration.has_down(),
        };
        if !available {
            return Err(CoreError::validation(
                migration.id(),
                format!("migration has no {method} operation"),
            ));
        }

        emit!(self.logger, Debug, "{} on [{}] starting", method, migration.title());
        let mut ctx = migration.context(method);

        let mut failure = None;
        for middleware in &self.middleware {
            if let Err(e) = middleware.before(&mut ctx).await {
                let error =
                    StatusError::from_error(e.as_ref()).with_field("middleware", middleware.name());
                migration.record_failure(error.clone());
                failure = Some(error);
                break;
            }
        }

        let outcome = match failure {
            Some(error) => Err(error),
            None => migration.run(method, &mut ctx).await,
        };
        drop(ctx);

        migration.status_mut().engine_version = Some(ENGINE_VERSION.to_string());
        if let Err(e) = self.store.save(migration.status()).await {
            return Err(self.status_not_recorded(migration, e, outcome.err()));
        }
        self.notify(EngineEvent::StatusSaved {
            id: migration.id().to_string(),
        });

        match outcome {
            Ok(()) => {
                emit!(
                    self.logger,
                    Info,
                    "{} on [{}] completed successfully",
                    method,
                    migration.title()
                );
                self.notify(EngineEvent::MigrationCompleted {
                    id: migration.id().to_string(),
                    method,
                });
                Ok(())
            }
            Err(error) => Err(CoreError::Execution {
                id: migration.id().to_string(),
                title: migration.title().to_string(),
                method,
                error,
            }),
        }
    }

    /// Dump the unsaved status somewhere an operator can find it
    fn status_not_recorded(
        &self,
        migration: &Migration,
        cause: CoreError,
        execution: Option<StatusError>,
    ) -> CoreError {
        let json = serde_json::to_string_pretty(migration.status())
            .unwrap_or_else(|e| format!("<unserializable status: {e}>"));
        let dump_path = std::env::temp_dir().join(format!(
            "flok_status_dump_{}.json",
            uuid::Uuid::new_v4()
        ));

        let dump_path = match std::fs::write(&dump_path, &json) {
            Ok(()) => {
                emit!(
                    self.logger,
                    Error,
                    "status of {} could not be saved; dumped to {}",
                    migration.id(),
                    dump_path.display()
                );
                Some(dump_path)
            }
            Err(e) => {
                emit!(
                    self.logger,
                    Error,
                    "status of {} could not be saved or dumped ({}): {}",
                    migration.id(),
                    e,
                    json
                );
                None
            }
        };

        CoreError::StatusNotRecorded {
            id: migration.id().to_string(),
            message: cause.to_string(),
            dump_path,
            execution,
        }
    }

    fn notify(&self, event: EngineEvent) {
        // no receivers is fine
        let _ = self.events.send(event);
    }
}

fn check_changed(migrations: &[Migration]) -> CoreResult<()> {
    let changed: Vec<String> = migrations
        .iter()
        .filter(|m| m.is_changed())
        .map(|m| m.id().to_string())
        .collect();
    if changed.is_empty() {
        Ok(())
    } else {
        Err(CoreError::ChangedMigrations { ids: changed })
    }
}

fn check_blocked(migrations: &[Migration]) -> CoreResult<()> {
    let blocked: Vec<String> = migrations
        .iter()
        .filter(|m| m.is_problem())
        .map(|m| m.id().to_string())
        .collect();
    if blocked.is_empty() {
        Ok(())
    } else {
        Err(CoreError::BlockedMigrations { ids: blocked })
    }
}

/// Assembles an [`Engine`]
#[derive(Default)]
pub struct EngineBuilder {
    source: Option<Arc<dyn MigrationSource>>,
    lock: Option<Arc<dyn LockProvider>>,
    store: Option<Arc<dyn StatusStore>>,
    lock_file: Option<PathBuf>,
    status_dir: Option<PathBuf>,
    lock_lease: Option<Duration>,
    middleware: Vec<Arc<dyn Middleware>>,
    logger: Option<Arc<dyn log::Log>>,
}

impl EngineBuilder {
    pub fn source(mut self, source: impl MigrationSource + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn lock_provider(mut self, lock: Arc<dyn LockProvider>) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn status_store(mut self, store: Arc<dyn StatusStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a [`FileLock`] at `path` unless a lock provider is set
    pub fn lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(path.into());
        self
    }

    /// Use a [`FileStatusStore`] in `dir` unless a status store is set
    pub fn status_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.status_dir = Some(dir.into());
        self
    }

    /// Lease after which a file lock counts as stale
    pub fn lock_lease(mut self, lease: Option<Duration>) -> Self {
        self.lock_lease = lease;
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Destination for engine log output. Defaults to discarding everything.
    pub fn logger(mut self, logger: Arc<dyn log::Log>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> CoreResult<Engine> {
        let logger = self
            .logger
            .map(EngineLogger::new)
            .unwrap_or_else(EngineLogger::discard);

        let source = self.source.ok_or_else(|| CoreError::ConfigInvalid {
            message: "no migration source configured".to_string(),
        })?;

        let lock: Arc<dyn LockProvider> = match (self.lock, self.lock_file) {
            (Some(lock), _) => lock,
            (None, Some(path)) => Arc::new(
                FileLock::new(path)
                    .with_lease(self.lock_lease)
                    .with_logger(logger.clone()),
            ),
            (None, None) => {
                return Err(CoreError::ConfigInvalid {
                    message: "no lock provider configured".to_string(),
                })
            }
        };

        let store: Arc<dyn StatusStore> = match (self.store, self.status_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(FileStatusStore::new(dir).with_logger(logger.clone())),
            (None, None) => {
                return Err(CoreError::ConfigInvalid {
                    message: "no status store configured".to_string(),
                })
            }
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Engine {
            source,
            lock,
            store,
            middleware: self.middleware,
            logger,
            events,
        })
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
