//! The migration entity: one opaque change unit plus its status.
//!
//! A [`MigrationUnit`] is what authors write. The engine wraps each unit in a
//! [`Migration`], attaches the persisted [`MigrationStatus`], and derives the
//! lifecycle state from that status and the live signature of the unit's
//! defining source.

use async_trait::async_trait;
use chrono::Utc;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::checksum::compute_checksum;
use crate::error::{CoreError, CoreResult};
use crate::logger::{emit, EngineLogger};
use crate::status::{MigrationState, MigrationStatus, RunMethod, StatusError, ENGINE_VERSION};

/// Error type returned by user migration operations
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Where a migration's defining content lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    /// A file on disk, re-read every time the signature is requested
    File(PathBuf),
    /// Content held in memory (code-defined migrations)
    Inline(String),
}

impl SourceRef {
    /// Read the current content
    pub fn read(&self) -> CoreResult<Vec<u8>> {
        match self {
            SourceRef::File(path) => std::fs::read(path).map_err(|e| CoreError::IoWithPath {
                path: path.display().to_string(),
                source: e,
            }),
            SourceRef::Inline(content) => Ok(content.as_bytes().to_vec()),
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::File(path) => write!(f, "{}", path.display()),
            SourceRef::Inline(_) => write!(f, "<inline>"),
        }
    }
}

/// A user-defined change unit.
///
/// `up` is required unless `has_up` is overridden to `false`; `down` is
/// optional and advertised through `has_down`. A unit exposing neither is
/// rejected when it is wrapped in a [`Migration`].
#[async_trait]
pub trait MigrationUnit: Send + Sync {
    /// Globally unique, author-supplied id
    fn id(&self) -> &str;

    /// Human label
    fn title(&self) -> &str;

    /// Ordering key
    fn time(&self) -> i64;

    /// Ids that must be applied before this one
    fn dependencies(&self) -> &[String] {
        &[]
    }

    /// Defining content, hashed into the signature
    fn source(&self) -> SourceRef;

    fn has_up(&self) -> bool {
        true
    }

    fn has_down(&self) -> bool {
        false
    }

    /// Forward operation
    async fn up(&self, ctx: &mut MigrationContext) -> Result<(), BoxError>;

    /// Reverse operation
    async fn down(&self, _ctx: &mut MigrationContext) -> Result<(), BoxError> {
        Err(format!("migration {} has no down operation", self.id()).into())
    }
}

/// Typed values attached to a migration run by middleware.
///
/// Keyed by type, so each middleware defines its own handle type.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous value of the same type
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|prev| prev.downcast::<T>().ok().map(|b| *b))
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut::<T>())
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok().map(|b| *b))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

/// What a migration operation (and each middleware) receives for one run
#[derive(Debug)]
pub struct MigrationContext {
    id: String,
    title: String,
    method: RunMethod,
    extensions: Extensions,
    logger: EngineLogger,
}

impl MigrationContext {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        method: RunMethod,
        logger: EngineLogger,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            method,
            extensions: Extensions::new(),
            logger,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Direction of the current run
    pub fn method(&self) -> RunMethod {
        self.method
    }

    /// Version of the running engine
    pub fn engine_version(&self) -> &'static str {
        ENGINE_VERSION
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Shorthand for `extensions().get::<T>()`
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    /// The engine's logger
    pub fn logger(&self) -> &EngineLogger {
        &self.logger
    }
}

/// One change unit with its attached status
pub struct Migration {
    unit: Arc<dyn MigrationUnit>,
    status: MigrationStatus,
    logger: EngineLogger,
}

impl Migration {
    /// Wrap a unit, validating that it is runnable
    pub fn new(unit: Arc<dyn MigrationUnit>, logger: EngineLogger) -> CoreResult<Self> {
        emit!(logger, Trace, "constructing migration from {}", unit.source());

        if unit.id().trim().is_empty() {
            return Err(CoreError::validation(
                unit.source().to_string(),
                "migration id must not be empty",
            ));
        }
        if !unit.has_up() && !unit.has_down() {
            return Err(CoreError::validation(
                unit.source().to_string(),
                "migration exposes neither an up nor a down operation",
            ));
        }

        let status = MigrationStatus::empty(unit.id(), unit.title());
        Ok(Self {
            unit,
            status,
            logger,
        })
    }

    pub fn id(&self) -> &str {
        self.unit.id()
    }

    pub fn title(&self) -> &str {
        self.unit.title()
    }

    pub fn time(&self) -> i64 {
        self.unit.time()
    }

    pub fn dependencies(&self) -> &[String] {
        self.unit.dependencies()
    }

    pub fn source(&self) -> SourceRef {
        self.unit.source()
    }

    pub fn has_down(&self) -> bool {
        self.unit.has_down()
    }

    pub fn has_up(&self) -> bool {
        self.unit.has_up()
    }

    /// SHA-256 of the defining source, recomputed on every call
    pub fn signature(&self) -> CoreResult<String> {
        let content = self.unit.source().read()?;
        Ok(compute_checksum(&content))
    }

    pub fn status(&self) -> &MigrationStatus {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut MigrationStatus {
        &mut self.status
    }

    /// Attach a status loaded from a store
    pub fn set_status(&mut self, status: MigrationStatus) {
        self.status = status;
    }

    pub fn is_done(&self) -> bool {
        self.status.run_method == Some(RunMethod::Up) && !self.is_problem()
    }

    pub fn is_pending(&self) -> bool {
        !self.is_done()
    }

    /// The signature recorded at the last run differs from the live one.
    ///
    /// A source that can no longer be read counts as changed.
    pub fn is_changed(&self) -> bool {
        match &self.status.signature {
            None => false,
            Some(recorded) => match self.signature() {
                Ok(live) => *recorded != live,
                Err(e) => {
                    emit!(self.logger, Warn, "cannot compute signature of {}: {}", self.id(), e);
                    true
                }
            },
        }
    }

    pub fn is_errored(&self) -> bool {
        self.status.error.is_some()
    }

    pub fn is_problem(&self) -> bool {
        self.is_errored() || self.is_changed()
    }

    pub fn state(&self) -> MigrationState {
        if self.is_problem() {
            MigrationState::Blocked
        } else if self.is_pending() {
            MigrationState::Pending
        } else if self.is_done() {
            MigrationState::Done
        } else {
            MigrationState::Unknown
        }
    }

    /// Build the context handed to middleware and to the operation
    pub fn context(&self, method: RunMethod) -> MigrationContext {
        MigrationContext::new(self.id(), self.title(), method, self.logger.clone())
    }

    /// Run the forward operation, stamping the status
    pub async fn run_up(&mut self, ctx: &mut MigrationContext) -> Result<(), StatusError> {
        self.run(RunMethod::Up, ctx).await
    }

    /// Run the reverse operation, stamping the status
    pub async fn run_down(&mut self, ctx: &mut MigrationContext) -> Result<(), StatusError> {
        self.run(RunMethod::Down, ctx).await
    }

    /// Run `method`: stamp run time and signature, call the unit, then stamp
    /// the run method and the outcome.
    pub async fn run(
        &mut self,
        method: RunMethod,
        ctx: &mut MigrationContext,
    ) -> Result<(), StatusError> {
        self.status.run_time = Some(Utc::now());
        self.status.title = self.title().to_string();

        let signature = match self.signature() {
            Ok(signature) => signature,
            Err(e) => {
                let error = StatusError::from(&e);
                self.status.run_method = Some(method);
                self.status.error = Some(error.clone());
                return Err(error);
            }
        };
        self.status.signature = Some(signature);

        let outcome = match method {
            RunMethod::Up => self.unit.up(ctx).await,
            RunMethod::Down => self.unit.down(ctx).await,
        };

        self.status.run_method = Some(method);
        match outcome {
            Ok(()) => {
                self.status.error = None;
                Ok(())
            }
            Err(e) => {
                let error = StatusError::from_error(e.as_ref());
                self.status.error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Record a failure that happened before the operation ran (middleware)
    pub fn record_failure(&mut self, error: StatusError) {
        self.status.run_time = Some(Utc::now());
        self.status.error = Some(error);
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id())
            .field("title", &self.title())
            .field("time", &self.time())
            .field("dependencies", &self.dependencies())
            .field("status", &self.status)
            .finish()
    }
}

#[cfg(test)]
#[path = "migration_test.rs"]
mod tests;
