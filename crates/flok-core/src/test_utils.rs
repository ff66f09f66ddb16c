//! In-memory migration units for unit tests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::logger::EngineLogger;
use crate::migration::{BoxError, Migration, MigrationContext, MigrationUnit, SourceRef};

/// Shared journal of executed operations, e.g. `["up:1", "up:2", "down:2"]`
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

pub(crate) struct TestUnit {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) time: i64,
    pub(crate) dependencies: Vec<String>,
    pub(crate) content: Arc<Mutex<String>>,
    pub(crate) journal: Journal,
    pub(crate) fail_up: bool,
    pub(crate) with_down: bool,
}

impl TestUnit {
    pub(crate) fn new(id: &str, time: i64) -> Self {
        Self {
            id: id.to_string(),
            title: format!("migration {id}"),
            time,
            dependencies: Vec::new(),
            content: Arc::new(Mutex::new(format!("content of {id}"))),
            journal: Arc::default(),
            fail_up: false,
            with_down: true,
        }
    }

    pub(crate) fn deps(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub(crate) fn journal(mut self, journal: &Journal) -> Self {
        self.journal = journal.clone();
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail_up = true;
        self
    }

    pub(crate) fn without_down(mut self) -> Self {
        self.with_down = false;
        self
    }

    pub(crate) fn into_migration(self) -> Migration {
        Migration::new(Arc::new(self), EngineLogger::discard()).unwrap()
    }
}

#[async_trait]
impl MigrationUnit for TestUnit {
    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn time(&self) -> i64 {
        self.time
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn source(&self) -> SourceRef {
        SourceRef::Inline(self.content.lock().unwrap().clone())
    }

    fn has_down(&self) -> bool {
        self.with_down
    }

    async fn up(&self, _ctx: &mut MigrationContext) -> Result<(), BoxError> {
        self.journal.lock().unwrap().push(format!("up:{}", self.id));
        if self.fail_up {
            return Err(format!("{} exploded", self.id).into());
        }
        Ok(())
    }

    async fn down(&self, _ctx: &mut MigrationContext) -> Result<(), BoxError> {
        self.journal.lock().unwrap().push(format!("down:{}", self.id));
        Ok(())
    }
}

/// Build migrations from `(id, time, deps)` triples
pub(crate) fn migrations(specs: &[(&str, i64, &[&str])]) -> Vec<Migration> {
    specs
        .iter()
        .map(|(id, time, deps)| TestUnit::new(id, *time).deps(deps).into_migration())
        .collect()
}

/// Ids in order
pub(crate) fn ids(migrations: &[Migration]) -> Vec<&str> {
    migrations.iter().map(|m| m.id()).collect()
}
