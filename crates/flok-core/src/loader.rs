//! Where the engine gets its migration units from

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::logger::{emit, EngineLogger};
use crate::migration::MigrationUnit;
use crate::script::ScriptMigration;

/// File names inside a migrations directory that are never definitions
const RESERVED_FILES: &[&str] = &["flok.yml", "flok.yaml"];

/// Produces the full set of migration units for one run
#[async_trait]
pub trait MigrationSource: Send + Sync {
    async fn load(&self, logger: &EngineLogger) -> CoreResult<Vec<Arc<dyn MigrationUnit>>>;

    fn describe(&self) -> String;
}

/// YAML definitions at the top level of a directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Definition files, sorted by name so load order is stable
    fn definition_files(&self) -> CoreResult<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Err(CoreError::MigrationsDirNotFound {
                path: self.dir.display().to_string(),
            });
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(|e| CoreError::IoWithPath {
            path: self.dir.display().to_string(),
            source: e,
        })? {
            let entry = entry.map_err(|e| CoreError::IoWithPath {
                path: self.dir.display().to_string(),
                source: e,
            })?;
            let path = entry.path();
            if !path.is_file() || !path.extension().is_some_and(|e| e == "yml" || e == "yaml") {
                continue;
            }
            let reserved = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| RESERVED_FILES.contains(&n));
            if reserved {
                continue;
            }
            files.push(path);
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl MigrationSource for DirectorySource {
    async fn load(&self, logger: &EngineLogger) -> CoreResult<Vec<Arc<dyn MigrationUnit>>> {
        let files = self.definition_files()?;
        if files.is_empty() {
            return Err(CoreError::NoMigrations {
                path: self.dir.display().to_string(),
            });
        }

        let mut units: Vec<Arc<dyn MigrationUnit>> = Vec::with_capacity(files.len());
        for path in &files {
            emit!(logger, Trace, "loading migration definition {}", path.display());
            units.push(Arc::new(ScriptMigration::load(path)?));
        }
        Ok(units)
    }

    fn describe(&self) -> String {
        format!("migrations directory {}", self.dir.display())
    }
}

/// A fixed set of code-defined units
#[derive(Clone, Default)]
pub struct StaticSource {
    units: Vec<Arc<dyn MigrationUnit>>,
}

impl StaticSource {
    pub fn new(units: Vec<Arc<dyn MigrationUnit>>) -> Self {
        Self { units }
    }

    pub fn push(&mut self, unit: Arc<dyn MigrationUnit>) {
        self.units.push(unit);
    }

    pub fn with(mut self, unit: impl MigrationUnit + 'static) -> Self {
        self.units.push(Arc::new(unit));
        self
    }
}

#[async_trait]
impl MigrationSource for StaticSource {
    async fn load(&self, _logger: &EngineLogger) -> CoreResult<Vec<Arc<dyn MigrationUnit>>> {
        Ok(self.units.clone())
    }

    fn describe(&self) -> String {
        format!("{} code-defined migrations", self.units.len())
    }
}

#[cfg(test)]
#[path = "loader_test.rs"]
mod tests;
