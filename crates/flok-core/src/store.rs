//! Status persistence: one record per migration id.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::checksum::compute_checksum;
use crate::error::{CoreError, CoreResult};
use crate::logger::{emit, EngineLogger};
use crate::status::MigrationStatus;

/// Loads and saves migration status records
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Every stored record, keyed by migration id
    async fn load_all(&self) -> CoreResult<HashMap<String, MigrationStatus>>;

    /// Insert or replace the record for `status.id`
    async fn save(&self, status: &MigrationStatus) -> CoreResult<()>;

    /// Remove the record for `id`. Returns whether a record existed.
    async fn clear(&self, id: &str) -> CoreResult<bool>;

    /// Backend name for logging
    fn describe(&self) -> String;
}

/// Turn a migration id into a file-name-safe slug.
///
/// Ids that are already safe map to themselves; anything else is lowercased,
/// runs of other characters collapse to `-`, and a short hash of the original
/// id is appended so distinct ids never share a file.
pub fn slugify(id: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
    if !id.is_empty() && id.chars().all(safe) {
        return id.to_string();
    }

    let mut slug = String::with_capacity(id.len());
    for c in id.chars() {
        if safe(c) {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    let hash = &compute_checksum(id.as_bytes())[..8];
    if slug.is_empty() {
        hash.to_string()
    } else {
        format!("{slug}-{hash}")
    }
}

/// Status records as JSON files in one directory
#[derive(Debug, Clone)]
pub struct FileStatusStore {
    dir: PathBuf,
    logger: EngineLogger,
}

impl FileStatusStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            logger: EngineLogger::discard(),
        }
    }

    pub fn with_logger(mut self, logger: EngineLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `id`
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slugify(id)))
    }

    fn ensure_dir(&self) -> CoreResult<()> {
        if self.dir.is_dir() {
            return Ok(());
        }
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o750);
        }
        builder.create(&self.dir).map_err(|e| CoreError::IoWithPath {
            path: self.dir.display().to_string(),
            source: e,
        })
    }
}

/// Write `content` to `path` through a sibling temp file and a rename
fn write_atomic(path: &Path, content: &[u8]) -> CoreResult<()> {
    let temp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o640);
    }

    let written = options.open(&temp_path).and_then(|mut file| {
        use std::io::Write;
        file.write_all(content)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(CoreError::IoWithPath {
            path: temp_path.display().to_string(),
            source: e,
        });
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        }
    })
}

#[async_trait]
impl StatusStore for FileStatusStore {
    async fn load_all(&self) -> CoreResult<HashMap<String, MigrationStatus>> {
        let mut statuses = HashMap::new();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                emit!(self.logger, Debug, "no status directory at {}", self.dir.display());
                return Ok(statuses);
            }
            Err(e) => {
                return Err(CoreError::IoWithPath {
                    path: self.dir.display().to_string(),
                    source: e,
                })
            }
        };

        for entry in entries {
            let path = entry
                .map_err(|e| CoreError::IoWithPath {
                    path: self.dir.display().to_string(),
                    source: e,
                })?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = fs::read_to_string(&path).map_err(|e| CoreError::IoWithPath {
                path: path.display().to_string(),
                source: e,
            })?;
            let status: MigrationStatus =
                serde_json::from_str(&content).map_err(|e| CoreError::Persistence {
                    message: format!("status record {} is unreadable: {}", path.display(), e),
                })?;
            statuses.insert(status.id.clone(), status);
        }

        emit!(
            self.logger,
            Debug,
            "loaded {} status records from {}",
            statuses.len(),
            self.dir.display()
        );
        Ok(statuses)
    }

    async fn save(&self, status: &MigrationStatus) -> CoreResult<()> {
        self.ensure_dir()?;
        let json = serde_json::to_string_pretty(status)?;
        write_atomic(&self.path_for(&status.id), json.as_bytes())
    }

    async fn clear(&self, id: &str) -> CoreResult<bool> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CoreError::IoWithPath {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    fn describe(&self) -> String {
        format!("status directory {}", self.dir.display())
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
