//! Configuration loaded from flok.yml

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Names searched for by [`Config::discover`]
pub const CONFIG_FILE_NAMES: &[&str] = &["flok.yml", "flok.yaml"];

/// Status directory name under the migrations directory
const DEFAULT_STATUS_DIR: &str = "flokStatus";

/// Lock file name under the migrations directory
const DEFAULT_LOCK_FILE: &str = "flok.lock";

/// Database file name under the migrations directory
const DEFAULT_DATABASE_FILE: &str = "flok.duckdb";

/// Project configuration from flok.yml
///
/// Relative paths are resolved against the directory holding the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding migration definitions
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,

    /// Directory for status records (file backend).
    /// Defaults to `<migrations_dir>/flokStatus`.
    #[serde(default)]
    pub status_dir: Option<PathBuf>,

    /// Lock file path (file backend). Defaults to `<migrations_dir>/flok.lock`.
    #[serde(default)]
    pub lock_file: Option<PathBuf>,

    /// Locks older than this many seconds are treated as stale and replaced.
    /// Unset means stale locks must be removed by hand.
    #[serde(default)]
    pub lock_lease_secs: Option<u64>,

    /// Persistence backend for locks and status
    #[serde(default)]
    pub backend: Backend,

    /// Database settings for the duckdb backend
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Where locks and status records are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Lock file plus one JSON file per migration
    #[default]
    File,
    /// Tables in a DuckDB database
    Duckdb,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::File => write!(f, "file"),
            Backend::Duckdb => write!(f, "duckdb"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Backend::File),
            "duckdb" => Ok(Backend::Duckdb),
            other => Err(CoreError::ConfigInvalid {
                message: format!("unknown backend '{other}', expected 'file' or 'duckdb'"),
            }),
        }
    }
}

/// Database connection settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database file, or `:memory:`. Defaults to `<migrations_dir>/flok.duckdb`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            migrations_dir: default_migrations_dir(),
            status_dir: None,
            lock_file: None,
            lock_lease_secs: None,
            backend: Backend::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.resolve(base))
    }

    /// Load `flok.yml` or `flok.yaml` from `dir`, falling back to defaults
    /// rooted at `dir` when neither exists
    pub fn discover(dir: &Path) -> CoreResult<Self> {
        for name in CONFIG_FILE_NAMES {
            let path = dir.join(name);
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default().resolve(dir))
    }

    /// Validate the configuration
    fn validate(&self) -> CoreResult<()> {
        if self.migrations_dir.as_os_str().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "migrations_dir cannot be empty".to_string(),
            });
        }
        if self.lock_lease_secs == Some(0) {
            return Err(CoreError::ConfigInvalid {
                message: "lock_lease_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Make relative paths absolute against `base`
    pub fn resolve(mut self, base: &Path) -> Self {
        let join = |p: &Path| {
            if p.is_absolute() || base.as_os_str().is_empty() {
                p.to_path_buf()
            } else {
                base.join(p)
            }
        };
        self.migrations_dir = join(&self.migrations_dir);
        self.status_dir = self.status_dir.as_deref().map(join);
        self.lock_file = self.lock_file.as_deref().map(join);
        self.database.path = self
            .database
            .path
            .as_deref()
            .map(|p| if is_in_memory(p) { p.to_path_buf() } else { join(p) });
        self
    }

    /// Status directory, defaulted under the migrations directory
    pub fn status_dir(&self) -> PathBuf {
        self.status_dir
            .clone()
            .unwrap_or_else(|| self.migrations_dir.join(DEFAULT_STATUS_DIR))
    }

    /// Lock file, defaulted under the migrations directory
    pub fn lock_file(&self) -> PathBuf {
        self.lock_file
            .clone()
            .unwrap_or_else(|| self.migrations_dir.join(DEFAULT_LOCK_FILE))
    }

    /// Database path, defaulted under the migrations directory
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| self.migrations_dir.join(DEFAULT_DATABASE_FILE))
    }

    pub fn lock_lease(&self) -> Option<Duration> {
        self.lock_lease_secs.map(Duration::from_secs)
    }
}

fn is_in_memory(path: &Path) -> bool {
    path.as_os_str() == ":memory:"
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
