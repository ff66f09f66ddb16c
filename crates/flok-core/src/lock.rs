//! Run-exclusive locking.
//!
//! A lock is a process-external singleton record. Whoever creates it first
//! owns the run; everyone else fails with [`CoreError::AlreadyLocked`] until it
//! is released. Locks are not renewed, so a crashed holder leaves a stale lock
//! behind unless a lease is configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::net::{IpAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, CoreResult};
use crate::logger::{emit, EngineLogger};

/// Id of the singleton lock record
pub const LOCK_ID: &str = "flok_lock";

/// Identity of the lock holder, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Always [`LOCK_ID`]
    pub id: String,

    pub hostname: String,

    /// Non-loopback addresses of the holder's host
    #[serde(default)]
    pub network: Vec<String>,

    /// When the lock was taken
    pub date: DateTime<Utc>,

    pub username: String,

    pub pid: u32,
}

impl LockRecord {
    /// Describe the current process as a lock holder
    pub fn current() -> Self {
        let hostname = hostname();
        Self {
            id: LOCK_ID.to_string(),
            network: network_addresses(&hostname),
            hostname,
            date: Utc::now(),
            username: whoami(),
            pid: std::process::id(),
        }
    }

    /// `host <hostname> pid <pid>`
    pub fn holder(&self) -> String {
        format!("host {} pid {}", self.hostname, self.pid)
    }

    /// How long the lock has been held
    pub fn age(&self) -> Duration {
        (Utc::now() - self.date).to_std().unwrap_or_default()
    }
}

/// Get the current host name.
pub fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .or_else(|| std::env::var("COMPUTERNAME").ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Get the current OS user.
pub fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn network_addresses(hostname: &str) -> Vec<String> {
    let Ok(addrs) = (hostname, 0u16).to_socket_addrs() else {
        return Vec::new();
    };
    let mut ips: Vec<IpAddr> = addrs.map(|a| a.ip()).filter(|ip| !ip.is_loopback()).collect();
    ips.sort();
    ips.dedup();
    ips.into_iter().map(|ip| ip.to_string()).collect()
}

/// Acquires and releases the run lock
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Take the lock, failing with [`CoreError::AlreadyLocked`] if it is held
    async fn acquire(&self) -> CoreResult<LockRecord>;

    /// Drop the lock, returning the record that was removed.
    ///
    /// The file lock fails with [`CoreError::NotLocked`] when nothing is
    /// held; database locks may tolerate that and return `None`.
    async fn release(&self) -> CoreResult<Option<LockRecord>>;

    /// Current holder, if any
    async fn inspect(&self) -> CoreResult<Option<LockRecord>>;

    /// Backend name for logging
    fn describe(&self) -> String;
}

/// Lock backed by the atomic creation of a file
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    lease: Option<Duration>,
    logger: EngineLogger,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lease: None,
            logger: EngineLogger::discard(),
        }
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

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CoreError {
        CoreError::IoWithPath {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Read the record in the lock file.
    ///
    /// Lock files written by other tools may hold only a pid; those are
    /// reported with unknown host and date.
    fn read_record(&self) -> CoreResult<Option<LockRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        if let Ok(record) = serde_json::from_str::<LockRecord>(&content) {
            return Ok(Some(record));
        }
        let modified = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(Some(LockRecord {
            id: LOCK_ID.to_string(),
            hostname: "unknown".to_string(),
            network: Vec::new(),
            date: modified,
            username: "unknown".to_string(),
            pid: content.trim().parse().unwrap_or(0),
        }))
    }

    fn try_create(&self, record: &LockRecord) -> CoreResult<bool> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o640);
        }

        let mut file = match options.open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(self.io_error(e)),
        };
        let json = serde_json::to_string_pretty(record)?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| self.io_error(e))?;
        Ok(true)
    }

    /// Sibling file marking a takeover in progress, `<lock>.takeover`
    fn takeover_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".takeover");
        self.path.with_file_name(name)
    }

    /// Remove the lock if the lease says it is stale. Returns whether the
    /// lock file is gone.
    ///
    /// Only the process that created the takeover marker may remove a lock,
    /// and it re-reads the record while holding the marker, so a lock freshly
    /// written by a competing takeover is never removed.
    fn expire_stale(&self) -> CoreResult<bool> {
        let Some(lease) = self.lease else {
            return Ok(false);
        };
        let Some(_marker) = TakeoverMarker::create(self.takeover_path())? else {
            emit!(
                self.logger,
                Debug,
                "another process is taking over {}",
                self.path.display()
            );
            return Ok(false);
        };

        let Some(existing) = self.read_record()? else {
            return Ok(true);
        };
        if existing.age() <= lease {
            return Ok(false);
        }
        emit!(
            self.logger,
            Warn,
            "lock held by {} since {} exceeded its lease of {}s; taking it over",
            existing.holder(),
            existing.date.to_rfc3339(),
            lease.as_secs()
        );
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Exclusive right to remove a stale lock, held while the marker file exists
struct TakeoverMarker {
    path: PathBuf,
}

impl TakeoverMarker {
    /// `None` when another process holds the marker
    fn create(path: PathBuf) -> CoreResult<Option<Self>> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        let mut file = match options.open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => {
                return Err(CoreError::IoWithPath {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };
        let marker = Self { path };
        file.write_all(std::process::id().to_string().as_bytes())
            .map_err(|e| CoreError::IoWithPath {
                path: marker.path.display().to_string(),
                source: e,
            })?;
        Ok(Some(marker))
    }
}

impl Drop for TakeoverMarker {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[async_trait]
impl LockProvider for FileLock {
    async fn acquire(&self) -> CoreResult<LockRecord> {
        let record = LockRecord::current();

        let mut created = self.try_create(&record)?;
        if !created && self.expire_stale()? {
            created = self.try_create(&record)?;
        }
        if !created {
            let holder = self.read_record()?.map(|r| r.holder());
            return Err(CoreError::AlreadyLocked { holder });
        }

        if self.read_record()?.is_none() {
            return Err(CoreError::persistence(format!(
                "lockfile {} absent after being written",
                self.path.display()
            )));
        }

        emit!(self.logger, Info, "locked with pid {}", record.pid);
        Ok(record)
    }

    async fn release(&self) -> CoreResult<Option<LockRecord>> {
        let Some(existing) = self.read_record()? else {
            return Err(CoreError::NotLocked);
        };

        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(CoreError::NotLocked),
            Err(e) => return Err(self.io_error(e)),
        }

        if self.path.exists() {
            return Err(CoreError::persistence(format!(
                "lockfile {} still present after being removed",
                self.path.display()
            )));
        }

        emit!(self.logger, Debug, "released lock held by {}", existing.holder());
        Ok(Some(existing))
    }

    async fn inspect(&self) -> CoreResult<Option<LockRecord>> {
        self.read_record()
    }

    fn describe(&self) -> String {
        format!("lock file {}", self.path.display())
    }
}

#[cfg(test)]
#[path = "lock_test.rs"]
mod tests;
