//! Persistent key-value storage with advisory locks.
//!
//! Data is addressed by `(domain, key)`. Locks are per key and advisory: a
//! caller that fails to get a lock is expected to carry on without writing,
//! never to wait.
//!
//! Two implementations:
//! - [`FileStorage`]: one file per entry under a data directory, written
//!   atomically (temp file + rename); locks are `create_new` lock files that
//!   are considered stale after a timeout.
//! - [`MemoryStorage`]: process-local maps, for tests and `storage-manager =
//!   "memory"`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tracing::{debug, warn};

/// Errors from a storage backend. Callers on the cache path treat every one
/// of these as a miss.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("storage entry corrupt: {reason}")]
    Corrupt { reason: String },

    #[error("storage lock poisoned")]
    Poisoned,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Key-value store with advisory per-key locks.
pub trait PersistentStorage: Send + Sync {
    fn save_data(&self, domain: &str, key: &str, data: &[u8]) -> StorageResult<()>;

    /// `Ok(None)` on a miss.
    fn restore_data(&self, domain: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Try to take the lock for `key` without blocking.
    fn get_lock(&self, key: &str) -> bool;

    fn release_lock(&self, key: &str);
}

// ============================================================================
// File Storage
// ============================================================================

/// Default age after which an abandoned lock file is reclaimed.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    lock_timeout: Duration,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStorage {
            root: root.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, domain: &str, key: &str) -> PathBuf {
        let key = sanitize(key);
        let shard: String = key
            .chars()
            .take(2)
            .map(|c| if c == '.' { '_' } else { c })
            .collect();
        self.root.join(sanitize(domain)).join(shard).join(key)
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.root.join("locks").join(format!("{}.lock", sanitize(key)))
    }

    fn try_create_lock(path: &Path) -> io::Result<()> {
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map(|_| ())
    }

    fn is_stale(&self, path: &Path) -> bool {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age >= self.lock_timeout)
    }
}

impl PersistentStorage for FileStorage {
    fn save_data(&self, domain: &str, key: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.entry_path(domain, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        atomic_write(&path, data).map_err(|source| StorageError::Io { path, source })
    }

    fn restore_data(&self, domain: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.entry_path(domain, key);
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn get_lock(&self, key: &str) -> bool {
        let path = self.lock_path(key);
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "cannot create lock directory");
                return false;
            }
        }

        match Self::try_create_lock(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if !self.is_stale(&path) {
                    return false;
                }
                debug!(path = %path.display(), "reclaiming stale lock");
                let _ = fs::remove_file(&path);
                Self::try_create_lock(&path).is_ok()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot create lock file");
                false
            }
        }
    }

    fn release_lock(&self, key: &str) {
        let path = self.lock_path(key);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "cannot remove lock file");
            }
        }
    }
}

/// Write to a unique temp file next to `path`, then rename over it.
fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    use std::time::UNIX_EPOCH;

    let pid = std::process::id();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let temp_path = path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        pid,
        timestamp
    ));
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)
}

/// Keep keys and domains usable as single path components.
fn sanitize(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{}", cleaned),
        _ => cleaned,
    }
}

// ============================================================================
// Memory Storage
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    locks: Mutex<BTreeSet<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PersistentStorage for MemoryStorage {
    fn save_data(&self, domain: &str, key: &str, data: &[u8]) -> StorageResult<()> {
        let mut map = self.data.lock().map_err(|_| StorageError::Poisoned)?;
        map.insert((domain.to_string(), key.to_string()), data.to_vec());
        Ok(())
    }

    fn restore_data(&self, domain: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let map = self.data.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(map.get(&(domain.to_string(), key.to_string())).cloned())
    }

    fn get_lock(&self, key: &str) -> bool {
        match self.locks.lock() {
            Ok(mut locks) => locks.insert(key.to_string()),
            Err(_) => false,
        }
    }

    fn release_lock(&self, key: &str) {
        if let Ok(mut locks) = self.locks.lock() {
            locks.remove(key);
        }
    }
}
