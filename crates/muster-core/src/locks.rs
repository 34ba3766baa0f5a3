//! Per-key locks
//!
//! [`KeyedLocks`] serializes tasks of one process: mailbox appends lock
//! `team/member`. [`FileLocks`] adds an exclusive `flock` on
//! `<dir>/<key>.lock`, so registry and task graph writers in separate
//! processes sharing one home serialize per team. Distinct keys never contend.

use crate::error::{MusterError, MusterResult};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

#[cfg(unix)]
use nix::fcntl::{Flock, FlockArg};

#[cfg(unix)]
type HeldFile = Flock<std::fs::File>;
#[cfg(not(unix))]
type HeldFile = ();

/// A map of lazily created async mutexes keyed by string
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, creating it on first use
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drop the lock entry for `key` once nobody holds or waits on it
    pub fn forget(&self, key: &str) {
        self.locks
            .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Keyed locks that also hold an OS file lock while taken
///
/// The in-process mutex is taken first, so at most one task per process
/// waits on the file lock for a given key.
#[derive(Debug)]
pub struct FileLocks {
    local: KeyedLocks,
    dir: PathBuf,
}

/// Held lock; the file lock is released before the in-process one
pub struct FileLockGuard {
    _file: HeldFile,
    _local: OwnedMutexGuard<()>,
}

impl FileLocks {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            local: KeyedLocks::new(),
            dir: dir.into(),
        }
    }

    /// Acquire `key`, waiting for other processes that hold it
    pub async fn lock(&self, key: &str) -> MusterResult<FileLockGuard> {
        let local = self.local.lock(key).await;
        let path = self.dir.join(format!("{key}.lock"));
        let file = tokio::task::spawn_blocking(move || lock_file(path))
            .await
            .map_err(|e| MusterError::Io(std::io::Error::other(e)))??;
        Ok(FileLockGuard {
            _file: file,
            _local: local,
        })
    }

    /// Drop the in-process entry for `key`; the lock file stays on disk
    pub fn forget(&self, key: &str) {
        self.local.forget(key);
    }
}

#[cfg(unix)]
fn lock_file(path: PathBuf) -> MusterResult<HeldFile> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)?;
    let held = Flock::lock(file, FlockArg::LockExclusive)
        .map_err(|(_, errno)| MusterError::Io(errno.into()))?;
    debug!("Locked {:?}", path);
    Ok(held)
}

#[cfg(not(unix))]
fn lock_file(path: PathBuf) -> MusterResult<HeldFile> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    debug!("File locks unavailable, {:?} is process-local", path);
    Ok(())
}
