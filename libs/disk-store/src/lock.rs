// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Per-pool exclusive locking.
//!
//! [PoolLock] is the cross-process gate around a pool directory. Callers
//! acquire it before any multi-step store sequence (enumerate-then-remove,
//! reserve-then-read-pointer) and release it by dropping the returned guard.
//! The lock uses an OS-level file lock (`flock` on Unix) on a `.lock`
//! artifact inside the pool directory, so it is released by the OS even if
//! the holding process crashes.

use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

/// Name of the lock artifact inside a pool directory.
pub const LOCK_FILE: &str = ".lock";

/// Pool locking errors.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock artifact could not be created or opened.
    #[error("failed to open lock file {path}: {source}")]
    Open {
        /// Path of the lock artifact.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// The lock is held by another process or thread.
    #[error("pool {0} is locked by another process")]
    AlreadyLocked(PathBuf),
    /// Acquiring the OS lock failed for a reason other than contention.
    #[error("failed to acquire pool lock: {0}")]
    Acquire(#[source] io::Error),
}

/// An exclusive lock scoped to one pool directory.
///
/// Each acquisition opens a fresh handle to the lock artifact, so the lock
/// excludes other threads of the same process as well as other processes.
#[derive(Debug, Clone)]
pub struct PoolLock {
    lock_path: PathBuf,
}

impl PoolLock {
    /// Creates a lock handle for the pool at `dir`. No file is touched until
    /// the first acquisition.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            lock_path: dir.as_ref().join(LOCK_FILE),
        }
    }

    /// Acquires the lock, blocking until the current holder releases it.
    pub fn acquire(&self) -> Result<PoolLockGuard, LockError> {
        let file = self.open_lock_file()?;
        file.lock_exclusive().map_err(LockError::Acquire)?;
        debug!(path = %self.lock_path.display(), "acquired pool lock");
        Ok(PoolLockGuard {
            file,
            path: self.lock_path.clone(),
        })
    }

    /// Acquires the lock without blocking.
    ///
    /// Returns [LockError::AlreadyLocked] if another holder currently has it.
    pub fn try_acquire(&self) -> Result<PoolLockGuard, LockError> {
        let file = self.open_lock_file()?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %self.lock_path.display(), "acquired pool lock");
                Ok(PoolLockGuard {
                    file,
                    path: self.lock_path.clone(),
                })
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                Err(LockError::AlreadyLocked(self.lock_path.clone()))
            }
            Err(e) => Err(LockError::Acquire(e)),
        }
    }

    /// Path of the lock artifact.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn open_lock_file(&self) -> Result<File, LockError> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        options.open(&self.lock_path).map_err(|e| LockError::Open {
            path: self.lock_path.clone(),
            source: e,
        })
    }
}

/// Holds the pool lock; dropping it releases the lock on every exit path.
#[derive(Debug)]
pub struct PoolLockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for PoolLockGuard {
    fn drop(&mut self) {
        // Closing the handle would release the lock anyway; unlock explicitly
        // so the release shows up in the logs.
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release pool lock");
        } else {
            debug!(path = %self.path.display(), "released pool lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn should_create_lock_artifact_on_first_acquire() {
        let dir = pool_dir();
        let lock = PoolLock::new(dir.path());
        assert!(!lock.lock_path().exists());

        let _guard = lock.acquire().unwrap();
        assert!(lock.lock_path().exists());
        assert_eq!(lock.lock_path(), dir.path().join(LOCK_FILE));
    }

    #[test]
    fn should_fail_try_acquire_while_held() {
        let dir = pool_dir();
        let lock = PoolLock::new(dir.path());

        let guard = lock.acquire().unwrap();
        let result = lock.try_acquire();
        assert!(matches!(result, Err(LockError::AlreadyLocked(_))));
        drop(guard);
    }

    #[test]
    fn should_release_on_drop() {
        let dir = pool_dir();
        let lock = PoolLock::new(dir.path());

        {
            let _guard = lock.acquire().unwrap();
        }

        let _guard = lock.try_acquire().expect("lock should be free after drop");
    }

    #[test]
    fn should_fail_to_open_lock_file_in_missing_directory() {
        let dir = pool_dir();
        let lock = PoolLock::new(dir.path().join("no-such-pool"));
        let result = lock.acquire();
        assert!(matches!(result, Err(LockError::Open { .. })));
    }
}
