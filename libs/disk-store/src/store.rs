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
//! Filesystem-backed reservation store.
//!
//! One pool maps to one directory; one reservation maps to one file named
//! after the address, containing the owner token. The store never caches
//! anything between calls: every operation re-reads authoritative state from
//! disk, so independent processes sharing the directory always see each
//! other's reservations.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write as _},
    net::IpAddr,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    config::StoreConfig,
    lock::{LockError, PoolLock, PoolLockGuard},
    store::scan::RecordScan,
};

mod scan;

/// Name of the file recording the most recently reserved address.
pub const LAST_RESERVED_FILE: &str = "last_reserved_ip";

/// Reservation store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The last-reserved pointer file is missing or unreadable.
    #[error("failed to retrieve last reserved ip: {0}")]
    LastReservedUnavailable(#[source] io::Error),
    /// The last-reserved pointer file does not contain an address.
    #[error("last reserved ip file contains malformed address {0:?}")]
    MalformedLastReserved(String),
    /// Any other storage failure, surfaced verbatim.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A reservation store scoped to one address pool.
///
/// The store embeds the pool's [PoolLock]. Callers must hold the lock, via
/// [Store::lock], around any sequence of calls that has to be atomic as a
/// whole; see the crate documentation for which single calls are safe
/// without it.
#[derive(Debug)]
pub struct Store {
    data_dir: PathBuf,
    lock: PoolLock,
}

impl Store {
    /// Opens the store for `pool`, creating the pool directory if absent.
    ///
    /// The directory is created with mode 0o755: owner read/write plus the
    /// traversal bit a directory needs to be usable at all.
    pub fn new(config: &StoreConfig, pool: &str) -> Result<Self, StoreError> {
        let data_dir = config.data_dir.join(pool);
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o755);
        }
        builder.create(&data_dir)?;
        let lock = PoolLock::new(&data_dir);
        Ok(Self { data_dir, lock })
    }

    /// Acquires the pool's exclusive lock, blocking until it is free.
    pub fn lock(&self) -> Result<PoolLockGuard, LockError> {
        self.lock.acquire()
    }

    /// Reserves `ip` for `owner`.
    ///
    /// Returns `Ok(false)` if the address is already reserved; that is an
    /// expected outcome, not an error. The create-exclusive step makes this
    /// call safe without the pool lock: at most one concurrent caller can
    /// win an address. The lock is still required around the trailing
    /// pointer update whenever callers rely on reading it back consistently.
    pub fn reserve(&self, owner: &str, ip: IpAddr) -> Result<bool, StoreError> {
        let won = self.reserve_with(ip, |file| {
            file.write_all(owner.as_bytes())?;
            file.sync_all()
        })?;
        if won {
            debug!(ip = %ip, owner, "reserved address");
        }
        Ok(won)
    }

    /// Reserve with the owner-write step factored out, so tests can drive
    /// the cleanup path for a record whose content never made it to disk.
    fn reserve_with(
        &self,
        ip: IpAddr,
        write_owner: impl FnOnce(&mut File) -> io::Result<()>,
    ) -> Result<bool, StoreError> {
        let path = self.data_dir.join(ip.to_string());
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        let mut file = match options.open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = write_owner(&mut file) {
            // Do not leave an ownerless record behind.
            drop(file);
            if let Err(remove_err) = fs::remove_file(&path) {
                warn!(
                    path = %path.display(),
                    error = %remove_err,
                    "failed to remove partially written reservation"
                );
            }
            return Err(e.into());
        }
        drop(file);

        // The reservation above stays valid even if this pointer write
        // fails; the pointer is a hint for sequential allocation, not part
        // of the reservation set.
        fs::write(self.data_dir.join(LAST_RESERVED_FILE), ip.to_string())?;
        Ok(true)
    }

    /// Returns the most recently reserved address.
    ///
    /// The pointer is a hint: a crash between record and pointer writes can
    /// leave it stale or missing, and the address it names may have been
    /// released since. A missing or unreadable pointer file yields
    /// [StoreError::LastReservedUnavailable]; content that does not parse as
    /// an address yields [StoreError::MalformedLastReserved].
    pub fn last_reserved_ip(&self) -> Result<IpAddr, StoreError> {
        let path = self.data_dir.join(LAST_RESERVED_FILE);
        let data = fs::read_to_string(&path).map_err(StoreError::LastReservedUnavailable)?;
        data.parse()
            .map_err(|_| StoreError::MalformedLastReserved(data))
    }

    /// Releases the reservation for `ip`.
    ///
    /// Not idempotent: releasing an address that has no record surfaces the
    /// underlying not-found error unmodified. Callers wanting idempotent
    /// release check for [io::ErrorKind::NotFound] themselves.
    pub fn release(&self, ip: IpAddr) -> Result<(), StoreError> {
        fs::remove_file(self.data_dir.join(ip.to_string()))?;
        debug!(ip = %ip, "released address");
        Ok(())
    }

    /// Releases every reservation held by `owner`.
    ///
    /// Best-effort by design: a record that cannot be read or removed is
    /// logged and skipped so that the remaining records are still reclaimed.
    /// Callers must hold the pool lock; the enumerate-then-remove sequence
    /// is not atomic on its own.
    pub fn release_all_by_owner(&self, owner: &str) -> Result<(), StoreError> {
        for record in RecordScan::new(&self.data_dir)? {
            if record.content == owner.as_bytes() {
                match fs::remove_file(&record.path) {
                    Ok(()) => debug!(ip = %record.name, owner, "released address"),
                    Err(e) => {
                        warn!(path = %record.path.display(), error = %e, "failed to remove record")
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns an address currently reserved by `owner`, or `None`.
    ///
    /// An owner may legally hold several addresses; in that case the last
    /// match seen during directory enumeration is returned, in whatever
    /// order the OS reports entries. Callers must hold the pool lock to get
    /// a consistent answer.
    pub fn find_by_owner(&self, owner: &str) -> Result<Option<IpAddr>, StoreError> {
        let mut found = None;
        for record in RecordScan::new(&self.data_dir)? {
            if record.content == owner.as_bytes() {
                match record.name.parse() {
                    Ok(ip) => found = Some(ip),
                    Err(_) => {
                        warn!(name = %record.name, "skipping record with unparseable name");
                    }
                }
            }
        }
        Ok(found)
    }

    /// The pool directory this store operates on.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
