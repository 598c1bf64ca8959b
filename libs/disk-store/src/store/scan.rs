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
//! Best-effort enumeration of reservation records.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::warn;

use crate::{lock::LOCK_FILE, store::LAST_RESERVED_FILE};

/// One reservation record as found on disk.
pub(crate) struct Record {
    /// File name, i.e. the canonical address text.
    pub name: String,
    /// Owner token bytes.
    pub content: Vec<u8>,
    /// Full path of the record file.
    pub path: PathBuf,
}

/// Lazy scan over the reservation records of one pool directory.
///
/// The pointer file and the lock artifact are not reservation records and are
/// skipped. Any entry that cannot be read is logged and skipped as well, so a
/// single corrupt or inaccessible record never hides the remaining ones.
/// Only the failure to open the pool directory itself is reported, via
/// [RecordScan::new].
pub(crate) struct RecordScan {
    entries: fs::ReadDir,
}

impl RecordScan {
    pub fn new(dir: &Path) -> io::Result<Self> {
        Ok(Self {
            entries: fs::read_dir(dir)?,
        })
    }
}

impl Iterator for RecordScan {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(name) => {
                    warn!(name = ?name, "skipping record with non-utf8 name");
                    continue;
                }
            };
            if name == LAST_RESERVED_FILE || name == LOCK_FILE {
                continue;
            }
            match entry.file_type() {
                Ok(file_type) if file_type.is_file() => {}
                _ => continue,
            }
            let path = entry.path();
            match fs::read(&path) {
                Ok(content) => return Some(Record { name, content, path }),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable record");
                    continue;
                }
            }
        }
    }
}
