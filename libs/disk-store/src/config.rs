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
//! Store configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default root directory under which pool directories are created.
pub const DEFAULT_DATA_DIR: &str = "/var/lib/cni/networks";

/// Configuration for a [crate::store::Store].
///
/// The data root is threaded into store construction explicitly instead of
/// living in a process-wide default, so that every caller (tests included)
/// decides where its pools live.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Root directory holding one subdirectory per pool.
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

impl StoreConfig {
    /// Creates a configuration rooted at the given directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}
