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
//! Shared helpers for the disk store integration tests.

use anyhow::Result;
use ipam_disk_store::{config::StoreConfig, store::Store};
use tempfile::TempDir;

/// A store on a throwaway data root, removed when the handle is dropped.
pub struct TestPool {
    /// Owns the temporary data root for the lifetime of the test.
    pub root: TempDir,
    /// Configuration pointing at the temporary root.
    pub config: StoreConfig,
    /// Store handle for the pool.
    pub store: Store,
}

/// Creates a pool named `testnet` on a fresh temporary data root.
pub fn test_pool() -> Result<TestPool> {
    let root = TempDir::new()?;
    let config = StoreConfig::with_data_dir(root.path());
    let store = Store::new(&config, "testnet")?;
    Ok(TestPool {
        root,
        config,
        store,
    })
}

/// Opens another handle to the same pool, as a separate process would.
pub fn reopen(pool: &TestPool) -> Result<Store> {
    Ok(Store::new(&pool.config, "testnet")?)
}
