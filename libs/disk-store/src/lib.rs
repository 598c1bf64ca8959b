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
//! # IPAM disk store
//!
//! A filesystem-backed reservation store for host-local IP address pools.
//!
//! The [store::Store] records which address is currently held by which owner.
//! It is shared by independent, short-lived processes through the filesystem
//! alone: every reservation is one file in a per-pool directory, so no daemon
//! has to stay resident between invocations.
//!
//! Multi-step call sequences must be serialized through the per-pool
//! [lock::PoolLock], which the store embeds. The single-address reserve
//! operation is safe without it, since it rides on the filesystem's
//! create-exclusive atomicity.

pub mod config;
pub mod lock;
pub mod store;
