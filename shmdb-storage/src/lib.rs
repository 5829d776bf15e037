// SPDX-License-Identifier: AGPL-3.0-or-later
// ShmDB - Shared-Memory Typed Key-Value Store
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! ShmDB storage engine
//!
//! A single-writer / many-reader, append-only typed key-value store backed
//! by a POSIX named shared-memory segment. Writers serialize on a
//! process-shared mutex embedded in the segment header; readers are
//! lock-free and validate against a generation seqlock. Values are stored
//! in the self-describing layouts of `shmdb-core`, so readers in any
//! attached process obtain zero-copy views with no decode step.
//!
//! ```no_run
//! # fn main() -> shmdb_core::Result<()> {
//! use shmdb_storage::Store;
//!
//! let store = Store::open("/sensor-cache")?;
//! store.insert_float_vector(b"readings", &[1.0, 2.0, 3.0])?;
//! let view = store.lookup_float_vector(b"readings")?;
//! assert_eq!(view.get(2), Some(3.0));
//! # Ok(())
//! # }
//! ```
//!
//! Environment toggles: `SHM_AUTO_CLEANUP=1` unlinks the first segment this
//! process creates on exit/SIGINT/SIGTERM/SIGHUP; `SHM_CREATE_LEGACY=1`
//! makes open trust caller geometry even for pre-existing segments
//! (migration only).

mod access;
mod alloc;
mod cleanup;
mod crypto;
pub mod ffi;
mod index;
mod layout;
mod mutex;
mod segment;
mod store;

pub use layout::{
    DEFAULT_N_BUCKETS, DEFAULT_N_NODES, DEFAULT_PAYLOAD_SIZE, MAX_AUTH_PIDS, MAX_BUCKETS,
    MAX_KEY_LEN, MAX_NODES, MAX_VAL_LEN,
};
pub use store::{Store, StoreConfig, StoreStats};

// Re-export the value model so most consumers only need this crate.
pub use shmdb_core::{
    codec, FloatMatrix, IntMatrix, Result, ShmError, TypedValue, ValueType,
};
