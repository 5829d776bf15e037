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

//! ShmDB value model and payload codecs
//!
//! This crate defines everything about ShmDB values that is independent of
//! the shared-memory segment: the error taxonomy, the one-byte type tags,
//! the owned `TypedValue` union, and for every tag an encoder producing the
//! bit-exact little-endian payload plus a bounds-checked zero-copy view
//! decoder. The storage engine in `shmdb-storage` stores and retrieves
//! these payloads; other consumers (tests, marshaling layers, the C ABI)
//! use the codecs directly.

pub mod codec;
pub mod error;
pub mod value;

pub use error::{Result, ShmError};
pub use value::{FloatMatrix, IntMatrix, TypedValue, ValueType};
