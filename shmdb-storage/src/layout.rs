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

//! On-segment layout
//!
//! A segment is one fixed-size byte region laid out as
//!
//! ```text
//! +--------+---------+---------+-----------------------------+
//! | Header | Buckets | Nodes   |          Payload            |
//! +--------+---------+---------+-----------------------------+
//! ```
//!
//! The header stores the three area offsets, so readable data never
//! contains an absolute pointer and independent mappings at different
//! virtual addresses are interchangeable. Atomically-updated header fields
//! are declared with their `std::sync::atomic` types in place; those share
//! the layout of their plain counterparts, keeping the struct `#[repr(C)]`
//! faithful.

use std::cell::UnsafeCell;
use std::mem;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, AtomicU8};

use shmdb_core::{Result, ShmError};

/// Segment signature, checked on every open.
pub const MAGIC: u32 = 0x4C4D_4252;

/// On-segment format version.
pub const FORMAT_VERSION: u16 = 1;

/// Empty bucket / chain tail sentinel. Also the node allocator's failure
/// value, chosen as the maximum so it never collides with a real index.
pub const EMPTY_INDEX: u32 = 0xFFFF_FFFF;

/// Node flag bit 0: entry is live.
pub const NODE_ACTIVE: u32 = 1;

pub const DEFAULT_N_BUCKETS: usize = 1 << 12;
pub const DEFAULT_N_NODES: usize = 1 << 16;
pub const DEFAULT_PAYLOAD_SIZE: usize = 1 << 24;

// Input limits guarding against resource exhaustion from bad arguments.
pub const MAX_KEY_LEN: usize = 1 << 16;
pub const MAX_VAL_LEN: usize = 1 << 28;
pub const MAX_BUCKETS: usize = 1 << 24;
pub const MAX_NODES: usize = 1 << 24;
pub const MAX_TOTAL_SIZE: usize = 1 << 32;

/// Bound on every CAS retry loop touching shared memory.
pub const MAX_CAS_RETRIES: u32 = 10_000;

/// Capacity of the authorized-PID list in the header.
pub const MAX_AUTH_PIDS: usize = 32;

/// Round `x` up to the next multiple of `a` (`a` must be a power of two).
#[inline]
pub const fn align_up(x: usize, a: usize) -> usize {
    (x + a - 1) & !(a - 1)
}

/// Segment header. Lives at offset 0 of the mapping.
#[repr(C)]
pub struct Header {
    pub magic: u32,
    pub version: u16,
    pub flags: u16,
    pub total_size: u64,

    // Area offsets from the mapping base.
    pub bucket_area_off: u64,
    pub node_area_off: u64,
    pub payload_area_off: u64,

    pub n_buckets: u32,
    pub n_nodes: u32,

    // Allocation cursors and the seqlock clock.
    pub next_free_node_index: AtomicU32,
    pub payload_alloc_off: AtomicU64,
    pub generation: AtomicU64,

    /// Process-shared writer mutex (robust where the platform supports it).
    pub writer_mutex: UnsafeCell<libc::pthread_mutex_t>,

    /// Reserved; never computed by this version.
    pub checksum: u32,

    // Access control, captured at initialization.
    pub owner_uid: libc::uid_t,
    pub owner_gid: libc::gid_t,
    pub auth_pid_count: AtomicU32,
    pub auth_pids: [AtomicI32; MAX_AUTH_PIDS],

    /// Nonzero when the backing object is an anonymous fd rather than a
    /// named shm object.
    pub is_memfd: u8,
    pub create_time: u64,
    pub marked_for_delete: AtomicU8,

    pub reserved: [u8; 32],
}

// SAFETY: all mutation of a mapped Header goes through the atomic fields or
// the pthread mutex; the remaining fields are written once during
// single-writer initialization and read-only afterwards.
unsafe impl Send for Header {}
unsafe impl Sync for Header {}

/// Header area size, 64-byte aligned.
pub const HEADER_SIZE: usize = align_up(mem::size_of::<Header>(), 64);

/// One key/value entry. Nodes are write-once: after the publishing CAS the
/// record's bytes never change.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Node {
    /// Key byte offset into the payload area.
    pub key_off: u32,
    pub key_len: u32,
    /// Value byte offset into the payload area.
    pub val_off: u32,
    pub val_len: u32,
    /// Next node in the bucket chain, `EMPTY_INDEX` at the tail.
    pub next_index: u32,
    /// Bit 0 = active.
    pub flags: u32,
    pub version: u64,
    /// `ValueType` tag byte; authoritative for every decode path.
    pub value_type: u8,
    pub reserved: [u8; 7],
}

const _: () = assert!(mem::size_of::<Node>() == 40, "node record layout drifted");
const _: () = assert!(HEADER_SIZE % 64 == 0);

/// Computed segment geometry. All areas are 64-byte aligned; the payload
/// area is rounded up to whole pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub n_buckets: u32,
    pub n_nodes: u32,
    pub buckets_size: usize,
    pub nodes_size: usize,
    pub payload_size: usize,
}

impl Geometry {
    pub fn compute(n_buckets: usize, n_nodes: usize, payload_size: usize) -> Result<Geometry> {
        if n_buckets == 0 || n_buckets > MAX_BUCKETS {
            return Err(ShmError::InvalidParam("bucket count out of range"));
        }
        if n_nodes == 0 || n_nodes > MAX_NODES {
            return Err(ShmError::InvalidParam("node count out of range"));
        }
        if payload_size == 0 || payload_size > MAX_TOTAL_SIZE {
            return Err(ShmError::InvalidParam("payload size out of range"));
        }

        let buckets_size = align_up(n_buckets * mem::size_of::<u32>(), 64);
        let nodes_size = align_up(n_nodes * mem::size_of::<Node>(), 64);
        let payload_size = align_up(payload_size, 4096);

        let total = HEADER_SIZE
            .checked_add(buckets_size)
            .and_then(|t| t.checked_add(nodes_size))
            .and_then(|t| t.checked_add(payload_size))
            .ok_or(ShmError::InvalidParam("segment size overflow"))?;
        if total > MAX_TOTAL_SIZE {
            return Err(ShmError::InvalidParam("segment size exceeds maximum"));
        }

        Ok(Geometry {
            n_buckets: n_buckets as u32,
            n_nodes: n_nodes as u32,
            buckets_size,
            nodes_size,
            payload_size,
        })
    }

    #[inline]
    pub fn bucket_area_off(&self) -> usize {
        HEADER_SIZE
    }

    #[inline]
    pub fn node_area_off(&self) -> usize {
        HEADER_SIZE + self.buckets_size
    }

    #[inline]
    pub fn payload_area_off(&self) -> usize {
        HEADER_SIZE + self.buckets_size + self.nodes_size
    }

    #[inline]
    pub fn total_size(&self) -> usize {
        HEADER_SIZE + self.buckets_size + self.nodes_size + self.payload_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_helper() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(13, 8), 16);
        assert_eq!(align_up(4095, 4096), 4096);
    }

    #[test]
    fn geometry_areas_are_contiguous_and_aligned() {
        let geo = Geometry::compute(1 << 12, 1 << 16, 1 << 24).unwrap();
        assert_eq!(geo.bucket_area_off() % 64, 0);
        assert_eq!(geo.node_area_off() % 64, 0);
        assert_eq!(geo.payload_area_off() % 64, 0);
        assert_eq!(geo.payload_size % 4096, 0);
        assert_eq!(
            geo.total_size(),
            geo.payload_area_off() + geo.payload_size
        );
    }

    #[test]
    fn geometry_rejects_bad_arguments() {
        assert!(Geometry::compute(0, 1, 1).is_err());
        assert!(Geometry::compute(1, 0, 1).is_err());
        assert!(Geometry::compute(1, 1, 0).is_err());
        assert!(Geometry::compute(MAX_BUCKETS + 1, 1, 1).is_err());
        assert!(Geometry::compute(1, MAX_NODES + 1, 1).is_err());
        assert!(Geometry::compute(1, 1, MAX_TOTAL_SIZE + 1).is_err());
        // Individually legal sizes whose sum exceeds the segment cap.
        assert!(Geometry::compute(MAX_BUCKETS, MAX_NODES, MAX_TOTAL_SIZE).is_err());
    }

    #[test]
    fn default_geometry_fits_the_cap() {
        let geo =
            Geometry::compute(DEFAULT_N_BUCKETS, DEFAULT_N_NODES, DEFAULT_PAYLOAD_SIZE).unwrap();
        assert!(geo.total_size() <= MAX_TOTAL_SIZE);
        assert_eq!(geo.n_buckets, DEFAULT_N_BUCKETS as u32);
    }
}
