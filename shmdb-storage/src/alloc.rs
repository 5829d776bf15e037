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

//! Append-only allocators over the header cursors
//!
//! Node slots come from an atomic fetch-add over a fixed array; payload
//! bytes come from a bump cursor advanced by CAS. Neither allocator ever
//! recycles. The payload CAS loop re-checks capacity inside the loop so a
//! lost race never consumes space, and both loops are bounded so pathologic
//! contention degrades to a `NO_SPACE`-style failure instead of spinning
//! forever.

use std::sync::atomic::Ordering;

use crate::layout::{align_up, Header, MAX_CAS_RETRIES, MAX_VAL_LEN};

/// Claim the next node slot. `None` once the node area is exhausted; the
/// cursor keeps advancing past `n_nodes` but the excess is never mapped
/// back to a slot.
#[inline]
pub(crate) fn alloc_node(hdr: &Header) -> Option<u32> {
    let idx = hdr.next_free_node_index.fetch_add(1, Ordering::SeqCst);
    (idx < hdr.n_nodes).then_some(idx)
}

/// Claim `len` payload bytes, rounded up to 8. Returns the byte offset into
/// the payload area.
pub(crate) fn alloc_payload(hdr: &Header, len: usize) -> Option<u64> {
    if len == 0 || len > MAX_VAL_LEN {
        return None;
    }
    let capacity = hdr.total_size - hdr.payload_area_off;
    let aligned = align_up(len, 8) as u64;

    for _ in 0..MAX_CAS_RETRIES {
        let current = hdr.payload_alloc_off.load(Ordering::SeqCst);
        if current + aligned > capacity {
            return None;
        }
        if hdr
            .payload_alloc_off
            .compare_exchange(current, current + aligned, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return Some(current);
        }
    }
    None
}

/// Remaining payload bytes, for the writer's pre-flight capacity check.
#[inline]
pub(crate) fn payload_remaining(hdr: &Header) -> u64 {
    let capacity = hdr.total_size - hdr.payload_area_off;
    capacity.saturating_sub(hdr.payload_alloc_off.load(Ordering::SeqCst))
}
