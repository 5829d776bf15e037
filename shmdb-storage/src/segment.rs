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

//! Segment lifecycle: shm_open, mapping, initialization, destroy
//!
//! Open is create-exclusive first; losing the race to another creator
//! degrades to a plain open. A pre-existing segment with a valid header
//! dictates the mapped size itself (the caller's geometry is ignored), so
//! mismatched open arguments across processes cannot shear the mapping.
//! `SHM_CREATE_LEGACY=1` restores the old behavior of trusting caller
//! geometry unconditionally; it exists for migration only.

use std::ffi::CString;
use std::fs::File;
use std::os::unix::io::FromRawFd;
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use memmap2::{MmapMut, MmapOptions};
use shmdb_core::{Result, ShmError};

use crate::layout::{
    Geometry, Header, Node, EMPTY_INDEX, FORMAT_VERSION, HEADER_SIZE, MAGIC,
};
use crate::{cleanup, mutex};

fn legacy_create_mode() -> bool {
    matches!(
        std::env::var("SHM_CREATE_LEGACY").as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE")
    )
}

fn shm_name(name: &str) -> Result<CString> {
    if name.is_empty() {
        return Err(ShmError::InvalidParam("empty segment name"));
    }
    CString::new(name).map_err(|_| ShmError::InvalidParam("segment name contains NUL"))
}

/// A per-process attachment: descriptor + mapping. Dropping unmaps and
/// closes; the OS-level name is only removed by [`Segment::destroy`].
pub(crate) struct Segment {
    // Field order matters: the mapping must unmap before the fd closes.
    map: MmapMut,
    base: *mut u8,
    // Held only for ownership; dropping closes the descriptor.
    _file: File,
    name: String,
}

// SAFETY: the mapping is shared memory; all cross-thread/process mutation
// goes through atomics, the in-segment writer mutex, or writes to regions
// not yet published to any reader.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Open or create the named segment.
    pub(crate) fn open(name: &str, geo: Geometry) -> Result<Segment> {
        let c_name = shm_name(name)?;

        // Create-exclusive first so creation is detected reliably; on
        // EEXIST fall back to a plain read-write open.
        // SAFETY: plain shm_open calls with a valid C string.
        let fd = unsafe {
            let fd = libc::shm_open(
                c_name.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                0o666,
            );
            if fd >= 0 {
                fd
            } else if std::io::Error::last_os_error().raw_os_error() == Some(libc::EEXIST) {
                let fd = libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0o666);
                if fd < 0 {
                    return Err(ShmError::OpenFailed(format!(
                        "shm_open({name}) failed: {}",
                        std::io::Error::last_os_error()
                    )));
                }
                fd
            } else {
                return Err(ShmError::OpenFailed(format!(
                    "shm_open({name}) failed: {}",
                    std::io::Error::last_os_error()
                )));
            }
        };
        // SAFETY: we own the fd we just opened.
        let file = unsafe { File::from_raw_fd(fd) };

        let existing_len = file
            .metadata()
            .map_err(|e| ShmError::OpenFailed(format!("fstat failed: {e}")))?
            .len() as usize;

        let requested_total = geo.total_size();
        let mut need_init = false;
        let map_total = if legacy_create_mode() {
            if existing_len < requested_total {
                file.set_len(requested_total as u64)
                    .map_err(|e| ShmError::OpenFailed(format!("ftruncate failed: {e}")))?;
                need_init = true;
            }
            requested_total
        } else {
            match probe_existing_total(&file, existing_len) {
                Some(stored_total) => stored_total,
                None => {
                    if existing_len < requested_total {
                        file.set_len(requested_total as u64)
                            .map_err(|e| ShmError::OpenFailed(format!("ftruncate failed: {e}")))?;
                        need_init = true;
                    }
                    requested_total
                }
            }
        };

        // SAFETY: mapping a file we hold open, MAP_SHARED via map_mut.
        let mut map = unsafe {
            MmapOptions::new()
                .len(map_total)
                .map_mut(&file)
                .map_err(|e| ShmError::OpenFailed(format!("mmap failed: {e}")))?
        };
        let base = map.as_mut_ptr();

        let magic = unsafe { (*(base as *const Header)).magic };
        if need_init || magic != MAGIC {
            // SAFETY: zeroed exclusive region of map_total bytes; either we
            // created the object or its header is unrecognizable.
            unsafe { initialize(base, map_total, &geo)? };
            tracing::debug!(
                segment = name,
                total = map_total,
                buckets = geo.n_buckets,
                nodes = geo.n_nodes,
                "initialized shared memory segment"
            );
        } else {
            tracing::debug!(segment = name, total = map_total, "attached to existing segment");
        }

        cleanup::register_if_enabled(name);

        Ok(Segment {
            map,
            base,
            _file: file,
            name: name.to_owned(),
        })
    }

    /// Remove the OS-level name. Existing mappings stay valid until their
    /// handles drop.
    pub(crate) fn destroy(name: &str) -> Result<()> {
        let c_name = shm_name(name)?;
        // SAFETY: plain shm_unlink call.
        let rc = unsafe { libc::shm_unlink(c_name.as_ptr()) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(ShmError::OpenFailed(format!(
                    "shm_unlink({name}) failed: {err}"
                )));
            }
        } else {
            tracing::debug!(segment = name, "unlinked shared memory segment");
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(crate) fn header(&self) -> &Header {
        // SAFETY: the mapping starts with an initialized Header and outlives
        // `self`.
        unsafe { &*(self.base as *const Header) }
    }

    /// Bucket slot `i` as an atomic, shared with every attached process.
    #[inline]
    pub(crate) fn bucket(&self, i: u32) -> &AtomicU32 {
        debug_assert!(i < self.header().n_buckets);
        // SAFETY: bucket area holds n_buckets u32 slots; AtomicU32 has the
        // same layout as u32 and the slot is 4-byte aligned.
        unsafe {
            &*(self
                .base
                .add(self.header().bucket_area_off as usize + i as usize * 4)
                as *const AtomicU32)
        }
    }

    /// By-value snapshot of node `i`.
    #[inline]
    pub(crate) fn read_node(&self, i: u32) -> Node {
        debug_assert!(i < self.header().n_nodes);
        // SAFETY: node area holds n_nodes records; published nodes are
        // write-once so a racing torn read can only observe an unpublished
        // record, which the caller never reaches via a bucket chain.
        unsafe {
            ptr::read(
                self.base
                    .add(self.header().node_area_off as usize + i as usize * size_of_node())
                    as *const Node,
            )
        }
    }

    /// Write node `i`. Caller holds the writer mutex and the slot is not
    /// yet published.
    #[inline]
    pub(crate) fn write_node(&self, i: u32, node: Node) {
        debug_assert!(i < self.header().n_nodes);
        // SAFETY: exclusive writer, unpublished slot.
        unsafe {
            ptr::write(
                self.base
                    .add(self.header().node_area_off as usize + i as usize * size_of_node())
                    as *mut Node,
                node,
            );
        }
    }

    /// Borrow `len` payload bytes at `off`; `None` when the range leaves
    /// the payload area (corrupt offsets from a broken writer).
    pub(crate) fn payload_slice(&self, off: u32, len: u32) -> Option<&[u8]> {
        let hdr = self.header();
        let capacity = hdr.total_size - hdr.payload_area_off;
        let end = off as u64 + len as u64;
        if end > capacity {
            return None;
        }
        // SAFETY: in-bounds region of the payload area; published payload
        // bytes are never rewritten.
        unsafe {
            Some(std::slice::from_raw_parts(
                self.base
                    .add(hdr.payload_area_off as usize + off as usize),
                len as usize,
            ))
        }
    }

    /// Copy `bytes` into the payload area at `off`. Caller holds the writer
    /// mutex and owns the freshly allocated, unpublished range.
    pub(crate) fn write_payload(&self, off: u64, bytes: &[u8]) {
        let hdr = self.header();
        debug_assert!(off + bytes.len() as u64 <= hdr.total_size - hdr.payload_area_off);
        // SAFETY: exclusive writer, unpublished range inside the payload
        // area.
        unsafe {
            ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.base.add(hdr.payload_area_off as usize + off as usize),
                bytes.len(),
            );
        }
    }

    /// Keep the mapping alive for the borrow checker when handing out
    /// views; the mapping itself is owned by `map`.
    #[allow(dead_code)]
    pub(crate) fn mapped_len(&self) -> usize {
        self.map.len()
    }
}

#[inline]
const fn size_of_node() -> usize {
    std::mem::size_of::<Node>()
}

/// Map just a header-sized prefix and read the stored geometry. `None`
/// unless the magic, version, and size fields are coherent.
fn probe_existing_total(file: &File, existing_len: usize) -> Option<usize> {
    if existing_len < HEADER_SIZE {
        return None;
    }
    // SAFETY: read-only mapping of a prefix we verified exists.
    let probe = unsafe { MmapOptions::new().len(HEADER_SIZE).map(file).ok()? };
    let hdr = unsafe { &*(probe.as_ptr() as *const Header) };
    let ok = hdr.magic == MAGIC
        && hdr.version == FORMAT_VERSION
        && hdr.total_size >= HEADER_SIZE as u64
        // A header claiming more bytes than the object holds would SIGBUS
        // on first touch; treat it as unrecognizable instead.
        && hdr.total_size <= existing_len as u64;
    ok.then(|| hdr.total_size as usize)
}

/// Lay down a fresh segment: zero everything, write the header, empty the
/// buckets, arm the writer mutex, and capture ownership.
///
/// # Safety
/// `base` must point to a writable mapping of `total` bytes that no other
/// process is reading yet.
unsafe fn initialize(base: *mut u8, total: usize, geo: &Geometry) -> Result<()> {
    ptr::write_bytes(base, 0, total);

    let hdr = &mut *(base as *mut Header);
    hdr.magic = MAGIC;
    hdr.version = FORMAT_VERSION;
    hdr.flags = 0;
    hdr.total_size = total as u64;
    hdr.bucket_area_off = geo.bucket_area_off() as u64;
    hdr.node_area_off = geo.node_area_off() as u64;
    hdr.payload_area_off = geo.payload_area_off() as u64;
    hdr.n_buckets = geo.n_buckets;
    hdr.n_nodes = geo.n_nodes;
    hdr.next_free_node_index = AtomicU32::new(0);
    hdr.payload_alloc_off = AtomicU64::new(0);
    hdr.generation = AtomicU64::new(0);
    hdr.checksum = 0;

    let buckets = base.add(geo.bucket_area_off()) as *mut u32;
    for i in 0..geo.n_buckets as usize {
        ptr::write(buckets.add(i), EMPTY_INDEX);
    }

    mutex::init_in_place(hdr.writer_mutex.get())?;

    hdr.owner_uid = libc::getuid();
    hdr.owner_gid = libc::getgid();
    hdr.auth_pid_count = AtomicU32::new(1);
    hdr.auth_pids[0] = AtomicI32::new(std::process::id() as i32);
    hdr.is_memfd = 0;
    hdr.create_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    hdr.marked_for_delete.store(0, Ordering::SeqCst);

    Ok(())
}
