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

//! Owner and authorized-PID access control
//!
//! The creator's uid/gid are captured at segment initialization. Privileged
//! operations are gated on the caller's current uid matching the owner;
//! a small in-header PID list extends read-side authorization to specific
//! cooperating processes. This is advisory gating for cooperating code, not
//! a defense against a process that already has write access to the
//! segment (that boundary is the OS permission on the shm object).

use std::sync::atomic::Ordering;

use shmdb_core::{Result, ShmError};

use crate::layout::MAX_AUTH_PIDS;
use crate::store::Store;

impl Store {
    /// Does the calling process own the segment (uid match)?
    pub fn is_owner(&self) -> bool {
        // SAFETY: getuid is always safe.
        (unsafe { libc::getuid() }) == self.header().owner_uid
    }

    /// Owner, or a PID previously added via [`Store::add_authorized_pid`].
    pub fn is_authorized(&self) -> bool {
        if self.is_owner() {
            return true;
        }
        let hdr = self.header();
        let pid = std::process::id() as i32;
        let count = hdr
            .auth_pid_count
            .load(Ordering::SeqCst)
            .min(MAX_AUTH_PIDS as u32);
        (0..count as usize).any(|i| hdr.auth_pids[i].load(Ordering::SeqCst) == pid)
    }

    /// Grant `pid` authorization. Owner only; re-adding is a no-op success;
    /// a full list reports `NoSpace`.
    pub fn add_authorized_pid(&self, pid: i32) -> Result<()> {
        if !self.is_owner() {
            return Err(ShmError::PermissionDenied(
                "only the owner may authorize processes",
            ));
        }
        let hdr = self.header();
        let count = hdr
            .auth_pid_count
            .load(Ordering::SeqCst)
            .min(MAX_AUTH_PIDS as u32) as usize;
        if (0..count).any(|i| hdr.auth_pids[i].load(Ordering::SeqCst) == pid) {
            return Ok(());
        }
        if count >= MAX_AUTH_PIDS {
            return Err(ShmError::NoSpace("authorized pid list full"));
        }
        hdr.auth_pids[count].store(pid, Ordering::SeqCst);
        hdr.auth_pid_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Uid recorded as the segment owner.
    pub fn owner_uid(&self) -> u32 {
        self.header().owner_uid
    }
}
