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

//! Process-shared writer mutex
//!
//! The mutex lives inside the segment header so every attaching process
//! serializes on the same instance. On Linux it is additionally robust: if
//! a writer dies while holding it, the next acquirer observes `EOWNERDEAD`,
//! marks the mutex consistent, and proceeds. The half-written record the
//! dead writer left behind is unreachable because its publishing CAS never
//! fired, and readers discard any in-flight observation via the generation
//! parity protocol.

use std::mem;

use shmdb_core::{Result, ShmError};

/// Initialize a mutex in place inside freshly zeroed shared memory.
///
/// # Safety
/// `mutex` must point to writable memory inside the mapping, and no other
/// process may be using the segment yet.
pub(crate) unsafe fn init_in_place(mutex: *mut libc::pthread_mutex_t) -> Result<()> {
    let mut attr: libc::pthread_mutexattr_t = mem::zeroed();
    if libc::pthread_mutexattr_init(&mut attr) != 0 {
        return Err(ShmError::OpenFailed("pthread_mutexattr_init failed".into()));
    }
    libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
    #[cfg(target_os = "linux")]
    libc::pthread_mutexattr_setrobust(&mut attr, libc::PTHREAD_MUTEX_ROBUST);

    let rc = libc::pthread_mutex_init(mutex, &attr);
    libc::pthread_mutexattr_destroy(&mut attr);
    if rc != 0 {
        return Err(ShmError::OpenFailed(format!(
            "pthread_mutex_init failed: {rc}"
        )));
    }
    Ok(())
}

/// Unlocks on drop.
pub(crate) struct WriterGuard {
    mutex: *mut libc::pthread_mutex_t,
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        // SAFETY: the guard was produced by `lock` on this mutex.
        unsafe {
            libc::pthread_mutex_unlock(self.mutex);
        }
    }
}

/// Block until the writer mutex is held. Recovers from a dead owner where
/// robust mutexes are available.
///
/// # Safety
/// `mutex` must point to the initialized mutex in a live mapping.
pub(crate) unsafe fn lock(mutex: *mut libc::pthread_mutex_t) -> Result<WriterGuard> {
    let rc = libc::pthread_mutex_lock(mutex);
    if rc == libc::EOWNERDEAD {
        #[cfg(target_os = "linux")]
        {
            libc::pthread_mutex_consistent(mutex);
            tracing::warn!("writer mutex owner died; recovered via robust mutex");
        }
    } else if rc != 0 {
        return Err(ShmError::OpenFailed(format!(
            "pthread_mutex_lock failed: {rc}"
        )));
    }
    Ok(WriterGuard { mutex })
}
