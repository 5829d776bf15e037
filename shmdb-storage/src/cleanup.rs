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

//! Process-exit auto-cleanup
//!
//! When `SHM_AUTO_CLEANUP=1`, the first segment this process opens is
//! unlinked again on normal exit and on SIGINT/SIGTERM/SIGHUP. The state is
//! a process-wide singleton installed exactly once; the unlink itself fires
//! at most once regardless of which hook runs first. The signal path stays
//! on async-signal-safe calls (`shm_unlink`, `_exit`) and re-raises the
//! conventional exit status.
//!
//! SIGKILL cannot be caught and SIGSEGV handling is not safe here, so
//! neither is installed.

use std::ffi::CString;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

/// Name of the segment to unlink, leaked into a stable allocation so the
/// signal handler can read it without locking.
static CLEANUP_NAME: AtomicPtr<libc::c_char> = AtomicPtr::new(ptr::null_mut());
static CLEANUP_FIRED: AtomicBool = AtomicBool::new(false);
static HOOKS_INSTALLED: AtomicBool = AtomicBool::new(false);

fn auto_cleanup_enabled() -> bool {
    matches!(std::env::var("SHM_AUTO_CLEANUP").as_deref(), Ok("1"))
}

/// Install the exit hooks for `name` if the env toggle is set and nothing
/// was registered before. Later segments in the same process are not
/// tracked, matching the first-segment-wins contract.
pub(crate) fn register_if_enabled(name: &str) {
    if !auto_cleanup_enabled() {
        return;
    }
    if HOOKS_INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }
    let c_name = match CString::new(name) {
        Ok(c) => c,
        Err(_) => return,
    };
    CLEANUP_NAME.store(c_name.into_raw(), Ordering::SeqCst);

    // SAFETY: handler registration with C-ABI functions defined below.
    unsafe {
        libc::atexit(unlink_at_exit);
        libc::signal(libc::SIGINT, unlink_on_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, unlink_on_signal as libc::sighandler_t);
        libc::signal(libc::SIGHUP, unlink_on_signal as libc::sighandler_t);
    }
    tracing::debug!(segment = name, "registered auto-cleanup exit hooks");
}

fn unlink_once() {
    if CLEANUP_FIRED.swap(true, Ordering::SeqCst) {
        return;
    }
    let name = CLEANUP_NAME.load(Ordering::SeqCst);
    if !name.is_null() {
        // SAFETY: the pointer came from CString::into_raw and is never
        // freed; shm_unlink is async-signal-safe.
        unsafe {
            libc::shm_unlink(name);
        }
    }
}

extern "C" fn unlink_at_exit() {
    unlink_once();
}

extern "C" fn unlink_on_signal(signum: libc::c_int) {
    unlink_once();
    // _exit instead of exit: atexit hooks must not run twice.
    // SAFETY: async-signal-safe process exit.
    unsafe {
        libc::_exit(128 + signum);
    }
}
