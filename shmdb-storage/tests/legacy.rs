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

//! Environment-toggle behavior. Kept in its own test binary because the
//! toggles are process-global; the single test below sequences every step
//! so no parallel test observes a half-set environment.

use shmdb_storage::{Store, StoreConfig};

#[test]
fn create_legacy_toggle_controls_reopen_geometry() {
    let name = format!("/shmdb-legacy-{}", std::process::id());
    let _ = Store::destroy(&name);

    let small = StoreConfig {
        n_buckets: 64,
        n_nodes: 256,
        payload_size: 1 << 16,
    };

    // Default behavior: the stored header geometry wins over the caller's.
    {
        let store = Store::open_with_config(&name, &small).unwrap();
        store.insert_int_scalar(b"kept", 7).unwrap();
        drop(store);

        let bigger = StoreConfig {
            n_buckets: 128,
            n_nodes: 512,
            payload_size: 1 << 18,
        };
        let reopened = Store::open_with_config(&name, &bigger).unwrap();
        assert_eq!(reopened.stats().n_buckets, 64);
        assert_eq!(reopened.lookup_int_scalar(b"kept").unwrap(), 7);
    }

    // Legacy behavior: caller geometry is honored even for an existing
    // segment, as long as it matches the mapped size the data survives.
    std::env::set_var("SHM_CREATE_LEGACY", "1");
    {
        let reopened = Store::open_with_config(&name, &small).unwrap();
        assert_eq!(reopened.stats().n_buckets, 64);
        assert_eq!(reopened.lookup_int_scalar(b"kept").unwrap(), 7);
    }

    // Growing the requested geometry under legacy mode re-truncates and
    // re-initializes the segment: prior contents are gone.
    {
        let bigger = StoreConfig {
            n_buckets: 128,
            n_nodes: 512,
            payload_size: 1 << 18,
        };
        let reinit = Store::open_with_config(&name, &bigger).unwrap();
        assert_eq!(reinit.stats().n_buckets, 128);
        assert!(reinit.lookup_int_scalar(b"kept").is_err());
    }
    std::env::remove_var("SHM_CREATE_LEGACY");

    let _ = Store::destroy(&name);
}
