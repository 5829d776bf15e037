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

//! End-to-end engine scenarios, including the lock-free reader racing a
//! live writer through two independent handles to one segment.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use shmdb_storage::{
    FloatMatrix, ShmError, Store, StoreConfig, TypedValue, ValueType,
};

fn unique_name(tag: &str) -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    format!(
        "/shmdb-engine-{tag}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}

struct Scoped(String);

impl Scoped {
    fn new(tag: &str) -> Self {
        let name = unique_name(tag);
        let _ = Store::destroy(&name);
        Scoped(name)
    }
}

impl Drop for Scoped {
    fn drop(&mut self) {
        let _ = Store::destroy(&self.0);
    }
}

fn test_config() -> StoreConfig {
    StoreConfig {
        n_buckets: 256,
        n_nodes: 1024,
        payload_size: 1 << 20,
    }
}

#[test]
fn scenario_int_scalar_with_type_checks() {
    let name = Scoped::new("t1");
    let store = Store::open_with_config(&name.0, &test_config()).unwrap();

    store.insert_int_scalar(b"n", 42).unwrap();
    assert_eq!(store.lookup_int_scalar(b"n").unwrap(), 42);
    assert_eq!(store.get_value_type(b"n").unwrap(), ValueType::IntScalar);
    assert!(matches!(
        store.lookup_float_scalar(b"n").unwrap_err(),
        ShmError::TypeMismatch { .. }
    ));
}

#[test]
fn scenario_float_vector_with_payload_accounting() {
    let name = Scoped::new("t2");
    let store = Store::open_with_config(&name.0, &test_config()).unwrap();

    store.insert_float_vector(b"v", &[1.0, 2.0, 3.0]).unwrap();
    let view = store.lookup_float_vector(b"v").unwrap();
    assert_eq!(view.len(), 3);
    assert_eq!(view.to_vec(), vec![1.0, 2.0, 3.0]);

    // key "v": align8(1); value [count + 3 doubles]: align8(4 + 24).
    assert!(store.stats().payload_used >= 8 + 32);
}

#[test]
fn scenario_int_set_dedups() {
    let name = Scoped::new("t3");
    let store = Store::open_with_config(&name.0, &test_config()).unwrap();

    store.insert_int_set(b"s", &[3, 1, 2, 1, 3]).unwrap();
    let view = store.lookup_int_set(b"s").unwrap();
    assert_eq!(view.len(), 3);
    assert_eq!(view.to_vec(), vec![1, 2, 3]);
}

#[test]
fn scenario_object_field_navigation() {
    let name = Scoped::new("t4");
    let store = Store::open_with_config(&name.0, &test_config()).unwrap();

    store
        .insert_object(
            b"obj",
            &[
                ("b".to_string(), TypedValue::IntScalar(7)),
                ("a".to_string(), TypedValue::String("hi".into())),
            ],
        )
        .unwrap();

    let view = store.lookup_object(b"obj").unwrap();
    assert_eq!(view.name(0).unwrap(), b"a");

    let a = view.get("a").unwrap();
    assert_eq!(a.tag, ValueType::String);
    assert_eq!(a.as_str().unwrap(), "hi");

    let b = view.get("b").unwrap();
    assert_eq!(b.tag, ValueType::IntScalar);
    assert_eq!(b.as_int().unwrap(), 7);

    assert_eq!(view.get("zzz").unwrap_err(), ShmError::NotFound);
}

/// Scenario 5: a reader with no synchronization beyond the engine either
/// observes a committed matrix completely or gets `ConcurrentMod`; once a
/// write has visibly committed, the reader must never see `NotFound`.
#[test]
fn concurrent_reader_never_sees_partial_writes() {
    let name = Scoped::new("t5");
    let config = test_config();
    let writer = Arc::new(Store::open_with_config(&name.0, &config).unwrap());
    let reader = Store::open_with_config(&name.0, &config).unwrap();

    const KEYS: usize = 200;
    let published = Arc::new(AtomicUsize::new(0));

    let writer_thread = {
        let writer = Arc::clone(&writer);
        let published = Arc::clone(&published);
        thread::spawn(move || {
            for i in 0..KEYS {
                let base = i as f64;
                let matrix = FloatMatrix::new(
                    2,
                    2,
                    vec![base, base + 1.0, base + 2.0, base + 3.0],
                )
                .unwrap();
                let key = format!("k{i}");
                writer.insert_float_matrix(key.as_bytes(), &matrix).unwrap();
                published.store(i + 1, Ordering::SeqCst);
            }
        })
    };

    let mut verified = 0usize;
    while verified < KEYS {
        let visible = published.load(Ordering::SeqCst);
        if visible == verified {
            thread::yield_now();
            continue;
        }
        // Verify every key that has visibly committed.
        for i in verified..visible {
            let key = format!("k{i}");
            let base = i as f64;
            loop {
                match reader.lookup_float_matrix(key.as_bytes()) {
                    Ok(view) => {
                        assert_eq!(view.rows(), 2);
                        assert_eq!(view.cols(), 2);
                        assert_eq!(
                            view.to_owned().unwrap().data,
                            vec![base, base + 1.0, base + 2.0, base + 3.0]
                        );
                        break;
                    }
                    // An in-flight insert elsewhere invalidated the read
                    // interval; the caller retries.
                    Err(ShmError::ConcurrentMod) => continue,
                    Err(other) => panic!("reader saw {other:?} for committed key {key}"),
                }
            }
        }
        verified = visible;
    }

    writer_thread.join().unwrap();
    assert_eq!(reader.stats().nodes_used, KEYS as u32);
}

/// Many readers hammering one key while a writer appends unrelated keys:
/// every read is either the correct value or `ConcurrentMod`.
#[test]
fn seqlock_readers_see_consistent_values() {
    let name = Scoped::new("seqlock");
    let config = test_config();
    let store = Arc::new(Store::open_with_config(&name.0, &config).unwrap());
    store.insert_int_scalar(b"stable", 42).unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let reader = Store::open_with_config(&name.0, &config).unwrap();
        handles.push(thread::spawn(move || {
            let mut oks = 0usize;
            let mut retries = 0usize;
            while oks < 2_000 {
                match reader.lookup_int_scalar(b"stable") {
                    Ok(v) => {
                        assert_eq!(v, 42);
                        oks += 1;
                    }
                    Err(ShmError::ConcurrentMod) => retries += 1,
                    Err(other) => panic!("unexpected read error: {other:?}"),
                }
            }
            retries
        }));
    }

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..500u32 {
                let key = format!("filler-{i}");
                store.insert_int_scalar(key.as_bytes(), i as i64).unwrap();
            }
        })
    };

    writer.join().unwrap();
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn generation_advances_twice_per_attempt() {
    let name = Scoped::new("genparity");
    let store = Store::open_with_config(
        &name.0,
        &StoreConfig {
            n_buckets: 8,
            n_nodes: 1,
            payload_size: 4096,
        },
    )
    .unwrap();

    assert_eq!(store.stats().generation, 0);
    store.insert_int_scalar(b"only", 1).unwrap();
    assert_eq!(store.stats().generation, 2);

    // Node capacity is exhausted; the failed attempt still frames itself.
    assert!(store.insert_int_scalar(b"next", 2).is_err());
    assert_eq!(store.stats().generation, 4);
    // Even generation at rest: no writer mid-update.
    assert_eq!(store.stats().generation % 2, 0);
}

#[test]
fn typed_values_round_trip_through_the_segment() {
    let name = Scoped::new("values");
    let store = Store::open_with_config(&name.0, &test_config()).unwrap();

    let samples: Vec<(&[u8], TypedValue)> = vec![
        (b"int", TypedValue::IntScalar(-5)),
        (b"float", TypedValue::FloatScalar(2.75)),
        (b"bool", TypedValue::BoolScalar(true)),
        (b"str", TypedValue::String("wire".into())),
        (b"bytes", TypedValue::Bytes(vec![1, 2, 3])),
        (b"iv", TypedValue::IntVector(vec![9, 8])),
        (b"bv", TypedValue::BoolVector(vec![true, false])),
        (
            b"dsv",
            TypedValue::DictStrStringVector(vec![
                ("a".into(), vec!["x".into(), "y".into()]),
                ("b".into(), vec![]),
            ]),
        ),
        (
            b"nested",
            TypedValue::List(vec![
                TypedValue::Null,
                TypedValue::Object(vec![(
                    "inner".into(),
                    TypedValue::FloatVector(vec![0.5]),
                )]),
            ]),
        ),
    ];

    for (key, value) in &samples {
        store.insert_value(key, value).unwrap();
    }
    for (key, value) in &samples {
        let view = store.lookup_value(key).unwrap();
        assert_eq!(view.tag, value.value_type());
        assert_eq!(view.to_owned().unwrap(), *value);
    }
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Invariant: a lookup that returns Ok returns exactly the bytes
        /// written for that key, for any batch of distinct keys, and the
        /// cursors advance strictly across successful inserts.
        #[test]
        fn lookups_return_written_bytes(
            entries in proptest::collection::btree_map(
                proptest::collection::vec(any::<u8>(), 1..32),
                proptest::collection::vec(any::<u8>(), 1..128),
                1..32,
            ),
        ) {
            let name = Scoped::new("prop");
            let store = Store::open_with_config(&name.0, &test_config()).unwrap();

            let mut last_nodes = 0;
            let mut last_payload = 0;
            for (key, value) in &entries {
                store.insert(key, value).unwrap();
                let stats = store.stats();
                prop_assert!(stats.nodes_used > last_nodes);
                prop_assert!(stats.payload_used > last_payload);
                last_nodes = stats.nodes_used;
                last_payload = stats.payload_used;
            }

            for (key, value) in &entries {
                prop_assert_eq!(store.lookup(key).unwrap(), &value[..]);
            }
        }
    }
}

#[test]
fn destroy_removes_the_name_but_not_live_handles() {
    let name = Scoped::new("destroy");
    let store = Store::open_with_config(&name.0, &test_config()).unwrap();
    store.insert_int_scalar(b"x", 1).unwrap();

    Store::destroy(&name.0).unwrap();
    // The mapping stays valid for this handle.
    assert_eq!(store.lookup_int_scalar(b"x").unwrap(), 1);

    // Re-opening the (now unlinked) name creates a fresh segment.
    let fresh = Store::open_with_config(&name.0, &test_config()).unwrap();
    assert_eq!(fresh.lookup_int_scalar(b"x").unwrap_err(), ShmError::NotFound);
}
