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

//! The store: writer-serialized inserts, lock-free reads
//!
//! ## Write path
//!
//! ```text
//! lock writer mutex -> generation += 1 -> allocate key/value bytes
//!   -> copy payloads -> allocate node -> write node
//!   -> CAS node into bucket head -> generation += 1 -> unlock
//! ```
//!
//! The generation counter is bumped exactly twice per attempt, on failure
//! paths too, so its parity tells readers whether a writer is mid-update.
//!
//! ## Read path
//!
//! Sample the generation, walk the bucket chain on node snapshots, verify
//! the type tag, build a view into the payload, sample the generation
//! again. A changed generation yields `ConcurrentMod` and the caller
//! decides whether to retry; the engine never retries silently.

use std::sync::atomic::Ordering;

use shmdb_core::codec::{self, ListView, ObjectView, TypedValueView};
use shmdb_core::{FloatMatrix, IntMatrix, Result, ShmError, TypedValue, ValueType};

use crate::layout::{
    align_up, Geometry, Header, Node, DEFAULT_N_BUCKETS, DEFAULT_N_NODES, DEFAULT_PAYLOAD_SIZE,
    EMPTY_INDEX, MAX_CAS_RETRIES, MAX_KEY_LEN, MAX_VAL_LEN, NODE_ACTIVE,
};
use crate::segment::Segment;
use crate::{alloc, index, mutex};

/// Segment geometry request. Zero fields fall back to the defaults, like
/// the C entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    pub n_buckets: usize,
    pub n_nodes: usize,
    pub payload_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            n_buckets: DEFAULT_N_BUCKETS,
            n_nodes: DEFAULT_N_NODES,
            payload_size: DEFAULT_PAYLOAD_SIZE,
        }
    }
}

/// Counters snapshot; all values come from header atomics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub n_buckets: u32,
    pub n_nodes: u32,
    pub nodes_used: u32,
    pub payload_capacity: u64,
    pub payload_used: u64,
    pub generation: u64,
}

/// A handle to a named shared-memory store. Cloning is not supported; open
/// the segment again instead (handles are cheap, the mapping is shared).
///
/// Dropping the handle unmaps and closes the descriptor. The OS-level name
/// lives until [`Store::destroy`].
pub struct Store {
    seg: Segment,
}

impl Store {
    /// Open or create `name` with default geometry.
    pub fn open(name: &str) -> Result<Store> {
        Self::open_with_config(name, &StoreConfig::default())
    }

    /// Open or create `name`. For a pre-existing segment with a valid
    /// header the stored geometry wins and `config` is ignored (unless
    /// `SHM_CREATE_LEGACY` selects the migration behavior).
    pub fn open_with_config(name: &str, config: &StoreConfig) -> Result<Store> {
        let pick = |v: usize, def: usize| if v == 0 { def } else { v };
        let geo = Geometry::compute(
            pick(config.n_buckets, DEFAULT_N_BUCKETS),
            pick(config.n_nodes, DEFAULT_N_NODES),
            pick(config.payload_size, DEFAULT_PAYLOAD_SIZE),
        )?;
        Ok(Store {
            seg: Segment::open(name, geo)?,
        })
    }

    /// Remove the OS-level name; attached handles keep working.
    pub fn destroy(name: &str) -> Result<()> {
        Segment::destroy(name)
    }

    /// Unmap and close. Equivalent to dropping the handle.
    pub fn close(self) {}

    pub fn name(&self) -> &str {
        self.seg.name()
    }

    #[inline]
    pub(crate) fn header(&self) -> &Header {
        self.seg.header()
    }

    // ========================================================================
    // Stats
    // ========================================================================

    pub fn stats(&self) -> StoreStats {
        let hdr = self.header();
        StoreStats {
            n_buckets: hdr.n_buckets,
            n_nodes: hdr.n_nodes,
            nodes_used: hdr.next_free_node_index.load(Ordering::SeqCst),
            payload_capacity: hdr.total_size - hdr.payload_area_off,
            payload_used: hdr.payload_alloc_off.load(Ordering::SeqCst),
            generation: hdr.generation.load(Ordering::SeqCst),
        }
    }

    // ========================================================================
    // Write path
    // ========================================================================

    /// Untyped insert; the node keeps the `UNKNOWN` tag.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.insert_raw(key, ValueType::Unknown, value)
    }

    /// Insert a pre-encoded payload under an explicit tag. The payload must
    /// be the exact wire encoding for `tag`; this is the entry point the C
    /// ABI uses for OBJECT/LIST fields that arrive already encoded.
    pub fn insert_encoded(&self, key: &[u8], tag: ValueType, payload: &[u8]) -> Result<()> {
        self.insert_raw(key, tag, payload)
    }

    /// Insert any owned value under its own tag.
    pub fn insert_value(&self, key: &[u8], value: &TypedValue) -> Result<()> {
        if matches!(value, TypedValue::Null) {
            return Err(ShmError::InvalidParam(
                "null is only storable inside object/list values",
            ));
        }
        self.insert_raw(key, value.value_type(), &value.encode()?)
    }

    fn insert_raw(&self, key: &[u8], tag: ValueType, value: &[u8]) -> Result<()> {
        validate_key(key)?;
        if value.is_empty() {
            return Err(ShmError::InvalidParam("empty value"));
        }
        if value.len() > MAX_VAL_LEN {
            return Err(ShmError::InvalidParam("value too large"));
        }

        let hdr = self.header();
        // SAFETY: the mutex lives in the mapped header for the lifetime of
        // this handle.
        let _guard = unsafe { mutex::lock(hdr.writer_mutex.get())? };

        hdr.generation.fetch_add(1, Ordering::SeqCst);
        let result = self.insert_locked(key, tag, value);
        // Second bump on success and failure alike: readers rely on the
        // parity pair to frame every write attempt.
        hdr.generation.fetch_add(1, Ordering::SeqCst);
        result
    }

    fn insert_locked(&self, key: &[u8], tag: ValueType, value: &[u8]) -> Result<()> {
        let hdr = self.header();

        // Pre-flight capacity checks. Writers are serialized, so checking
        // before consuming keeps both cursors untouched on every failure
        // path.
        if hdr.next_free_node_index.load(Ordering::SeqCst) >= hdr.n_nodes {
            return Err(ShmError::NoSpace("node capacity exhausted"));
        }
        let needed = (align_up(key.len(), 8) + align_up(value.len(), 8)) as u64;
        if alloc::payload_remaining(hdr) < needed {
            return Err(ShmError::NoSpace("payload area exhausted"));
        }

        let key_off = alloc::alloc_payload(hdr, key.len())
            .ok_or(ShmError::NoSpace("payload area exhausted"))?;
        let val_off = alloc::alloc_payload(hdr, value.len())
            .ok_or(ShmError::NoSpace("payload area exhausted"))?;
        self.seg.write_payload(key_off, key);
        self.seg.write_payload(val_off, value);

        let node_idx = alloc::alloc_node(hdr).ok_or(ShmError::NoSpace("node capacity exhausted"))?;
        let mut node = Node {
            key_off: key_off as u32,
            key_len: key.len() as u32,
            val_off: val_off as u32,
            val_len: value.len() as u32,
            next_index: EMPTY_INDEX,
            flags: NODE_ACTIVE,
            version: 1,
            value_type: tag.as_u8(),
            reserved: [0; 7],
        };

        // Publish: write the full record, then CAS it in as the new chain
        // head. Readers that see the new head see the record complete.
        let bucket = self
            .seg
            .bucket(index::bucket_of(index::fnv1a(key), hdr.n_buckets));
        for _ in 0..MAX_CAS_RETRIES {
            let head = bucket.load(Ordering::SeqCst);
            node.next_index = head;
            self.seg.write_node(node_idx, node);
            if bucket
                .compare_exchange(head, node_idx, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Ok(());
            }
        }
        Err(ShmError::NoSpace("bucket publish retries exhausted"))
    }

    // ========================================================================
    // Read path
    // ========================================================================

    /// Walk the bucket chain on by-value node snapshots. Indices or offsets
    /// that leave the segment terminate the walk as not-found.
    fn find_node(&self, key: &[u8]) -> Option<Node> {
        let hdr = self.header();
        let bucket = self
            .seg
            .bucket(index::bucket_of(index::fnv1a(key), hdr.n_buckets));
        let mut idx = bucket.load(Ordering::SeqCst);
        while idx != EMPTY_INDEX {
            if idx >= hdr.n_nodes {
                return None;
            }
            let node = self.seg.read_node(idx);
            if node.flags & NODE_ACTIVE != 0 && node.key_len as usize == key.len() {
                match self.seg.payload_slice(node.key_off, node.key_len) {
                    Some(stored) if stored == key => return Some(node),
                    Some(_) => {}
                    None => return None,
                }
            }
            idx = node.next_index;
        }
        None
    }

    /// Seqlock read skeleton shared by every lookup: sample the generation,
    /// resolve the node and run `read` on its payload, then re-check the
    /// generation. Errors from `read` (for example a type mismatch) pass
    /// through unchanged.
    fn seqlock_read<'a, T: 'a>(
        &'a self,
        key: &[u8],
        read: impl FnOnce(&Node, &'a [u8]) -> Result<T>,
    ) -> Result<T> {
        validate_key(key)?;
        let hdr = self.header();
        let g1 = hdr.generation.load(Ordering::SeqCst);

        match self.find_node(key) {
            Some(node) => {
                let payload = self
                    .seg
                    .payload_slice(node.val_off, node.val_len)
                    .ok_or(ShmError::NotFound)?;
                let out = read(&node, payload)?;
                if hdr.generation.load(Ordering::SeqCst) != g1 {
                    return Err(ShmError::ConcurrentMod);
                }
                Ok(out)
            }
            None => {
                if hdr.generation.load(Ordering::SeqCst) != g1 {
                    Err(ShmError::ConcurrentMod)
                } else {
                    Err(ShmError::NotFound)
                }
            }
        }
    }

    fn lookup_typed<'a, T: 'a>(
        &'a self,
        key: &[u8],
        expected: ValueType,
        decode: impl FnOnce(&'a [u8]) -> Result<T>,
    ) -> Result<T> {
        self.seqlock_read(key, |node, payload| {
            let found = ValueType::from_u8(node.value_type)
                .ok_or(ShmError::InvalidParam("unrecognized type tag"))?;
            if found != expected {
                return Err(ShmError::TypeMismatch { expected, found });
            }
            decode(payload)
        })
    }

    /// Untyped lookup: the raw value bytes, whatever the tag.
    pub fn lookup(&self, key: &[u8]) -> Result<&[u8]> {
        self.seqlock_read(key, |_, payload| Ok(payload))
    }

    /// Untyped lookup into a caller buffer; `NoSpace` when it does not fit.
    pub fn lookup_copy(&self, key: &[u8], buf: &mut [u8]) -> Result<usize> {
        let value = self.lookup(key)?;
        if buf.len() < value.len() {
            return Err(ShmError::NoSpace("destination buffer too small"));
        }
        buf[..value.len()].copy_from_slice(value);
        Ok(value.len())
    }

    /// Tag plus raw payload for any stored value.
    pub fn lookup_value(&self, key: &[u8]) -> Result<TypedValueView<'_>> {
        self.seqlock_read(key, |node, payload| {
            let tag = ValueType::from_u8(node.value_type)
                .ok_or(ShmError::InvalidParam("unrecognized type tag"))?;
            Ok(TypedValueView { tag, payload })
        })
    }

    /// The stored tag for `key`.
    pub fn get_value_type(&self, key: &[u8]) -> Result<ValueType> {
        self.seqlock_read(key, |node, _| {
            ValueType::from_u8(node.value_type)
                .ok_or(ShmError::InvalidParam("unrecognized type tag"))
        })
    }

    // ========================================================================
    // Typed inserts
    // ========================================================================

    pub fn insert_int_scalar(&self, key: &[u8], value: i64) -> Result<()> {
        self.insert_raw(key, ValueType::IntScalar, &codec::encode_int_scalar(value))
    }

    pub fn insert_float_scalar(&self, key: &[u8], value: f64) -> Result<()> {
        self.insert_raw(
            key,
            ValueType::FloatScalar,
            &codec::encode_float_scalar(value),
        )
    }

    pub fn insert_bool_scalar(&self, key: &[u8], value: bool) -> Result<()> {
        self.insert_raw(
            key,
            ValueType::BoolScalar,
            &codec::encode_bool_scalar(value),
        )
    }

    pub fn insert_string(&self, key: &[u8], value: &str) -> Result<()> {
        self.insert_raw(key, ValueType::String, &codec::encode_string(value))
    }

    pub fn insert_bytes(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.insert_raw(key, ValueType::Bytes, &codec::encode_bytes(value))
    }

    pub fn insert_int_vector(&self, key: &[u8], values: &[i64]) -> Result<()> {
        self.insert_raw(key, ValueType::IntVector, &codec::encode_int_vector(values))
    }

    pub fn insert_float_vector(&self, key: &[u8], values: &[f64]) -> Result<()> {
        self.insert_raw(
            key,
            ValueType::FloatVector,
            &codec::encode_float_vector(values),
        )
    }

    pub fn insert_bool_vector(&self, key: &[u8], values: &[bool]) -> Result<()> {
        self.insert_raw(
            key,
            ValueType::BoolVector,
            &codec::encode_bool_vector(values),
        )
    }

    pub fn insert_int_matrix(&self, key: &[u8], matrix: &IntMatrix) -> Result<()> {
        self.insert_raw(key, ValueType::IntMatrix, &codec::encode_int_matrix(matrix)?)
    }

    pub fn insert_float_matrix(&self, key: &[u8], matrix: &FloatMatrix) -> Result<()> {
        self.insert_raw(
            key,
            ValueType::FloatMatrix,
            &codec::encode_float_matrix(matrix)?,
        )
    }

    pub fn insert_int_set(&self, key: &[u8], values: &[i64]) -> Result<()> {
        self.insert_raw(key, ValueType::IntSet, &codec::encode_int_set(values))
    }

    pub fn insert_float_set(&self, key: &[u8], values: &[f64]) -> Result<()> {
        self.insert_raw(key, ValueType::FloatSet, &codec::encode_float_set(values))
    }

    pub fn insert_string_set<S: AsRef<str>>(&self, key: &[u8], values: &[S]) -> Result<()> {
        self.insert_raw(key, ValueType::StringSet, &codec::encode_string_set(values)?)
    }

    pub fn insert_string_vector<S: AsRef<str>>(&self, key: &[u8], values: &[S]) -> Result<()> {
        self.insert_raw(
            key,
            ValueType::StringVector,
            &codec::encode_string_vector(values)?,
        )
    }

    pub fn insert_dict_str_int<K: AsRef<str>>(&self, key: &[u8], pairs: &[(K, i64)]) -> Result<()> {
        self.insert_raw(
            key,
            ValueType::DictStrInt,
            &codec::encode_dict_str_int(pairs)?,
        )
    }

    pub fn insert_dict_str_float<K: AsRef<str>>(
        &self,
        key: &[u8],
        pairs: &[(K, f64)],
    ) -> Result<()> {
        self.insert_raw(
            key,
            ValueType::DictStrFloat,
            &codec::encode_dict_str_float(pairs)?,
        )
    }

    pub fn insert_dict_str_bool<K: AsRef<str>>(
        &self,
        key: &[u8],
        pairs: &[(K, bool)],
    ) -> Result<()> {
        self.insert_raw(
            key,
            ValueType::DictStrBool,
            &codec::encode_dict_str_bool(pairs)?,
        )
    }

    pub fn insert_dict_str_string<K: AsRef<str>, V: AsRef<str>>(
        &self,
        key: &[u8],
        pairs: &[(K, V)],
    ) -> Result<()> {
        self.insert_raw(
            key,
            ValueType::DictStrString,
            &codec::encode_dict_str_string(pairs)?,
        )
    }

    pub fn insert_dict_str_bytes<K: AsRef<str>, V: AsRef<[u8]>>(
        &self,
        key: &[u8],
        pairs: &[(K, V)],
    ) -> Result<()> {
        self.insert_raw(
            key,
            ValueType::DictStrBytes,
            &codec::encode_dict_str_bytes(pairs)?,
        )
    }

    pub fn insert_dict_str_float_vector<K: AsRef<str>, V: AsRef<[f64]>>(
        &self,
        key: &[u8],
        pairs: &[(K, V)],
    ) -> Result<()> {
        self.insert_raw(
            key,
            ValueType::DictStrFloatVector,
            &codec::encode_dict_str_float_vector(pairs)?,
        )
    }

    pub fn insert_dict_str_float_matrix<K: AsRef<str>>(
        &self,
        key: &[u8],
        pairs: &[(K, FloatMatrix)],
    ) -> Result<()> {
        self.insert_raw(
            key,
            ValueType::DictStrFloatMatrix,
            &codec::encode_dict_str_float_matrix(pairs)?,
        )
    }

    pub fn insert_dict_str_string_vector<K: AsRef<str>, S: AsRef<str>>(
        &self,
        key: &[u8],
        pairs: &[(K, Vec<S>)],
    ) -> Result<()> {
        self.insert_raw(
            key,
            ValueType::DictStrStringVector,
            &codec::encode_dict_str_string_vector(pairs)?,
        )
    }

    pub fn insert_object<K: AsRef<str>>(
        &self,
        key: &[u8],
        fields: &[(K, TypedValue)],
    ) -> Result<()> {
        self.insert_raw(key, ValueType::Object, &codec::encode_object(fields)?)
    }

    pub fn insert_list(&self, key: &[u8], items: &[TypedValue]) -> Result<()> {
        self.insert_raw(key, ValueType::List, &codec::encode_list(items)?)
    }

    // ========================================================================
    // Typed lookups (zero-copy views tied to this handle)
    // ========================================================================

    pub fn lookup_int_scalar(&self, key: &[u8]) -> Result<i64> {
        self.lookup_typed(key, ValueType::IntScalar, codec::decode_int_scalar)
    }

    pub fn lookup_float_scalar(&self, key: &[u8]) -> Result<f64> {
        self.lookup_typed(key, ValueType::FloatScalar, codec::decode_float_scalar)
    }

    pub fn lookup_bool_scalar(&self, key: &[u8]) -> Result<bool> {
        self.lookup_typed(key, ValueType::BoolScalar, codec::decode_bool_scalar)
    }

    pub fn lookup_string(&self, key: &[u8]) -> Result<&str> {
        self.lookup_typed(key, ValueType::String, codec::decode_str)
    }

    pub fn lookup_bytes(&self, key: &[u8]) -> Result<&[u8]> {
        self.lookup_typed(key, ValueType::Bytes, codec::decode_bytes)
    }

    pub fn lookup_int_vector(&self, key: &[u8]) -> Result<codec::IntVectorView<'_>> {
        self.lookup_typed(key, ValueType::IntVector, codec::decode_int_vector)
    }

    pub fn lookup_float_vector(&self, key: &[u8]) -> Result<codec::FloatVectorView<'_>> {
        self.lookup_typed(key, ValueType::FloatVector, codec::decode_float_vector)
    }

    pub fn lookup_bool_vector(&self, key: &[u8]) -> Result<codec::BoolVectorView<'_>> {
        self.lookup_typed(key, ValueType::BoolVector, codec::decode_bool_vector)
    }

    pub fn lookup_int_matrix(&self, key: &[u8]) -> Result<codec::IntMatrixView<'_>> {
        self.lookup_typed(key, ValueType::IntMatrix, codec::decode_int_matrix)
    }

    pub fn lookup_float_matrix(&self, key: &[u8]) -> Result<codec::FloatMatrixView<'_>> {
        self.lookup_typed(key, ValueType::FloatMatrix, codec::decode_float_matrix)
    }

    pub fn lookup_int_set(&self, key: &[u8]) -> Result<codec::IntSetView<'_>> {
        self.lookup_typed(key, ValueType::IntSet, codec::decode_int_set)
    }

    pub fn lookup_float_set(&self, key: &[u8]) -> Result<codec::FloatSetView<'_>> {
        self.lookup_typed(key, ValueType::FloatSet, codec::decode_float_set)
    }

    pub fn lookup_string_set(&self, key: &[u8]) -> Result<codec::StringSetView<'_>> {
        self.lookup_typed(key, ValueType::StringSet, codec::decode_string_set)
    }

    pub fn lookup_string_vector(&self, key: &[u8]) -> Result<codec::StringVectorView<'_>> {
        self.lookup_typed(key, ValueType::StringVector, codec::decode_string_vector)
    }

    pub fn lookup_dict_str_int(&self, key: &[u8]) -> Result<codec::DictStrIntView<'_>> {
        self.lookup_typed(key, ValueType::DictStrInt, codec::decode_dict_str_int)
    }

    pub fn lookup_dict_str_float(&self, key: &[u8]) -> Result<codec::DictStrFloatView<'_>> {
        self.lookup_typed(key, ValueType::DictStrFloat, codec::decode_dict_str_float)
    }

    pub fn lookup_dict_str_bool(&self, key: &[u8]) -> Result<codec::DictStrBoolView<'_>> {
        self.lookup_typed(key, ValueType::DictStrBool, codec::decode_dict_str_bool)
    }

    pub fn lookup_dict_str_string(&self, key: &[u8]) -> Result<codec::DictStrStringView<'_>> {
        self.lookup_typed(key, ValueType::DictStrString, codec::decode_dict_str_string)
    }

    pub fn lookup_dict_str_bytes(&self, key: &[u8]) -> Result<codec::DictStrBytesView<'_>> {
        self.lookup_typed(key, ValueType::DictStrBytes, codec::decode_dict_str_bytes)
    }

    pub fn lookup_dict_str_float_vector(
        &self,
        key: &[u8],
    ) -> Result<codec::DictStrFloatVectorView<'_>> {
        self.lookup_typed(
            key,
            ValueType::DictStrFloatVector,
            codec::decode_dict_str_float_vector,
        )
    }

    pub fn lookup_dict_str_float_matrix(
        &self,
        key: &[u8],
    ) -> Result<codec::DictStrFloatMatrixView<'_>> {
        self.lookup_typed(
            key,
            ValueType::DictStrFloatMatrix,
            codec::decode_dict_str_float_matrix,
        )
    }

    pub fn lookup_dict_str_string_vector(
        &self,
        key: &[u8],
    ) -> Result<codec::DictStrStringVectorView<'_>> {
        self.lookup_typed(
            key,
            ValueType::DictStrStringVector,
            codec::decode_dict_str_string_vector,
        )
    }

    pub fn lookup_object(&self, key: &[u8]) -> Result<ObjectView<'_>> {
        self.lookup_typed(key, ValueType::Object, codec::decode_object)
    }

    pub fn lookup_list(&self, key: &[u8]) -> Result<ListView<'_>> {
        self.lookup_typed(key, ValueType::List, codec::decode_list)
    }
}

#[inline]
fn validate_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(ShmError::InvalidParam("empty key"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(ShmError::InvalidParam("key too long"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        use std::sync::atomic::AtomicU32;
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        format!(
            "/shmdb-store-{tag}-{}-{}",
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

    fn small_config() -> StoreConfig {
        StoreConfig {
            n_buckets: 64,
            n_nodes: 128,
            payload_size: 1 << 16,
        }
    }

    #[test]
    fn raw_insert_and_lookup() {
        let name = Scoped::new("raw");
        let store = Store::open_with_config(&name.0, &small_config()).unwrap();

        store.insert(b"hello", b"world").unwrap();
        assert_eq!(store.lookup(b"hello").unwrap(), b"world");
        assert_eq!(store.lookup(b"missing").unwrap_err(), ShmError::NotFound);
        assert_eq!(store.get_value_type(b"hello").unwrap(), ValueType::Unknown);

        let mut buf = [0u8; 16];
        assert_eq!(store.lookup_copy(b"hello", &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"world");
        let mut tiny = [0u8; 2];
        assert!(matches!(
            store.lookup_copy(b"hello", &mut tiny).unwrap_err(),
            ShmError::NoSpace(_)
        ));
    }

    #[test]
    fn rejects_degenerate_keys_and_values() {
        let name = Scoped::new("degenerate");
        let store = Store::open_with_config(&name.0, &small_config()).unwrap();

        assert_eq!(
            store.insert(b"", b"v").unwrap_err(),
            ShmError::InvalidParam("empty key")
        );
        assert_eq!(
            store.insert(b"k", b"").unwrap_err(),
            ShmError::InvalidParam("empty value")
        );
        assert!(store.lookup(b"").is_err());
        let long_key = vec![b'k'; MAX_KEY_LEN + 1];
        assert!(store.insert(&long_key, b"v").is_err());
    }

    #[test]
    fn scalar_round_trip_and_type_check() {
        let name = Scoped::new("scalar");
        let store = Store::open_with_config(&name.0, &small_config()).unwrap();

        store.insert_int_scalar(b"n", 42).unwrap();
        assert_eq!(store.lookup_int_scalar(b"n").unwrap(), 42);
        assert_eq!(store.get_value_type(b"n").unwrap(), ValueType::IntScalar);
        assert_eq!(
            store.lookup_float_scalar(b"n").unwrap_err(),
            ShmError::TypeMismatch {
                expected: ValueType::FloatScalar,
                found: ValueType::IntScalar,
            }
        );

        store.insert_bool_scalar(b"flag", true).unwrap();
        assert!(store.lookup_bool_scalar(b"flag").unwrap());
        store.insert_string(b"s", "héllo").unwrap();
        assert_eq!(store.lookup_string(b"s").unwrap(), "héllo");
    }

    #[test]
    fn vector_views_and_payload_accounting() {
        let name = Scoped::new("vector");
        let store = Store::open_with_config(&name.0, &small_config()).unwrap();

        store.insert_float_vector(b"v", &[1.0, 2.0, 3.0]).unwrap();
        let view = store.lookup_float_vector(b"v").unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.to_vec(), vec![1.0, 2.0, 3.0]);

        // key "v" consumes align8(1), the payload align8(4 + 24).
        let stats = store.stats();
        assert!(stats.payload_used >= 8 + 32);
        assert_eq!(stats.nodes_used, 1);
    }

    #[test]
    fn set_insert_sorts_and_dedups() {
        let name = Scoped::new("set");
        let store = Store::open_with_config(&name.0, &small_config()).unwrap();

        store.insert_int_set(b"s", &[3, 1, 2, 1, 3]).unwrap();
        let view = store.lookup_int_set(b"s").unwrap();
        assert_eq!(view.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn object_fields_sorted_and_searchable() {
        let name = Scoped::new("object");
        let store = Store::open_with_config(&name.0, &small_config()).unwrap();

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
        assert_eq!(view.get("a").unwrap().as_str().unwrap(), "hi");
        assert_eq!(view.get("b").unwrap().as_int().unwrap(), 7);
        assert_eq!(view.get("zzz").unwrap_err(), ShmError::NotFound);
    }

    #[test]
    fn list_elements_by_index() {
        let name = Scoped::new("list");
        let store = Store::open_with_config(&name.0, &small_config()).unwrap();

        store
            .insert_list(
                b"l",
                &[TypedValue::IntScalar(1), TypedValue::String("x".into())],
            )
            .unwrap();
        let view = store.lookup_list(b"l").unwrap();
        assert_eq!(view.get(0).unwrap().as_int().unwrap(), 1);
        assert_eq!(view.get(1).unwrap().as_str().unwrap(), "x");
        assert_eq!(view.get(2).unwrap_err(), ShmError::NotFound);
    }

    #[test]
    fn dict_duplicate_keys_are_rejected() {
        let name = Scoped::new("dictdup");
        let store = Store::open_with_config(&name.0, &small_config()).unwrap();

        let before = store.stats();
        let err = store
            .insert_dict_str_int(b"d", &[("k", 1), ("k", 2)])
            .unwrap_err();
        assert_eq!(err.code(), 4);
        // Encoding fails before the write path runs at all.
        assert_eq!(store.stats(), before);
    }

    #[test]
    fn node_capacity_exhaustion_freezes_cursors() {
        let name = Scoped::new("nodecap");
        let store = Store::open_with_config(
            &name.0,
            &StoreConfig {
                n_buckets: 8,
                n_nodes: 2,
                payload_size: 1 << 16,
            },
        )
        .unwrap();

        store.insert_int_scalar(b"a", 1).unwrap();
        store.insert_int_scalar(b"b", 2).unwrap();
        let full = store.stats();
        assert_eq!(full.nodes_used, 2);

        let err = store.insert_int_scalar(b"c", 3).unwrap_err();
        assert!(matches!(err, ShmError::NoSpace(_)));

        let after = store.stats();
        assert_eq!(after.nodes_used, full.nodes_used);
        assert_eq!(after.payload_used, full.payload_used);
        // Both earlier keys are still reachable.
        assert_eq!(store.lookup_int_scalar(b"a").unwrap(), 1);
        assert_eq!(store.lookup_int_scalar(b"b").unwrap(), 2);
        // Failed attempt still bumped the generation twice.
        assert_eq!(after.generation, full.generation + 2);
    }

    #[test]
    fn payload_exhaustion_freezes_cursors() {
        let name = Scoped::new("paycap");
        let store = Store::open_with_config(
            &name.0,
            &StoreConfig {
                n_buckets: 8,
                n_nodes: 64,
                payload_size: 4096,
            },
        )
        .unwrap();

        // Key (8) + value (4000, already 8-aligned) = 4008 of 4096.
        let big = vec![0xABu8; 4000];
        store.insert(b"big", &big).unwrap();
        let full = store.stats();
        assert_eq!(full.payload_used, 4008);

        // Needs 8 + 104 = 112 > 88 remaining.
        let err = store.insert(b"more", &[0u8; 100]).unwrap_err();
        assert!(matches!(err, ShmError::NoSpace(_)));

        let after = store.stats();
        assert_eq!(after.payload_used, full.payload_used);
        assert_eq!(after.nodes_used, full.nodes_used);
        assert_eq!(store.lookup(b"big").unwrap(), &big[..]);
    }

    #[test]
    fn second_handle_sees_existing_data() {
        let name = Scoped::new("twohandles");
        let writer = Store::open_with_config(&name.0, &small_config()).unwrap();
        writer.insert_int_scalar(b"shared", 99).unwrap();

        let reader = Store::open(&name.0).unwrap();
        // Header geometry wins over the caller's default request.
        assert_eq!(reader.stats().n_buckets, 64);
        assert_eq!(reader.lookup_int_scalar(b"shared").unwrap(), 99);
    }

    #[test]
    fn stats_report_geometry_and_generation() {
        let name = Scoped::new("stats");
        let store = Store::open_with_config(&name.0, &small_config()).unwrap();
        let s0 = store.stats();
        assert_eq!(s0.n_buckets, 64);
        assert_eq!(s0.n_nodes, 128);
        assert_eq!(s0.nodes_used, 0);
        assert_eq!(s0.payload_used, 0);
        assert_eq!(s0.generation, 0);

        store.insert_int_scalar(b"x", 1).unwrap();
        let s1 = store.stats();
        assert_eq!(s1.nodes_used, 1);
        assert_eq!(s1.generation, 2);
        assert!(s1.payload_used > 0);
    }

    #[test]
    fn owner_can_round_trip_encrypted_values() {
        let name = Scoped::new("crypto");
        let store = Store::open_with_config(&name.0, &small_config()).unwrap();
        let key16 = *b"0123456789abcdef";

        assert!(store.is_owner());
        assert!(store.is_authorized());
        store.insert_encrypted(b"secret", b"hello", &key16).unwrap();
        assert_eq!(
            store.lookup_decrypted(b"secret", &key16).unwrap(),
            b"hello"
        );
        // Stored via the untyped path: tag stays UNKNOWN and the raw bytes
        // are not the plaintext.
        assert_eq!(
            store.get_value_type(b"secret").unwrap(),
            ValueType::Unknown
        );
        let raw = store.lookup(b"secret").unwrap();
        assert_eq!(raw.len(), 4 + 16);
        assert_ne!(&raw[4..9], b"hello");
    }

    #[test]
    fn authorized_pid_list_gates_and_fills() {
        let name = Scoped::new("pids");
        let store = Store::open_with_config(&name.0, &small_config()).unwrap();

        // Creator is pre-authorized; re-adding is a no-op success.
        let own_pid = std::process::id() as i32;
        store.add_authorized_pid(own_pid).unwrap();
        assert!(store.is_authorized());

        // 31 more distinct pids fill the list; the next one overflows.
        for pid in 1..=31 {
            store.add_authorized_pid(1_000_000 + pid).unwrap();
        }
        assert_eq!(
            store.add_authorized_pid(2_000_000).unwrap_err(),
            ShmError::NoSpace("authorized pid list full")
        );
    }

    #[test]
    fn insert_value_dispatches_and_rejects_null() {
        let name = Scoped::new("value");
        let store = Store::open_with_config(&name.0, &small_config()).unwrap();

        store
            .insert_value(b"dv", &TypedValue::DictStrBool(vec![("on".into(), true)]))
            .unwrap();
        let view = store.lookup_dict_str_bool(b"dv").unwrap();
        assert_eq!(view.get("on"), Some(true));

        assert!(store.insert_value(b"nil", &TypedValue::Null).is_err());

        let tv = store.lookup_value(b"dv").unwrap();
        assert_eq!(tv.tag, ValueType::DictStrBool);
        assert_eq!(tv.to_owned().unwrap(), TypedValue::DictStrBool(vec![("on".into(), true)]));
    }
}
