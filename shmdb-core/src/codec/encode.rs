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

//! Value encoders
//!
//! Each function emits the exact payload layout for one tag. Set encoders
//! sort and deduplicate their input; dictionary and object encoders sort by
//! key bytes and reject duplicates with `InvalidParam`.

use crate::codec::raw::align4;
use crate::error::{Result, ShmError};
use crate::value::{FloatMatrix, IntMatrix, TypedValue, ValueType};

/// Keys and key blobs are addressed by u32 offsets.
const MAX_BLOB: usize = u32::MAX as usize;

#[inline]
fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Append a `(count + 1)` offset table followed by the concatenated items.
fn push_str_table<B: AsRef<[u8]>>(out: &mut Vec<u8>, items: &[B]) -> Result<()> {
    let total: usize = items.iter().map(|s| s.as_ref().len()).sum();
    if total > MAX_BLOB {
        return Err(ShmError::InvalidParam("string blob exceeds u32 range"));
    }
    let mut cur = 0u32;
    for item in items {
        push_u32(out, cur);
        cur += item.as_ref().len() as u32;
    }
    push_u32(out, cur);
    for item in items {
        out.extend_from_slice(item.as_ref());
    }
    Ok(())
}

/// Sort dictionary entries by key bytes and reject duplicate keys.
fn sorted_pairs<'a, K: AsRef<str>, V>(pairs: &'a [(K, V)]) -> Result<Vec<(&'a [u8], &'a V)>> {
    if pairs.len() > u32::MAX as usize {
        return Err(ShmError::InvalidParam("too many dictionary entries"));
    }
    let mut sorted: Vec<(&[u8], &V)> = pairs
        .iter()
        .map(|(k, v)| (k.as_ref().as_bytes(), v))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    for w in sorted.windows(2) {
        if w[0].0 == w[1].0 {
            return Err(ShmError::InvalidParam("duplicate dictionary key"));
        }
    }
    Ok(sorted)
}

// ============================================================================
// Scalars, strings, bytes
// ============================================================================

pub fn encode_int_scalar(v: i64) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

pub fn encode_float_scalar(v: f64) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

pub fn encode_bool_scalar(v: bool) -> Vec<u8> {
    vec![v as u8]
}

pub fn encode_string(s: &str) -> Vec<u8> {
    encode_bytes(s.as_bytes())
}

/// `[count:u32][count bytes]`, shared by STRING and BYTES.
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + data.len());
    push_u32(&mut out, data.len() as u32);
    out.extend_from_slice(data);
    out
}

// ============================================================================
// Vectors and matrices
// ============================================================================

pub fn encode_int_vector(values: &[i64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + values.len() * 8);
    push_u32(&mut out, values.len() as u32);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn encode_float_vector(values: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + values.len() * 8);
    push_u32(&mut out, values.len() as u32);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// `[count:u32][count bytes]`, one 0/1 byte per element.
pub fn encode_bool_vector(values: &[bool]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + values.len());
    push_u32(&mut out, values.len() as u32);
    out.extend(values.iter().map(|&b| b as u8));
    out
}

pub fn encode_int_matrix(m: &IntMatrix) -> Result<Vec<u8>> {
    if m.data.len() != m.rows as usize * m.cols as usize {
        return Err(ShmError::InvalidParam("matrix data length != rows*cols"));
    }
    let mut out = Vec::with_capacity(8 + m.data.len() * 8);
    push_u32(&mut out, m.rows);
    push_u32(&mut out, m.cols);
    for v in &m.data {
        out.extend_from_slice(&v.to_le_bytes());
    }
    Ok(out)
}

pub fn encode_float_matrix(m: &FloatMatrix) -> Result<Vec<u8>> {
    if m.data.len() != m.rows as usize * m.cols as usize {
        return Err(ShmError::InvalidParam("matrix data length != rows*cols"));
    }
    let mut out = Vec::with_capacity(8 + m.data.len() * 8);
    push_u32(&mut out, m.rows);
    push_u32(&mut out, m.cols);
    for v in &m.data {
        out.extend_from_slice(&v.to_le_bytes());
    }
    Ok(out)
}

// ============================================================================
// Sets
// ============================================================================

pub fn encode_int_set(values: &[i64]) -> Vec<u8> {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    encode_int_vector(&sorted)
}

pub fn encode_float_set(values: &[f64]) -> Vec<u8> {
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    sorted.dedup_by(|a, b| a.to_bits() == b.to_bits());
    encode_float_vector(&sorted)
}

pub fn encode_string_set<S: AsRef<str>>(items: &[S]) -> Result<Vec<u8>> {
    let mut sorted: Vec<&[u8]> = items.iter().map(|s| s.as_ref().as_bytes()).collect();
    sorted.sort_unstable();
    sorted.dedup();
    let mut out = Vec::new();
    push_u32(&mut out, sorted.len() as u32);
    push_str_table(&mut out, &sorted)?;
    Ok(out)
}

/// Same layout as the set variant but preserves input order and duplicates.
pub fn encode_string_vector<S: AsRef<str>>(items: &[S]) -> Result<Vec<u8>> {
    let bytes: Vec<&[u8]> = items.iter().map(|s| s.as_ref().as_bytes()).collect();
    let mut out = Vec::new();
    push_u32(&mut out, bytes.len() as u32);
    push_str_table(&mut out, &bytes)?;
    Ok(out)
}

// ============================================================================
// String-keyed dictionaries
// ============================================================================

pub fn encode_dict_str_int<K: AsRef<str>>(pairs: &[(K, i64)]) -> Result<Vec<u8>> {
    let sorted = sorted_pairs(pairs)?;
    let mut out = Vec::new();
    push_u32(&mut out, sorted.len() as u32);
    let keys: Vec<&[u8]> = sorted.iter().map(|(k, _)| *k).collect();
    push_str_table(&mut out, &keys)?;
    for (_, v) in &sorted {
        out.extend_from_slice(&v.to_le_bytes());
    }
    Ok(out)
}

pub fn encode_dict_str_float<K: AsRef<str>>(pairs: &[(K, f64)]) -> Result<Vec<u8>> {
    let sorted = sorted_pairs(pairs)?;
    let mut out = Vec::new();
    push_u32(&mut out, sorted.len() as u32);
    let keys: Vec<&[u8]> = sorted.iter().map(|(k, _)| *k).collect();
    push_str_table(&mut out, &keys)?;
    for (_, v) in &sorted {
        out.extend_from_slice(&v.to_le_bytes());
    }
    Ok(out)
}

pub fn encode_dict_str_bool<K: AsRef<str>>(pairs: &[(K, bool)]) -> Result<Vec<u8>> {
    let sorted = sorted_pairs(pairs)?;
    let mut out = Vec::new();
    push_u32(&mut out, sorted.len() as u32);
    let keys: Vec<&[u8]> = sorted.iter().map(|(k, _)| *k).collect();
    push_str_table(&mut out, &keys)?;
    out.extend(sorted.iter().map(|(_, &v)| v as u8));
    Ok(out)
}

pub fn encode_dict_str_string<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> Result<Vec<u8>> {
    let sorted = sorted_pairs(pairs)?;
    let mut out = Vec::new();
    push_u32(&mut out, sorted.len() as u32);
    let keys: Vec<&[u8]> = sorted.iter().map(|(k, _)| *k).collect();
    push_str_table(&mut out, &keys)?;
    let values: Vec<&[u8]> = sorted.iter().map(|(_, v)| v.as_ref().as_bytes()).collect();
    push_str_table(&mut out, &values)?;
    Ok(out)
}

pub fn encode_dict_str_bytes<K: AsRef<str>, V: AsRef<[u8]>>(pairs: &[(K, V)]) -> Result<Vec<u8>> {
    let sorted = sorted_pairs(pairs)?;
    let mut out = Vec::new();
    push_u32(&mut out, sorted.len() as u32);
    let keys: Vec<&[u8]> = sorted.iter().map(|(k, _)| *k).collect();
    push_str_table(&mut out, &keys)?;
    let values: Vec<&[u8]> = sorted.iter().map(|(_, v)| v.as_ref()).collect();
    push_str_table(&mut out, &values)?;
    Ok(out)
}

/// `[count][key table][value_offsets (count+1, in elements)]
/// [value_lengths (count, in elements)][flattened f64s]`
pub fn encode_dict_str_float_vector<K: AsRef<str>, V: AsRef<[f64]>>(
    pairs: &[(K, V)],
) -> Result<Vec<u8>> {
    let sorted = sorted_pairs(pairs)?;
    let total_elems: usize = sorted.iter().map(|(_, v)| v.as_ref().len()).sum();
    if total_elems > MAX_BLOB {
        return Err(ShmError::InvalidParam("flattened vector exceeds u32 range"));
    }
    let mut out = Vec::new();
    push_u32(&mut out, sorted.len() as u32);
    let keys: Vec<&[u8]> = sorted.iter().map(|(k, _)| *k).collect();
    push_str_table(&mut out, &keys)?;
    let mut cur = 0u32;
    for (_, v) in &sorted {
        push_u32(&mut out, cur);
        cur += v.as_ref().len() as u32;
    }
    push_u32(&mut out, cur);
    for (_, v) in &sorted {
        push_u32(&mut out, v.as_ref().len() as u32);
    }
    for (_, v) in &sorted {
        for x in v.as_ref() {
            out.extend_from_slice(&x.to_le_bytes());
        }
    }
    Ok(out)
}

/// `[count][key table][value_offsets (count+1, in elements)]
/// [rows (count)][cols (count)][flattened f64s]`
pub fn encode_dict_str_float_matrix<K: AsRef<str>>(
    pairs: &[(K, FloatMatrix)],
) -> Result<Vec<u8>> {
    let sorted = sorted_pairs(pairs)?;
    let mut total_elems = 0usize;
    for (_, m) in &sorted {
        if m.data.len() != m.rows as usize * m.cols as usize {
            return Err(ShmError::InvalidParam("matrix data length != rows*cols"));
        }
        total_elems += m.data.len();
    }
    if total_elems > MAX_BLOB {
        return Err(ShmError::InvalidParam("flattened matrix exceeds u32 range"));
    }
    let mut out = Vec::new();
    push_u32(&mut out, sorted.len() as u32);
    let keys: Vec<&[u8]> = sorted.iter().map(|(k, _)| *k).collect();
    push_str_table(&mut out, &keys)?;
    let mut cur = 0u32;
    for (_, m) in &sorted {
        push_u32(&mut out, cur);
        cur += m.data.len() as u32;
    }
    push_u32(&mut out, cur);
    for (_, m) in &sorted {
        push_u32(&mut out, m.rows);
    }
    for (_, m) in &sorted {
        push_u32(&mut out, m.cols);
    }
    for (_, m) in &sorted {
        for x in &m.data {
            out.extend_from_slice(&x.to_le_bytes());
        }
    }
    Ok(out)
}

/// `[count][key table][value_list_offsets (count+1, string indices)]
/// [n_strings:u32][string table]`
pub fn encode_dict_str_string_vector<K: AsRef<str>, S: AsRef<str>>(
    pairs: &[(K, Vec<S>)],
) -> Result<Vec<u8>> {
    let sorted = sorted_pairs(pairs)?;
    let n_strings: usize = sorted.iter().map(|(_, list)| list.len()).sum();
    if n_strings > u32::MAX as usize {
        return Err(ShmError::InvalidParam("too many strings"));
    }
    let mut out = Vec::new();
    push_u32(&mut out, sorted.len() as u32);
    let keys: Vec<&[u8]> = sorted.iter().map(|(k, _)| *k).collect();
    push_str_table(&mut out, &keys)?;
    let mut cur = 0u32;
    for (_, list) in &sorted {
        push_u32(&mut out, cur);
        cur += list.len() as u32;
    }
    push_u32(&mut out, cur);
    push_u32(&mut out, n_strings as u32);
    let strings: Vec<&[u8]> = sorted
        .iter()
        .flat_map(|(_, list)| list.iter().map(|s| s.as_ref().as_bytes()))
        .collect();
    push_str_table(&mut out, &strings)?;
    Ok(out)
}

// ============================================================================
// Recursive tree
// ============================================================================

/// OBJECT: fields sorted by name bytes, duplicate names rejected.
pub fn encode_object<K: AsRef<str>>(fields: &[(K, TypedValue)]) -> Result<Vec<u8>> {
    let payloads: Vec<Vec<u8>> = fields
        .iter()
        .map(|(_, v)| encode_value(v))
        .collect::<Result<_>>()?;
    let raw: Vec<(&[u8], ValueType, &[u8])> = fields
        .iter()
        .zip(&payloads)
        .map(|((k, v), p)| (k.as_ref().as_bytes(), v.value_type(), p.as_slice()))
        .collect();
    encode_object_raw(&raw)
}

/// OBJECT from already-encoded field payloads, as the C ABI receives them.
///
/// `[count][name_offsets (count+1)][names][types (count)][pad to 4]
/// [value_offsets (count+1)][values blob]`
pub fn encode_object_raw<K: AsRef<[u8]>>(
    fields: &[(K, ValueType, &[u8])],
) -> Result<Vec<u8>> {
    if fields.len() > u32::MAX as usize {
        return Err(ShmError::InvalidParam("too many object fields"));
    }
    let mut sorted: Vec<(&[u8], ValueType, &[u8])> = fields
        .iter()
        .map(|(k, t, p)| (k.as_ref(), *t, *p))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    for w in sorted.windows(2) {
        if w[0].0 == w[1].0 {
            return Err(ShmError::InvalidParam("duplicate object field name"));
        }
    }

    let mut out = Vec::new();
    push_u32(&mut out, sorted.len() as u32);
    let names: Vec<&[u8]> = sorted.iter().map(|(k, _, _)| *k).collect();
    push_str_table(&mut out, &names)?;
    out.extend(sorted.iter().map(|(_, t, _)| t.as_u8()));
    out.resize(align4(out.len()), 0);
    let payloads: Vec<&[u8]> = sorted.iter().map(|(_, _, p)| *p).collect();
    push_offset_blob(&mut out, &payloads)?;
    Ok(out)
}

/// LIST: `[count][elem types (count)][pad to 4][value_offsets (count+1)]
/// [values blob]`
pub fn encode_list(items: &[TypedValue]) -> Result<Vec<u8>> {
    let payloads: Vec<Vec<u8>> = items.iter().map(encode_value).collect::<Result<_>>()?;
    let raw: Vec<(ValueType, &[u8])> = items
        .iter()
        .zip(&payloads)
        .map(|(v, p)| (v.value_type(), p.as_slice()))
        .collect();
    encode_list_raw(&raw)
}

/// LIST from already-encoded element payloads.
pub fn encode_list_raw(items: &[(ValueType, &[u8])]) -> Result<Vec<u8>> {
    if items.len() > u32::MAX as usize {
        return Err(ShmError::InvalidParam("too many list elements"));
    }
    let mut out = Vec::new();
    push_u32(&mut out, items.len() as u32);
    out.extend(items.iter().map(|(t, _)| t.as_u8()));
    out.resize(align4(out.len()), 0);
    let payloads: Vec<&[u8]> = items.iter().map(|(_, p)| *p).collect();
    push_offset_blob(&mut out, &payloads)?;
    Ok(out)
}

/// `(count + 1)` value offsets followed by the concatenated payload blob.
fn push_offset_blob<B: AsRef<[u8]>>(out: &mut Vec<u8>, payloads: &[B]) -> Result<()> {
    let total: usize = payloads.iter().map(|p| p.as_ref().len()).sum();
    if total > MAX_BLOB {
        return Err(ShmError::InvalidParam("values blob exceeds u32 range"));
    }
    let mut cur = 0u32;
    for p in payloads {
        push_u32(out, cur);
        cur += p.as_ref().len() as u32;
    }
    push_u32(out, cur);
    for p in payloads {
        out.extend_from_slice(p.as_ref());
    }
    Ok(())
}

/// Dispatch on the value's tag. `Null` encodes to an empty payload; it only
/// occurs nested inside OBJECT/LIST blobs.
pub fn encode_value(value: &TypedValue) -> Result<Vec<u8>> {
    match value {
        TypedValue::Null => Ok(Vec::new()),
        TypedValue::IntScalar(v) => Ok(encode_int_scalar(*v)),
        TypedValue::FloatScalar(v) => Ok(encode_float_scalar(*v)),
        TypedValue::BoolScalar(v) => Ok(encode_bool_scalar(*v)),
        TypedValue::String(s) => Ok(encode_string(s)),
        TypedValue::Bytes(b) => Ok(encode_bytes(b)),
        TypedValue::IntVector(v) => Ok(encode_int_vector(v)),
        TypedValue::FloatVector(v) => Ok(encode_float_vector(v)),
        TypedValue::BoolVector(v) => Ok(encode_bool_vector(v)),
        TypedValue::IntMatrix(m) => encode_int_matrix(m),
        TypedValue::FloatMatrix(m) => encode_float_matrix(m),
        TypedValue::IntSet(v) => Ok(encode_int_set(v)),
        TypedValue::FloatSet(v) => Ok(encode_float_set(v)),
        TypedValue::StringSet(v) => encode_string_set(v),
        TypedValue::StringVector(v) => encode_string_vector(v),
        TypedValue::DictStrInt(p) => encode_dict_str_int(p),
        TypedValue::DictStrFloat(p) => encode_dict_str_float(p),
        TypedValue::DictStrString(p) => encode_dict_str_string(p),
        TypedValue::DictStrBool(p) => encode_dict_str_bool(p),
        TypedValue::DictStrBytes(p) => encode_dict_str_bytes(p),
        TypedValue::DictStrFloatVector(p) => encode_dict_str_float_vector(p),
        TypedValue::DictStrFloatMatrix(p) => encode_dict_str_float_matrix(p),
        TypedValue::DictStrStringVector(p) => encode_dict_str_string_vector(p),
        TypedValue::Object(fields) => encode_object(fields),
        TypedValue::List(items) => encode_list(items),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_layouts_are_bit_exact() {
        assert_eq!(encode_int_scalar(1), 1i64.to_le_bytes());
        assert_eq!(encode_float_scalar(1.5), 1.5f64.to_le_bytes());
        assert_eq!(encode_bool_scalar(true), [1]);
        assert_eq!(encode_bool_scalar(false), [0]);
    }

    #[test]
    fn vector_layout_has_count_prefix() {
        let bytes = encode_int_vector(&[7]);
        assert_eq!(&bytes[..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[4..], &7i64.to_le_bytes());
        assert_eq!(bytes.len(), 12);
    }

    #[test]
    fn string_vector_offsets_span_elements() {
        // "ab", "c" -> offsets 0, 2, 3 then "abc"
        let bytes = encode_string_vector(&["ab", "c"]).unwrap();
        assert_eq!(&bytes[..4], &2u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &0u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &2u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &3u32.to_le_bytes());
        assert_eq!(&bytes[16..], b"abc");
    }

    #[test]
    fn sets_sort_and_dedup() {
        let bytes = encode_int_set(&[3, 1, 2, 1, 3]);
        assert_eq!(&bytes[..4], &3u32.to_le_bytes());
        assert_eq!(&bytes[4..12], &1i64.to_le_bytes());
        assert_eq!(&bytes[12..20], &2i64.to_le_bytes());
        assert_eq!(&bytes[20..28], &3i64.to_le_bytes());
    }

    #[test]
    fn string_set_sorts_bytewise_with_length_tiebreak() {
        let bytes = encode_string_set(&["ab", "a", "b"]).unwrap();
        // sorted: "a", "ab", "b" -> offsets 0,1,3,4
        assert_eq!(&bytes[..4], &3u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &0u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &1u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &3u32.to_le_bytes());
        assert_eq!(&bytes[16..20], &4u32.to_le_bytes());
        assert_eq!(&bytes[20..], b"aabb");
    }

    #[test]
    fn dict_rejects_duplicate_keys() {
        let err = encode_dict_str_int(&[("k", 1), ("k", 2)]).unwrap_err();
        assert_eq!(err.code(), 4);
        assert!(encode_dict_str_string(&[("a", "x"), ("a", "y")]).is_err());
        assert!(encode_dict_str_float_vector(&[("a", vec![1.0]), ("a", vec![])]).is_err());
    }

    #[test]
    fn object_rejects_duplicate_field_names() {
        let fields = vec![
            ("f".to_string(), TypedValue::IntScalar(1)),
            ("f".to_string(), TypedValue::IntScalar(2)),
        ];
        assert!(encode_object(&fields).is_err());
    }

    #[test]
    fn object_layout_pads_types_to_four_bytes() {
        // One field, one type byte: 4 + 8 + 1 + 1 = 14, padded to 16 before
        // the value offset table.
        let fields = vec![("a".to_string(), TypedValue::BoolScalar(true))];
        let bytes = encode_object(&fields).unwrap();
        let header = 4 + 4 * 2 + 1 + 1; // count, offsets, name, type tag
        let padded = align4(header);
        assert_eq!(padded, 16);
        // value offsets 0, 1 then the 1-byte bool payload
        assert_eq!(&bytes[padded..padded + 4], &0u32.to_le_bytes());
        assert_eq!(&bytes[padded + 4..padded + 8], &1u32.to_le_bytes());
        assert_eq!(bytes[padded + 8], 1);
        assert_eq!(bytes.len(), padded + 9);
    }

    #[test]
    fn empty_containers_encode() {
        assert_eq!(encode_int_vector(&[]), 0u32.to_le_bytes());
        let empty: [&str; 0] = [];
        let bytes = encode_string_set(&empty).unwrap();
        // count 0 + one offset entry
        assert_eq!(bytes.len(), 8);
        assert_eq!(encode_list(&[]).unwrap().len(), 4 + 4);
    }
}
