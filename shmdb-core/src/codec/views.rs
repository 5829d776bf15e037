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

//! Zero-copy value views
//!
//! Every `decode_*` validates the payload bounds once and returns a view
//! holding byte ranges into it. Accessors read fixed-width elements in
//! place; nothing is allocated until a caller explicitly asks for an owned
//! form (`to_vec`, `to_pairs`).

use byteorder::{ByteOrder, LittleEndian};

use crate::codec::raw::{f64_at, i64_at, slice_at, u32_at};
use crate::error::{Result, ShmError};
use crate::value::{FloatMatrix, IntMatrix};

const CORRUPT_OFFSETS: ShmError = ShmError::InvalidParam("corrupt offset table");
const NOT_UTF8: ShmError = ShmError::InvalidParam("string data is not utf-8");

// ============================================================================
// Offset and string tables (shared by every variable-length layout)
// ============================================================================

/// A `(count + 1)` array of u32 offsets; element `i` spans
/// `[at(i), at(i + 1))` and `at(count)` is the blob length.
#[derive(Clone, Copy)]
pub(crate) struct OffsetTable<'a> {
    raw: &'a [u8],
    count: usize,
}

impl<'a> OffsetTable<'a> {
    /// Parse a table of `count + 1` offsets at `off`; returns the table and
    /// the offset just past it.
    pub(crate) fn parse(buf: &'a [u8], off: usize, count: usize) -> Result<(Self, usize)> {
        let len = (count + 1)
            .checked_mul(4)
            .ok_or(ShmError::InvalidParam("offset table too large"))?;
        let raw = slice_at(buf, off, len)?;
        Ok((Self { raw, count }, off + len))
    }

    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub(crate) fn at(&self, i: usize) -> u32 {
        debug_assert!(i <= self.count);
        LittleEndian::read_u32(&self.raw[i * 4..])
    }

    /// Total blob length covered by the table.
    #[inline]
    pub(crate) fn end(&self) -> u32 {
        self.at(self.count)
    }

    /// Byte range of element `i`. Caller guarantees `i < count`.
    pub(crate) fn bounds(&self, i: usize) -> Result<(usize, usize)> {
        let start = self.at(i) as usize;
        let end = self.at(i + 1) as usize;
        if end < start {
            return Err(CORRUPT_OFFSETS);
        }
        Ok((start, end))
    }

    /// Raw table bytes, for ABI consumers that want the u32 array itself.
    #[inline]
    pub(crate) fn raw_bytes(&self) -> &'a [u8] {
        self.raw
    }
}

/// Offset table plus its concatenated byte blob.
#[derive(Clone, Copy)]
pub(crate) struct StrTable<'a> {
    offsets: OffsetTable<'a>,
    blob: &'a [u8],
}

impl<'a> StrTable<'a> {
    /// Parse offsets-then-blob at `off`; returns the table and the offset
    /// just past the blob.
    pub(crate) fn parse(buf: &'a [u8], off: usize, count: usize) -> Result<(Self, usize)> {
        let (offsets, next) = OffsetTable::parse(buf, off, count)?;
        let blob_len = offsets.end() as usize;
        let blob = slice_at(buf, next, blob_len)?;
        Ok((Self { offsets, blob }, next + blob_len))
    }

    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.offsets.count()
    }

    pub(crate) fn get(&self, i: usize) -> Result<&'a [u8]> {
        let (start, end) = self.offsets.bounds(i)?;
        slice_at(self.blob, start, end - start)
    }

    /// Binary search by bytewise comparison (shorter-prefix-first ordering,
    /// the same order the encoders sort by).
    pub(crate) fn binary_search(&self, needle: &[u8]) -> Option<usize> {
        let mut lo = 0usize;
        let mut hi = self.count();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.get(mid).ok()?.cmp(needle) {
                std::cmp::Ordering::Equal => return Some(mid),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        None
    }

    #[inline]
    pub(crate) fn offsets(&self) -> OffsetTable<'a> {
        self.offsets
    }

    #[inline]
    pub(crate) fn blob(&self) -> &'a [u8] {
        self.blob
    }

    fn to_string_vec(self) -> Result<Vec<String>> {
        (0..self.count())
            .map(|i| {
                std::str::from_utf8(self.get(i)?)
                    .map(str::to_owned)
                    .map_err(|_| NOT_UTF8)
            })
            .collect()
    }
}

/// A run of `len` 8-byte elements starting 4-byte aligned at best; reads go
/// through `from_le_bytes`.
#[derive(Clone, Copy)]
struct Words<'a> {
    data: &'a [u8],
    len: usize,
}

impl<'a> Words<'a> {
    fn parse(buf: &'a [u8], off: usize, len: usize) -> Result<(Self, usize)> {
        let bytes = len
            .checked_mul(8)
            .ok_or(ShmError::InvalidParam("element count too large"))?;
        let data = slice_at(buf, off, bytes)?;
        Ok((Self { data, len }, off + bytes))
    }

    #[inline]
    fn i64(&self, i: usize) -> Option<i64> {
        (i < self.len).then(|| LittleEndian::read_i64(&self.data[i * 8..]))
    }

    #[inline]
    fn f64(&self, i: usize) -> Option<f64> {
        (i < self.len).then(|| LittleEndian::read_f64(&self.data[i * 8..]))
    }

    fn sub(&self, start: usize, len: usize) -> Result<Words<'a>> {
        let data = slice_at(self.data, start * 8, len * 8)?;
        Ok(Words { data, len })
    }
}

// ============================================================================
// Scalars, strings, bytes
// ============================================================================

pub fn decode_int_scalar(payload: &[u8]) -> Result<i64> {
    i64_at(payload, 0)
}

pub fn decode_float_scalar(payload: &[u8]) -> Result<f64> {
    f64_at(payload, 0)
}

pub fn decode_bool_scalar(payload: &[u8]) -> Result<bool> {
    payload
        .first()
        .map(|&b| b != 0)
        .ok_or(ShmError::InvalidParam("truncated payload"))
}

/// STRING and BYTES share `[count:u32][count bytes]`.
pub fn decode_bytes(payload: &[u8]) -> Result<&[u8]> {
    let len = u32_at(payload, 0)? as usize;
    slice_at(payload, 4, len)
}

pub fn decode_str(payload: &[u8]) -> Result<&str> {
    std::str::from_utf8(decode_bytes(payload)?).map_err(|_| NOT_UTF8)
}

// ============================================================================
// Vectors
// ============================================================================

macro_rules! word_vector_view {
    ($view:ident, $decode:ident, $elem:ty, $read:ident) => {
        #[derive(Clone, Copy)]
        pub struct $view<'a> {
            words: Words<'a>,
        }

        impl<'a> $view<'a> {
            #[inline]
            pub fn len(&self) -> usize {
                self.words.len
            }

            #[inline]
            pub fn is_empty(&self) -> bool {
                self.words.len == 0
            }

            #[inline]
            pub fn get(&self, i: usize) -> Option<$elem> {
                self.words.$read(i)
            }

            pub fn iter(&self) -> impl Iterator<Item = $elem> + 'a {
                let words = self.words;
                (0..words.len).map(move |i| words.$read(i).unwrap())
            }

            pub fn to_vec(&self) -> Vec<$elem> {
                self.iter().collect()
            }

            /// Raw element bytes (`len * 8`), for ABI consumers.
            #[inline]
            pub fn data_bytes(&self) -> &'a [u8] {
                self.words.data
            }
        }

        pub fn $decode(payload: &[u8]) -> Result<$view<'_>> {
            let count = u32_at(payload, 0)? as usize;
            let (words, _) = Words::parse(payload, 4, count)?;
            Ok($view { words })
        }
    };
}

word_vector_view!(IntVectorView, decode_int_vector, i64, i64);
word_vector_view!(FloatVectorView, decode_float_vector, f64, f64);

#[derive(Clone, Copy)]
pub struct BoolVectorView<'a> {
    data: &'a [u8],
}

impl<'a> BoolVectorView<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, i: usize) -> Option<bool> {
        self.data.get(i).map(|&b| b != 0)
    }

    pub fn to_vec(&self) -> Vec<bool> {
        self.data.iter().map(|&b| b != 0).collect()
    }

    /// One 0/1 byte per element.
    #[inline]
    pub fn data_bytes(&self) -> &'a [u8] {
        self.data
    }
}

pub fn decode_bool_vector(payload: &[u8]) -> Result<BoolVectorView<'_>> {
    let count = u32_at(payload, 0)? as usize;
    let data = slice_at(payload, 4, count)?;
    Ok(BoolVectorView { data })
}

// ============================================================================
// Matrices
// ============================================================================

macro_rules! word_matrix_view {
    ($view:ident, $decode:ident, $elem:ty, $read:ident, $owned:ident) => {
        #[derive(Clone, Copy)]
        pub struct $view<'a> {
            rows: u32,
            cols: u32,
            words: Words<'a>,
        }

        impl<'a> $view<'a> {
            #[inline]
            pub fn rows(&self) -> u32 {
                self.rows
            }

            #[inline]
            pub fn cols(&self) -> u32 {
                self.cols
            }

            #[inline]
            pub fn get(&self, row: u32, col: u32) -> Option<$elem> {
                if row >= self.rows || col >= self.cols {
                    return None;
                }
                self.words
                    .$read(row as usize * self.cols as usize + col as usize)
            }

            pub fn to_owned(&self) -> Result<$owned> {
                let data = (0..self.words.len)
                    .map(|i| self.words.$read(i).unwrap())
                    .collect();
                $owned::new(self.rows, self.cols, data)
            }

            /// Raw element bytes (`rows * cols * 8`), for ABI consumers.
            #[inline]
            pub fn data_bytes(&self) -> &'a [u8] {
                self.words.data
            }
        }

        pub fn $decode(payload: &[u8]) -> Result<$view<'_>> {
            let rows = u32_at(payload, 0)?;
            let cols = u32_at(payload, 4)?;
            let len = (rows as usize)
                .checked_mul(cols as usize)
                .ok_or(ShmError::InvalidParam("matrix too large"))?;
            let (words, _) = Words::parse(payload, 8, len)?;
            Ok($view { rows, cols, words })
        }
    };
}

word_matrix_view!(IntMatrixView, decode_int_matrix, i64, i64, IntMatrix);
word_matrix_view!(FloatMatrixView, decode_float_matrix, f64, f64, FloatMatrix);

// ============================================================================
// Sets (vector layout, stored sorted and deduplicated)
// ============================================================================

#[derive(Clone, Copy)]
pub struct IntSetView<'a> {
    inner: IntVectorView<'a>,
}

impl<'a> IntSetView<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn get(&self, i: usize) -> Option<i64> {
        self.inner.get(i)
    }

    pub fn contains(&self, value: i64) -> bool {
        let mut lo = 0usize;
        let mut hi = self.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.inner.get(mid).unwrap().cmp(&value) {
                std::cmp::Ordering::Equal => return true,
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + 'a {
        self.inner.iter()
    }

    pub fn to_vec(&self) -> Vec<i64> {
        self.inner.to_vec()
    }

    #[inline]
    pub fn data_bytes(&self) -> &'a [u8] {
        self.inner.data_bytes()
    }
}

pub fn decode_int_set(payload: &[u8]) -> Result<IntSetView<'_>> {
    Ok(IntSetView {
        inner: decode_int_vector(payload)?,
    })
}

#[derive(Clone, Copy)]
pub struct FloatSetView<'a> {
    inner: FloatVectorView<'a>,
}

impl<'a> FloatSetView<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn get(&self, i: usize) -> Option<f64> {
        self.inner.get(i)
    }

    pub fn contains(&self, value: f64) -> bool {
        let mut lo = 0usize;
        let mut hi = self.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.inner.get(mid).unwrap().total_cmp(&value) {
                std::cmp::Ordering::Equal => return true,
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + 'a {
        self.inner.iter()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.inner.to_vec()
    }

    #[inline]
    pub fn data_bytes(&self) -> &'a [u8] {
        self.inner.data_bytes()
    }
}

pub fn decode_float_set(payload: &[u8]) -> Result<FloatSetView<'_>> {
    Ok(FloatSetView {
        inner: decode_float_vector(payload)?,
    })
}

// ============================================================================
// String containers
// ============================================================================

macro_rules! string_table_view {
    ($view:ident, $decode:ident) => {
        #[derive(Clone, Copy)]
        pub struct $view<'a> {
            table: StrTable<'a>,
        }

        impl<'a> $view<'a> {
            #[inline]
            pub fn len(&self) -> usize {
                self.table.count()
            }

            #[inline]
            pub fn is_empty(&self) -> bool {
                self.table.count() == 0
            }

            pub fn get(&self, i: usize) -> Result<&'a [u8]> {
                self.table.get(i)
            }

            pub fn get_str(&self, i: usize) -> Result<&'a str> {
                std::str::from_utf8(self.table.get(i)?).map_err(|_| NOT_UTF8)
            }

            pub fn iter(&self) -> impl Iterator<Item = Result<&'a [u8]>> + 'a {
                let table = self.table;
                (0..table.count()).map(move |i| table.get(i))
            }

            pub fn to_string_vec(&self) -> Result<Vec<String>> {
                self.table.to_string_vec()
            }

            /// `(count + 1)` u32 offsets, raw, for ABI consumers.
            #[inline]
            pub fn offsets_bytes(&self) -> &'a [u8] {
                self.table.offsets().raw_bytes()
            }

            /// Concatenated string bytes.
            #[inline]
            pub fn data_bytes(&self) -> &'a [u8] {
                self.table.blob()
            }
        }

        pub fn $decode(payload: &[u8]) -> Result<$view<'_>> {
            let count = u32_at(payload, 0)? as usize;
            let (table, _) = StrTable::parse(payload, 4, count)?;
            Ok($view { table })
        }
    };
}

string_table_view!(StringVectorView, decode_string_vector);
string_table_view!(StringSetView, decode_string_set);

impl<'a> StringSetView<'a> {
    /// Membership test via binary search over the stored sorted order.
    pub fn contains(&self, value: &str) -> bool {
        self.table.binary_search(value.as_bytes()).is_some()
    }
}

// ============================================================================
// Dictionaries with fixed-width values
// ============================================================================

macro_rules! word_dict_view {
    ($view:ident, $decode:ident, $elem:ty, $read:ident) => {
        #[derive(Clone, Copy)]
        pub struct $view<'a> {
            keys: StrTable<'a>,
            vals: Words<'a>,
        }

        impl<'a> $view<'a> {
            #[inline]
            pub fn len(&self) -> usize {
                self.keys.count()
            }

            #[inline]
            pub fn is_empty(&self) -> bool {
                self.keys.count() == 0
            }

            pub fn key(&self, i: usize) -> Result<&'a [u8]> {
                self.keys.get(i)
            }

            #[inline]
            pub fn value(&self, i: usize) -> Option<$elem> {
                self.vals.$read(i)
            }

            /// Binary search over the sorted keys.
            pub fn get(&self, key: &str) -> Option<$elem> {
                let i = self.keys.binary_search(key.as_bytes())?;
                self.vals.$read(i)
            }

            pub fn to_pairs(&self) -> Result<Vec<(String, $elem)>> {
                (0..self.len())
                    .map(|i| {
                        let key = std::str::from_utf8(self.keys.get(i)?)
                            .map_err(|_| NOT_UTF8)?
                            .to_owned();
                        Ok((key, self.vals.$read(i).unwrap()))
                    })
                    .collect()
            }

            #[inline]
            pub fn key_offsets_bytes(&self) -> &'a [u8] {
                self.keys.offsets().raw_bytes()
            }

            #[inline]
            pub fn keys_bytes(&self) -> &'a [u8] {
                self.keys.blob()
            }

            #[inline]
            pub fn values_bytes(&self) -> &'a [u8] {
                self.vals.data
            }
        }

        pub fn $decode(payload: &[u8]) -> Result<$view<'_>> {
            let count = u32_at(payload, 0)? as usize;
            let (keys, next) = StrTable::parse(payload, 4, count)?;
            let (vals, _) = Words::parse(payload, next, count)?;
            Ok($view { keys, vals })
        }
    };
}

word_dict_view!(DictStrIntView, decode_dict_str_int, i64, i64);
word_dict_view!(DictStrFloatView, decode_dict_str_float, f64, f64);

#[derive(Clone, Copy)]
pub struct DictStrBoolView<'a> {
    keys: StrTable<'a>,
    vals: &'a [u8],
}

impl<'a> DictStrBoolView<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.count() == 0
    }

    pub fn key(&self, i: usize) -> Result<&'a [u8]> {
        self.keys.get(i)
    }

    #[inline]
    pub fn value(&self, i: usize) -> Option<bool> {
        self.vals.get(i).map(|&b| b != 0)
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        let i = self.keys.binary_search(key.as_bytes())?;
        self.value(i)
    }

    pub fn to_pairs(&self) -> Result<Vec<(String, bool)>> {
        (0..self.len())
            .map(|i| {
                let key = std::str::from_utf8(self.keys.get(i)?)
                    .map_err(|_| NOT_UTF8)?
                    .to_owned();
                Ok((key, self.value(i).unwrap()))
            })
            .collect()
    }

    #[inline]
    pub fn key_offsets_bytes(&self) -> &'a [u8] {
        self.keys.offsets().raw_bytes()
    }

    #[inline]
    pub fn keys_bytes(&self) -> &'a [u8] {
        self.keys.blob()
    }

    #[inline]
    pub fn values_bytes(&self) -> &'a [u8] {
        self.vals
    }
}

pub fn decode_dict_str_bool(payload: &[u8]) -> Result<DictStrBoolView<'_>> {
    let count = u32_at(payload, 0)? as usize;
    let (keys, next) = StrTable::parse(payload, 4, count)?;
    let vals = slice_at(payload, next, count)?;
    Ok(DictStrBoolView { keys, vals })
}

// ============================================================================
// Dictionaries with string/bytes values
// ============================================================================

macro_rules! table_dict_view {
    ($view:ident, $decode:ident) => {
        #[derive(Clone, Copy)]
        pub struct $view<'a> {
            keys: StrTable<'a>,
            values: StrTable<'a>,
        }

        impl<'a> $view<'a> {
            #[inline]
            pub fn len(&self) -> usize {
                self.keys.count()
            }

            #[inline]
            pub fn is_empty(&self) -> bool {
                self.keys.count() == 0
            }

            pub fn key(&self, i: usize) -> Result<&'a [u8]> {
                self.keys.get(i)
            }

            pub fn value(&self, i: usize) -> Result<&'a [u8]> {
                self.values.get(i)
            }

            pub fn get(&self, key: &str) -> Option<&'a [u8]> {
                let i = self.keys.binary_search(key.as_bytes())?;
                self.values.get(i).ok()
            }

            #[inline]
            pub fn key_offsets_bytes(&self) -> &'a [u8] {
                self.keys.offsets().raw_bytes()
            }

            #[inline]
            pub fn keys_bytes(&self) -> &'a [u8] {
                self.keys.blob()
            }

            #[inline]
            pub fn value_offsets_bytes(&self) -> &'a [u8] {
                self.values.offsets().raw_bytes()
            }

            #[inline]
            pub fn values_bytes(&self) -> &'a [u8] {
                self.values.blob()
            }
        }

        pub fn $decode(payload: &[u8]) -> Result<$view<'_>> {
            let count = u32_at(payload, 0)? as usize;
            let (keys, next) = StrTable::parse(payload, 4, count)?;
            let (values, _) = StrTable::parse(payload, next, count)?;
            Ok($view { keys, values })
        }
    };
}

table_dict_view!(DictStrStringView, decode_dict_str_string);
table_dict_view!(DictStrBytesView, decode_dict_str_bytes);

impl<'a> DictStrStringView<'a> {
    pub fn to_pairs(&self) -> Result<Vec<(String, String)>> {
        (0..self.len())
            .map(|i| {
                let key = std::str::from_utf8(self.key(i)?)
                    .map_err(|_| NOT_UTF8)?
                    .to_owned();
                let value = std::str::from_utf8(self.value(i)?)
                    .map_err(|_| NOT_UTF8)?
                    .to_owned();
                Ok((key, value))
            })
            .collect()
    }
}

impl<'a> DictStrBytesView<'a> {
    pub fn to_pairs(&self) -> Result<Vec<(String, Vec<u8>)>> {
        (0..self.len())
            .map(|i| {
                let key = std::str::from_utf8(self.key(i)?)
                    .map_err(|_| NOT_UTF8)?
                    .to_owned();
                Ok((key, self.value(i)?.to_vec()))
            })
            .collect()
    }
}

// ============================================================================
// Dict[str, float vector] and Dict[str, float matrix]
// ============================================================================

#[derive(Clone, Copy)]
pub struct DictStrFloatVectorView<'a> {
    keys: StrTable<'a>,
    value_offsets: OffsetTable<'a>,
    value_lengths: &'a [u8],
    flat: Words<'a>,
}

impl<'a> DictStrFloatVectorView<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.count() == 0
    }

    pub fn key(&self, i: usize) -> Result<&'a [u8]> {
        self.keys.get(i)
    }

    /// Element count of vector `i`.
    pub fn vector_len(&self, i: usize) -> Result<usize> {
        if i >= self.len() {
            return Err(ShmError::NotFound);
        }
        Ok(LittleEndian::read_u32(&self.value_lengths[i * 4..]) as usize)
    }

    /// Zero-copy view of vector `i` inside the flattened element array.
    pub fn vector(&self, i: usize) -> Result<FloatVectorView<'a>> {
        if i >= self.len() {
            return Err(ShmError::NotFound);
        }
        let start = self.value_offsets.at(i) as usize;
        let len = self.vector_len(i)?;
        Ok(FloatVectorView {
            words: self.flat.sub(start, len)?,
        })
    }

    pub fn get(&self, key: &str) -> Result<FloatVectorView<'a>> {
        let i = self
            .keys
            .binary_search(key.as_bytes())
            .ok_or(ShmError::NotFound)?;
        self.vector(i)
    }

    pub fn to_pairs(&self) -> Result<Vec<(String, Vec<f64>)>> {
        (0..self.len())
            .map(|i| {
                let key = std::str::from_utf8(self.keys.get(i)?)
                    .map_err(|_| NOT_UTF8)?
                    .to_owned();
                Ok((key, self.vector(i)?.to_vec()))
            })
            .collect()
    }

    #[inline]
    pub fn key_offsets_bytes(&self) -> &'a [u8] {
        self.keys.offsets().raw_bytes()
    }

    #[inline]
    pub fn keys_bytes(&self) -> &'a [u8] {
        self.keys.blob()
    }

    /// `(count + 1)` u32 element offsets into the flat array.
    #[inline]
    pub fn value_offsets_bytes(&self) -> &'a [u8] {
        self.value_offsets.raw_bytes()
    }

    /// `count` u32 per-vector element lengths.
    #[inline]
    pub fn value_lengths_bytes(&self) -> &'a [u8] {
        self.value_lengths
    }

    #[inline]
    pub fn flat_bytes(&self) -> &'a [u8] {
        self.flat.data
    }
}

pub fn decode_dict_str_float_vector(payload: &[u8]) -> Result<DictStrFloatVectorView<'_>> {
    let count = u32_at(payload, 0)? as usize;
    let (keys, next) = StrTable::parse(payload, 4, count)?;
    let (value_offsets, next) = OffsetTable::parse(payload, next, count)?;
    let lengths_len = count
        .checked_mul(4)
        .ok_or(ShmError::InvalidParam("length table too large"))?;
    let value_lengths = slice_at(payload, next, lengths_len)?;
    let total = value_offsets.end() as usize;
    let (flat, _) = Words::parse(payload, next + lengths_len, total)?;
    Ok(DictStrFloatVectorView {
        keys,
        value_offsets,
        value_lengths,
        flat,
    })
}

#[derive(Clone, Copy)]
pub struct DictStrFloatMatrixView<'a> {
    keys: StrTable<'a>,
    value_offsets: OffsetTable<'a>,
    rows: &'a [u8],
    cols: &'a [u8],
    flat: Words<'a>,
}

impl<'a> DictStrFloatMatrixView<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.count() == 0
    }

    pub fn key(&self, i: usize) -> Result<&'a [u8]> {
        self.keys.get(i)
    }

    pub fn dims(&self, i: usize) -> Result<(u32, u32)> {
        if i >= self.len() {
            return Err(ShmError::NotFound);
        }
        Ok((
            LittleEndian::read_u32(&self.rows[i * 4..]),
            LittleEndian::read_u32(&self.cols[i * 4..]),
        ))
    }

    /// Zero-copy view of matrix `i` inside the flattened element array.
    pub fn matrix(&self, i: usize) -> Result<FloatMatrixView<'a>> {
        let (rows, cols) = self.dims(i)?;
        let start = self.value_offsets.at(i) as usize;
        let len = (rows as usize)
            .checked_mul(cols as usize)
            .ok_or(ShmError::InvalidParam("matrix too large"))?;
        Ok(FloatMatrixView {
            rows,
            cols,
            words: self.flat.sub(start, len)?,
        })
    }

    pub fn get(&self, key: &str) -> Result<FloatMatrixView<'a>> {
        let i = self
            .keys
            .binary_search(key.as_bytes())
            .ok_or(ShmError::NotFound)?;
        self.matrix(i)
    }

    pub fn to_pairs(&self) -> Result<Vec<(String, FloatMatrix)>> {
        (0..self.len())
            .map(|i| {
                let key = std::str::from_utf8(self.keys.get(i)?)
                    .map_err(|_| NOT_UTF8)?
                    .to_owned();
                Ok((key, self.matrix(i)?.to_owned()?))
            })
            .collect()
    }

    #[inline]
    pub fn key_offsets_bytes(&self) -> &'a [u8] {
        self.keys.offsets().raw_bytes()
    }

    #[inline]
    pub fn keys_bytes(&self) -> &'a [u8] {
        self.keys.blob()
    }

    #[inline]
    pub fn value_offsets_bytes(&self) -> &'a [u8] {
        self.value_offsets.raw_bytes()
    }

    #[inline]
    pub fn rows_bytes(&self) -> &'a [u8] {
        self.rows
    }

    #[inline]
    pub fn cols_bytes(&self) -> &'a [u8] {
        self.cols
    }

    #[inline]
    pub fn flat_bytes(&self) -> &'a [u8] {
        self.flat.data
    }
}

pub fn decode_dict_str_float_matrix(payload: &[u8]) -> Result<DictStrFloatMatrixView<'_>> {
    let count = u32_at(payload, 0)? as usize;
    let (keys, next) = StrTable::parse(payload, 4, count)?;
    let (value_offsets, next) = OffsetTable::parse(payload, next, count)?;
    let table_len = count
        .checked_mul(4)
        .ok_or(ShmError::InvalidParam("dimension table too large"))?;
    let rows = slice_at(payload, next, table_len)?;
    let cols = slice_at(payload, next + table_len, table_len)?;
    let total = value_offsets.end() as usize;
    let (flat, _) = Words::parse(payload, next + 2 * table_len, total)?;
    Ok(DictStrFloatMatrixView {
        keys,
        value_offsets,
        rows,
        cols,
        flat,
    })
}

// ============================================================================
// Dict[str, list[string]]
// ============================================================================

#[derive(Clone, Copy)]
pub struct DictStrStringVectorView<'a> {
    keys: StrTable<'a>,
    list_offsets: OffsetTable<'a>,
    strings: StrTable<'a>,
}

impl<'a> DictStrStringVectorView<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.count() == 0
    }

    /// Number of strings across all lists.
    #[inline]
    pub fn n_strings(&self) -> usize {
        self.strings.count()
    }

    pub fn key(&self, i: usize) -> Result<&'a [u8]> {
        self.keys.get(i)
    }

    /// Number of strings in list `i`.
    pub fn list_len(&self, i: usize) -> Result<usize> {
        if i >= self.len() {
            return Err(ShmError::NotFound);
        }
        let (start, end) = self.list_offsets.bounds(i)?;
        Ok(end - start)
    }

    /// String `j` of list `i`.
    pub fn string_at(&self, i: usize, j: usize) -> Result<&'a [u8]> {
        if i >= self.len() {
            return Err(ShmError::NotFound);
        }
        let (start, end) = self.list_offsets.bounds(i)?;
        if start + j >= end {
            return Err(ShmError::NotFound);
        }
        self.strings.get(start + j)
    }

    pub fn get(&self, key: &str) -> Result<Vec<&'a [u8]>> {
        let i = self
            .keys
            .binary_search(key.as_bytes())
            .ok_or(ShmError::NotFound)?;
        let (start, end) = self.list_offsets.bounds(i)?;
        (start..end).map(|j| self.strings.get(j)).collect()
    }

    pub fn to_pairs(&self) -> Result<Vec<(String, Vec<String>)>> {
        (0..self.len())
            .map(|i| {
                let key = std::str::from_utf8(self.keys.get(i)?)
                    .map_err(|_| NOT_UTF8)?
                    .to_owned();
                let (start, end) = self.list_offsets.bounds(i)?;
                let list = (start..end)
                    .map(|j| {
                        std::str::from_utf8(self.strings.get(j)?)
                            .map(str::to_owned)
                            .map_err(|_| NOT_UTF8)
                    })
                    .collect::<Result<_>>()?;
                Ok((key, list))
            })
            .collect()
    }

    #[inline]
    pub fn key_offsets_bytes(&self) -> &'a [u8] {
        self.keys.offsets().raw_bytes()
    }

    #[inline]
    pub fn keys_bytes(&self) -> &'a [u8] {
        self.keys.blob()
    }

    /// `(count + 1)` u32 indices into the string-offset index space.
    #[inline]
    pub fn list_offsets_bytes(&self) -> &'a [u8] {
        self.list_offsets.raw_bytes()
    }

    #[inline]
    pub fn string_offsets_bytes(&self) -> &'a [u8] {
        self.strings.offsets().raw_bytes()
    }

    #[inline]
    pub fn string_data_bytes(&self) -> &'a [u8] {
        self.strings.blob()
    }
}

pub fn decode_dict_str_string_vector(payload: &[u8]) -> Result<DictStrStringVectorView<'_>> {
    let count = u32_at(payload, 0)? as usize;
    let (keys, next) = StrTable::parse(payload, 4, count)?;
    let (list_offsets, next) = OffsetTable::parse(payload, next, count)?;
    let n_strings = u32_at(payload, next)? as usize;
    if list_offsets.end() as usize > n_strings {
        return Err(CORRUPT_OFFSETS);
    }
    let (strings, _) = StrTable::parse(payload, next + 4, n_strings)?;
    Ok(DictStrStringVectorView {
        keys,
        list_offsets,
        strings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode::*;
    use proptest::prelude::*;

    #[test]
    fn vector_view_reads_in_place() {
        let payload = encode_int_vector(&[10, -20, 30]);
        let view = decode_int_vector(&payload).unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.get(1), Some(-20));
        assert_eq!(view.get(3), None);
        assert_eq!(view.to_vec(), vec![10, -20, 30]);
    }

    #[test]
    fn truncated_vector_is_rejected() {
        let mut payload = encode_int_vector(&[1, 2]);
        payload.truncate(payload.len() - 1);
        assert!(decode_int_vector(&payload).is_err());
    }

    #[test]
    fn matrix_view_indexes_row_major() {
        let m = IntMatrix::new(2, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let payload = encode_int_matrix(&m).unwrap();
        let view = decode_int_matrix(&payload).unwrap();
        assert_eq!(view.rows(), 2);
        assert_eq!(view.cols(), 3);
        assert_eq!(view.get(1, 2), Some(6));
        assert_eq!(view.get(2, 0), None);
    }

    #[test]
    fn set_views_are_sorted_and_searchable() {
        let payload = encode_int_set(&[5, -1, 3, 5]);
        let view = decode_int_set(&payload).unwrap();
        assert_eq!(view.to_vec(), vec![-1, 3, 5]);
        assert!(view.contains(3));
        assert!(!view.contains(4));

        let payload = encode_string_set(&["pear", "apple", "fig"]).unwrap();
        let view = decode_string_set(&payload).unwrap();
        assert_eq!(view.get_str(0).unwrap(), "apple");
        assert!(view.contains("fig"));
        assert!(!view.contains("grape"));
    }

    #[test]
    fn dict_views_binary_search() {
        let payload =
            encode_dict_str_int(&[("zz", 3), ("a", 1), ("mm", 2)]).unwrap();
        let view = decode_dict_str_int(&payload).unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.get("a"), Some(1));
        assert_eq!(view.get("mm"), Some(2));
        assert_eq!(view.get("zz"), Some(3));
        assert_eq!(view.get("nope"), None);
        assert_eq!(view.key(0).unwrap(), b"a");
    }

    #[test]
    fn dict_str_string_view() {
        let payload = encode_dict_str_string(&[("b", "two"), ("a", "one")]).unwrap();
        let view = decode_dict_str_string(&payload).unwrap();
        assert_eq!(view.get("a"), Some(&b"one"[..]));
        assert_eq!(view.get("b"), Some(&b"two"[..]));
        assert_eq!(view.get("c"), None);
    }

    #[test]
    fn dict_float_vector_view() {
        let payload = encode_dict_str_float_vector(&[
            ("x", vec![1.0, 2.0]),
            ("a", vec![]),
            ("m", vec![9.0]),
        ])
        .unwrap();
        let view = decode_dict_str_float_vector(&payload).unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.key(0).unwrap(), b"a");
        assert_eq!(view.vector_len(0).unwrap(), 0);
        assert_eq!(view.get("x").unwrap().to_vec(), vec![1.0, 2.0]);
        assert_eq!(view.get("m").unwrap().to_vec(), vec![9.0]);
        assert!(view.get("q").is_err());
    }

    #[test]
    fn dict_float_matrix_view() {
        let m1 = FloatMatrix::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let m2 = FloatMatrix::new(1, 3, vec![5.0, 6.0, 7.0]).unwrap();
        let payload =
            encode_dict_str_float_matrix(&[("b", m2.clone()), ("a", m1.clone())]).unwrap();
        let view = decode_dict_str_float_matrix(&payload).unwrap();
        assert_eq!(view.dims(0).unwrap(), (2, 2));
        assert_eq!(view.get("a").unwrap().get(1, 1), Some(4.0));
        assert_eq!(view.get("b").unwrap().to_owned().unwrap(), m2);
    }

    #[test]
    fn dict_string_vector_view() {
        let payload = encode_dict_str_string_vector(&[
            ("tags", vec!["x", "y"]),
            ("empty", Vec::<&str>::new()),
        ])
        .unwrap();
        let view = decode_dict_str_string_vector(&payload).unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view.n_strings(), 2);
        assert_eq!(view.list_len(0).unwrap(), 0); // "empty" sorts first
        assert_eq!(view.string_at(1, 1).unwrap(), b"y");
        assert_eq!(view.get("tags").unwrap(), vec![&b"x"[..], &b"y"[..]]);
    }

    proptest! {
        #[test]
        fn prop_int_set_strictly_increasing(values in proptest::collection::vec(any::<i64>(), 0..64)) {
            let payload = encode_int_set(&values);
            let view = decode_int_set(&payload).unwrap();
            let decoded = view.to_vec();
            for w in decoded.windows(2) {
                prop_assert!(w[0] < w[1]);
            }
            for v in &values {
                prop_assert!(view.contains(*v));
            }
        }

        #[test]
        fn prop_dict_keys_strictly_increasing(
            keys in proptest::collection::btree_set("[a-z]{1,8}", 0..16),
        ) {
            let pairs: Vec<(String, i64)> = keys
                .iter()
                .enumerate()
                .map(|(i, k)| (k.clone(), i as i64))
                .collect();
            let payload = encode_dict_str_int(&pairs).unwrap();
            let view = decode_dict_str_int(&payload).unwrap();
            let mut prev: Option<Vec<u8>> = None;
            for i in 0..view.len() {
                let key = view.key(i).unwrap().to_vec();
                if let Some(p) = &prev {
                    prop_assert!(p < &key);
                }
                prev = Some(key);
            }
            for (k, v) in &pairs {
                prop_assert_eq!(view.get(k), Some(*v));
            }
        }

        #[test]
        fn prop_string_vector_round_trip(items in proptest::collection::vec(".{0,12}", 0..16)) {
            let payload = encode_string_vector(&items).unwrap();
            let view = decode_string_vector(&payload).unwrap();
            prop_assert_eq!(view.to_string_vec().unwrap(), items);
        }
    }
}
