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

//! Flat C ABI
//!
//! Every function is a thin shim over [`Store`]: null-check the arguments,
//! borrow the byte slices, call the engine, translate the error code. View
//! structs expose raw pointers into the shared mapping; the pointed-to
//! data stays valid until the handle is closed. Views of 8-byte elements
//! may be only 4-byte aligned, so C consumers must read them with
//! unaligned loads (plain dereference works on x86-64 and arm64).

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::slice;

use shmdb_core::codec;
use shmdb_core::{Result, ShmError, ValueType};

use crate::store::{Store, StoreConfig};

/// Opaque handle; created by [`shmdb_create`], freed by [`shmdb_close`].
pub struct ShmdbHandle(Store);

/// Error codes, bit-exact with the engine taxonomy.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmdbErrorCode {
    Ok = 0,
    NotFound = 1,
    NoSpace = 2,
    ConcurrentMod = 3,
    InvalidParam = 4,
    OpenFailed = 5,
    PermissionDenied = 6,
    TypeMismatch = 7,
}

fn err_code(e: &ShmError) -> ShmdbErrorCode {
    match e.code() {
        1 => ShmdbErrorCode::NotFound,
        2 => ShmdbErrorCode::NoSpace,
        3 => ShmdbErrorCode::ConcurrentMod,
        5 => ShmdbErrorCode::OpenFailed,
        6 => ShmdbErrorCode::PermissionDenied,
        7 => ShmdbErrorCode::TypeMismatch,
        _ => ShmdbErrorCode::InvalidParam,
    }
}

fn code_of<T>(r: Result<T>) -> ShmdbErrorCode {
    match r {
        Ok(_) => ShmdbErrorCode::Ok,
        Err(e) => err_code(&e),
    }
}

#[inline]
unsafe fn store_ref<'a>(handle: *mut ShmdbHandle) -> Option<&'a Store> {
    (!handle.is_null()).then(|| &(*handle).0)
}

#[inline]
unsafe fn bytes_arg<'a>(ptr: *const c_void, len: usize) -> Option<&'a [u8]> {
    if ptr.is_null() {
        return None;
    }
    Some(slice::from_raw_parts(ptr as *const u8, len))
}

#[inline]
unsafe fn str_arg<'a>(ptr: *const c_char, len: usize) -> Option<&'a str> {
    let bytes = bytes_arg(ptr as *const c_void, len)?;
    std::str::from_utf8(bytes).ok()
}

/// Read one u32 from a possibly unaligned table pointer.
#[inline]
unsafe fn u32_entry(table: *const u32, i: usize) -> u32 {
    ptr::read_unaligned(table.add(i))
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Open or create a named segment. Zero geometry arguments select the
/// defaults. Returns null on failure.
///
/// # Safety
/// `name` must be a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn shmdb_create(
    name: *const c_char,
    n_buckets: usize,
    n_nodes: usize,
    payload_size: usize,
) -> *mut ShmdbHandle {
    if name.is_null() {
        return ptr::null_mut();
    }
    let name = match CStr::from_ptr(name).to_str() {
        Ok(s) => s,
        Err(_) => return ptr::null_mut(),
    };
    let config = StoreConfig {
        n_buckets,
        n_nodes,
        payload_size,
    };
    match Store::open_with_config(name, &config) {
        Ok(store) => Box::into_raw(Box::new(ShmdbHandle(store))),
        Err(_) => ptr::null_mut(),
    }
}

/// Unmap and close the handle. The OS-level name is untouched.
///
/// # Safety
/// `handle` must be null or a pointer returned by [`shmdb_create`]; it must
/// not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn shmdb_close(handle: *mut ShmdbHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Remove the named segment from the OS namespace.
///
/// # Safety
/// `name` must be a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn shmdb_destroy(name: *const c_char) -> ShmdbErrorCode {
    if name.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    match CStr::from_ptr(name).to_str() {
        Ok(s) => code_of(Store::destroy(s)),
        Err(_) => ShmdbErrorCode::InvalidParam,
    }
}

// ============================================================================
// Untyped operations and stats
// ============================================================================

#[repr(C)]
pub struct ShmdbStats {
    pub n_buckets: u32,
    pub n_nodes: u32,
    pub nodes_used: u32,
    pub payload_capacity: u64,
    pub payload_used: u64,
    pub generation: u64,
}

/// # Safety
/// `handle` from [`shmdb_create`]; `key`/`value` readable for their lengths.
#[no_mangle]
pub unsafe extern "C" fn shmdb_insert(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    value: *const c_void,
    value_len: usize,
) -> ShmdbErrorCode {
    let (Some(store), Some(key), Some(value)) = (
        store_ref(handle),
        bytes_arg(key, key_len),
        bytes_arg(value, value_len),
    ) else {
        return ShmdbErrorCode::InvalidParam;
    };
    code_of(store.insert(key, value))
}

/// Zero-copy untyped lookup; `*out_value` points into the mapping.
///
/// # Safety
/// Pointer arguments must be valid; the returned pointer is only good while
/// the handle stays open.
#[no_mangle]
pub unsafe extern "C" fn shmdb_lookup(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    out_value: *mut *const c_void,
    out_value_len: *mut usize,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if out_value.is_null() || out_value_len.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    match store.lookup(key) {
        Ok(value) => {
            *out_value = value.as_ptr() as *const c_void;
            *out_value_len = value.len();
            ShmdbErrorCode::Ok
        }
        Err(e) => err_code(&e),
    }
}

/// Copying untyped lookup. Reports the value length even when the buffer is
/// too small (and then returns `NoSpace`).
///
/// # Safety
/// `out_buffer` must be writable for `buffer_size` bytes.
#[no_mangle]
pub unsafe extern "C" fn shmdb_lookup_copy(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    out_buffer: *mut c_void,
    buffer_size: usize,
    out_value_len: *mut usize,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if out_buffer.is_null() || out_value_len.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    match store.lookup(key) {
        Ok(value) => {
            *out_value_len = value.len();
            if buffer_size < value.len() {
                return ShmdbErrorCode::NoSpace;
            }
            ptr::copy_nonoverlapping(value.as_ptr(), out_buffer as *mut u8, value.len());
            ShmdbErrorCode::Ok
        }
        Err(e) => err_code(&e),
    }
}

/// # Safety
/// `stats` must be writable.
#[no_mangle]
pub unsafe extern "C" fn shmdb_get_stats(handle: *mut ShmdbHandle, stats: *mut ShmdbStats) {
    let Some(store) = store_ref(handle) else {
        return;
    };
    if stats.is_null() {
        return;
    }
    let s = store.stats();
    *stats = ShmdbStats {
        n_buckets: s.n_buckets,
        n_nodes: s.n_nodes,
        nodes_used: s.nodes_used,
        payload_capacity: s.payload_capacity,
        payload_used: s.payload_used,
        generation: s.generation,
    };
}

/// # Safety
/// `out_type` must be writable.
#[no_mangle]
pub unsafe extern "C" fn shmdb_get_value_type(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    out_type: *mut u32,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if out_type.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    match store.get_value_type(key) {
        Ok(tag) => {
            *out_type = tag.as_u8() as u32;
            ShmdbErrorCode::Ok
        }
        Err(e) => err_code(&e),
    }
}

// ============================================================================
// Scalars
// ============================================================================

macro_rules! scalar_insert {
    ($name:ident, $ty:ty, $method:ident) => {
        /// # Safety
        /// `handle` from [`shmdb_create`]; `key` readable for `key_len`.
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            handle: *mut ShmdbHandle,
            key: *const c_void,
            key_len: usize,
            value: $ty,
        ) -> ShmdbErrorCode {
            let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
                return ShmdbErrorCode::InvalidParam;
            };
            code_of(store.$method(key, value))
        }
    };
}

scalar_insert!(shmdb_insert_int_scalar, i64, insert_int_scalar);
scalar_insert!(shmdb_insert_float_scalar, f64, insert_float_scalar);

/// # Safety
/// `handle` from [`shmdb_create`]; `key` readable for `key_len`.
#[no_mangle]
pub unsafe extern "C" fn shmdb_insert_bool_scalar(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    value: c_int,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    code_of(store.insert_bool_scalar(key, value != 0))
}

macro_rules! scalar_lookup {
    ($name:ident, $ty:ty, $method:ident) => {
        /// # Safety
        /// `out_value` must be writable.
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            handle: *mut ShmdbHandle,
            key: *const c_void,
            key_len: usize,
            out_value: *mut $ty,
        ) -> ShmdbErrorCode {
            let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
                return ShmdbErrorCode::InvalidParam;
            };
            if out_value.is_null() {
                return ShmdbErrorCode::InvalidParam;
            }
            match store.$method(key) {
                Ok(v) => {
                    *out_value = v;
                    ShmdbErrorCode::Ok
                }
                Err(e) => err_code(&e),
            }
        }
    };
}

scalar_lookup!(shmdb_lookup_int_scalar, i64, lookup_int_scalar);
scalar_lookup!(shmdb_lookup_float_scalar, f64, lookup_float_scalar);

/// # Safety
/// `out_value` must be writable.
#[no_mangle]
pub unsafe extern "C" fn shmdb_lookup_bool_scalar(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    out_value: *mut c_int,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if out_value.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    match store.lookup_bool_scalar(key) {
        Ok(v) => {
            *out_value = v as c_int;
            ShmdbErrorCode::Ok
        }
        Err(e) => err_code(&e),
    }
}

// ============================================================================
// Strings, bytes, vectors, matrices
// ============================================================================

#[repr(C)]
pub struct ShmdbStringView {
    pub data: *const c_char,
    pub length: usize,
}

#[repr(C)]
pub struct ShmdbBytesView {
    pub data: *const u8,
    pub length: usize,
}

#[repr(C)]
pub struct ShmdbIntVectorView {
    pub data: *const i64,
    pub count: usize,
}

#[repr(C)]
pub struct ShmdbFloatVectorView {
    pub data: *const f64,
    pub count: usize,
}

#[repr(C)]
pub struct ShmdbBoolVectorView {
    pub data: *const u8,
    pub count: usize,
}

#[repr(C)]
pub struct ShmdbIntMatrixView {
    pub data: *const i64,
    pub rows: usize,
    pub cols: usize,
}

#[repr(C)]
pub struct ShmdbFloatMatrixView {
    pub data: *const f64,
    pub rows: usize,
    pub cols: usize,
}

/// # Safety
/// `value` must be readable for `value_len`.
#[no_mangle]
pub unsafe extern "C" fn shmdb_insert_string(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    value: *const c_char,
    value_len: usize,
) -> ShmdbErrorCode {
    let (Some(store), Some(key), Some(value)) = (
        store_ref(handle),
        bytes_arg(key, key_len),
        str_arg(value, value_len),
    ) else {
        return ShmdbErrorCode::InvalidParam;
    };
    code_of(store.insert_string(key, value))
}

/// # Safety
/// `value` must be readable for `value_len`.
#[no_mangle]
pub unsafe extern "C" fn shmdb_insert_bytes(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    value: *const u8,
    value_len: usize,
) -> ShmdbErrorCode {
    let (Some(store), Some(key), Some(value)) = (
        store_ref(handle),
        bytes_arg(key, key_len),
        bytes_arg(value as *const c_void, value_len),
    ) else {
        return ShmdbErrorCode::InvalidParam;
    };
    code_of(store.insert_bytes(key, value))
}

/// # Safety
/// `out_view` must be writable; the view lives as long as the handle.
#[no_mangle]
pub unsafe extern "C" fn shmdb_lookup_string(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    out_view: *mut ShmdbStringView,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if out_view.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    match store.lookup_string(key) {
        Ok(s) => {
            *out_view = ShmdbStringView {
                data: s.as_ptr() as *const c_char,
                length: s.len(),
            };
            ShmdbErrorCode::Ok
        }
        Err(e) => err_code(&e),
    }
}

/// # Safety
/// `out_view` must be writable; the view lives as long as the handle.
#[no_mangle]
pub unsafe extern "C" fn shmdb_lookup_bytes(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    out_view: *mut ShmdbBytesView,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if out_view.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    match store.lookup_bytes(key) {
        Ok(b) => {
            *out_view = ShmdbBytesView {
                data: b.as_ptr(),
                length: b.len(),
            };
            ShmdbErrorCode::Ok
        }
        Err(e) => err_code(&e),
    }
}

macro_rules! word_vector_insert {
    ($name:ident, $elem:ty, $method:ident) => {
        /// # Safety
        /// `values` must be readable for `count` elements.
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            handle: *mut ShmdbHandle,
            key: *const c_void,
            key_len: usize,
            values: *const $elem,
            count: usize,
        ) -> ShmdbErrorCode {
            let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
                return ShmdbErrorCode::InvalidParam;
            };
            if values.is_null() && count > 0 {
                return ShmdbErrorCode::InvalidParam;
            }
            let values = if count == 0 {
                &[]
            } else {
                slice::from_raw_parts(values, count)
            };
            code_of(store.$method(key, values))
        }
    };
}

word_vector_insert!(shmdb_insert_int_vector, i64, insert_int_vector);
word_vector_insert!(shmdb_insert_float_vector, f64, insert_float_vector);
word_vector_insert!(shmdb_insert_int_set, i64, insert_int_set);
word_vector_insert!(shmdb_insert_float_set, f64, insert_float_set);

/// Bool elements are 0/1 bytes.
///
/// # Safety
/// `values` must be readable for `count` bytes.
#[no_mangle]
pub unsafe extern "C" fn shmdb_insert_bool_vector(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    values: *const u8,
    count: usize,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if values.is_null() && count > 0 {
        return ShmdbErrorCode::InvalidParam;
    }
    let bools: Vec<bool> = if count == 0 {
        Vec::new()
    } else {
        slice::from_raw_parts(values, count)
            .iter()
            .map(|&b| b != 0)
            .collect()
    };
    code_of(store.insert_bool_vector(key, &bools))
}

macro_rules! word_vector_lookup {
    ($name:ident, $view:ty, $elem:ty, $method:ident) => {
        /// # Safety
        /// `out_view` must be writable; the view lives as long as the handle.
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            handle: *mut ShmdbHandle,
            key: *const c_void,
            key_len: usize,
            out_view: *mut $view,
        ) -> ShmdbErrorCode {
            let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
                return ShmdbErrorCode::InvalidParam;
            };
            if out_view.is_null() {
                return ShmdbErrorCode::InvalidParam;
            }
            match store.$method(key) {
                Ok(v) => {
                    (*out_view).data = v.data_bytes().as_ptr() as *const $elem;
                    (*out_view).count = v.len();
                    ShmdbErrorCode::Ok
                }
                Err(e) => err_code(&e),
            }
        }
    };
}

word_vector_lookup!(
    shmdb_lookup_int_vector,
    ShmdbIntVectorView,
    i64,
    lookup_int_vector
);
word_vector_lookup!(
    shmdb_lookup_float_vector,
    ShmdbFloatVectorView,
    f64,
    lookup_float_vector
);
word_vector_lookup!(
    shmdb_lookup_bool_vector,
    ShmdbBoolVectorView,
    u8,
    lookup_bool_vector
);

#[repr(C)]
pub struct ShmdbIntSetView {
    pub data: *const i64,
    pub count: usize,
}

#[repr(C)]
pub struct ShmdbFloatSetView {
    pub data: *const f64,
    pub count: usize,
}

word_vector_lookup!(shmdb_lookup_int_set, ShmdbIntSetView, i64, lookup_int_set);
word_vector_lookup!(
    shmdb_lookup_float_set,
    ShmdbFloatSetView,
    f64,
    lookup_float_set
);

macro_rules! matrix_insert {
    ($name:ident, $elem:ty, $matrix:ident, $method:ident) => {
        /// Row-major `rows * cols` elements.
        ///
        /// # Safety
        /// `values` must be readable for `rows * cols` elements.
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            handle: *mut ShmdbHandle,
            key: *const c_void,
            key_len: usize,
            values: *const $elem,
            rows: usize,
            cols: usize,
        ) -> ShmdbErrorCode {
            let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
                return ShmdbErrorCode::InvalidParam;
            };
            let Some(total) = rows.checked_mul(cols) else {
                return ShmdbErrorCode::InvalidParam;
            };
            if values.is_null() && total > 0 {
                return ShmdbErrorCode::InvalidParam;
            }
            if rows > u32::MAX as usize || cols > u32::MAX as usize {
                return ShmdbErrorCode::InvalidParam;
            }
            let data = if total == 0 {
                Vec::new()
            } else {
                slice::from_raw_parts(values, total).to_vec()
            };
            let matrix = match shmdb_core::$matrix::new(rows as u32, cols as u32, data) {
                Ok(m) => m,
                Err(e) => return err_code(&e),
            };
            code_of(store.$method(key, &matrix))
        }
    };
}

matrix_insert!(shmdb_insert_int_matrix, i64, IntMatrix, insert_int_matrix);
matrix_insert!(
    shmdb_insert_float_matrix,
    f64,
    FloatMatrix,
    insert_float_matrix
);

macro_rules! matrix_lookup {
    ($name:ident, $view:ty, $elem:ty, $method:ident) => {
        /// # Safety
        /// `out_view` must be writable; the view lives as long as the handle.
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            handle: *mut ShmdbHandle,
            key: *const c_void,
            key_len: usize,
            out_view: *mut $view,
        ) -> ShmdbErrorCode {
            let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
                return ShmdbErrorCode::InvalidParam;
            };
            if out_view.is_null() {
                return ShmdbErrorCode::InvalidParam;
            }
            match store.$method(key) {
                Ok(m) => {
                    (*out_view).data = m.data_bytes().as_ptr() as *const $elem;
                    (*out_view).rows = m.rows() as usize;
                    (*out_view).cols = m.cols() as usize;
                    ShmdbErrorCode::Ok
                }
                Err(e) => err_code(&e),
            }
        }
    };
}

matrix_lookup!(
    shmdb_lookup_int_matrix,
    ShmdbIntMatrixView,
    i64,
    lookup_int_matrix
);
matrix_lookup!(
    shmdb_lookup_float_matrix,
    ShmdbFloatMatrixView,
    f64,
    lookup_float_matrix
);

// ============================================================================
// String containers
// ============================================================================

#[repr(C)]
pub struct ShmdbStringSetView {
    /// `(count + 1)` offsets into `string_data`.
    pub offsets: *const u32,
    pub string_data: *const c_char,
    pub count: usize,
}

#[repr(C)]
pub struct ShmdbStringVectorView {
    pub offsets: *const u32,
    pub string_data: *const c_char,
    pub count: usize,
}

/// Collect a parallel `(ptr, len)` string array from C.
unsafe fn collect_strs<'a>(
    strings: *const *const c_char,
    lengths: *const usize,
    count: usize,
) -> Option<Vec<&'a str>> {
    if (strings.is_null() || lengths.is_null()) && count > 0 {
        return None;
    }
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        out.push(str_arg(*strings.add(i), *lengths.add(i))?);
    }
    Some(out)
}

macro_rules! string_seq_insert {
    ($name:ident, $method:ident) => {
        /// # Safety
        /// `strings`/`string_lengths` must hold `count` valid entries.
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            handle: *mut ShmdbHandle,
            key: *const c_void,
            key_len: usize,
            strings: *const *const c_char,
            string_lengths: *const usize,
            count: usize,
        ) -> ShmdbErrorCode {
            let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
                return ShmdbErrorCode::InvalidParam;
            };
            let Some(items) = collect_strs(strings, string_lengths, count) else {
                return ShmdbErrorCode::InvalidParam;
            };
            code_of(store.$method(key, &items))
        }
    };
}

string_seq_insert!(shmdb_insert_string_set, insert_string_set);
string_seq_insert!(shmdb_insert_string_vector, insert_string_vector);

macro_rules! string_seq_lookup {
    ($name:ident, $view:ty, $method:ident) => {
        /// # Safety
        /// `out_view` must be writable; the view lives as long as the handle.
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            handle: *mut ShmdbHandle,
            key: *const c_void,
            key_len: usize,
            out_view: *mut $view,
        ) -> ShmdbErrorCode {
            let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
                return ShmdbErrorCode::InvalidParam;
            };
            if out_view.is_null() {
                return ShmdbErrorCode::InvalidParam;
            }
            match store.$method(key) {
                Ok(v) => {
                    (*out_view).offsets = v.offsets_bytes().as_ptr() as *const u32;
                    (*out_view).string_data = v.data_bytes().as_ptr() as *const c_char;
                    (*out_view).count = v.len();
                    ShmdbErrorCode::Ok
                }
                Err(e) => err_code(&e),
            }
        }
    };
}

string_seq_lookup!(shmdb_lookup_string_set, ShmdbStringSetView, lookup_string_set);
string_seq_lookup!(
    shmdb_lookup_string_vector,
    ShmdbStringVectorView,
    lookup_string_vector
);

// ============================================================================
// Dictionaries
// ============================================================================

#[repr(C)]
pub struct ShmdbDictStrIntView {
    pub key_offsets: *const u32,
    pub keys_data: *const c_char,
    pub values: *const i64,
    pub count: usize,
}

#[repr(C)]
pub struct ShmdbDictStrFloatView {
    pub key_offsets: *const u32,
    pub keys_data: *const c_char,
    pub values: *const f64,
    pub count: usize,
}

#[repr(C)]
pub struct ShmdbDictStrBoolView {
    pub key_offsets: *const u32,
    pub keys_data: *const c_char,
    pub values: *const u8,
    pub count: usize,
}

#[repr(C)]
pub struct ShmdbDictStrStringView {
    pub key_offsets: *const u32,
    pub keys_data: *const c_char,
    pub value_offsets: *const u32,
    pub values_data: *const c_char,
    pub count: usize,
}

#[repr(C)]
pub struct ShmdbDictStrBytesView {
    pub key_offsets: *const u32,
    pub keys_data: *const c_char,
    pub value_offsets: *const u32,
    pub values_data: *const u8,
    pub count: usize,
}

macro_rules! word_dict_insert {
    ($name:ident, $elem:ty, $method:ident) => {
        /// # Safety
        /// The parallel arrays must hold `count` valid entries.
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            handle: *mut ShmdbHandle,
            key: *const c_void,
            key_len: usize,
            keys: *const *const c_char,
            key_lengths: *const usize,
            values: *const $elem,
            count: usize,
        ) -> ShmdbErrorCode {
            let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
                return ShmdbErrorCode::InvalidParam;
            };
            let Some(dict_keys) = collect_strs(keys, key_lengths, count) else {
                return ShmdbErrorCode::InvalidParam;
            };
            if values.is_null() && count > 0 {
                return ShmdbErrorCode::InvalidParam;
            }
            let pairs: Vec<(&str, $elem)> = dict_keys
                .into_iter()
                .enumerate()
                .map(|(i, k)| (k, *values.add(i)))
                .collect();
            code_of(store.$method(key, &pairs))
        }
    };
}

word_dict_insert!(shmdb_insert_dict_str_int, i64, insert_dict_str_int);
word_dict_insert!(shmdb_insert_dict_str_float, f64, insert_dict_str_float);

/// Bool values are 0/1 bytes.
///
/// # Safety
/// The parallel arrays must hold `count` valid entries.
#[no_mangle]
pub unsafe extern "C" fn shmdb_insert_dict_str_bool(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    keys: *const *const c_char,
    key_lengths: *const usize,
    values: *const u8,
    count: usize,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    let Some(dict_keys) = collect_strs(keys, key_lengths, count) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if values.is_null() && count > 0 {
        return ShmdbErrorCode::InvalidParam;
    }
    let pairs: Vec<(&str, bool)> = dict_keys
        .into_iter()
        .enumerate()
        .map(|(i, k)| (k, *values.add(i) != 0))
        .collect();
    code_of(store.insert_dict_str_bool(key, &pairs))
}

macro_rules! bytes_dict_insert {
    ($name:ident, $valptr:ty, $method:ident, $conv:expr) => {
        /// # Safety
        /// The parallel arrays must hold `count` valid entries.
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            handle: *mut ShmdbHandle,
            key: *const c_void,
            key_len: usize,
            keys: *const *const c_char,
            key_lengths: *const usize,
            values: *const $valptr,
            value_lengths: *const usize,
            count: usize,
        ) -> ShmdbErrorCode {
            let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
                return ShmdbErrorCode::InvalidParam;
            };
            let Some(dict_keys) = collect_strs(keys, key_lengths, count) else {
                return ShmdbErrorCode::InvalidParam;
            };
            if (values.is_null() || value_lengths.is_null()) && count > 0 {
                return ShmdbErrorCode::InvalidParam;
            }
            let mut pairs = Vec::with_capacity(count);
            for (i, k) in dict_keys.into_iter().enumerate() {
                let Some(v) = $conv(*values.add(i), *value_lengths.add(i)) else {
                    return ShmdbErrorCode::InvalidParam;
                };
                pairs.push((k, v));
            }
            code_of(store.$method(key, &pairs))
        }
    };
}

bytes_dict_insert!(
    shmdb_insert_dict_str_string,
    *const c_char,
    insert_dict_str_string,
    |p: *const c_char, l: usize| str_arg(p, l)
);
bytes_dict_insert!(
    shmdb_insert_dict_str_bytes,
    *const u8,
    insert_dict_str_bytes,
    |p: *const u8, l: usize| bytes_arg(p as *const c_void, l)
);

macro_rules! word_dict_lookup {
    ($name:ident, $view:ty, $elem:ty, $method:ident) => {
        /// # Safety
        /// `out_view` must be writable; the view lives as long as the handle.
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            handle: *mut ShmdbHandle,
            key: *const c_void,
            key_len: usize,
            out_view: *mut $view,
        ) -> ShmdbErrorCode {
            let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
                return ShmdbErrorCode::InvalidParam;
            };
            if out_view.is_null() {
                return ShmdbErrorCode::InvalidParam;
            }
            match store.$method(key) {
                Ok(v) => {
                    (*out_view).key_offsets = v.key_offsets_bytes().as_ptr() as *const u32;
                    (*out_view).keys_data = v.keys_bytes().as_ptr() as *const c_char;
                    (*out_view).values = v.values_bytes().as_ptr() as *const $elem;
                    (*out_view).count = v.len();
                    ShmdbErrorCode::Ok
                }
                Err(e) => err_code(&e),
            }
        }
    };
}

word_dict_lookup!(
    shmdb_lookup_dict_str_int,
    ShmdbDictStrIntView,
    i64,
    lookup_dict_str_int
);
word_dict_lookup!(
    shmdb_lookup_dict_str_float,
    ShmdbDictStrFloatView,
    f64,
    lookup_dict_str_float
);
word_dict_lookup!(
    shmdb_lookup_dict_str_bool,
    ShmdbDictStrBoolView,
    u8,
    lookup_dict_str_bool
);

macro_rules! table_dict_lookup {
    ($name:ident, $view:ty, $data:ty, $method:ident) => {
        /// # Safety
        /// `out_view` must be writable; the view lives as long as the handle.
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            handle: *mut ShmdbHandle,
            key: *const c_void,
            key_len: usize,
            out_view: *mut $view,
        ) -> ShmdbErrorCode {
            let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
                return ShmdbErrorCode::InvalidParam;
            };
            if out_view.is_null() {
                return ShmdbErrorCode::InvalidParam;
            }
            match store.$method(key) {
                Ok(v) => {
                    (*out_view).key_offsets = v.key_offsets_bytes().as_ptr() as *const u32;
                    (*out_view).keys_data = v.keys_bytes().as_ptr() as *const c_char;
                    (*out_view).value_offsets = v.value_offsets_bytes().as_ptr() as *const u32;
                    (*out_view).values_data = v.values_bytes().as_ptr() as *const $data;
                    (*out_view).count = v.len();
                    ShmdbErrorCode::Ok
                }
                Err(e) => err_code(&e),
            }
        }
    };
}

table_dict_lookup!(
    shmdb_lookup_dict_str_string,
    ShmdbDictStrStringView,
    c_char,
    lookup_dict_str_string
);
table_dict_lookup!(
    shmdb_lookup_dict_str_bytes,
    ShmdbDictStrBytesView,
    u8,
    lookup_dict_str_bytes
);

#[repr(C)]
pub struct ShmdbDictStrFloatVectorView {
    pub key_offsets: *const u32,
    pub keys_data: *const c_char,
    /// `(count + 1)` offsets into `values_flat`, in elements.
    pub value_offsets: *const u32,
    /// `count` per-vector lengths, in elements.
    pub value_lengths: *const u32,
    pub values_flat: *const f64,
    pub count: usize,
}

/// # Safety
/// The parallel arrays must describe `count` vectors flattened into
/// `values_flat`.
#[no_mangle]
pub unsafe extern "C" fn shmdb_insert_dict_str_float_vector(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    keys: *const *const c_char,
    key_lengths: *const usize,
    value_offsets: *const u32,
    value_lengths: *const u32,
    values_flat: *const f64,
    count: usize,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    let Some(dict_keys) = collect_strs(keys, key_lengths, count) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if (value_offsets.is_null() || value_lengths.is_null()) && count > 0 {
        return ShmdbErrorCode::InvalidParam;
    }
    let mut pairs: Vec<(&str, &[f64])> = Vec::with_capacity(count);
    for (i, k) in dict_keys.into_iter().enumerate() {
        let off = u32_entry(value_offsets, i) as usize;
        let len = u32_entry(value_lengths, i) as usize;
        if len > 0 && values_flat.is_null() {
            return ShmdbErrorCode::InvalidParam;
        }
        let v = if len == 0 {
            &[]
        } else {
            slice::from_raw_parts(values_flat.add(off), len)
        };
        pairs.push((k, v));
    }
    code_of(store.insert_dict_str_float_vector(key, &pairs))
}

/// # Safety
/// `out_view` must be writable; the view lives as long as the handle.
#[no_mangle]
pub unsafe extern "C" fn shmdb_lookup_dict_str_float_vector(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    out_view: *mut ShmdbDictStrFloatVectorView,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if out_view.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    match store.lookup_dict_str_float_vector(key) {
        Ok(v) => {
            *out_view = ShmdbDictStrFloatVectorView {
                key_offsets: v.key_offsets_bytes().as_ptr() as *const u32,
                keys_data: v.keys_bytes().as_ptr() as *const c_char,
                value_offsets: v.value_offsets_bytes().as_ptr() as *const u32,
                value_lengths: v.value_lengths_bytes().as_ptr() as *const u32,
                values_flat: v.flat_bytes().as_ptr() as *const f64,
                count: v.len(),
            };
            ShmdbErrorCode::Ok
        }
        Err(e) => err_code(&e),
    }
}

#[repr(C)]
pub struct ShmdbDictStrFloatMatrixView {
    pub key_offsets: *const u32,
    pub keys_data: *const c_char,
    /// `(count + 1)` offsets into `values_flat`, in elements.
    pub value_offsets: *const u32,
    pub rows: *const u32,
    pub cols: *const u32,
    pub values_flat: *const f64,
    pub count: usize,
}

/// # Safety
/// The parallel arrays must describe `count` matrices flattened into
/// `values_flat`.
#[no_mangle]
pub unsafe extern "C" fn shmdb_insert_dict_str_float_matrix(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    keys: *const *const c_char,
    key_lengths: *const usize,
    value_offsets: *const u32,
    rows: *const u32,
    cols: *const u32,
    values_flat: *const f64,
    count: usize,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    let Some(dict_keys) = collect_strs(keys, key_lengths, count) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if (value_offsets.is_null() || rows.is_null() || cols.is_null()) && count > 0 {
        return ShmdbErrorCode::InvalidParam;
    }
    let mut pairs: Vec<(&str, shmdb_core::FloatMatrix)> = Vec::with_capacity(count);
    for (i, k) in dict_keys.into_iter().enumerate() {
        let off = u32_entry(value_offsets, i) as usize;
        let r = u32_entry(rows, i);
        let c = u32_entry(cols, i);
        let Some(len) = (r as usize).checked_mul(c as usize) else {
            return ShmdbErrorCode::InvalidParam;
        };
        if len > 0 && values_flat.is_null() {
            return ShmdbErrorCode::InvalidParam;
        }
        let data = if len == 0 {
            Vec::new()
        } else {
            slice::from_raw_parts(values_flat.add(off), len).to_vec()
        };
        let matrix = match shmdb_core::FloatMatrix::new(r, c, data) {
            Ok(m) => m,
            Err(e) => return err_code(&e),
        };
        pairs.push((k, matrix));
    }
    code_of(store.insert_dict_str_float_matrix(key, &pairs))
}

/// # Safety
/// `out_view` must be writable; the view lives as long as the handle.
#[no_mangle]
pub unsafe extern "C" fn shmdb_lookup_dict_str_float_matrix(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    out_view: *mut ShmdbDictStrFloatMatrixView,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if out_view.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    match store.lookup_dict_str_float_matrix(key) {
        Ok(v) => {
            *out_view = ShmdbDictStrFloatMatrixView {
                key_offsets: v.key_offsets_bytes().as_ptr() as *const u32,
                keys_data: v.keys_bytes().as_ptr() as *const c_char,
                value_offsets: v.value_offsets_bytes().as_ptr() as *const u32,
                rows: v.rows_bytes().as_ptr() as *const u32,
                cols: v.cols_bytes().as_ptr() as *const u32,
                values_flat: v.flat_bytes().as_ptr() as *const f64,
                count: v.len(),
            };
            ShmdbErrorCode::Ok
        }
        Err(e) => err_code(&e),
    }
}

#[repr(C)]
pub struct ShmdbDictStrStringVectorView {
    pub key_offsets: *const u32,
    pub keys_data: *const c_char,
    /// `(count + 1)` indices into the string-offset index space.
    pub value_list_offsets: *const u32,
    /// `(n_strings + 1)` offsets into `string_data`.
    pub string_offsets: *const u32,
    pub string_data: *const c_char,
    pub count: usize,
    pub n_strings: usize,
}

/// # Safety
/// The arrays must describe `count` lists over a shared string table of
/// `n_strings` entries.
#[no_mangle]
pub unsafe extern "C" fn shmdb_insert_dict_str_string_vector(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    keys: *const *const c_char,
    key_lengths: *const usize,
    value_list_offsets: *const u32,
    string_offsets: *const u32,
    string_data: *const c_char,
    n_strings: usize,
    count: usize,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    let Some(dict_keys) = collect_strs(keys, key_lengths, count) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if (value_list_offsets.is_null() || string_offsets.is_null()) && count > 0 {
        return ShmdbErrorCode::InvalidParam;
    }
    if string_data.is_null() && n_strings > 0 {
        return ShmdbErrorCode::InvalidParam;
    }

    let mut pairs: Vec<(&str, Vec<&str>)> = Vec::with_capacity(count);
    for (i, k) in dict_keys.into_iter().enumerate() {
        let start = u32_entry(value_list_offsets, i) as usize;
        let end = u32_entry(value_list_offsets, i + 1) as usize;
        if end < start || end > n_strings {
            return ShmdbErrorCode::InvalidParam;
        }
        let mut list = Vec::with_capacity(end - start);
        for j in start..end {
            let s_start = u32_entry(string_offsets, j) as usize;
            let s_end = u32_entry(string_offsets, j + 1) as usize;
            if s_end < s_start {
                return ShmdbErrorCode::InvalidParam;
            }
            let Some(s) = str_arg(string_data.add(s_start), s_end - s_start) else {
                return ShmdbErrorCode::InvalidParam;
            };
            list.push(s);
        }
        pairs.push((k, list));
    }
    code_of(store.insert_dict_str_string_vector(key, &pairs))
}

/// # Safety
/// `out_view` must be writable; the view lives as long as the handle.
#[no_mangle]
pub unsafe extern "C" fn shmdb_lookup_dict_str_string_vector(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    out_view: *mut ShmdbDictStrStringVectorView,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if out_view.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    match store.lookup_dict_str_string_vector(key) {
        Ok(v) => {
            *out_view = ShmdbDictStrStringVectorView {
                key_offsets: v.key_offsets_bytes().as_ptr() as *const u32,
                keys_data: v.keys_bytes().as_ptr() as *const c_char,
                value_list_offsets: v.list_offsets_bytes().as_ptr() as *const u32,
                string_offsets: v.string_offsets_bytes().as_ptr() as *const u32,
                string_data: v.string_data_bytes().as_ptr() as *const c_char,
                count: v.len(),
                n_strings: v.n_strings(),
            };
            ShmdbErrorCode::Ok
        }
        Err(e) => err_code(&e),
    }
}

// ============================================================================
// Recursive object / list
// ============================================================================

#[repr(C)]
pub struct ShmdbTypedValueView {
    /// `ValueType` tag byte widened to u32.
    pub value_type: u32,
    pub payload: *const c_void,
    pub payload_len: usize,
}

#[repr(C)]
pub struct ShmdbObjectView {
    pub name_offsets: *const u32,
    pub names_data: *const c_char,
    pub field_types: *const u8,
    pub value_offsets: *const u32,
    pub values_data: *const u8,
    pub count: usize,
}

#[repr(C)]
pub struct ShmdbListView {
    pub elem_types: *const u8,
    pub value_offsets: *const u32,
    pub values_data: *const u8,
    pub count: usize,
}

/// Fields arrive as parallel arrays with payloads already encoded for their
/// tags. Sorting and duplicate rejection happen here.
///
/// # Safety
/// All parallel arrays must hold `field_count` valid entries.
#[no_mangle]
pub unsafe extern "C" fn shmdb_insert_object(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    field_names: *const *const c_char,
    field_name_lengths: *const usize,
    field_types: *const u8,
    field_payloads: *const *const c_void,
    field_payload_lengths: *const usize,
    field_count: usize,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    let Some(names) = collect_strs(field_names, field_name_lengths, field_count) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if (field_types.is_null() || field_payloads.is_null() || field_payload_lengths.is_null())
        && field_count > 0
    {
        return ShmdbErrorCode::InvalidParam;
    }

    let mut fields: Vec<(&str, ValueType, &[u8])> = Vec::with_capacity(field_count);
    for (i, name) in names.into_iter().enumerate() {
        let Some(tag) = ValueType::from_u8(*field_types.add(i)) else {
            return ShmdbErrorCode::InvalidParam;
        };
        let len = *field_payload_lengths.add(i);
        let payload_ptr = *field_payloads.add(i);
        let payload = if len == 0 {
            &[]
        } else {
            match bytes_arg(payload_ptr, len) {
                Some(p) => p,
                None => return ShmdbErrorCode::InvalidParam,
            }
        };
        fields.push((name, tag, payload));
    }

    let encoded = match codec::encode_object_raw(&fields) {
        Ok(e) => e,
        Err(e) => return err_code(&e),
    };
    code_of(store.insert_encoded(key, ValueType::Object, &encoded))
}

/// # Safety
/// All parallel arrays must hold `count` valid entries.
#[no_mangle]
pub unsafe extern "C" fn shmdb_insert_list(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    elem_types: *const u8,
    elem_payloads: *const *const c_void,
    elem_payload_lengths: *const usize,
    count: usize,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if (elem_types.is_null() || elem_payloads.is_null() || elem_payload_lengths.is_null())
        && count > 0
    {
        return ShmdbErrorCode::InvalidParam;
    }

    let mut items: Vec<(ValueType, &[u8])> = Vec::with_capacity(count);
    for i in 0..count {
        let Some(tag) = ValueType::from_u8(*elem_types.add(i)) else {
            return ShmdbErrorCode::InvalidParam;
        };
        let len = *elem_payload_lengths.add(i);
        let payload_ptr = *elem_payloads.add(i);
        let payload = if len == 0 {
            &[]
        } else {
            match bytes_arg(payload_ptr, len) {
                Some(p) => p,
                None => return ShmdbErrorCode::InvalidParam,
            }
        };
        items.push((tag, payload));
    }

    let encoded = match codec::encode_list_raw(&items) {
        Ok(e) => e,
        Err(e) => return err_code(&e),
    };
    code_of(store.insert_encoded(key, ValueType::List, &encoded))
}

/// # Safety
/// `out_view` must be writable; the view lives as long as the handle.
#[no_mangle]
pub unsafe extern "C" fn shmdb_lookup_object(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    out_view: *mut ShmdbObjectView,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if out_view.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    match store.lookup_object(key) {
        Ok(v) => {
            *out_view = ShmdbObjectView {
                name_offsets: v.name_offsets_bytes().as_ptr() as *const u32,
                names_data: v.names_bytes().as_ptr() as *const c_char,
                field_types: v.field_types_bytes().as_ptr(),
                value_offsets: v.value_offsets_bytes().as_ptr() as *const u32,
                values_data: v.values_bytes().as_ptr(),
                count: v.count(),
            };
            ShmdbErrorCode::Ok
        }
        Err(e) => err_code(&e),
    }
}

/// # Safety
/// `out_view` must be writable; the view lives as long as the handle.
#[no_mangle]
pub unsafe extern "C" fn shmdb_lookup_list(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    out_view: *mut ShmdbListView,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if out_view.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    match store.lookup_list(key) {
        Ok(v) => {
            *out_view = ShmdbListView {
                elem_types: v.elem_types_bytes().as_ptr(),
                value_offsets: v.value_offsets_bytes().as_ptr() as *const u32,
                values_data: v.values_bytes().as_ptr(),
                count: v.count(),
            };
            ShmdbErrorCode::Ok
        }
        Err(e) => err_code(&e),
    }
}

/// Binary search over the object's sorted field names.
///
/// # Safety
/// `object_view` must come from a successful [`shmdb_lookup_object`] whose
/// handle is still open; `field_name` readable for `field_name_len`.
#[no_mangle]
pub unsafe extern "C" fn shmdb_object_get_field(
    object_view: *const ShmdbObjectView,
    field_name: *const c_char,
    field_name_len: usize,
    out_value: *mut ShmdbTypedValueView,
) -> ShmdbErrorCode {
    if object_view.is_null() || field_name.is_null() || out_value.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    let view = &*object_view;
    let needle = slice::from_raw_parts(field_name as *const u8, field_name_len);

    let mut lo = 0usize;
    let mut hi = view.count;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let start = u32_entry(view.name_offsets, mid) as usize;
        let end = u32_entry(view.name_offsets, mid + 1) as usize;
        let name = slice::from_raw_parts(view.names_data.add(start) as *const u8, end - start);
        match name.cmp(needle) {
            std::cmp::Ordering::Equal => {
                let v_start = u32_entry(view.value_offsets, mid) as usize;
                let v_end = u32_entry(view.value_offsets, mid + 1) as usize;
                *out_value = ShmdbTypedValueView {
                    value_type: *view.field_types.add(mid) as u32,
                    payload: view.values_data.add(v_start) as *const c_void,
                    payload_len: v_end - v_start,
                };
                return ShmdbErrorCode::Ok;
            }
            std::cmp::Ordering::Less => lo = mid + 1,
            std::cmp::Ordering::Greater => hi = mid,
        }
    }
    ShmdbErrorCode::NotFound
}

/// # Safety
/// `list_view` must come from a successful [`shmdb_lookup_list`] whose
/// handle is still open.
#[no_mangle]
pub unsafe extern "C" fn shmdb_list_get_element(
    list_view: *const ShmdbListView,
    index: usize,
    out_value: *mut ShmdbTypedValueView,
) -> ShmdbErrorCode {
    if list_view.is_null() || out_value.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    let view = &*list_view;
    if index >= view.count {
        return ShmdbErrorCode::NotFound;
    }
    let start = u32_entry(view.value_offsets, index) as usize;
    let end = u32_entry(view.value_offsets, index + 1) as usize;
    *out_value = ShmdbTypedValueView {
        value_type: *view.elem_types.add(index) as u32,
        payload: view.values_data.add(start) as *const c_void,
        payload_len: end - start,
    };
    ShmdbErrorCode::Ok
}

// ============================================================================
// Access control and encryption
// ============================================================================

/// # Safety
/// `is_owner` must be writable.
#[no_mangle]
pub unsafe extern "C" fn shmdb_check_owner(
    handle: *mut ShmdbHandle,
    is_owner: *mut c_int,
) -> ShmdbErrorCode {
    let Some(store) = store_ref(handle) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if is_owner.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    *is_owner = store.is_owner() as c_int;
    ShmdbErrorCode::Ok
}

/// # Safety
/// `is_authorized` must be writable.
#[no_mangle]
pub unsafe extern "C" fn shmdb_check_authorized(
    handle: *mut ShmdbHandle,
    is_authorized: *mut c_int,
) -> ShmdbErrorCode {
    let Some(store) = store_ref(handle) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if is_authorized.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    *is_authorized = store.is_authorized() as c_int;
    ShmdbErrorCode::Ok
}

/// # Safety
/// `handle` from [`shmdb_create`].
#[no_mangle]
pub unsafe extern "C" fn shmdb_add_authorized_pid(
    handle: *mut ShmdbHandle,
    pid: c_int,
) -> ShmdbErrorCode {
    let Some(store) = store_ref(handle) else {
        return ShmdbErrorCode::InvalidParam;
    };
    code_of(store.add_authorized_pid(pid))
}

/// # Safety
/// `aes_key` must be readable for 16 bytes; `value` for `value_len`.
#[no_mangle]
pub unsafe extern "C" fn shmdb_insert_encrypted(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    value: *const c_void,
    value_len: usize,
    aes_key: *const u8,
) -> ShmdbErrorCode {
    let (Some(store), Some(key), Some(value)) = (
        store_ref(handle),
        bytes_arg(key, key_len),
        bytes_arg(value, value_len),
    ) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if aes_key.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    let aes_key: &[u8; 16] = &*(aes_key as *const [u8; 16]);
    code_of(store.insert_encrypted(key, value, aes_key))
}

/// Reports the plaintext length even when the buffer is too small (and then
/// returns `NoSpace`).
///
/// # Safety
/// `aes_key` must be readable for 16 bytes; `out_buffer` writable for
/// `buffer_size` bytes; `out_value_len` writable.
#[no_mangle]
pub unsafe extern "C" fn shmdb_lookup_decrypted(
    handle: *mut ShmdbHandle,
    key: *const c_void,
    key_len: usize,
    out_buffer: *mut c_void,
    buffer_size: usize,
    out_value_len: *mut usize,
    aes_key: *const u8,
) -> ShmdbErrorCode {
    let (Some(store), Some(key)) = (store_ref(handle), bytes_arg(key, key_len)) else {
        return ShmdbErrorCode::InvalidParam;
    };
    if out_buffer.is_null() || out_value_len.is_null() || aes_key.is_null() {
        return ShmdbErrorCode::InvalidParam;
    }
    let aes_key: &[u8; 16] = &*(aes_key as *const [u8; 16]);
    match store.lookup_decrypted(key, aes_key) {
        Ok(plain) => {
            *out_value_len = plain.len();
            if buffer_size < plain.len() {
                return ShmdbErrorCode::NoSpace;
            }
            ptr::copy_nonoverlapping(plain.as_ptr(), out_buffer as *mut u8, plain.len());
            ShmdbErrorCode::Ok
        }
        Err(e) => err_code(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn unique_name(tag: &str) -> CString {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        CString::new(format!(
            "/shmdb-ffi-{tag}-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ))
        .unwrap()
    }

    #[test]
    fn ffi_round_trip_via_c_surface() {
        let name = unique_name("roundtrip");
        unsafe {
            let handle = shmdb_create(name.as_ptr(), 64, 64, 1 << 16);
            assert!(!handle.is_null());

            let key = b"counter";
            assert_eq!(
                shmdb_insert_int_scalar(handle, key.as_ptr() as *const c_void, key.len(), 41),
                ShmdbErrorCode::Ok
            );
            let mut out = 0i64;
            assert_eq!(
                shmdb_lookup_int_scalar(handle, key.as_ptr() as *const c_void, key.len(), &mut out),
                ShmdbErrorCode::Ok
            );
            assert_eq!(out, 41);

            let mut tag = 0u32;
            assert_eq!(
                shmdb_get_value_type(handle, key.as_ptr() as *const c_void, key.len(), &mut tag),
                ShmdbErrorCode::Ok
            );
            assert_eq!(tag, ValueType::IntScalar.as_u8() as u32);

            let mut fval = 0f64;
            assert_eq!(
                shmdb_lookup_float_scalar(
                    handle,
                    key.as_ptr() as *const c_void,
                    key.len(),
                    &mut fval
                ),
                ShmdbErrorCode::TypeMismatch
            );

            let mut stats = std::mem::zeroed::<ShmdbStats>();
            shmdb_get_stats(handle, &mut stats);
            assert_eq!(stats.nodes_used, 1);

            shmdb_close(handle);
            assert_eq!(shmdb_destroy(name.as_ptr()), ShmdbErrorCode::Ok);
        }
    }

    #[test]
    fn ffi_null_arguments_are_rejected() {
        let name = unique_name("nulls");
        unsafe {
            assert!(shmdb_create(ptr::null(), 0, 0, 0).is_null());

            let handle = shmdb_create(name.as_ptr(), 64, 64, 1 << 16);
            assert!(!handle.is_null());
            assert_eq!(
                shmdb_insert(handle, ptr::null(), 0, ptr::null(), 0),
                ShmdbErrorCode::InvalidParam
            );
            let mut out = 0i64;
            assert_eq!(
                shmdb_lookup_int_scalar(ptr::null_mut(), ptr::null(), 0, &mut out),
                ShmdbErrorCode::InvalidParam
            );
            shmdb_close(handle);
            assert_eq!(shmdb_destroy(name.as_ptr()), ShmdbErrorCode::Ok);
        }
    }

    #[test]
    fn ffi_object_field_access() {
        let name = unique_name("object");
        unsafe {
            let handle = shmdb_create(name.as_ptr(), 64, 64, 1 << 16);
            assert!(!handle.is_null());

            let int_payload = codec::encode_int_scalar(7);
            let str_payload = codec::encode_string("hi");
            let names = [b"b".as_ptr() as *const c_char, b"a".as_ptr() as *const c_char];
            let name_lens = [1usize, 1usize];
            let types = [
                ValueType::IntScalar.as_u8(),
                ValueType::String.as_u8(),
            ];
            let payloads = [
                int_payload.as_ptr() as *const c_void,
                str_payload.as_ptr() as *const c_void,
            ];
            let payload_lens = [int_payload.len(), str_payload.len()];

            let key = b"obj";
            assert_eq!(
                shmdb_insert_object(
                    handle,
                    key.as_ptr() as *const c_void,
                    key.len(),
                    names.as_ptr(),
                    name_lens.as_ptr(),
                    types.as_ptr(),
                    payloads.as_ptr(),
                    payload_lens.as_ptr(),
                    2,
                ),
                ShmdbErrorCode::Ok
            );

            let mut view = std::mem::zeroed::<ShmdbObjectView>();
            assert_eq!(
                shmdb_lookup_object(handle, key.as_ptr() as *const c_void, key.len(), &mut view),
                ShmdbErrorCode::Ok
            );
            assert_eq!(view.count, 2);

            let mut field = std::mem::zeroed::<ShmdbTypedValueView>();
            assert_eq!(
                shmdb_object_get_field(&view, b"b".as_ptr() as *const c_char, 1, &mut field),
                ShmdbErrorCode::Ok
            );
            assert_eq!(field.value_type, ValueType::IntScalar.as_u8() as u32);
            assert_eq!(field.payload_len, 8);

            assert_eq!(
                shmdb_object_get_field(&view, b"z".as_ptr() as *const c_char, 1, &mut field),
                ShmdbErrorCode::NotFound
            );

            shmdb_close(handle);
            assert_eq!(shmdb_destroy(name.as_ptr()), ShmdbErrorCode::Ok);
        }
    }
}
