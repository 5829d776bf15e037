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

//! Recursive typed tree views
//!
//! OBJECT and LIST payloads hold a values blob of concatenated
//! self-describing payloads, each slot carrying its own type tag. A field
//! or element access yields a `TypedValueView` pointing into that blob; the
//! caller re-dispatches on the tag, arbitrarily deep, without copying.

use crate::codec::raw::{align4, slice_at, u32_at};
use crate::codec::views::{self, StrTable};
use crate::error::{Result, ShmError};
use crate::value::{TypedValue, ValueType};

/// A tag plus the byte range of one encoded value.
#[derive(Clone, Copy, Debug)]
pub struct TypedValueView<'a> {
    pub tag: ValueType,
    pub payload: &'a [u8],
}

macro_rules! typed_accessor {
    ($name:ident, $tag:ident, $decode:path, $out:ty) => {
        pub fn $name(&self) -> Result<$out> {
            self.expect(ValueType::$tag)?;
            $decode(self.payload)
        }
    };
}

impl<'a> TypedValueView<'a> {
    fn expect(&self, expected: ValueType) -> Result<()> {
        if self.tag != expected {
            return Err(ShmError::TypeMismatch {
                expected,
                found: self.tag,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.tag == ValueType::Null
    }

    typed_accessor!(as_int, IntScalar, views::decode_int_scalar, i64);
    typed_accessor!(as_float, FloatScalar, views::decode_float_scalar, f64);
    typed_accessor!(as_bool, BoolScalar, views::decode_bool_scalar, bool);
    typed_accessor!(as_str, String, views::decode_str, &'a str);
    typed_accessor!(as_bytes, Bytes, views::decode_bytes, &'a [u8]);
    typed_accessor!(
        as_int_vector,
        IntVector,
        views::decode_int_vector,
        views::IntVectorView<'a>
    );
    typed_accessor!(
        as_float_vector,
        FloatVector,
        views::decode_float_vector,
        views::FloatVectorView<'a>
    );
    typed_accessor!(
        as_bool_vector,
        BoolVector,
        views::decode_bool_vector,
        views::BoolVectorView<'a>
    );
    typed_accessor!(
        as_int_matrix,
        IntMatrix,
        views::decode_int_matrix,
        views::IntMatrixView<'a>
    );
    typed_accessor!(
        as_float_matrix,
        FloatMatrix,
        views::decode_float_matrix,
        views::FloatMatrixView<'a>
    );
    typed_accessor!(as_int_set, IntSet, views::decode_int_set, views::IntSetView<'a>);
    typed_accessor!(
        as_float_set,
        FloatSet,
        views::decode_float_set,
        views::FloatSetView<'a>
    );
    typed_accessor!(
        as_string_set,
        StringSet,
        views::decode_string_set,
        views::StringSetView<'a>
    );
    typed_accessor!(
        as_string_vector,
        StringVector,
        views::decode_string_vector,
        views::StringVectorView<'a>
    );
    typed_accessor!(
        as_dict_str_int,
        DictStrInt,
        views::decode_dict_str_int,
        views::DictStrIntView<'a>
    );
    typed_accessor!(
        as_dict_str_float,
        DictStrFloat,
        views::decode_dict_str_float,
        views::DictStrFloatView<'a>
    );
    typed_accessor!(
        as_dict_str_bool,
        DictStrBool,
        views::decode_dict_str_bool,
        views::DictStrBoolView<'a>
    );
    typed_accessor!(
        as_dict_str_string,
        DictStrString,
        views::decode_dict_str_string,
        views::DictStrStringView<'a>
    );
    typed_accessor!(
        as_dict_str_bytes,
        DictStrBytes,
        views::decode_dict_str_bytes,
        views::DictStrBytesView<'a>
    );
    typed_accessor!(
        as_dict_str_float_vector,
        DictStrFloatVector,
        views::decode_dict_str_float_vector,
        views::DictStrFloatVectorView<'a>
    );
    typed_accessor!(
        as_dict_str_float_matrix,
        DictStrFloatMatrix,
        views::decode_dict_str_float_matrix,
        views::DictStrFloatMatrixView<'a>
    );
    typed_accessor!(
        as_dict_str_string_vector,
        DictStrStringVector,
        views::decode_dict_str_string_vector,
        views::DictStrStringVectorView<'a>
    );
    typed_accessor!(as_object, Object, decode_object, ObjectView<'a>);
    typed_accessor!(as_list, List, decode_list, ListView<'a>);

    /// Fully decode into an owned value (recursive for OBJECT/LIST).
    pub fn to_owned(&self) -> Result<TypedValue> {
        TypedValue::decode(self.tag, self.payload)
    }
}

// ============================================================================
// OBJECT
// ============================================================================

/// String-keyed record of typed fields, stored sorted by name bytes.
#[derive(Clone, Copy)]
pub struct ObjectView<'a> {
    names: StrTable<'a>,
    types: &'a [u8],
    values: StrTable<'a>,
}

impl<'a> ObjectView<'a> {
    pub(crate) fn parse(payload: &'a [u8]) -> Result<Self> {
        let count = u32_at(payload, 0)? as usize;
        let (names, next) = StrTable::parse(payload, 4, count)?;
        let types = slice_at(payload, next, count)?;
        let (values, _) = StrTable::parse(payload, align4(next + count), count)?;
        Ok(Self {
            names,
            types,
            values,
        })
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.names.count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Field name at position `i` (names are sorted ascending).
    pub fn name(&self, i: usize) -> Result<&'a [u8]> {
        self.names.get(i)
    }

    pub fn field_type(&self, i: usize) -> Result<ValueType> {
        let byte = *self
            .types
            .get(i)
            .ok_or(ShmError::InvalidParam("field index out of range"))?;
        ValueType::from_u8(byte).ok_or(ShmError::InvalidParam("unrecognized type tag"))
    }

    /// Typed view of field `i`.
    pub fn field(&self, i: usize) -> Result<TypedValueView<'a>> {
        Ok(TypedValueView {
            tag: self.field_type(i)?,
            payload: self.values.get(i)?,
        })
    }

    /// Field lookup by name: binary search over the sorted name table.
    pub fn get(&self, name: &str) -> Result<TypedValueView<'a>> {
        let i = self
            .names
            .binary_search(name.as_bytes())
            .ok_or(ShmError::NotFound)?;
        self.field(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<(&'a [u8], TypedValueView<'a>)>> + 'a {
        let this = *self;
        (0..this.count()).map(move |i| Ok((this.name(i)?, this.field(i)?)))
    }

    // Raw regions for ABI consumers.

    #[inline]
    pub fn name_offsets_bytes(&self) -> &'a [u8] {
        self.names.offsets().raw_bytes()
    }

    #[inline]
    pub fn names_bytes(&self) -> &'a [u8] {
        self.names.blob()
    }

    #[inline]
    pub fn field_types_bytes(&self) -> &'a [u8] {
        self.types
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

/// Parse an OBJECT payload into a view.
pub fn decode_object(payload: &[u8]) -> Result<ObjectView<'_>> {
    ObjectView::parse(payload)
}

// ============================================================================
// LIST
// ============================================================================

/// Positional heterogeneous sequence of typed elements.
#[derive(Clone, Copy)]
pub struct ListView<'a> {
    types: &'a [u8],
    values: StrTable<'a>,
}

impl<'a> ListView<'a> {
    pub(crate) fn parse(payload: &'a [u8]) -> Result<Self> {
        let count = u32_at(payload, 0)? as usize;
        let types = slice_at(payload, 4, count)?;
        let (values, _) = StrTable::parse(payload, align4(4 + count), count)?;
        Ok(Self { types, values })
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.types.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn element_type(&self, i: usize) -> Result<ValueType> {
        let byte = *self.types.get(i).ok_or(ShmError::NotFound)?;
        ValueType::from_u8(byte).ok_or(ShmError::InvalidParam("unrecognized type tag"))
    }

    /// Typed view of element `i`; `NotFound` past the end.
    pub fn get(&self, i: usize) -> Result<TypedValueView<'a>> {
        if i >= self.count() {
            return Err(ShmError::NotFound);
        }
        Ok(TypedValueView {
            tag: self.element_type(i)?,
            payload: self.values.get(i)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<TypedValueView<'a>>> + 'a {
        let this = *self;
        (0..this.count()).map(move |i| this.get(i))
    }

    // Raw regions for ABI consumers.

    #[inline]
    pub fn elem_types_bytes(&self) -> &'a [u8] {
        self.types
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

/// Parse a LIST payload into a view.
pub fn decode_list(payload: &[u8]) -> Result<ListView<'_>> {
    ListView::parse(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode::{encode_list, encode_object};

    fn sample_object() -> Vec<u8> {
        encode_object(&[
            ("b".to_string(), TypedValue::IntScalar(7)),
            ("a".to_string(), TypedValue::String("hi".into())),
            ("zz".to_string(), TypedValue::Null),
        ])
        .unwrap()
    }

    #[test]
    fn object_fields_are_sorted_by_name() {
        let payload = sample_object();
        let view = decode_object(&payload).unwrap();
        assert_eq!(view.count(), 3);
        assert_eq!(view.name(0).unwrap(), b"a");
        assert_eq!(view.name(1).unwrap(), b"b");
        assert_eq!(view.name(2).unwrap(), b"zz");
    }

    #[test]
    fn object_get_field_dispatches_on_tag() {
        let payload = sample_object();
        let view = decode_object(&payload).unwrap();

        let a = view.get("a").unwrap();
        assert_eq!(a.tag, ValueType::String);
        assert_eq!(a.as_str().unwrap(), "hi");

        let b = view.get("b").unwrap();
        assert_eq!(b.as_int().unwrap(), 7);
        assert!(matches!(
            b.as_float().unwrap_err(),
            ShmError::TypeMismatch { .. }
        ));

        assert!(view.get("zz").unwrap().is_null());
        assert_eq!(view.get("zzz").unwrap_err(), ShmError::NotFound);
    }

    #[test]
    fn object_binary_search_matches_scan() {
        let fields: Vec<(String, TypedValue)> = (0..17)
            .map(|i| (format!("field_{i:02}"), TypedValue::IntScalar(i)))
            .collect();
        let payload = encode_object(&fields).unwrap();
        let view = decode_object(&payload).unwrap();

        for i in 0..view.count() {
            let name = std::str::from_utf8(view.name(i).unwrap()).unwrap();
            let by_search = view.get(name).unwrap();
            let by_scan = view.field(i).unwrap();
            assert_eq!(by_search.tag, by_scan.tag);
            assert_eq!(by_search.payload, by_scan.payload);
        }
    }

    #[test]
    fn list_elements_are_positional() {
        let payload = encode_list(&[
            TypedValue::IntScalar(1),
            TypedValue::String("two".into()),
            TypedValue::BoolScalar(true),
        ])
        .unwrap();
        let view = decode_list(&payload).unwrap();
        assert_eq!(view.count(), 3);
        assert_eq!(view.get(0).unwrap().as_int().unwrap(), 1);
        assert_eq!(view.get(1).unwrap().as_str().unwrap(), "two");
        assert!(view.get(2).unwrap().as_bool().unwrap());
        assert_eq!(view.get(3).unwrap_err(), ShmError::NotFound);
    }

    #[test]
    fn deep_nesting_re_dispatches_without_copying() {
        let inner = TypedValue::Object(vec![(
            "vec".to_string(),
            TypedValue::FloatVector(vec![1.0, 2.0]),
        )]);
        let payload = encode_list(&[TypedValue::List(vec![inner])]).unwrap();

        let outer = decode_list(&payload).unwrap();
        let mid = outer.get(0).unwrap().as_list().unwrap();
        let obj = mid.get(0).unwrap().as_object().unwrap();
        let vec = obj.get("vec").unwrap().as_float_vector().unwrap();
        assert_eq!(vec.to_vec(), vec![1.0, 2.0]);
    }
}
