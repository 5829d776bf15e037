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

//! Payload codecs
//!
//! One encoder and one view decoder per value tag. All integers in the
//! payload are little-endian. Variable-length layouts carry `(count + 1)`
//! offsets so element `i` spans `[off[i], off[i+1])` and the final offset
//! doubles as the blob length.
//!
//! Decoders never allocate and never copy: a view is a set of byte ranges
//! into the payload plus accessors that read elements in place. Element
//! accessors go through `from_le_bytes` on fixed-width windows because the
//! inner layouts place 8-byte data at 4-byte offsets; on little-endian
//! hardware this compiles to a plain load.

mod encode;
mod tree;
mod views;

pub use encode::{
    encode_bool_scalar, encode_bool_vector, encode_bytes, encode_dict_str_bool,
    encode_dict_str_bytes, encode_dict_str_float, encode_dict_str_float_matrix,
    encode_dict_str_float_vector, encode_dict_str_int, encode_dict_str_string,
    encode_dict_str_string_vector, encode_float_matrix, encode_float_scalar, encode_float_set,
    encode_float_vector, encode_int_matrix, encode_int_scalar, encode_int_set, encode_int_vector,
    encode_list, encode_list_raw, encode_object, encode_object_raw, encode_string,
    encode_string_set, encode_string_vector,
};
pub use tree::{decode_list, decode_object, ListView, ObjectView, TypedValueView};
pub use views::{
    decode_bool_scalar, decode_bool_vector, decode_bytes, decode_dict_str_bool,
    decode_dict_str_bytes, decode_dict_str_float, decode_dict_str_float_matrix,
    decode_dict_str_float_vector, decode_dict_str_int, decode_dict_str_string,
    decode_dict_str_string_vector, decode_float_matrix, decode_float_scalar, decode_float_set,
    decode_float_vector, decode_int_matrix, decode_int_scalar, decode_int_set, decode_int_vector,
    decode_str, decode_string_set, decode_string_vector, BoolVectorView, DictStrBoolView,
    DictStrBytesView, DictStrFloatMatrixView, DictStrFloatVectorView, DictStrFloatView,
    DictStrIntView, DictStrStringVectorView, DictStrStringView, FloatMatrixView, FloatSetView,
    FloatVectorView, IntMatrixView, IntSetView, IntVectorView, StringSetView, StringVectorView,
};

use crate::error::{Result, ShmError};
use crate::value::{TypedValue, ValueType};

pub(crate) mod raw {
    //! Bounds-checked little-endian reads shared by every decoder.

    use byteorder::{ByteOrder, LittleEndian};

    use crate::error::{Result, ShmError};

    const TRUNCATED: ShmError = ShmError::InvalidParam("truncated payload");

    #[inline]
    pub fn u32_at(buf: &[u8], off: usize) -> Result<u32> {
        buf.get(off..off.checked_add(4).ok_or(TRUNCATED)?)
            .map(LittleEndian::read_u32)
            .ok_or(TRUNCATED)
    }

    #[inline]
    pub fn i64_at(buf: &[u8], off: usize) -> Result<i64> {
        buf.get(off..off.checked_add(8).ok_or(TRUNCATED)?)
            .map(LittleEndian::read_i64)
            .ok_or(TRUNCATED)
    }

    #[inline]
    pub fn f64_at(buf: &[u8], off: usize) -> Result<f64> {
        buf.get(off..off.checked_add(8).ok_or(TRUNCATED)?)
            .map(LittleEndian::read_f64)
            .ok_or(TRUNCATED)
    }

    #[inline]
    pub fn slice_at(buf: &[u8], off: usize, len: usize) -> Result<&[u8]> {
        buf.get(off..off.checked_add(len).ok_or(TRUNCATED)?)
            .ok_or(TRUNCATED)
    }

    /// Round `x` up to the next multiple of 4 (pad before offset tables).
    #[inline]
    pub fn align4(x: usize) -> usize {
        (x + 3) & !3
    }
}

/// Encode any owned value into the wire payload for its tag.
pub fn encode_value(value: &TypedValue) -> Result<Vec<u8>> {
    encode::encode_value(value)
}

/// Decode a payload into an owned value, dispatching on the tag.
///
/// Sets and dictionaries come back in stored (sorted, deduplicated) order,
/// so `decode(encode(x))` equals `x` modulo that normalization.
pub fn decode_value(tag: ValueType, payload: &[u8]) -> Result<TypedValue> {
    match tag {
        ValueType::Null => {
            if payload.is_empty() {
                Ok(TypedValue::Null)
            } else {
                Err(ShmError::InvalidParam("null payload must be empty"))
            }
        }
        ValueType::IntScalar => Ok(TypedValue::IntScalar(decode_int_scalar(payload)?)),
        ValueType::FloatScalar => Ok(TypedValue::FloatScalar(decode_float_scalar(payload)?)),
        ValueType::BoolScalar => Ok(TypedValue::BoolScalar(decode_bool_scalar(payload)?)),
        ValueType::String => Ok(TypedValue::String(decode_str(payload)?.to_owned())),
        ValueType::Bytes => Ok(TypedValue::Bytes(decode_bytes(payload)?.to_vec())),
        ValueType::IntVector => Ok(TypedValue::IntVector(decode_int_vector(payload)?.to_vec())),
        ValueType::FloatVector => Ok(TypedValue::FloatVector(
            decode_float_vector(payload)?.to_vec(),
        )),
        ValueType::BoolVector => Ok(TypedValue::BoolVector(
            decode_bool_vector(payload)?.to_vec(),
        )),
        ValueType::IntMatrix => Ok(TypedValue::IntMatrix(decode_int_matrix(payload)?.to_owned()?)),
        ValueType::FloatMatrix => Ok(TypedValue::FloatMatrix(
            decode_float_matrix(payload)?.to_owned()?,
        )),
        ValueType::IntSet => Ok(TypedValue::IntSet(decode_int_set(payload)?.to_vec())),
        ValueType::FloatSet => Ok(TypedValue::FloatSet(decode_float_set(payload)?.to_vec())),
        ValueType::StringSet => Ok(TypedValue::StringSet(
            decode_string_set(payload)?.to_string_vec()?,
        )),
        ValueType::StringVector => Ok(TypedValue::StringVector(
            decode_string_vector(payload)?.to_string_vec()?,
        )),
        ValueType::DictStrInt => Ok(TypedValue::DictStrInt(
            decode_dict_str_int(payload)?.to_pairs()?,
        )),
        ValueType::DictStrFloat => Ok(TypedValue::DictStrFloat(
            decode_dict_str_float(payload)?.to_pairs()?,
        )),
        ValueType::DictStrBool => Ok(TypedValue::DictStrBool(
            decode_dict_str_bool(payload)?.to_pairs()?,
        )),
        ValueType::DictStrString => Ok(TypedValue::DictStrString(
            decode_dict_str_string(payload)?.to_pairs()?,
        )),
        ValueType::DictStrBytes => Ok(TypedValue::DictStrBytes(
            decode_dict_str_bytes(payload)?.to_pairs()?,
        )),
        ValueType::DictStrFloatVector => Ok(TypedValue::DictStrFloatVector(
            decode_dict_str_float_vector(payload)?.to_pairs()?,
        )),
        ValueType::DictStrFloatMatrix => Ok(TypedValue::DictStrFloatMatrix(
            decode_dict_str_float_matrix(payload)?.to_pairs()?,
        )),
        ValueType::DictStrStringVector => Ok(TypedValue::DictStrStringVector(
            decode_dict_str_string_vector(payload)?.to_pairs()?,
        )),
        ValueType::Object => {
            let view = ObjectView::parse(payload)?;
            let mut fields = Vec::with_capacity(view.count());
            for i in 0..view.count() {
                let name = std::str::from_utf8(view.name(i)?)
                    .map_err(|_| ShmError::InvalidParam("object field name is not utf-8"))?
                    .to_owned();
                let field = view.field(i)?;
                fields.push((name, TypedValue::decode(field.tag, field.payload)?));
            }
            Ok(TypedValue::Object(fields))
        }
        ValueType::List => {
            let view = ListView::parse(payload)?;
            let mut items = Vec::with_capacity(view.count());
            for i in 0..view.count() {
                let elem = view.get(i)?;
                items.push(TypedValue::decode(elem.tag, elem.payload)?);
            }
            Ok(TypedValue::List(items))
        }
        ValueType::Unknown | ValueType::Complex => {
            Err(ShmError::InvalidParam("tag has no owned decoding"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{FloatMatrix, IntMatrix};

    fn round_trip(v: TypedValue) {
        let bytes = v.encode().expect("encode");
        let back = TypedValue::decode(v.value_type(), &bytes).expect("decode");
        assert_eq!(back, v);
    }

    #[test]
    fn scalar_round_trips() {
        round_trip(TypedValue::IntScalar(-42));
        round_trip(TypedValue::FloatScalar(3.5));
        round_trip(TypedValue::BoolScalar(true));
        round_trip(TypedValue::String("héllo".into()));
        round_trip(TypedValue::Bytes(vec![0, 255, 7]));
    }

    #[test]
    fn container_round_trips() {
        round_trip(TypedValue::IntVector(vec![1, -2, i64::MAX]));
        round_trip(TypedValue::FloatVector(vec![0.0, -1.5]));
        round_trip(TypedValue::BoolVector(vec![true, false, true]));
        round_trip(TypedValue::IntMatrix(
            IntMatrix::new(2, 3, vec![1, 2, 3, 4, 5, 6]).unwrap(),
        ));
        round_trip(TypedValue::FloatMatrix(
            FloatMatrix::new(1, 2, vec![1.0, 2.0]).unwrap(),
        ));
        round_trip(TypedValue::StringVector(vec!["b".into(), "a".into()]));
    }

    #[test]
    fn set_round_trips_normalize() {
        let v = TypedValue::IntSet(vec![3, 1, 2, 1, 3]);
        let bytes = v.encode().unwrap();
        assert_eq!(
            TypedValue::decode(ValueType::IntSet, &bytes).unwrap(),
            TypedValue::IntSet(vec![1, 2, 3])
        );

        let v = TypedValue::StringSet(vec!["b".into(), "a".into(), "b".into()]);
        let bytes = v.encode().unwrap();
        assert_eq!(
            TypedValue::decode(ValueType::StringSet, &bytes).unwrap(),
            TypedValue::StringSet(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn dict_round_trips_sorted() {
        let v = TypedValue::DictStrInt(vec![("b".into(), 2), ("a".into(), 1)]);
        let bytes = v.encode().unwrap();
        assert_eq!(
            TypedValue::decode(ValueType::DictStrInt, &bytes).unwrap(),
            TypedValue::DictStrInt(vec![("a".into(), 1), ("b".into(), 2)])
        );
    }

    #[test]
    fn nested_tree_round_trips() {
        round_trip(TypedValue::Object(vec![
            ("a".into(), TypedValue::String("hi".into())),
            (
                "b".into(),
                TypedValue::List(vec![
                    TypedValue::Null,
                    TypedValue::IntScalar(7),
                    TypedValue::Object(vec![("x".into(), TypedValue::FloatVector(vec![1.0]))]),
                ]),
            ),
        ]));
    }

    #[test]
    fn unknown_has_no_owned_decoding() {
        assert!(decode_value(ValueType::Unknown, b"abc").is_err());
    }
}
