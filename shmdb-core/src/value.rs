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

//! Value model: type tags and the owned tagged union
//!
//! Every stored value carries a one-byte type tag in its node record. The
//! tag is the single discriminator for all decode paths: readers dispatch
//! on it and reinterpret the payload bytes without any per-value schema.
//!
//! `TypedValue` is the owned counterpart used on the insert side and by
//! marshaling layers; it is a plain tagged union rather than a trait
//! hierarchy so encoders and decoders stay keyed on the tag alone.

use crate::error::{Result, ShmError};

/// Value type tags. The byte values are part of the segment format and
/// never change meaning once assigned.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Unknown = 0,
    IntScalar = 1,
    FloatScalar = 2,
    String = 3,
    IntVector = 4,
    FloatVector = 5,
    IntMatrix = 6,
    FloatMatrix = 7,
    IntSet = 8,
    FloatSet = 9,
    StringSet = 10,
    DictStrInt = 11,
    DictStrFloat = 12,
    StringVector = 13,
    Bytes = 14,
    DictStrString = 15,
    BoolScalar = 16,
    BoolVector = 17,
    Object = 18,
    List = 19,
    DictStrFloatVector = 20,
    DictStrFloatMatrix = 21,
    DictStrStringVector = 22,
    DictStrBool = 23,
    DictStrBytes = 24,
    Null = 25,
    /// Reserved for values that need an external structured codec.
    Complex = 99,
}

impl ValueType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Unknown),
            1 => Some(Self::IntScalar),
            2 => Some(Self::FloatScalar),
            3 => Some(Self::String),
            4 => Some(Self::IntVector),
            5 => Some(Self::FloatVector),
            6 => Some(Self::IntMatrix),
            7 => Some(Self::FloatMatrix),
            8 => Some(Self::IntSet),
            9 => Some(Self::FloatSet),
            10 => Some(Self::StringSet),
            11 => Some(Self::DictStrInt),
            12 => Some(Self::DictStrFloat),
            13 => Some(Self::StringVector),
            14 => Some(Self::Bytes),
            15 => Some(Self::DictStrString),
            16 => Some(Self::BoolScalar),
            17 => Some(Self::BoolVector),
            18 => Some(Self::Object),
            19 => Some(Self::List),
            20 => Some(Self::DictStrFloatVector),
            21 => Some(Self::DictStrFloatMatrix),
            22 => Some(Self::DictStrStringVector),
            23 => Some(Self::DictStrBool),
            24 => Some(Self::DictStrBytes),
            25 => Some(Self::Null),
            99 => Some(Self::Complex),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A row-major integer matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct IntMatrix {
    pub rows: u32,
    pub cols: u32,
    pub data: Vec<i64>,
}

impl IntMatrix {
    pub fn new(rows: u32, cols: u32, data: Vec<i64>) -> Result<Self> {
        if data.len() != rows as usize * cols as usize {
            return Err(ShmError::InvalidParam("matrix data length != rows*cols"));
        }
        Ok(Self { rows, cols, data })
    }
}

/// A row-major floating point matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatMatrix {
    pub rows: u32,
    pub cols: u32,
    pub data: Vec<f64>,
}

impl FloatMatrix {
    pub fn new(rows: u32, cols: u32, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows as usize * cols as usize {
            return Err(ShmError::InvalidParam("matrix data length != rows*cols"));
        }
        Ok(Self { rows, cols, data })
    }
}

/// Owned tagged value. Encoding a `TypedValue` yields exactly the payload
/// bytes the corresponding `insert_*` operation would write; decoding a
/// payload with its tag reconstructs it (sets and dictionaries come back
/// sorted and deduplicated).
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Null,
    IntScalar(i64),
    FloatScalar(f64),
    BoolScalar(bool),
    String(String),
    Bytes(Vec<u8>),
    IntVector(Vec<i64>),
    FloatVector(Vec<f64>),
    BoolVector(Vec<bool>),
    IntMatrix(IntMatrix),
    FloatMatrix(FloatMatrix),
    IntSet(Vec<i64>),
    FloatSet(Vec<f64>),
    StringSet(Vec<String>),
    StringVector(Vec<String>),
    DictStrInt(Vec<(String, i64)>),
    DictStrFloat(Vec<(String, f64)>),
    DictStrString(Vec<(String, String)>),
    DictStrBool(Vec<(String, bool)>),
    DictStrBytes(Vec<(String, Vec<u8>)>),
    DictStrFloatVector(Vec<(String, Vec<f64>)>),
    DictStrFloatMatrix(Vec<(String, FloatMatrix)>),
    DictStrStringVector(Vec<(String, Vec<String>)>),
    Object(Vec<(String, TypedValue)>),
    List(Vec<TypedValue>),
}

impl TypedValue {
    /// The tag this value encodes under.
    pub fn value_type(&self) -> ValueType {
        match self {
            TypedValue::Null => ValueType::Null,
            TypedValue::IntScalar(_) => ValueType::IntScalar,
            TypedValue::FloatScalar(_) => ValueType::FloatScalar,
            TypedValue::BoolScalar(_) => ValueType::BoolScalar,
            TypedValue::String(_) => ValueType::String,
            TypedValue::Bytes(_) => ValueType::Bytes,
            TypedValue::IntVector(_) => ValueType::IntVector,
            TypedValue::FloatVector(_) => ValueType::FloatVector,
            TypedValue::BoolVector(_) => ValueType::BoolVector,
            TypedValue::IntMatrix(_) => ValueType::IntMatrix,
            TypedValue::FloatMatrix(_) => ValueType::FloatMatrix,
            TypedValue::IntSet(_) => ValueType::IntSet,
            TypedValue::FloatSet(_) => ValueType::FloatSet,
            TypedValue::StringSet(_) => ValueType::StringSet,
            TypedValue::StringVector(_) => ValueType::StringVector,
            TypedValue::DictStrInt(_) => ValueType::DictStrInt,
            TypedValue::DictStrFloat(_) => ValueType::DictStrFloat,
            TypedValue::DictStrString(_) => ValueType::DictStrString,
            TypedValue::DictStrBool(_) => ValueType::DictStrBool,
            TypedValue::DictStrBytes(_) => ValueType::DictStrBytes,
            TypedValue::DictStrFloatVector(_) => ValueType::DictStrFloatVector,
            TypedValue::DictStrFloatMatrix(_) => ValueType::DictStrFloatMatrix,
            TypedValue::DictStrStringVector(_) => ValueType::DictStrStringVector,
            TypedValue::Object(_) => ValueType::Object,
            TypedValue::List(_) => ValueType::List,
        }
    }

    /// Encode into the wire payload for this value's tag.
    pub fn encode(&self) -> Result<Vec<u8>> {
        crate::codec::encode_value(self)
    }

    /// Decode a payload back into an owned value, dispatching on `tag`.
    pub fn decode(tag: ValueType, payload: &[u8]) -> Result<TypedValue> {
        crate::codec::decode_value(tag, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_bytes_round_trip() {
        for byte in (0u8..=25).chain(std::iter::once(99)) {
            let tag = ValueType::from_u8(byte).expect("assigned tag byte");
            assert_eq!(tag.as_u8(), byte);
        }
        assert_eq!(ValueType::from_u8(26), None);
        assert_eq!(ValueType::from_u8(98), None);
    }

    #[test]
    fn matrix_shape_is_validated() {
        assert!(IntMatrix::new(2, 2, vec![1, 2, 3]).is_err());
        assert!(FloatMatrix::new(2, 2, vec![1.0; 4]).is_ok());
    }

    #[test]
    fn value_reports_its_tag() {
        assert_eq!(
            TypedValue::IntScalar(7).value_type().as_u8(),
            ValueType::IntScalar as u8
        );
        assert_eq!(TypedValue::Null.value_type(), ValueType::Null);
        assert_eq!(
            TypedValue::List(vec![]).value_type(),
            ValueType::List
        );
    }
}
