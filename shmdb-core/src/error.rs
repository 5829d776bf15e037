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

//! Error types for ShmDB
//!
//! Every error maps to a stable numeric code so the C ABI and other-language
//! consumers observe the same taxonomy regardless of which crate produced
//! the failure. Code 0 is reserved for success and never constructed here.

use thiserror::Error;

use crate::value::ValueType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShmError {
    #[error("key not found")]
    NotFound,

    #[error("no space left in segment: {0}")]
    NoSpace(&'static str),

    #[error("concurrent modification detected, caller may retry")]
    ConcurrentMod,

    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),

    #[error("segment open failed: {0}")]
    OpenFailed(String),

    #[error("permission denied: {0}")]
    PermissionDenied(&'static str),

    #[error("value type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        expected: ValueType,
        found: ValueType,
    },
}

impl ShmError {
    /// Numeric code reported across the C ABI. Success is 0.
    pub fn code(&self) -> u32 {
        match self {
            ShmError::NotFound => 1,
            ShmError::NoSpace(_) => 2,
            ShmError::ConcurrentMod => 3,
            ShmError::InvalidParam(_) => 4,
            ShmError::OpenFailed(_) => 5,
            ShmError::PermissionDenied(_) => 6,
            ShmError::TypeMismatch { .. } => 7,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ShmError::NotFound.code(), 1);
        assert_eq!(ShmError::NoSpace("nodes").code(), 2);
        assert_eq!(ShmError::ConcurrentMod.code(), 3);
        assert_eq!(ShmError::InvalidParam("key").code(), 4);
        assert_eq!(ShmError::OpenFailed("mmap".into()).code(), 5);
        assert_eq!(ShmError::PermissionDenied("owner only").code(), 6);
        assert_eq!(
            ShmError::TypeMismatch {
                expected: ValueType::IntScalar,
                found: ValueType::FloatScalar,
            }
            .code(),
            7
        );
    }
}
