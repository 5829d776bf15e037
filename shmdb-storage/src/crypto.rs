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

//! AES-128-ECB value envelope
//!
//! Stored form: `[plain_len:u32 LE][AES-128-ECB(plain, zero-padded to 16)]`,
//! written through the generic untyped insert so the node tag stays
//! `UNKNOWN` (the lookup side depends on that). ECB is cryptographically
//! weak (equal blocks leak equality); it is retained for layout
//! compatibility. Inserting is owner-gated, decrypting is authorized-gated.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use shmdb_core::{Result, ShmError};

use crate::store::Store;

const AES_BLOCK: usize = 16;

/// Encrypt with zero padding to a whole number of blocks. The ciphertext
/// length is exactly `align16(plain.len())`.
pub(crate) fn ecb_encrypt(key: &[u8; 16], plain: &[u8]) -> Vec<u8> {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let padded = (plain.len() + AES_BLOCK - 1) & !(AES_BLOCK - 1);
    let mut out = vec![0u8; padded];
    out[..plain.len()].copy_from_slice(plain);
    for block in out.chunks_exact_mut(AES_BLOCK) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    out
}

/// Decrypt a whole number of blocks; padding removal is the caller's job
/// via the stored plaintext length.
pub(crate) fn ecb_decrypt(key: &[u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() % AES_BLOCK != 0 {
        return Err(ShmError::InvalidParam(
            "ciphertext length is not a multiple of the AES block",
        ));
    }
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut out = data.to_vec();
    for block in out.chunks_exact_mut(AES_BLOCK) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }
    Ok(out)
}

impl Store {
    /// Insert `plain` encrypted under `aes_key`. Owner only.
    pub fn insert_encrypted(&self, key: &[u8], plain: &[u8], aes_key: &[u8; 16]) -> Result<()> {
        if !self.is_owner() {
            return Err(ShmError::PermissionDenied(
                "encrypted insert requires segment ownership",
            ));
        }
        let mut envelope = Vec::with_capacity(4 + plain.len() + AES_BLOCK);
        envelope.extend_from_slice(&(plain.len() as u32).to_le_bytes());
        envelope.extend_from_slice(&ecb_encrypt(aes_key, plain));
        self.insert(key, &envelope)
    }

    /// Fetch and decrypt a value stored by [`Store::insert_encrypted`].
    /// Owner or authorized PID only.
    pub fn lookup_decrypted(&self, key: &[u8], aes_key: &[u8; 16]) -> Result<Vec<u8>> {
        if !self.is_authorized() {
            return Err(ShmError::PermissionDenied(
                "decryption requires authorization",
            ));
        }
        let raw = self.lookup(key)?;
        if raw.len() < 4 {
            return Err(ShmError::InvalidParam("encrypted value too short"));
        }
        let plain_len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        let mut plain = ecb_decrypt(aes_key, &raw[4..])?;
        if plain_len > plain.len() {
            return Err(ShmError::InvalidParam("inconsistent encrypted length"));
        }
        plain.truncate(plain_len);
        Ok(plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = *b"0123456789abcdef";

    #[test]
    fn encrypt_pads_to_whole_blocks() {
        assert_eq!(ecb_encrypt(&KEY, b"").len(), 0);
        assert_eq!(ecb_encrypt(&KEY, b"x").len(), 16);
        assert_eq!(ecb_encrypt(&KEY, &[0u8; 16]).len(), 16);
        assert_eq!(ecb_encrypt(&KEY, &[0u8; 17]).len(), 32);
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        for len in [1usize, 5, 15, 16, 17, 64, 1000] {
            let plain: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let cipher = ecb_encrypt(&KEY, &plain);
            let mut back = ecb_decrypt(&KEY, &cipher).unwrap();
            back.truncate(len);
            assert_eq!(back, plain);
        }
    }

    #[test]
    fn ciphertext_differs_from_plaintext() {
        let plain = b"sixteen byte msg";
        let cipher = ecb_encrypt(&KEY, plain);
        assert_ne!(&cipher[..], &plain[..]);
    }

    #[test]
    fn ragged_ciphertext_is_rejected() {
        assert!(ecb_decrypt(&KEY, &[0u8; 15]).is_err());
        assert!(ecb_decrypt(&KEY, &[0u8; 17]).is_err());
    }
}
