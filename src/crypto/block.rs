// LCP Core - Readium LCP package reader
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! AES-256-CBC block primitives
//!
//! Thin wrappers over the `aes` + `cbc` crates. Nothing in here allocates
//! except the small padded-message helper used for license fields.

use super::{CipherError, BLOCK_SIZE, KEY_SIZE};
use ::cbc::cipher::block_padding::{NoPadding, Pkcs7};
use ::cbc::cipher::{BlockDecryptMut, KeyIvInit};
use aes::Aes256;

type Aes256CbcDec = ::cbc::Decryptor<Aes256>;

/// Decrypt whole blocks in place, chaining from `iv`
///
/// `iv` is the ciphertext block preceding `blocks` (or the resource IV for
/// the first block). No padding is removed.
pub fn decrypt_blocks_in_place(
    key: &[u8; KEY_SIZE],
    iv: &[u8],
    blocks: &mut [u8],
) -> Result<(), CipherError> {
    if blocks.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::Misaligned(blocks.len()));
    }
    let decryptor =
        Aes256CbcDec::new_from_slices(key, iv).map_err(|_| CipherError::InvalidLength)?;
    decryptor
        .decrypt_padded_mut::<NoPadding>(blocks)
        .map_err(|_| CipherError::BadPadding)?;
    Ok(())
}

/// Decrypt an IV-prefixed, PKCS#7-padded message (key check, content key)
pub fn decrypt_padded_message(key: &[u8; KEY_SIZE], data: &[u8]) -> Result<Vec<u8>, CipherError> {
    if data.len() < 2 * BLOCK_SIZE || data.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::Misaligned(data.len()));
    }
    let (iv, ciphertext) = data.split_at(BLOCK_SIZE);
    let decryptor =
        Aes256CbcDec::new_from_slices(key, iv).map_err(|_| CipherError::InvalidLength)?;
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CipherError::BadPadding)
}

/// Length of the PKCS#7 padding carried by a decrypted final block
pub fn padding_len(final_block: &[u8]) -> Result<usize, CipherError> {
    if final_block.len() != BLOCK_SIZE {
        return Err(CipherError::Misaligned(final_block.len()));
    }
    let pad = final_block[BLOCK_SIZE - 1] as usize;
    if pad == 0 || pad > BLOCK_SIZE {
        return Err(CipherError::BadPadding);
    }
    if final_block[BLOCK_SIZE - pad..].iter().any(|&b| b as usize != pad) {
        return Err(CipherError::BadPadding);
    }
    Ok(pad)
}

#[cfg(test)]
pub(crate) fn encrypt_padded_message(key: &[u8; KEY_SIZE], iv: &[u8; BLOCK_SIZE], plaintext: &[u8]) -> Vec<u8> {
    use ::cbc::cipher::BlockEncryptMut;
    let encryptor = ::cbc::Encryptor::<Aes256>::new(key.into(), iv.into());
    let mut out = iv.to_vec();
    out.extend(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext));
    out
}
