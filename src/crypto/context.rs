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


//! Decryption context handed out by a successful authentication
//!
//! A context is a value: the content key is copied in at authentication time
//! and never looked up again, so clearing the passphrase cache cannot pull the
//! key out from under an open publication.

use super::block::decrypt_blocks_in_place;
use super::keys::ContentKey;
use super::{CipherError, AES256_CBC_ALGORITHM, BLOCK_SIZE};

/// Resource cipher supported by the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgorithm {
    Aes256Cbc,
}

impl CipherAlgorithm {
    /// Map an XML-ENC algorithm URI to a supported cipher
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            AES256_CBC_ALGORITHM => Some(Self::Aes256Cbc),
            _ => None,
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Self::Aes256Cbc => AES256_CBC_ALGORITHM,
        }
    }

    pub fn block_size(&self) -> usize {
        match self {
            Self::Aes256Cbc => BLOCK_SIZE,
        }
    }
}

/// Immutable key material for one publication
#[derive(Debug, Clone)]
pub struct DecryptionContext {
    license_id: String,
    content_key: ContentKey,
    algorithm: CipherAlgorithm,
}

impl DecryptionContext {
    pub fn new(license_id: impl Into<String>, content_key: ContentKey, algorithm: CipherAlgorithm) -> Self {
        Self {
            license_id: license_id.into(),
            content_key,
            algorithm,
        }
    }

    pub fn license_id(&self) -> &str {
        &self.license_id
    }

    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    pub fn block_size(&self) -> usize {
        self.algorithm.block_size()
    }

    /// Decrypt whole ciphertext blocks in place
    ///
    /// `iv` is the ciphertext block immediately preceding `blocks` in the
    /// resource (the resource IV when `blocks` starts at block 0). Padding is
    /// left in place for the caller to inspect.
    pub fn decrypt_blocks(&self, iv: &[u8], blocks: &mut [u8]) -> Result<(), CipherError> {
        match self.algorithm {
            CipherAlgorithm::Aes256Cbc => decrypt_blocks_in_place(self.content_key.as_bytes(), iv, blocks),
        }
    }

    /// Allocating form of `decrypt_blocks`
    pub fn decrypt_chunk(&self, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut plain = ciphertext.to_vec();
        self.decrypt_blocks(iv, &mut plain)?;
        Ok(plain)
    }
}
