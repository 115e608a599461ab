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


//! User and content keys
//!
//! Hashing contract: callers always hand us the clear passphrase and we hash
//! it here, once, with SHA-256 over its UTF-8 bytes. Pre-hashed passphrases
//! are never accepted, so a hash computed on one platform can never be
//! hashed a second time on another.

use super::block::decrypt_padded_message;
use super::{CipherError, KEY_SIZE};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 of a passphrase; the key that unlocks the license
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UserKey([u8; KEY_SIZE]);

impl UserKey {
    /// Derive the user key from a clear passphrase
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        Self(key)
    }

    /// Rebuild a user key from its hex form (passphrase store)
    pub fn from_hex(hex_key: &str) -> Option<Self> {
        let bytes = hex::decode(hex_key.trim()).ok()?;
        let key: [u8; KEY_SIZE] = bytes.try_into().ok()?;
        Some(Self(key))
    }

    /// Lowercase hex form, as persisted by the passphrase store
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Check the key against a license's key-check ciphertext
    ///
    /// The key is right iff the key check decrypts to the license id.
    pub fn unlocks(&self, key_check: &[u8], license_id: &str) -> bool {
        match decrypt_padded_message(&self.0, key_check) {
            Ok(plain) => plain == license_id.as_bytes(),
            Err(_) => false,
        }
    }

    /// Decrypt the license's encrypted content key
    pub fn unwrap_content_key(&self, encrypted_content_key: &[u8]) -> Result<ContentKey, CipherError> {
        let plain = decrypt_padded_message(&self.0, encrypted_content_key)?;
        let key: [u8; KEY_SIZE] = plain.try_into().map_err(|_| CipherError::InvalidLength)?;
        Ok(ContentKey(key))
    }
}

impl fmt::Debug for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UserKey(<redacted>)")
    }
}

/// Symmetric key that decrypts the package resources
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ContentKey([u8; KEY_SIZE]);

impl ContentKey {
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey(<redacted>)")
    }
}
