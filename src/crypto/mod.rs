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


//! Cryptography for LCP-protected packages
//!
//! Everything here implements the LCP basic encryption profile:
//! - User key: SHA-256 over the UTF-8 bytes of the clear passphrase
//! - Key check: AES-256-CBC(user key) of the license id, IV prefixed
//! - Content key: AES-256-CBC(user key) of the 32-byte content key, IV prefixed
//! - Resources: AES-256-CBC(content key), 16-byte IV prefix, PKCS#7 padding
//!
//! The block-level primitives never pad or unpad on their own; the resource
//! reader decides where padding lives because it only ever sees windows of a
//! resource.

pub mod block;
pub mod context;
pub mod keys;

pub use context::{CipherAlgorithm, DecryptionContext};
pub use keys::{ContentKey, UserKey};

use thiserror::Error;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// AES-256 key size in bytes
pub const KEY_SIZE: usize = 32;

/// Encryption profile URI of the LCP basic profile
pub const BASIC_PROFILE: &str = "http://readium.org/lcp/basic-profile";

/// XML-ENC identifier of AES-256-CBC
pub const AES256_CBC_ALGORITHM: &str = "http://www.w3.org/2001/04/xmlenc#aes256-cbc";

/// XML-ENC identifier of SHA-256 (user key derivation)
pub const SHA256_ALGORITHM: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

/// Low-level cipher failures, mapped to `LcpError` by callers that know
/// which license or resource they were working on
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// Ciphertext length is not a whole number of blocks (or has no IV)
    #[error("ciphertext of {0} bytes is not block aligned")]
    Misaligned(usize),

    /// PKCS#7 padding did not check out
    #[error("invalid padding")]
    BadPadding,

    /// Key or IV has the wrong size
    #[error("invalid key or IV length")]
    InvalidLength,
}
