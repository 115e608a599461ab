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


//! License document model
//!
//! The JSON shape follows the LCP license document: `encryption`, `links`,
//! `rights`, `user`, `signature`. The optional top-level `status` carries the
//! last known status-document state when the host merged it in.

use crate::crypto::BLOCK_SIZE;
use crate::error::{LcpError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Link relation of the package download
pub const PUBLICATION_REL: &str = "publication";

/// Link relation of the passphrase hint page
pub const HINT_REL: &str = "hint";

/// Link relation of the license status document
pub const STATUS_REL: &str = "status";

/// License status as reported by the status document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Ready,
    Active,
    Revoked,
    Expired,
    Returned,
    Cancelled,
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LicenseStatus::Ready => "ready",
            LicenseStatus::Active => "active",
            LicenseStatus::Revoked => "revoked",
            LicenseStatus::Expired => "expired",
            LicenseStatus::Returned => "returned",
            LicenseStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentKeyInfo {
    pub algorithm: String,
    pub encrypted_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserKeyInfo {
    pub algorithm: String,
    #[serde(default)]
    pub text_hint: String,
    pub key_check: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionInfo {
    pub profile: String,
    pub content_key: ContentKeyInfo,
    pub user_key: UserKeyInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseLink {
    pub rel: String,
    pub href: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    /// Base64 SHA-256 of the linked resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Rights summary; only `start`/`end` take part in the usability check
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rights {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub algorithm: String,
    #[serde(default)]
    pub certificate: String,
    pub value: String,
}

/// Raw license document as it appears on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseDocument {
    pub id: String,
    pub issued: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    pub provider: String,
    pub encryption: EncryptionInfo,
    #[serde(default)]
    pub links: Vec<LicenseLink>,
    #[serde(default)]
    pub rights: Rights,
    #[serde(default)]
    pub user: UserInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LicenseStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureInfo>,
}

/// A structurally valid license
///
/// Only `license::validate` produces one, so holding a `License` means the
/// profile, algorithms, base64 fields and status have all been checked.
#[derive(Debug, Clone)]
pub struct License {
    document: LicenseDocument,
    key_check: Vec<u8>,
    encrypted_content_key: Vec<u8>,
    raw: Vec<u8>,
}

impl License {
    pub(crate) fn new(document: LicenseDocument, raw: Vec<u8>) -> Result<Self> {
        let key_check = decode_blocks("encryption.user_key.key_check", &document.encryption.user_key.key_check)?;
        let encrypted_content_key = decode_blocks(
            "encryption.content_key.encrypted_value",
            &document.encryption.content_key.encrypted_value,
        )?;
        Ok(Self {
            document,
            key_check,
            encrypted_content_key,
            raw,
        })
    }

    pub fn id(&self) -> &str {
        &self.document.id
    }

    pub fn provider(&self) -> &str {
        &self.document.provider
    }

    pub fn issued(&self) -> DateTime<Utc> {
        self.document.issued
    }

    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.document.updated
    }

    /// Status; a license without status information counts as active
    pub fn status(&self) -> LicenseStatus {
        self.document.status.unwrap_or(LicenseStatus::Active)
    }

    pub fn rights(&self) -> &Rights {
        &self.document.rights
    }

    pub fn user(&self) -> &UserInfo {
        &self.document.user
    }

    pub fn links(&self) -> &[LicenseLink] {
        &self.document.links
    }

    pub fn link(&self, rel: &str) -> Option<&LicenseLink> {
        self.document.links.iter().find(|l| l.rel == rel)
    }

    pub fn publication_link(&self) -> Option<&LicenseLink> {
        self.link(PUBLICATION_REL)
    }

    pub fn hint_link(&self) -> Option<&LicenseLink> {
        self.link(HINT_REL)
    }

    pub fn status_link(&self) -> Option<&LicenseLink> {
        self.link(STATUS_REL)
    }

    /// Passphrase hint shown when prompting the user
    pub fn text_hint(&self) -> &str {
        &self.document.encryption.user_key.text_hint
    }

    pub fn profile(&self) -> &str {
        &self.document.encryption.profile
    }

    pub fn content_key_algorithm(&self) -> &str {
        &self.document.encryption.content_key.algorithm
    }

    pub(crate) fn key_check(&self) -> &[u8] {
        &self.key_check
    }

    pub(crate) fn encrypted_content_key(&self) -> &[u8] {
        &self.encrypted_content_key
    }

    pub fn signature(&self) -> Option<&SignatureInfo> {
        self.document.signature.as_ref()
    }

    pub fn document(&self) -> &LicenseDocument {
        &self.document
    }

    /// The license bytes exactly as received
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// Decode a base64 field that must hold an IV plus at least one cipher block
fn decode_blocks(field: &str, value: &str) -> Result<Vec<u8>> {
    let bytes = BASE64
        .decode(value.trim())
        .map_err(|e| LcpError::invalid_license(format!("{} is not valid base64: {}", field, e)))?;
    if bytes.len() < 2 * BLOCK_SIZE || bytes.len() % BLOCK_SIZE != 0 {
        return Err(LcpError::invalid_license(format!(
            "{} must be whole {}-byte cipher blocks with an IV, got {} bytes",
            field,
            BLOCK_SIZE,
            bytes.len()
        )));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parses_lowercase() {
        let status: LicenseStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(status, LicenseStatus::Cancelled);
        assert_eq!(status.to_string(), "cancelled");
    }

    #[test]
    fn test_decode_blocks_rejects_partial_block() {
        let short = BASE64.encode([0u8; 40]);
        assert!(matches!(
            decode_blocks("key_check", &short),
            Err(LcpError::LicenseInvalid(_))
        ));
        assert!(decode_blocks("key_check", &BASE64.encode([0u8; 48])).is_ok());
        assert!(decode_blocks("key_check", "***").is_err());
    }
}
