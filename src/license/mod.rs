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


//! License validation and authentication building blocks
//!
//! `validate` turns raw bytes into a [`License`]; the service then turns a
//! `License` plus a passphrase into a `DecryptionContext`. Each stage is a
//! separate type, so a context can only exist for a license that passed
//! validation and a key check.

pub mod authenticator;
pub mod cache;
pub mod document;
pub mod signature;

pub use authenticator::{AuthenticationReason, Authenticator};
pub use cache::PassphraseCache;
pub use document::{License, LicenseDocument, LicenseLink, LicenseStatus, Rights};
pub use signature::SignatureVerifier;

use crate::crypto::{AES256_CBC_ALGORITHM, BASIC_PROFILE, SHA256_ALGORITHM};
use crate::error::{LcpError, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Validate a license document against the current time
pub fn validate(bytes: &[u8], verifier: Option<&SignatureVerifier>) -> Result<License> {
    validate_at(bytes, verifier, Utc::now())
}

/// Validate a license document
///
/// # Errors
/// - `LicenseInvalid` for malformed JSON, an unsupported profile or
///   algorithm, bad base64 fields, a failed signature check, or a revoked,
///   returned or cancelled status
/// - `LicenseExpired` when the status is expired or the rights end has passed
pub fn validate_at(bytes: &[u8], verifier: Option<&SignatureVerifier>, now: DateTime<Utc>) -> Result<License> {
    let json: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| LcpError::invalid_license(format!("not a JSON document: {}", e)))?;
    let document: LicenseDocument = serde_json::from_value(json.clone())
        .map_err(|e| LcpError::invalid_license(format!("missing or malformed field: {}", e)))?;

    if document.id.trim().is_empty() {
        return Err(LcpError::invalid_license("license id is empty"));
    }

    let encryption = &document.encryption;
    if encryption.profile != BASIC_PROFILE {
        return Err(LcpError::invalid_license(format!(
            "unsupported encryption profile {}",
            encryption.profile
        )));
    }
    if encryption.content_key.algorithm != AES256_CBC_ALGORITHM {
        return Err(LcpError::invalid_license(format!(
            "unsupported content key algorithm {}",
            encryption.content_key.algorithm
        )));
    }
    if encryption.user_key.algorithm != SHA256_ALGORITHM {
        return Err(LcpError::invalid_license(format!(
            "unsupported user key algorithm {}",
            encryption.user_key.algorithm
        )));
    }

    if let Some(verifier) = verifier {
        verifier.verify(&json)?;
        debug!(license_id = %document.id, "license signature verified");
    }

    let license = License::new(document, bytes.to_vec())?;
    check_status(&license, now)?;

    debug!(
        license_id = %license.id(),
        provider = %license.provider(),
        status = %license.status(),
        "license validated"
    );
    Ok(license)
}

fn check_status(license: &License, now: DateTime<Utc>) -> Result<()> {
    match license.status() {
        LicenseStatus::Expired => {
            return Err(LcpError::LicenseExpired {
                license_id: license.id().to_string(),
            })
        }
        status @ (LicenseStatus::Revoked | LicenseStatus::Returned | LicenseStatus::Cancelled) => {
            warn!(license_id = %license.id(), %status, "license is no longer valid");
            return Err(LcpError::invalid_license(format!("license status is {}", status)));
        }
        LicenseStatus::Ready | LicenseStatus::Active => {}
    }

    if let Some(end) = license.rights().end {
        if end < now {
            return Err(LcpError::LicenseExpired {
                license_id: license.id().to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::crypto::block::encrypt_padded_message;
    use crate::crypto::UserKey;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde_json::{json, Value};

    /// License JSON whose key check and content key open with `passphrase`
    pub fn license_json(id: &str, passphrase: &str, content_key: &[u8; 32]) -> Value {
        let user = UserKey::from_passphrase(passphrase);
        let key_check = encrypt_padded_message(user.as_bytes(), &[7u8; 16], id.as_bytes());
        let encrypted_key = encrypt_padded_message(user.as_bytes(), &[9u8; 16], content_key);
        json!({
            "id": id,
            "issued": "2024-01-01T00:00:00Z",
            "provider": "https://provider.example.org",
            "encryption": {
                "profile": crate::crypto::BASIC_PROFILE,
                "content_key": {
                    "algorithm": crate::crypto::AES256_CBC_ALGORITHM,
                    "encrypted_value": BASE64.encode(encrypted_key),
                },
                "user_key": {
                    "algorithm": crate::crypto::SHA256_ALGORITHM,
                    "text_hint": "the usual one",
                    "key_check": BASE64.encode(key_check),
                },
            },
            "links": [
                {"rel": "hint", "href": "https://provider.example.org/hint"}
            ],
            "rights": {"print": 10, "copy": 2048}
        })
    }
}
