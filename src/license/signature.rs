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


//! License signature verification
//!
//! Providers sign the canonical form of the license: the JSON document with
//! the `signature` member removed, object keys sorted, no insignificant
//! whitespace. serde_json's default map is ordered, so re-serializing the
//! parsed `Value` yields exactly that form.

use super::document::SignatureInfo;
use crate::error::{LcpError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pkcs8::DecodePublicKey;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use serde_json::Value;
use sha2::Sha256;

/// XML-DSig identifier of RSA with SHA-256
pub const RSA_SHA256_ALGORITHM: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

/// Verifies license signatures against one trusted provider key
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    key: VerifyingKey<Sha256>,
}

impl SignatureVerifier {
    /// Load the provider's public key from PEM (SubjectPublicKeyInfo)
    pub fn from_pem(pem: &str) -> Result<Self> {
        let public = RsaPublicKey::from_public_key_pem(pem.trim())
            .map_err(|e| LcpError::InvalidConfiguration(format!("trusted provider key: {}", e)))?;
        Ok(Self::new(public))
    }

    pub fn new(public: RsaPublicKey) -> Self {
        Self {
            key: VerifyingKey::<Sha256>::new(public),
        }
    }

    /// Verify the signature carried by a parsed license JSON value
    pub fn verify(&self, license_json: &Value) -> Result<()> {
        let info: SignatureInfo = match license_json.get("signature") {
            Some(sig) => serde_json::from_value(sig.clone())
                .map_err(|e| LcpError::invalid_license(format!("malformed signature: {}", e)))?,
            None => return Err(LcpError::invalid_license("license is not signed")),
        };
        if info.algorithm != RSA_SHA256_ALGORITHM {
            return Err(LcpError::invalid_license(format!(
                "unsupported signature algorithm {}",
                info.algorithm
            )));
        }

        let value = BASE64
            .decode(info.value.trim())
            .map_err(|e| LcpError::invalid_license(format!("signature is not valid base64: {}", e)))?;
        let signature = Signature::try_from(value.as_slice())
            .map_err(|_| LcpError::invalid_license("signature has the wrong size"))?;

        let message = canonical_bytes(license_json)?;
        self.key
            .verify(&message, &signature)
            .map_err(|_| LcpError::invalid_license("signature does not match the trusted provider key"))
    }
}

/// Canonical serialization of a license, without its signature
pub fn canonical_bytes(license_json: &Value) -> Result<Vec<u8>> {
    let mut unsigned = license_json.clone();
    if let Value::Object(map) = &mut unsigned {
        map.remove("signature");
    }
    Ok(serde_json::to_vec(&unsigned)?)
}
