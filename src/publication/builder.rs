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


//! Publication builder
//!
//! Parses the package manifest for the sniffed format, binds every resource
//! to an encryption profile and assembles the `Publication`. Anything the
//! reader could not decrypt is rejected here rather than at first read.

use super::{epub, manifest, EncryptionProfile, Format, Link, Metadata, Publication};
use crate::config::LcpConfig;
use crate::container::{Container, EntryCompression};
use crate::crypto::{CipherAlgorithm, DecryptionContext, BASIC_PROFILE};
use crate::error::{LcpError, Result};
use crate::license::License;
use tracing::{debug, info};

/// Encryption scheme identifier of LCP in RWPM `properties.encrypted`
pub const LCP_SCHEME: &str = "http://readium.org/2014/11/lcp";

/// A manifest entry before profile binding
#[derive(Debug, Clone, Default)]
pub struct LinkDraft {
    pub href: String,
    pub media_type: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub encryption: Option<EncryptionDecl>,
}

/// Encryption as declared by the manifest, not yet validated
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncryptionDecl {
    pub scheme: Option<String>,
    pub profile: Option<String>,
    pub algorithm: String,
    pub original_length: Option<u64>,
    /// `deflate`, `none` or absent
    pub compression: Option<String>,
}

/// Manifest content shared by the RWPM and EPUB parsers
#[derive(Debug, Clone, Default)]
pub struct ParsedManifest {
    pub metadata: Metadata,
    pub reading_order: Vec<LinkDraft>,
    pub resources: Vec<LinkDraft>,
}

/// Build the publication for an authenticated package
///
/// # Errors
/// - `ManifestInvalid` if the manifest is missing, malformed, or its reading
///   order names entries the package does not contain
/// - `UnsupportedEncryptionProfile` if any resource uses a scheme, algorithm
///   or compression the reader cannot undo
pub fn build(
    container: Container,
    context: DecryptionContext,
    license: License,
    format: Format,
    config: &LcpConfig,
) -> Result<Publication> {
    let parsed = match format {
        Format::Epub => epub::parse(&container)?,
        Format::Audiobook | Format::Pdf | Format::WebPub => manifest::parse(&container)?,
    };

    if parsed.reading_order.is_empty() {
        return Err(LcpError::invalid_manifest("reading order is empty"));
    }

    let mut reading_order = Vec::with_capacity(parsed.reading_order.len());
    for draft in parsed.reading_order {
        if !container.contains(&draft.href) {
            return Err(LcpError::invalid_manifest(format!(
                "reading order entry '{}' is not in the package",
                draft.href
            )));
        }
        reading_order.push(bind_link(&container, draft)?);
    }

    let mut resources = Vec::with_capacity(parsed.resources.len());
    for draft in parsed.resources {
        resources.push(bind_link(&container, draft)?);
    }

    let mut metadata = parsed.metadata;
    if metadata.duration.is_none() {
        let durations: Option<Vec<f64>> = reading_order.iter().map(|l| l.duration).collect();
        metadata.duration = durations.map(|d| d.iter().sum());
    }

    info!(
        license_id = %license.id(),
        format = %format,
        reading_order = reading_order.len(),
        resources = resources.len(),
        "publication built"
    );

    Ok(Publication::new(
        metadata,
        format,
        reading_order,
        resources,
        license,
        container,
        context,
        config.aligned_chunk_window(),
    ))
}

fn bind_link(container: &Container, draft: LinkDraft) -> Result<Link> {
    let encryption = match &draft.encryption {
        Some(decl) => bind_profile(&draft.href, decl)?,
        None => EncryptionProfile::Clear,
    };

    let entry = container.entry(&draft.href);
    if let Some(entry) = entry {
        match (&entry.compression, encryption) {
            (EntryCompression::Unsupported(method), _) => {
                return Err(LcpError::UnsupportedFormat(format!(
                    "'{}' uses unsupported ZIP compression {}",
                    draft.href, method
                )))
            }
            (EntryCompression::Deflated, EncryptionProfile::Lcp { .. }) => {
                return Err(LcpError::unsupported_profile(
                    &draft.href,
                    "encrypted entries must be stored without ZIP compression",
                ))
            }
            _ => {}
        }
    }

    let length = match encryption {
        EncryptionProfile::Clear => entry.map(|e| e.uncompressed_length),
        EncryptionProfile::Lcp { original_length, .. } => original_length,
    };

    debug!(href = %draft.href, encrypted = encryption.is_encrypted(), ?length, "bound resource");
    Ok(Link {
        href: draft.href,
        media_type: draft.media_type,
        title: draft.title,
        duration: draft.duration,
        length,
        encryption,
    })
}

/// Validate a declared encryption against what the reader supports
pub fn bind_profile(href: &str, decl: &EncryptionDecl) -> Result<EncryptionProfile> {
    match decl.scheme.as_deref() {
        Some(LCP_SCHEME) => {}
        Some(other) => {
            return Err(LcpError::unsupported_profile(href, format!("unknown encryption scheme {}", other)))
        }
        None => return Err(LcpError::unsupported_profile(href, "encryption scheme is missing")),
    }

    if let Some(profile) = decl.profile.as_deref() {
        if profile != BASIC_PROFILE {
            return Err(LcpError::unsupported_profile(href, format!("unknown LCP profile {}", profile)));
        }
    }

    let algorithm = CipherAlgorithm::from_uri(&decl.algorithm)
        .ok_or_else(|| LcpError::unsupported_profile(href, format!("unsupported algorithm {}", decl.algorithm)))?;

    let deflated = match decl.compression.as_deref() {
        None | Some("none") => false,
        Some("deflate") => true,
        Some(other) => {
            return Err(LcpError::unsupported_profile(href, format!("unsupported compression {}", other)))
        }
    };

    Ok(EncryptionProfile::Lcp {
        algorithm,
        original_length: decl.original_length,
        deflated,
    })
}

/// Normalize a manifest href into a container path
///
/// Drops any fragment or query, percent-decodes and strips the leading `/`.
pub(crate) fn normalize_href(href: &str) -> String {
    let path = href.split(['#', '?']).next().unwrap_or(href);
    let decoded = urlencoding::decode(path)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| path.to_string());
    decoded.trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AES256_CBC_ALGORITHM;

    fn lcp_decl() -> EncryptionDecl {
        EncryptionDecl {
            scheme: Some(LCP_SCHEME.to_string()),
            profile: Some(BASIC_PROFILE.to_string()),
            algorithm: AES256_CBC_ALGORITHM.to_string(),
            original_length: Some(1000),
            compression: None,
        }
    }

    #[test]
    fn test_bind_basic_profile() {
        let profile = bind_profile("a.mp3", &lcp_decl()).unwrap();
        assert_eq!(
            profile,
            EncryptionProfile::Lcp {
                algorithm: CipherAlgorithm::Aes256Cbc,
                original_length: Some(1000),
                deflated: false
            }
        );
    }

    #[test]
    fn test_bind_rejects_other_algorithms_and_schemes() {
        let mut decl = lcp_decl();
        decl.algorithm = "http://www.w3.org/2001/04/xmlenc#aes128-cbc".to_string();
        assert!(matches!(
            bind_profile("a.mp3", &decl),
            Err(LcpError::UnsupportedEncryptionProfile { .. })
        ));

        let mut decl = lcp_decl();
        decl.scheme = Some("http://www.idpf.org/2008/embedding".to_string());
        assert!(bind_profile("font.otf", &decl).is_err());

        let mut decl = lcp_decl();
        decl.compression = Some("brotli".to_string());
        assert!(bind_profile("a.html", &decl).is_err());
    }

    #[test]
    fn test_bind_deflate() {
        let mut decl = lcp_decl();
        decl.compression = Some("deflate".to_string());
        assert!(matches!(
            bind_profile("a.html", &decl).unwrap(),
            EncryptionProfile::Lcp { deflated: true, .. }
        ));
    }

    #[test]
    fn test_normalize_href() {
        assert_eq!(normalize_href("/audio/track%201.mp3#t=10"), "audio/track 1.mp3");
        assert_eq!(normalize_href("chapter.xhtml?x=1"), "chapter.xhtml");
    }
}
