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


//! EPUB package parsing
//!
//! `META-INF/container.xml` points at the OPF package document, which gives
//! the metadata, the manifest and the spine. `META-INF/encryption.xml` lists
//! the encrypted resources and how their keys are retrieved.

use super::builder::{bind_profile, normalize_href, EncryptionDecl, LinkDraft, ParsedManifest, LCP_SCHEME};
use super::Metadata;
use crate::container::Container;
use crate::error::{LcpError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{HashMap, HashSet};
use tracing::debug;

const CONTAINER_PATH: &str = "META-INF/container.xml";
const ENCRYPTION_PATH: &str = "META-INF/encryption.xml";

/// `RetrievalMethod` URI suffix pointing at the license's content key
const LCP_RETRIEVAL_FRAGMENT: &str = "license.lcpl#/encryption/content_key";

/// Obfuscation algorithms for embedded fonts
const FONT_OBFUSCATION: [&str; 2] = ["http://www.idpf.org/2008/embedding", "http://ns.adobe.com/pdf/enc#RC"];

/// Parse container.xml, the OPF and encryption.xml
pub fn parse(container: &Container) -> Result<ParsedManifest> {
    let container_xml = read_text(container, CONTAINER_PATH)?;
    let opf_path = rootfile_path(&container_xml)?;
    let opf_dir = match opf_path.rfind('/') {
        Some(i) => &opf_path[..i],
        None => "",
    };

    let opf = read_text(container, &opf_path)?;
    let package = parse_opf(&opf, opf_dir)?;

    let encryption = if container.contains(ENCRYPTION_PATH) {
        parse_encryption(&read_text(container, ENCRYPTION_PATH)?)?
    } else {
        HashMap::new()
    };
    for (href, decl) in &encryption {
        bind_profile(href, decl)?;
    }
    debug!(opf = %opf_path, items = package.items.len(), encrypted = encryption.len(), "parsed EPUB package");

    let by_id: HashMap<&str, &ManifestItem> = package.items.iter().map(|i| (i.id.as_str(), i)).collect();
    let draft = |item: &ManifestItem| LinkDraft {
        href: item.href.clone(),
        media_type: item.media_type.clone(),
        title: None,
        duration: None,
        encryption: encryption.get(&item.href).cloned(),
    };

    let mut in_spine = HashSet::new();
    let mut reading_order = Vec::with_capacity(package.spine.len());
    for idref in &package.spine {
        let item: &ManifestItem = by_id
            .get(idref.as_str())
            .copied()
            .ok_or_else(|| LcpError::invalid_manifest(format!("spine references unknown item '{}'", idref)))?;
        in_spine.insert(item.id.as_str());
        reading_order.push(draft(item));
    }
    let resources = package
        .items
        .iter()
        .filter(|i| !in_spine.contains(i.id.as_str()))
        .map(draft)
        .collect();

    Ok(ParsedManifest {
        metadata: package.metadata,
        reading_order,
        resources,
    })
}

fn read_text(container: &Container, href: &str) -> Result<String> {
    let bytes = match container.read_entry(href) {
        Ok(bytes) => bytes,
        Err(LcpError::EntryNotFound(_)) => return Err(LcpError::invalid_manifest(format!("missing {}", href))),
        Err(e) => return Err(e),
    };
    let text = String::from_utf8(bytes).map_err(|_| LcpError::invalid_manifest(format!("{} is not UTF-8", href)))?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

fn xml_error(file: &str, err: impl std::fmt::Display) -> LcpError {
    LcpError::invalid_manifest(format!("{}: {}", file, err))
}

fn attribute(e: &BytesStart<'_>, name: &[u8], file: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| xml_error(file, err))?;
        if attr.key.local_name().as_ref() == name {
            let value = attr.unescape_value().map_err(|err| xml_error(file, err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// `full-path` of the first rootfile
fn rootfile_path(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event().map_err(|e| xml_error(CONTAINER_PATH, e))? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                if let Some(path) = attribute(&e, b"full-path", CONTAINER_PATH)? {
                    return Ok(normalize_href(&path));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Err(LcpError::invalid_manifest("container.xml has no rootfile"))
}

#[derive(Debug, Clone)]
struct ManifestItem {
    id: String,
    href: String,
    media_type: Option<String>,
}

#[derive(Debug, Default)]
struct OpfPackage {
    metadata: Metadata,
    items: Vec<ManifestItem>,
    spine: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DcField {
    Title,
    Creator,
    Identifier,
    Language,
}

fn parse_opf(xml: &str, opf_dir: &str) -> Result<OpfPackage> {
    const FILE: &str = "package document";
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut package = OpfPackage::default();
    let mut unique_id: Option<String> = None;
    let mut identifiers: Vec<(Option<String>, String)> = Vec::new();
    let mut in_metadata = false;
    let mut capture: Option<(DcField, Option<String>, String)> = None;

    loop {
        match reader.read_event().map_err(|e| xml_error(FILE, e))? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"package" => unique_id = attribute(&e, b"unique-identifier", FILE)?,
                b"metadata" => in_metadata = true,
                b"item" | b"itemref" => push_manifest_entry(&e, &mut package, opf_dir)?,
                name if in_metadata => {
                    let field = match name {
                        b"title" => Some(DcField::Title),
                        b"creator" => Some(DcField::Creator),
                        b"identifier" => Some(DcField::Identifier),
                        b"language" => Some(DcField::Language),
                        _ => None,
                    };
                    if let Some(field) = field {
                        capture = Some((field, attribute(&e, b"id", FILE)?, String::new()));
                    }
                }
                _ => {}
            },
            Event::Empty(e) => push_manifest_entry(&e, &mut package, opf_dir)?,
            Event::Text(t) => {
                if let Some((_, _, text)) = capture.as_mut() {
                    text.push_str(&t.unescape().map_err(|e| xml_error(FILE, e))?);
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"metadata" {
                    in_metadata = false;
                }
                if let Some((field, id, text)) = capture.take() {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        let meta = &mut package.metadata;
                        match field {
                            DcField::Title if meta.title.is_none() => meta.title = Some(text),
                            DcField::Creator => meta.authors.push(text),
                            DcField::Identifier => identifiers.push((id, text)),
                            DcField::Language if meta.language.is_none() => meta.language = Some(text),
                            _ => {}
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    package.metadata.identifier = identifiers
        .iter()
        .find(|(id, _)| id.is_some() && *id == unique_id)
        .or_else(|| identifiers.first())
        .map(|(_, value)| value.clone());

    Ok(package)
}

/// Record a manifest `item` or spine `itemref`; other elements are ignored
fn push_manifest_entry(e: &BytesStart<'_>, package: &mut OpfPackage, opf_dir: &str) -> Result<()> {
    const FILE: &str = "package document";
    match e.local_name().as_ref() {
        b"item" => {
            let id = attribute(e, b"id", FILE)?.unwrap_or_default();
            let href = attribute(e, b"href", FILE)?
                .ok_or_else(|| LcpError::invalid_manifest(format!("manifest item '{}' has no href", id)))?;
            package.items.push(ManifestItem {
                id,
                href: resolve_href(opf_dir, &href),
                media_type: attribute(e, b"media-type", FILE)?,
            });
        }
        b"itemref" => {
            if let Some(idref) = attribute(e, b"idref", FILE)? {
                package.spine.push(idref);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Map of resource path → declared encryption
fn parse_encryption(xml: &str) -> Result<HashMap<String, EncryptionDecl>> {
    const FILE: &str = ENCRYPTION_PATH;
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = HashMap::new();
    let mut current: Option<(Option<String>, EncryptionDecl, Option<String>)> = None;

    loop {
        let event = reader.read_event().map_err(|e| xml_error(FILE, e))?;
        let (element, is_end) = match &event {
            Event::Start(e) | Event::Empty(e) => (Some(e.clone()), false),
            Event::End(e) if e.local_name().as_ref() == b"EncryptedData" => (None, true),
            Event::Eof => break,
            _ => (None, false),
        };

        if is_end {
            if let Some((Some(uri), mut decl, retrieval)) = current.take() {
                if FONT_OBFUSCATION.contains(&decl.algorithm.as_str()) {
                    return Err(LcpError::unsupported_profile(&uri, "font obfuscation is not supported"));
                }
                decl.scheme = retrieval.map(|r| {
                    if r.ends_with(LCP_RETRIEVAL_FRAGMENT) {
                        LCP_SCHEME.to_string()
                    } else {
                        r
                    }
                });
                entries.insert(uri, decl);
            }
            continue;
        }

        let Some(e) = element else { continue };
        match e.local_name().as_ref() {
            b"EncryptedData" => current = Some((None, EncryptionDecl::default(), None)),
            b"EncryptionMethod" => {
                if let Some((_, decl, _)) = current.as_mut() {
                    decl.algorithm = attribute(&e, b"Algorithm", FILE)?.unwrap_or_default();
                }
            }
            b"RetrievalMethod" => {
                if let Some((_, _, retrieval)) = current.as_mut() {
                    *retrieval = attribute(&e, b"URI", FILE)?;
                }
            }
            b"CipherReference" => {
                if let Some((uri, _, _)) = current.as_mut() {
                    *uri = attribute(&e, b"URI", FILE)?.map(|u| normalize_href(&u));
                }
            }
            b"Compression" => {
                if let Some((_, decl, _)) = current.as_mut() {
                    decl.compression = attribute(&e, b"Method", FILE)?.map(|m| match m.as_str() {
                        "8" => "deflate".to_string(),
                        "0" => "none".to_string(),
                        other => format!("zip method {}", other),
                    });
                    decl.original_length = match attribute(&e, b"OriginalLength", FILE)? {
                        Some(len) => Some(len.trim().parse().map_err(|_| {
                            LcpError::invalid_manifest(format!("bad OriginalLength '{}' in encryption.xml", len))
                        })?),
                        None => None,
                    };
                }
            }
            _ => {}
        }
    }
    Ok(entries)
}

/// Resolve an OPF-relative href to a container path
fn resolve_href(base_dir: &str, href: &str) -> String {
    let relative = normalize_href(href);
    let mut segments: Vec<&str> = if href.starts_with('/') || base_dir.is_empty() {
        Vec::new()
    } else {
        base_dir.split('/').filter(|s| !s.is_empty()).collect()
    };
    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AES256_CBC_ALGORITHM;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="isbn">urn:isbn:123</dc:identifier>
    <dc:identifier id="uid">urn:uuid:abc</dc:identifier>
    <dc:title>Moby &amp; Dick</dc:title>
    <dc:creator>Herman Melville</dc:creator>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="c1" href="text/chapter%201.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="text/chapter2.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="../styles/main.css" media-type="text/css"/>
  </manifest>
  <spine>
    <itemref idref="c2"/>
    <itemref idref="c1"/>
  </spine>
</package>"#;

    #[test]
    fn test_parse_opf() {
        let package = parse_opf(OPF, "OEBPS").unwrap();
        assert_eq!(package.metadata.title.as_deref(), Some("Moby & Dick"));
        assert_eq!(package.metadata.authors, vec!["Herman Melville"]);
        assert_eq!(package.metadata.identifier.as_deref(), Some("urn:uuid:abc"));
        assert_eq!(package.metadata.language.as_deref(), Some("en"));
        assert_eq!(package.spine, vec!["c2", "c1"]);
        assert_eq!(package.items[1].href, "OEBPS/text/chapter 1.xhtml");
        assert_eq!(package.items[3].href, "styles/main.css");
    }

    #[test]
    fn test_rootfile_path() {
        let xml = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;
        assert_eq!(rootfile_path(xml).unwrap(), "OEBPS/content.opf");
        assert!(rootfile_path("<container/>").is_err());
    }

    #[test]
    fn test_parse_encryption_xml() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<encryption xmlns="urn:oasis:names:tc:opendocument:xmlns:container"
            xmlns:enc="http://www.w3.org/2001/04/xmlenc#"
            xmlns:ds="http://www.w3.org/2000/09/xmldsig#"
            xmlns:comp="http://www.idpf.org/2016/encryption#compression">
  <enc:EncryptedData>
    <enc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes256-cbc"/>
    <ds:KeyInfo><ds:RetrievalMethod URI="license.lcpl#/encryption/content_key" Type="http://readium.org/2014/11/lcp#EncryptedContentKey"/></ds:KeyInfo>
    <enc:CipherData><enc:CipherReference URI="OEBPS/text/chapter2.xhtml"/></enc:CipherData>
    <enc:EncryptionProperties><enc:EncryptionProperty>
      <comp:Compression Method="8" OriginalLength="4521"/>
    </enc:EncryptionProperty></enc:EncryptionProperties>
  </enc:EncryptedData>
</encryption>"#;
        let entries = parse_encryption(xml).unwrap();
        let decl = &entries["OEBPS/text/chapter2.xhtml"];
        assert_eq!(decl.algorithm, AES256_CBC_ALGORITHM);
        assert_eq!(decl.scheme.as_deref(), Some(LCP_SCHEME));
        assert_eq!(decl.compression.as_deref(), Some("deflate"));
        assert_eq!(decl.original_length, Some(4521));
    }

    #[test]
    fn test_font_obfuscation_rejected() {
        let xml = r#"<encryption xmlns:enc="http://www.w3.org/2001/04/xmlenc#">
  <enc:EncryptedData>
    <enc:EncryptionMethod Algorithm="http://www.idpf.org/2008/embedding"/>
    <enc:CipherData><enc:CipherReference URI="fonts/a.otf"/></enc:CipherData>
  </enc:EncryptedData>
</encryption>"#;
        assert!(matches!(
            parse_encryption(xml),
            Err(LcpError::UnsupportedEncryptionProfile { .. })
        ));
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(resolve_href("", "a.xhtml"), "a.xhtml");
        assert_eq!(resolve_href("OEBPS/text", "../img/c.png"), "OEBPS/img/c.png");
        assert_eq!(resolve_href("OEBPS", "./x.css"), "OEBPS/x.css");
    }
}
