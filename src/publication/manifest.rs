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


//! Readium Web Publication manifest (`manifest.json`)
//!
//! Used by audiobooks, PDFs and generic web publications.

use super::builder::{normalize_href, EncryptionDecl, LinkDraft, ParsedManifest};
use super::Metadata;
use crate::container::Container;
use crate::error::{LcpError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

const MANIFEST_PATH: &str = "manifest.json";

#[derive(Debug, Deserialize)]
struct RwpManifest {
    #[serde(default)]
    metadata: RwpMetadata,
    #[serde(default, rename = "readingOrder")]
    reading_order: Vec<RwpLink>,
    #[serde(default)]
    resources: Vec<RwpLink>,
}

#[derive(Debug, Default, Deserialize)]
struct RwpMetadata {
    title: Option<LocalizedString>,
    author: Option<OneOrMany<Contributor>>,
    identifier: Option<String>,
    language: Option<OneOrMany<String>>,
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LocalizedString {
    Plain(String),
    Localized(BTreeMap<String, String>),
}

impl LocalizedString {
    fn into_string(self) -> Option<String> {
        match self {
            LocalizedString::Plain(s) => Some(s),
            LocalizedString::Localized(map) => {
                let mut map = map;
                ["und", "en"]
                    .iter()
                    .find_map(|lang| map.remove(*lang))
                    .or_else(|| map.into_values().next())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Contributor {
    Name(String),
    Object { name: LocalizedString },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RwpLink {
    href: String,
    #[serde(rename = "type")]
    media_type: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    properties: RwpProperties,
}

#[derive(Debug, Default, Deserialize)]
struct RwpProperties {
    encrypted: Option<RwpEncrypted>,
}

#[derive(Debug, Deserialize)]
struct RwpEncrypted {
    scheme: Option<String>,
    profile: Option<String>,
    algorithm: String,
    #[serde(rename = "originalLength")]
    original_length: Option<u64>,
    compression: Option<String>,
}

/// Read and parse `manifest.json` from the container
pub fn parse(container: &Container) -> Result<ParsedManifest> {
    let bytes = match container.read_entry(MANIFEST_PATH) {
        Ok(bytes) => bytes,
        Err(LcpError::EntryNotFound(_)) => {
            return Err(LcpError::invalid_manifest("package has no manifest.json"))
        }
        Err(e) => return Err(e),
    };
    parse_bytes(&bytes)
}

pub fn parse_bytes(bytes: &[u8]) -> Result<ParsedManifest> {
    let manifest: RwpManifest =
        serde_json::from_slice(bytes).map_err(|e| LcpError::invalid_manifest(format!("manifest.json: {}", e)))?;

    let meta = manifest.metadata;
    let metadata = Metadata {
        title: meta.title.and_then(LocalizedString::into_string),
        authors: meta
            .author
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| match c {
                Contributor::Name(name) => Some(name),
                Contributor::Object { name } => name.into_string(),
            })
            .collect(),
        identifier: meta.identifier,
        language: meta.language.and_then(|l| l.into_vec().into_iter().next()),
        duration: meta.duration,
    };

    Ok(ParsedManifest {
        metadata,
        reading_order: manifest.reading_order.into_iter().map(into_draft).collect(),
        resources: manifest.resources.into_iter().map(into_draft).collect(),
    })
}

fn into_draft(link: RwpLink) -> LinkDraft {
    LinkDraft {
        href: normalize_href(&link.href),
        media_type: link.media_type,
        title: link.title,
        duration: link.duration,
        encryption: link.properties.encrypted.map(|e| EncryptionDecl {
            scheme: e.scheme,
            profile: e.profile,
            algorithm: e.algorithm,
            original_length: e.original_length,
            compression: e.compression,
        }),
    }
}
