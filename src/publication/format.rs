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


//! Package format sniffing

use crate::container::Container;
use crate::error::{LcpError, Result};
use std::fmt;

/// Kind of package behind an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// EPUB with LCP-encrypted resources (`.epub`)
    Epub,
    /// LCP-protected audiobook (`.lcpa`, `.lcpau`)
    Audiobook,
    /// LCP-protected PDF (`.lcpdf`)
    Pdf,
    /// Generic Readium Web Publication package
    WebPub,
}

impl Format {
    pub fn media_type(&self) -> &'static str {
        match self {
            Format::Epub => "application/epub+zip",
            Format::Audiobook => "application/audiobook+lcp",
            Format::Pdf => "application/pdf+lcp",
            Format::WebPub => "application/webpub+zip",
        }
    }

    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "application/epub+zip" => Some(Format::Epub),
            "application/audiobook+lcp" | "application/audiobook+zip" => Some(Format::Audiobook),
            "application/pdf+lcp" => Some(Format::Pdf),
            "application/webpub+zip" => Some(Format::WebPub),
            _ => None,
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "epub" => Some(Format::Epub),
            "lcpa" | "lcpau" | "audiobook" => Some(Format::Audiobook),
            "lcpdf" => Some(Format::Pdf),
            "webpub" => Some(Format::WebPub),
            _ => None,
        }
    }

    /// Whether the package is described by a Readium Web Publication manifest
    pub fn uses_rwpm(&self) -> bool {
        !matches!(self, Format::Epub)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Format::Epub => "EPUB",
            Format::Audiobook => "audiobook",
            Format::Pdf => "PDF",
            Format::WebPub => "web publication",
        };
        f.write_str(s)
    }
}

/// Caller-provided hints; checked against the container content
#[derive(Debug, Clone, Default)]
pub struct FormatHints {
    pub extension: Option<String>,
    pub media_type: Option<String>,
}

impl FormatHints {
    pub fn extension<S: Into<String>>(ext: S) -> Self {
        Self {
            extension: Some(ext.into()),
            media_type: None,
        }
    }

    pub fn media_type<S: Into<String>>(media_type: S) -> Self {
        Self {
            extension: None,
            media_type: Some(media_type.into()),
        }
    }
}

const RWPM_MANIFEST: &str = "manifest.json";
const EPUB_CONTAINER: &str = "META-INF/container.xml";

/// Determine the package format
///
/// Hints win when the container has the manifest their format needs;
/// otherwise the content decides.
pub fn sniff(container: &Container, hints: &FormatHints) -> Result<Format> {
    let hinted = hints
        .media_type
        .as_deref()
        .and_then(Format::from_media_type)
        .or_else(|| hints.extension.as_deref().and_then(Format::from_extension));

    if let Some(format) = hinted {
        if has_manifest_for(container, format) {
            return Ok(format);
        }
    }

    sniff_content(container)
}

fn has_manifest_for(container: &Container, format: Format) -> bool {
    if format.uses_rwpm() {
        container.contains(RWPM_MANIFEST)
    } else {
        container.contains(EPUB_CONTAINER)
    }
}

fn sniff_content(container: &Container) -> Result<Format> {
    if let Ok(mimetype) = container.read_entry("mimetype") {
        if String::from_utf8_lossy(&mimetype).trim() == Format::Epub.media_type() {
            return Ok(Format::Epub);
        }
    }
    if container.contains(EPUB_CONTAINER) {
        return Ok(Format::Epub);
    }

    if container.contains(RWPM_MANIFEST) {
        let bytes = container.read_entry(RWPM_MANIFEST)?;
        let manifest: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| LcpError::invalid_manifest(format!("manifest.json: {}", e)))?;
        return Ok(sniff_manifest(&manifest));
    }

    Err(LcpError::UnsupportedFormat(
        "package has neither manifest.json nor META-INF/container.xml".to_string(),
    ))
}

/// Classify an RWPM by its declared profile, then by its reading order
fn sniff_manifest(manifest: &serde_json::Value) -> Format {
    let metadata = &manifest["metadata"];
    let mut declared: Vec<&str> = Vec::new();
    match &metadata["conformsTo"] {
        serde_json::Value::String(s) => declared.push(s),
        serde_json::Value::Array(items) => declared.extend(items.iter().filter_map(|v| v.as_str())),
        _ => {}
    }
    if let Some(t) = metadata["@type"].as_str() {
        declared.push(t);
    }

    for profile in &declared {
        let profile = profile.to_ascii_lowercase();
        if profile.contains("audiobook") {
            return Format::Audiobook;
        }
        if profile.contains("pdf") {
            return Format::Pdf;
        }
    }

    let types: Vec<&str> = manifest["readingOrder"]
        .as_array()
        .map(|links| links.iter().filter_map(|l| l["type"].as_str()).collect())
        .unwrap_or_default();
    if !types.is_empty() && types.iter().all(|t| t.starts_with("audio/")) {
        Format::Audiobook
    } else if !types.is_empty() && types.iter().all(|t| *t == "application/pdf") {
        Format::Pdf
    } else {
        Format::WebPub
    }
}
