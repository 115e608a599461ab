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


//! Publication model
//!
//! A `Publication` owns the container, the decryption context and the
//! license. Readers borrow it, so none of them can outlive the key material
//! or the archive they read from.

pub mod builder;
pub mod epub;
pub mod format;
pub mod manifest;

pub use builder::build;
pub use format::{sniff, Format, FormatHints};

use crate::container::Container;
use crate::crypto::{CipherAlgorithm, DecryptionContext};
use crate::error::{LcpError, Result};
use crate::license::License;
use crate::resource::EncryptedResource;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// How a resource is protected inside the package
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EncryptionProfile {
    /// Stored in the clear
    Clear,
    /// LCP basic profile: IV-prefixed AES-256-CBC with PKCS#7 padding
    Lcp {
        algorithm: CipherAlgorithm,
        /// Plaintext length before encryption (after inflation when deflated)
        original_length: Option<u64>,
        /// Deflated before encryption
        deflated: bool,
    },
}

impl EncryptionProfile {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, EncryptionProfile::Lcp { .. })
    }
}

/// One resource of the publication
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// Path inside the package
    pub href: String,
    pub media_type: Option<String>,
    pub title: Option<String>,
    /// Duration in seconds (audio)
    pub duration: Option<f64>,
    /// Declared plaintext length; verified lazily while reading
    pub length: Option<u64>,
    pub encryption: EncryptionProfile,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub identifier: Option<String>,
    pub language: Option<String>,
    /// Total duration in seconds, declared or summed over the reading order
    pub duration: Option<f64>,
}

#[derive(Debug)]
pub struct Publication {
    metadata: Metadata,
    format: Format,
    reading_order: Vec<Link>,
    resources: Vec<Link>,
    license: License,
    container: Container,
    context: DecryptionContext,
    chunk_window: usize,
    open_resources: Mutex<HashSet<String>>,
}

impl Publication {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        metadata: Metadata,
        format: Format,
        reading_order: Vec<Link>,
        resources: Vec<Link>,
        license: License,
        container: Container,
        context: DecryptionContext,
        chunk_window: usize,
    ) -> Self {
        Self {
            metadata,
            format,
            reading_order,
            resources,
            license,
            container,
            context,
            chunk_window,
            open_resources: Mutex::new(HashSet::new()),
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Primary resources in manifest order
    pub fn reading_order(&self) -> &[Link] {
        &self.reading_order
    }

    /// Secondary resources (images, styles, cover art)
    pub fn resources(&self) -> &[Link] {
        &self.resources
    }

    pub fn license(&self) -> &License {
        &self.license
    }

    /// Find a link in the reading order or the resources
    pub fn link(&self, href: &str) -> Option<&Link> {
        let href = href.trim_start_matches('/');
        self.reading_order
            .iter()
            .chain(self.resources.iter())
            .find(|l| l.href == href)
    }

    /// A closed reader for `link`; call `open` on it to start reading
    pub fn open_resource(&self, link: &Link) -> EncryptedResource<'_> {
        EncryptedResource::new(self, link.clone())
    }

    /// `open_resource` by href
    pub fn resource(&self, href: &str) -> Result<EncryptedResource<'_>> {
        let link = self
            .link(href)
            .ok_or_else(|| LcpError::EntryNotFound(href.to_string()))?;
        Ok(self.open_resource(link))
    }

    pub fn chunk_window(&self) -> usize {
        self.chunk_window
    }

    pub(crate) fn container(&self) -> &Container {
        &self.container
    }

    pub(crate) fn context(&self) -> &DecryptionContext {
        &self.context
    }

    /// Mark `href` as open; fails if a reader already holds it
    pub(crate) fn claim(&self, href: &str) -> Result<()> {
        let mut open = self.open_resources.lock().unwrap_or_else(PoisonError::into_inner);
        if !open.insert(href.to_string()) {
            return Err(LcpError::AlreadyOpen(href.to_string()));
        }
        Ok(())
    }

    pub(crate) fn release(&self, href: &str) {
        let mut open = self.open_resources.lock().unwrap_or_else(PoisonError::into_inner);
        open.remove(href);
    }

    /// Number of resources currently open
    pub fn open_resource_count(&self) -> usize {
        self.open_resources.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
