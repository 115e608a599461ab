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


//! Asset resolution
//!
//! An asset is a package location plus its indexed container and sniffed
//! format. Resolving it touches only the ZIP directory; nothing is decrypted.

use crate::container::{ByteSource, Container, FileSource, MemorySource};
use crate::error::{LcpError, Result};
use crate::publication::{sniff, Format, FormatHints};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct Asset {
    location: String,
    format: Format,
    container: Container,
}

impl Asset {
    /// Open a package file
    ///
    /// The file extension is used as a hint when `hints` carries none.
    ///
    /// # Errors
    /// - `AssetNotFound` if the path does not exist or is not a file
    /// - `UnsupportedFormat` if the file is not a known package
    pub fn open<P: AsRef<Path>>(path: P, hints: FormatHints) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LcpError::AssetNotFound(path.display().to_string()));
        }

        let mut hints = hints;
        if hints.extension.is_none() {
            hints.extension = path.extension().map(|e| e.to_string_lossy().into_owned());
        }

        let source = FileSource::open(path)?;
        Self::from_source(path.display().to_string(), Arc::new(source), &hints)
    }

    /// Wrap a package already held in memory
    pub fn from_bytes(location: impl Into<String>, bytes: Vec<u8>, hints: FormatHints) -> Result<Self> {
        Self::from_source(location.into(), Arc::new(MemorySource::new(bytes)), &hints)
    }

    pub fn from_source(location: String, source: Arc<dyn ByteSource>, hints: &FormatHints) -> Result<Self> {
        let container = Container::open(source)?;
        let format = sniff(&container, hints)?;
        debug!(location = %location, format = %format, "asset resolved");
        Ok(Self {
            location,
            format,
            container,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn into_parts(self) -> (String, Format, Container) {
        (self.location, self.format, self.container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let result = Asset::open("/definitely/not/here.lcpa", FormatHints::default());
        assert!(matches!(result, Err(LcpError::AssetNotFound(_))));
    }

    #[test]
    fn test_not_a_package() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.lcpa");
        std::fs::write(&path, b"plain text, not a zip").unwrap();
        assert!(matches!(
            Asset::open(&path, FormatHints::default()),
            Err(LcpError::UnsupportedFormat(_))
        ));
    }
}
