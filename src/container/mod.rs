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


//! Random-access reader over the package archive
//!
//! LCP packages are ZIP archives. The central directory is indexed once when
//! the container opens; after that every read is positional and goes straight
//! to the byte source, so there is no shared cursor to lock.
//!
//! Raw bytes of encrypted entries leave this module only through
//! `read_raw`/`read_raw_into`, which the resource reader feeds directly into
//! the decryption context.

pub mod source;

pub use source::{ByteSource, FileSource, MemorySource};

use crate::error::{LcpError, Result};
use flate2::read::DeflateDecoder;
use source::SourceCursor;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;
use zip::CompressionMethod;

/// ZIP local file header signature
const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;

/// Fixed part of a ZIP local file header
const LOCAL_HEADER_LEN: usize = 30;

/// Largest structural entry (manifest, OPF, license) read into memory whole
const MAX_STRUCTURAL_ENTRY: u64 = 8 * 1024 * 1024;

/// Paths where packagers embed the license document
const EMBEDDED_LICENSE_PATHS: [&str; 2] = ["META-INF/license.lcpl", "license.lcpl"];

/// How the archive stores an entry's bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryCompression {
    Stored,
    Deflated,
    /// Any other ZIP method; readable as raw bytes only
    Unsupported(String),
}

/// Location of one entry inside the archive
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub href: String,
    /// Absolute offset of the entry's first data byte
    pub data_offset: u64,
    /// Bytes stored in the archive (ciphertext for encrypted entries)
    pub raw_length: u64,
    /// Size after ZIP decompression
    pub uncompressed_length: u64,
    pub compression: EntryCompression,
}

/// Opaque handle returned by `open_entry`
///
/// Handles index into the container that issued them. A handle presented to
/// another container resolves to `EntryNotFound` when out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryHandle {
    index: usize,
}

/// Indexed package archive
#[derive(Debug)]
pub struct Container {
    source: Arc<dyn ByteSource>,
    entries: Vec<EntryInfo>,
    by_href: HashMap<String, usize>,
}

impl Container {
    /// Index the archive held by `source`
    ///
    /// # Errors
    /// - `UnsupportedFormat` if the bytes are not a ZIP archive
    /// - `Io` if the source cannot be read
    pub fn open(source: Arc<dyn ByteSource>) -> Result<Self> {
        let mut listed = Vec::new();
        {
            let mut archive = zip::ZipArchive::new(SourceCursor::new(source.as_ref()))?;
            for i in 0..archive.len() {
                let file = archive.by_index_raw(i)?;
                if file.is_dir() {
                    continue;
                }
                let compression = match file.compression() {
                    CompressionMethod::Stored => EntryCompression::Stored,
                    CompressionMethod::Deflated => EntryCompression::Deflated,
                    other => EntryCompression::Unsupported(format!("{:?}", other)),
                };
                listed.push((
                    file.name().to_string(),
                    file.header_start(),
                    file.compressed_size(),
                    file.size(),
                    compression,
                ));
            }
        }

        let mut entries = Vec::with_capacity(listed.len());
        let mut by_href = HashMap::with_capacity(listed.len());
        for (name, header_start, raw_length, uncompressed_length, compression) in listed {
            let data_offset = local_data_offset(source.as_ref(), header_start, &name)?;
            if data_offset.checked_add(raw_length).map_or(true, |end| end > source.len()) {
                return Err(LcpError::UnsupportedFormat(format!(
                    "entry '{}' extends past the end of the archive",
                    name
                )));
            }
            by_href.insert(name.clone(), entries.len());
            entries.push(EntryInfo {
                href: name,
                data_offset,
                raw_length,
                uncompressed_length,
                compression,
            });
        }

        debug!(entries = entries.len(), size = source.len(), "indexed container");
        Ok(Self {
            source,
            entries,
            by_href,
        })
    }

    /// Resolve an href to an entry handle
    ///
    /// A leading `/` is ignored, so manifest hrefs written as absolute paths
    /// inside the package still resolve.
    pub fn open_entry(&self, href: &str) -> Result<EntryHandle> {
        let key = href.trim_start_matches('/');
        self.by_href
            .get(key)
            .map(|&index| EntryHandle { index })
            .ok_or_else(|| LcpError::EntryNotFound(href.to_string()))
    }

    /// Entry metadata for a handle
    pub fn info(&self, handle: EntryHandle) -> Result<&EntryInfo> {
        self.entries
            .get(handle.index)
            .ok_or_else(|| LcpError::EntryNotFound(format!("entry #{}", handle.index)))
    }

    /// Entry metadata by href
    pub fn entry(&self, href: &str) -> Option<&EntryInfo> {
        self.open_entry(href).ok().and_then(|h| self.info(h).ok())
    }

    pub fn contains(&self, href: &str) -> bool {
        self.open_entry(href).is_ok()
    }

    /// All indexed entries, in archive order
    pub fn entries(&self) -> impl Iterator<Item = &EntryInfo> {
        self.entries.iter()
    }

    /// Read `length` raw bytes starting `offset` bytes into the entry
    pub fn read_raw(&self, handle: EntryHandle, offset: u64, length: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; length];
        self.read_raw_into(handle, offset, &mut buf)?;
        Ok(buf)
    }

    /// Fill `buf` with raw bytes starting `offset` bytes into the entry
    ///
    /// # Errors
    /// - `OutOfRange` if the range leaves the entry
    /// - `Io` verbatim from the byte source
    pub fn read_raw_into(&self, handle: EntryHandle, offset: u64, buf: &mut [u8]) -> Result<()> {
        let info = self.info(handle)?;
        let end = offset.checked_add(buf.len() as u64);
        if end.map_or(true, |end| end > info.raw_length) {
            return Err(LcpError::OutOfRange {
                href: info.href.clone(),
                offset,
                length: buf.len() as u64,
                size: info.raw_length,
            });
        }
        self.source.read_exact_at(info.data_offset + offset, buf)?;
        Ok(())
    }

    /// Read a small, unencrypted entry whole, undoing ZIP compression
    ///
    /// Only for structural files; resources go through the resource reader.
    pub fn read_entry(&self, href: &str) -> Result<Vec<u8>> {
        let handle = self.open_entry(href)?;
        let info = self.info(handle)?;
        if info.uncompressed_length > MAX_STRUCTURAL_ENTRY || info.raw_length > MAX_STRUCTURAL_ENTRY {
            return Err(LcpError::invalid_manifest(format!(
                "'{}' is too large to be a package descriptor ({} bytes)",
                href, info.uncompressed_length
            )));
        }
        let raw = self.read_raw(handle, 0, info.raw_length as usize)?;
        match &info.compression {
            EntryCompression::Stored => Ok(raw),
            EntryCompression::Deflated => {
                let mut out = Vec::with_capacity(info.uncompressed_length as usize);
                DeflateDecoder::new(raw.as_slice()).read_to_end(&mut out)?;
                Ok(out)
            }
            EntryCompression::Unsupported(method) => Err(LcpError::UnsupportedFormat(format!(
                "'{}' uses unsupported ZIP compression {}",
                href, method
            ))),
        }
    }

    /// License document embedded in the package, if the packager added one
    pub fn embedded_license(&self) -> Result<Option<Vec<u8>>> {
        for path in EMBEDDED_LICENSE_PATHS {
            if self.contains(path) {
                return self.read_entry(path).map(Some);
            }
        }
        Ok(None)
    }

    /// Whether `href` is one of the embedded license paths
    pub fn is_license_path(href: &str) -> bool {
        EMBEDDED_LICENSE_PATHS.contains(&href.trim_start_matches('/'))
    }

    /// Size of the underlying archive
    pub fn archive_len(&self) -> u64 {
        self.source.len()
    }
}

/// Skip the local file header to find where an entry's data begins
fn local_data_offset(source: &dyn ByteSource, header_start: u64, name: &str) -> Result<u64> {
    let mut header = [0u8; LOCAL_HEADER_LEN];
    source.read_exact_at(header_start, &mut header)?;
    let signature = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if signature != LOCAL_HEADER_SIGNATURE {
        return Err(LcpError::UnsupportedFormat(format!(
            "bad local header for '{}' at offset {}",
            name, header_start
        )));
    }
    let name_len = u16::from_le_bytes([header[26], header[27]]) as u64;
    let extra_len = u16::from_le_bytes([header[28], header[29]]) as u64;
    header_start
        .checked_add(LOCAL_HEADER_LEN as u64 + name_len + extra_len)
        .ok_or_else(|| LcpError::UnsupportedFormat(format!("local header for '{}' overflows the archive", name)))
}
