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


//! Range-addressable plaintext readers
//!
//! One `EncryptedResource` per open/read/close cycle of a link. The reader
//! borrows its `Publication`, so it cannot outlive the container or the key
//! material. Reads pull block-aligned ciphertext windows from the container,
//! decrypt them with the publication's context and hand back the requested
//! slice; nothing is decrypted ahead and nothing is written anywhere.
//!
//! ```text
//! Closed --open--> Open --close--> Closed
//!                   |
//!                   +--DecryptionFailed--> Failed --close--> Closed
//! ```

mod inflate;
mod window;

use crate::container::{Container, EntryCompression, EntryHandle};
use crate::error::{LcpError, Result};
use crate::publication::{EncryptionProfile, Link, Publication};
use inflate::Inflater;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use tracing::{debug, warn};
use window::BlockReader;

/// Plaintext source addressed by absolute offset
pub(crate) trait PositionalRead: Send {
    /// Plaintext length, when known up front
    fn len(&self) -> Option<u64>;

    /// Read up to `buf.len()` bytes at `offset`; 0 means end of resource
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;
}

/// Clear entry stored without compression
struct StoredEntry<'a> {
    container: &'a Container,
    handle: EntryHandle,
    len: u64,
}

impl PositionalRead for StoredEntry<'_> {
    fn len(&self) -> Option<u64> {
        Some(self.len)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        let n = (buf.len() as u64).min(self.len - offset) as usize;
        self.container.read_raw_into(self.handle, offset, &mut buf[..n])?;
        Ok(n)
    }
}

/// Observable reader state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Closed,
    Open,
    Failed,
}

struct OpenState<'a> {
    body: Box<dyn PositionalRead + 'a>,
    cursor: u64,
}

enum State<'a> {
    Closed,
    Open(OpenState<'a>),
    Failed { offset: u64, reason: String },
}

pub struct EncryptedResource<'a> {
    publication: &'a Publication,
    link: Link,
    state: State<'a>,
}

impl<'a> EncryptedResource<'a> {
    pub(crate) fn new(publication: &'a Publication, link: Link) -> Self {
        Self {
            publication,
            link,
            state: State::Closed,
        }
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn href(&self) -> &str {
        &self.link.href
    }

    pub fn state(&self) -> ResourceState {
        match self.state {
            State::Closed => ResourceState::Closed,
            State::Open(_) => ResourceState::Open,
            State::Failed { .. } => ResourceState::Failed,
        }
    }

    /// Current plaintext offset (0 when not open)
    pub fn position(&self) -> u64 {
        match &self.state {
            State::Open(open) => open.cursor,
            _ => 0,
        }
    }

    /// Plaintext length; known after `open` unless a deflated resource
    /// declares no original length
    pub fn length(&self) -> Option<u64> {
        match &self.state {
            State::Open(open) => open.body.len(),
            _ => self.link.length,
        }
    }

    /// Open the resource with the cursor at `initial_offset`
    ///
    /// Returns the plaintext length when it is known.
    ///
    /// # Errors
    /// - `AlreadyOpen` if this href is already open on the publication
    /// - `EntryNotFound` if the package has no such entry
    /// - `DecryptionFailed` if the ciphertext cannot hold the declared
    ///   length, or (without a declared length) its final block is corrupt
    pub fn open(&mut self, initial_offset: u64) -> Result<Option<u64>> {
        if !matches!(self.state, State::Closed) {
            return Err(LcpError::AlreadyOpen(self.link.href.clone()));
        }
        self.publication.claim(&self.link.href)?;

        let body = match self.build_body() {
            Ok(body) => body,
            Err(e) => {
                self.publication.release(&self.link.href);
                return Err(e);
            }
        };
        let length = body.len();
        debug!(href = %self.link.href, offset = initial_offset, ?length, "resource opened");

        self.state = State::Open(OpenState {
            body,
            cursor: initial_offset,
        });
        Ok(length)
    }

    fn build_body(&self) -> Result<Box<dyn PositionalRead + 'a>> {
        let publication: &'a Publication = self.publication;
        let container = publication.container();
        let href = self.link.href.as_str();
        let handle = container.open_entry(href)?;
        let info = container.info(handle)?;

        match self.link.encryption {
            EncryptionProfile::Clear => match &info.compression {
                EntryCompression::Stored => Ok(Box::new(StoredEntry {
                    container,
                    handle,
                    len: info.raw_length,
                })),
                EntryCompression::Deflated => {
                    let raw = StoredEntry {
                        container,
                        handle,
                        len: info.raw_length,
                    };
                    Ok(Box::new(Inflater::new(raw, Some(info.uncompressed_length), href)))
                }
                EntryCompression::Unsupported(method) => Err(LcpError::UnsupportedFormat(format!(
                    "'{}' uses unsupported ZIP compression {}",
                    href, method
                ))),
            },
            EncryptionProfile::Lcp {
                algorithm,
                original_length,
                deflated,
            } => {
                let context = publication.context();
                if algorithm != context.algorithm() {
                    return Err(LcpError::unsupported_profile(href, "algorithm differs from the license"));
                }
                if info.compression != EntryCompression::Stored {
                    return Err(LcpError::unsupported_profile(
                        href,
                        "encrypted entries must be stored without ZIP compression",
                    ));
                }
                let window = publication.chunk_window();
                if deflated {
                    let blocks = BlockReader::new(container, context, handle, None, window)?;
                    Ok(Box::new(Inflater::new(blocks, original_length, href)))
                } else {
                    Ok(Box::new(BlockReader::new(container, context, handle, original_length, window)?))
                }
            }
        }
    }

    fn failure(&self) -> Option<LcpError> {
        match &self.state {
            State::Failed { offset, reason } => Some(LcpError::decryption_failed(&self.link.href, *offset, reason)),
            State::Closed => Some(LcpError::ResourceClosed(self.link.href.clone())),
            State::Open(_) => None,
        }
    }

    /// Fill `buf` from the cursor; returns fewer bytes only at the end
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Some(err) = self.failure() {
            return Err(err);
        }
        let State::Open(open) = &mut self.state else {
            return Err(LcpError::ResourceClosed(self.link.href.clone()));
        };

        let mut filled = 0;
        let mut error = None;
        while filled < buf.len() {
            match open.body.read_at(open.cursor, &mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    open.cursor += n as u64;
                }
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }

        match error {
            None => Ok(filled),
            Some(err) => {
                if let LcpError::DecryptionFailed { offset, reason, .. } = &err {
                    warn!(href = %self.link.href, offset, %reason, "decryption failed; reader is now unusable");
                    self.state = State::Failed {
                        offset: *offset,
                        reason: reason.clone(),
                    };
                }
                Err(err)
            }
        }
    }

    /// Read up to `length` bytes from the cursor
    ///
    /// Empty at or after the end of the resource.
    pub fn read(&mut self, length: usize) -> Result<Vec<u8>> {
        if let Some(err) = self.failure() {
            return Err(err);
        }
        let remaining = match (self.length(), self.position()) {
            (Some(len), pos) => len.saturating_sub(pos),
            (None, _) => length as u64,
        };
        let mut out = vec![0u8; (length as u64).min(remaining) as usize];
        let n = self.read_into(&mut out)?;
        out.truncate(n);
        Ok(out)
    }

    /// Move the cursor; offsets past the end are allowed and read as empty
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if let Some(err) = self.failure() {
            return Err(err);
        }
        if let State::Open(open) = &mut self.state {
            open.cursor = offset;
        }
        Ok(())
    }

    /// Close the reader; closing twice is a no-op
    pub fn close(&mut self) {
        if matches!(self.state, State::Closed) {
            return;
        }
        self.state = State::Closed;
        self.publication.release(&self.link.href);
        debug!(href = %self.link.href, "resource closed");
    }
}

impl Drop for EncryptedResource<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

impl Read for EncryptedResource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf).map_err(LcpError::into_io)
    }
}

impl Seek for EncryptedResource<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position().checked_add_signed(delta),
            SeekFrom::End(delta) => match self.length() {
                Some(len) => len.checked_add_signed(delta),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::Unsupported,
                        "resource length is unknown",
                    ))
                }
            },
        };
        let target = target.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start"))?;
        EncryptedResource::seek(self, target).map_err(LcpError::into_io)?;
        Ok(target)
    }
}

impl fmt::Debug for EncryptedResource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedResource")
            .field("href", &self.link.href)
            .field("state", &self.state())
            .field("position", &self.position())
            .finish()
    }
}
