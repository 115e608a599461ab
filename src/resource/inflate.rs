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


//! Raw-deflate layer over a positional plaintext source
//!
//! Deflate streams can only be decoded front to back, so this layer keeps a
//! decoder positioned at the last read. Forward seeks decode and discard;
//! backward seeks restart from the beginning. Memory use is the decoder's
//! window plus its input buffer, independent of the resource size.

use super::PositionalRead;
use crate::error::{LcpError, Result};
use flate2::read::DeflateDecoder;
use std::fmt;
use std::io::{self, Read};

const DISCARD_CHUNK: usize = 8 * 1024;

/// Adapts a positional source to `io::Read` for the decoder
struct SequentialReader<S> {
    source: S,
    offset: u64,
}

impl<S: PositionalRead> Read for SequentialReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.source.read_at(self.offset, buf).map_err(io::Error::other)?;
        self.offset += n as u64;
        Ok(n)
    }
}

pub(crate) struct Inflater<S: PositionalRead> {
    decoder: Option<DeflateDecoder<SequentialReader<S>>>,
    position: u64,
    length: Option<u64>,
    href: String,
}

impl<S: PositionalRead> Inflater<S> {
    /// `length` is the declared inflated length, if any
    pub(crate) fn new(source: S, length: Option<u64>, href: impl Into<String>) -> Self {
        Self {
            decoder: Some(DeflateDecoder::new(SequentialReader { source, offset: 0 })),
            position: 0,
            length,
            href: href.into(),
        }
    }

    fn restart(&mut self) -> Result<()> {
        let decoder = self
            .decoder
            .take()
            .ok_or_else(|| LcpError::decryption_failed(&self.href, self.position, "inflater lost its source"))?;
        let mut inner = decoder.into_inner();
        inner.offset = 0;
        self.decoder = Some(DeflateDecoder::new(inner));
        self.position = 0;
        Ok(())
    }

    fn read_next(&mut self, buf: &mut [u8]) -> Result<usize> {
        let limit = match self.length {
            Some(len) if self.position >= len => return Ok(0),
            Some(len) => buf.len().min((len - self.position).min(usize::MAX as u64) as usize),
            None => buf.len(),
        };
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| LcpError::decryption_failed(&self.href, self.position, "inflater lost its source"))?;

        let n = match decoder.read(&mut buf[..limit]) {
            Ok(n) => n,
            Err(e) => return Err(inflate_error(&self.href, self.position, e)),
        };

        if n == 0 && limit > 0 {
            if let Some(len) = self.length {
                return Err(LcpError::decryption_failed(
                    &self.href,
                    self.position,
                    format!("inflated stream ends at {} bytes but {} were declared", self.position, len),
                ));
            }
        }
        self.position += n as u64;
        Ok(n)
    }

    fn seek_to(&mut self, target: u64) -> Result<()> {
        if target < self.position {
            self.restart()?;
        }
        let mut discard = [0u8; DISCARD_CHUNK];
        while self.position < target {
            let step = ((target - self.position) as usize).min(DISCARD_CHUNK);
            if self.read_next(&mut discard[..step])? == 0 {
                break;
            }
        }
        Ok(())
    }
}

/// Recover typed errors from the source; anything else is bad deflate data
fn inflate_error(href: &str, position: u64, err: io::Error) -> LcpError {
    if err.get_ref().map_or(false, |inner| inner.is::<LcpError>()) {
        return LcpError::from_io(err);
    }
    LcpError::decryption_failed(href, position, format!("invalid deflate data: {}", err))
}

impl<S: PositionalRead> PositionalRead for Inflater<S> {
    fn len(&self) -> Option<u64> {
        self.length
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if let Some(len) = self.length {
            if offset >= len {
                return Ok(0);
            }
        }
        if offset != self.position {
            self.seek_to(offset)?;
            if self.position < offset {
                return Ok(0);
            }
        }
        self.read_next(buf)
    }
}

impl<S: PositionalRead> fmt::Debug for Inflater<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inflater")
            .field("href", &self.href)
            .field("position", &self.position)
            .field("length", &self.length)
            .finish()
    }
}
