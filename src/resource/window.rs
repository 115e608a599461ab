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


//! Block-aligned range decryption
//!
//! Plaintext block `b` of a resource is the ciphertext block at raw offset
//! `16 + 16*b`, chained from the raw block before it (the IV for `b = 0`).
//! A plaintext range `[p, q)` therefore needs raw bytes
//! `[16*(p/16), 16 + 16*((q-1)/16 + 1))`: decrypt, then trim. Windows are
//! capped at the configured chunk size so memory stays bounded no matter how
//! much the caller asks for.

use super::PositionalRead;
use crate::container::{Container, EntryHandle};
use crate::crypto::block::padding_len;
use crate::crypto::{DecryptionContext, BLOCK_SIZE};
use crate::error::{LcpError, Result};

const BLOCK: u64 = BLOCK_SIZE as u64;

/// Plaintext view over one encrypted entry
#[derive(Debug)]
pub(crate) struct BlockReader<'a> {
    container: &'a Container,
    context: &'a DecryptionContext,
    handle: EntryHandle,
    href: String,
    raw_len: u64,
    plain_len: u64,
    /// Whole blocks decrypted per step, not counting the chaining block
    max_blocks: u64,
    scratch: Vec<u8>,
}

impl<'a> BlockReader<'a> {
    /// Prepare a reader; `declared_len` is the payload length if known
    ///
    /// Without a declared length the final block is decrypted once to find
    /// the padding.
    pub(crate) fn new(
        container: &'a Container,
        context: &'a DecryptionContext,
        handle: EntryHandle,
        declared_len: Option<u64>,
        window: usize,
    ) -> Result<Self> {
        let info = container.info(handle)?;
        let href = info.href.clone();
        let raw_len = info.raw_length;

        if raw_len < 2 * BLOCK || raw_len % BLOCK != 0 {
            return Err(LcpError::decryption_failed(
                &href,
                0,
                format!("ciphertext of {} bytes is not an IV plus whole blocks", raw_len),
            ));
        }

        let max_blocks = ((window as u64) / BLOCK).saturating_sub(1).max(1);
        let mut reader = Self {
            container,
            context,
            handle,
            href,
            raw_len,
            plain_len: 0,
            max_blocks,
            scratch: Vec::new(),
        };

        reader.plain_len = match declared_len {
            Some(len) => {
                // At least one byte of padding, at most one block of it
                let max_len = raw_len - BLOCK - 1;
                let min_len = raw_len - 2 * BLOCK;
                if len < min_len || len > max_len {
                    return Err(LcpError::decryption_failed(
                        &reader.href,
                        0,
                        format!("declared length {} does not fit {} bytes of ciphertext", len, raw_len),
                    ));
                }
                len
            }
            None => reader.payload_len_from_padding()?,
        };
        Ok(reader)
    }

    pub(crate) fn len(&self) -> u64 {
        self.plain_len
    }

    fn payload_len_from_padding(&mut self) -> Result<u64> {
        let mut tail = [0u8; 2 * BLOCK_SIZE];
        self.container.read_raw_into(self.handle, self.raw_len - 2 * BLOCK, &mut tail)?;
        let (iv, last) = tail.split_at_mut(BLOCK_SIZE);
        let final_offset = self.raw_len - 2 * BLOCK;
        self.context
            .decrypt_blocks(iv, last)
            .map_err(|e| LcpError::decryption_failed(&self.href, final_offset, e.to_string()))?;
        let pad = padding_len(last).map_err(|e| LcpError::decryption_failed(&self.href, final_offset, e.to_string()))?;
        Ok(self.raw_len - BLOCK - pad as u64)
    }
}

impl PositionalRead for BlockReader<'_> {
    fn len(&self) -> Option<u64> {
        Some(self.plain_len)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.plain_len {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(self.plain_len - offset);

        let first_block = offset / BLOCK;
        let wanted_last = (offset + want - 1) / BLOCK;
        let last_block = wanted_last.min(first_block + self.max_blocks - 1);

        let raw_start = first_block * BLOCK;
        let raw_end = BLOCK + (last_block + 1) * BLOCK;
        let window_len = (raw_end - raw_start) as usize;

        self.scratch.clear();
        self.scratch.resize(window_len, 0);
        self.container.read_raw_into(self.handle, raw_start, &mut self.scratch)?;

        let (iv, blocks) = self.scratch.split_at_mut(BLOCK_SIZE);
        self.context
            .decrypt_blocks(iv, blocks)
            .map_err(|e| LcpError::decryption_failed(&self.href, offset, e.to_string()))?;

        if raw_end == self.raw_len {
            let final_block = &blocks[blocks.len() - BLOCK_SIZE..];
            let final_offset = last_block * BLOCK;
            let pad = padding_len(final_block)
                .map_err(|e| LcpError::decryption_failed(&self.href, final_offset, e.to_string()))?;
            let actual = self.raw_len - BLOCK - pad as u64;
            if actual != self.plain_len {
                return Err(LcpError::decryption_failed(
                    &self.href,
                    final_offset,
                    format!("plaintext is {} bytes but {} were declared", actual, self.plain_len),
                ));
            }
        }

        let start = (offset - raw_start) as usize;
        let produced_end = ((last_block + 1) * BLOCK).min(self.plain_len);
        let n = want.min(produced_end - offset) as usize;
        buf[..n].copy_from_slice(&blocks[start..start + n]);
        Ok(n)
    }
}
