// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! On-disk framing of journal entries.
//!
//! Every entry is written as `[u32 length][u64 index][u64 checksum][payload]`, all integers in
//! big endian. The checksum is the xxh3 hash of the payload.

use bytes::{Buf, BufMut};

use crate::error::{JournalError, Result};

pub(crate) const FRAME_HEADER_LEN: usize = 4 + 8 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    pub length: u32,
    pub index: u64,
    pub checksum: u64,
}

impl FrameHeader {
    pub fn for_payload(index: u64, payload: &[u8]) -> Result<Self> {
        let length = u32::try_from(payload.len()).map_err(|_| JournalError::EntryTooLarge {
            size: payload.len(),
            limit: u32::MAX as usize,
        })?;
        Ok(Self {
            length,
            index,
            checksum: checksum(payload),
        })
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32(self.length);
        buf.put_u64(self.index);
        buf.put_u64(self.checksum);
    }

    /// Decodes a header, `None` if `buf` holds less than [`FRAME_HEADER_LEN`] bytes.
    pub fn decode<B: Buf>(buf: &mut B) -> Option<Self> {
        if buf.remaining() < FRAME_HEADER_LEN {
            return None;
        }
        Some(Self {
            length: buf.get_u32(),
            index: buf.get_u64(),
            checksum: buf.get_u64(),
        })
    }

    /// Size of the whole frame including the header.
    pub fn frame_len(&self) -> u64 {
        (FRAME_HEADER_LEN + self.length as usize) as u64
    }

    pub fn matches(&self, payload: &[u8]) -> bool {
        payload.len() == self.length as usize && checksum(payload) == self.checksum
    }
}

pub(crate) fn frame_len(payload: &[u8]) -> u64 {
    (FRAME_HEADER_LEN + payload.len()) as u64
}

fn checksum(payload: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64(payload)
}
