// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use tokenflow_types::identifiers::Position;

use crate::error::{JournalError, Result};
use crate::frame::{frame_len, FrameHeader, FRAME_HEADER_LEN};

const SEGMENT_MAGIC: [u8; 4] = *b"TFJS";
const SEGMENT_VERSION: u32 = 1;
pub(crate) const SEGMENT_HEADER_LEN: u64 = 4 + 4 + 8 + 8;

const SEGMENT_FILE_PREFIX: &str = "segment-";
const SEGMENT_FILE_SUFFIX: &str = ".log";

/// Header at the start of every segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SegmentHeader {
    first_index: u64,
    /// Journal position of the first frame in this segment.
    base_position: Position,
}

impl SegmentHeader {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&SEGMENT_MAGIC);
        buf.put_u32(SEGMENT_VERSION);
        buf.put_u64(self.first_index);
        buf.put_u64(self.base_position);
    }

    fn decode<B: Buf>(buf: &mut B) -> std::result::Result<Self, String> {
        if (buf.remaining() as u64) < SEGMENT_HEADER_LEN {
            return Err(format!(
                "segment header requires {SEGMENT_HEADER_LEN} bytes, found {}",
                buf.remaining()
            ));
        }
        let mut magic = [0; 4];
        buf.copy_to_slice(&mut magic);
        if magic != SEGMENT_MAGIC {
            return Err(format!("unexpected magic bytes {magic:?}"));
        }
        let version = buf.get_u32();
        if version != SEGMENT_VERSION {
            return Err(format!("unsupported segment version {version}"));
        }
        Ok(Self {
            first_index: buf.get_u64(),
            base_position: buf.get_u64(),
        })
    }
}

/// Outcome of scanning a segment file on open.
pub(crate) enum Recovered {
    Segment(Segment),
    /// The file ended before its header was complete. Only possible for the last segment.
    TornHeader,
}

/// A single file of a [`crate::SegmentedJournal`].
#[derive(Debug)]
pub(crate) struct Segment {
    path: PathBuf,
    file: File,
    header: SegmentHeader,
    /// Number of frame bytes, excluding the segment header.
    len: u64,
    next_index: u64,
}

impl Segment {
    pub fn file_name(first_index: u64) -> String {
        format!("{SEGMENT_FILE_PREFIX}{first_index:020}{SEGMENT_FILE_SUFFIX}")
    }

    /// First index of the segment file with the given name, if it names a segment at all.
    pub fn parse_file_name(name: &str) -> Option<u64> {
        name.strip_prefix(SEGMENT_FILE_PREFIX)?
            .strip_suffix(SEGMENT_FILE_SUFFIX)?
            .parse()
            .ok()
    }

    pub fn create(directory: &Path, first_index: u64, base_position: Position) -> Result<Self> {
        let path = directory.join(Self::file_name(first_index));
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create_new(true)
            .open(&path)?;

        let header = SegmentHeader {
            first_index,
            base_position,
        };
        let mut buf = BytesMut::with_capacity(SEGMENT_HEADER_LEN as usize);
        header.encode(&mut buf);
        file.write_all(&buf)?;
        file.sync_all()?;

        debug!(
            path = %path.display(),
            first_index,
            base_position,
            "Created journal segment"
        );
        Ok(Self {
            path,
            file,
            header,
            len: 0,
            next_index: first_index,
        })
    }

    /// Opens an existing segment and validates all of its frames, calling `on_entry` with the
    /// index and position of every valid entry. A torn or corrupted tail is cut off if
    /// `is_last` is set, it is an error otherwise.
    pub fn recover(
        path: PathBuf,
        is_last: bool,
        mut on_entry: impl FnMut(u64, Position),
    ) -> Result<Recovered> {
        let mut file = OpenOptions::new().read(true).append(true).open(&path)?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;

        let header = match SegmentHeader::decode(&mut &content[..]) {
            Ok(header) => header,
            Err(_) if is_last && (content.len() as u64) < SEGMENT_HEADER_LEN => {
                return Ok(Recovered::TornHeader);
            }
            Err(reason) => return Err(JournalError::CorruptedSegment { path, reason }),
        };

        let mut offset = SEGMENT_HEADER_LEN as usize;
        let mut next_index = header.first_index;
        let mut corruption = None;
        while offset < content.len() {
            let position = header.base_position + (offset as u64 - SEGMENT_HEADER_LEN);
            let mut remaining = &content[offset..];
            let Some(frame) = FrameHeader::decode(&mut remaining) else {
                corruption = Some((next_index, position, "torn frame header".to_owned()));
                break;
            };
            if frame.index != next_index {
                corruption = Some((
                    next_index,
                    position,
                    format!("expected index {next_index}, found {}", frame.index),
                ));
                break;
            }
            if remaining.len() < frame.length as usize {
                corruption = Some((next_index, position, "torn frame payload".to_owned()));
                break;
            }
            if !frame.matches(&remaining[..frame.length as usize]) {
                corruption = Some((next_index, position, "checksum mismatch".to_owned()));
                break;
            }

            on_entry(next_index, position);
            next_index += 1;
            offset += frame.frame_len() as usize;
        }

        if let Some((index, position, reason)) = corruption {
            if !is_last {
                return Err(JournalError::Corrupted {
                    index,
                    position,
                    reason,
                });
            }
            warn!(
                path = %path.display(),
                index,
                position,
                %reason,
                "Truncating journal segment after the last valid entry"
            );
            file.set_len(offset as u64)?;
            file.sync_all()?;
        }

        Ok(Recovered::Segment(Self {
            path,
            file,
            header,
            len: offset as u64 - SEGMENT_HEADER_LEN,
            next_index,
        }))
    }

    pub fn first_index(&self) -> u64 {
        self.header.first_index
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn base_position(&self) -> Position {
        self.header.base_position
    }

    /// Position directly after the last frame of this segment.
    pub fn end_position(&self) -> Position {
        self.header.base_position + self.len
    }

    #[cfg(test)]
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether appending `payload` would grow this segment beyond `max_size` bytes.
    pub fn exceeds(&self, payload: &[u8], max_size: u64) -> bool {
        SEGMENT_HEADER_LEN + self.len + frame_len(payload) > max_size
    }

    pub fn append(&mut self, payload: &[u8]) -> Result<Position> {
        let header = FrameHeader::for_payload(self.next_index, payload)?;
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
        header.encode(&mut buf);
        buf.put_slice(payload);
        self.file.write_all(&buf)?;

        let position = self.end_position();
        self.len += header.frame_len();
        self.next_index += 1;
        Ok(position)
    }

    /// Reads the frame header at `position`, `None` if `position` is at the end of the segment.
    pub fn read_frame_header(&self, position: Position) -> Result<Option<FrameHeader>> {
        if position >= self.end_position() {
            return Ok(None);
        }
        let mut buf = [0; FRAME_HEADER_LEN];
        self.read_exact_at(position, &mut buf)?;
        Ok(FrameHeader::decode(&mut &buf[..]))
    }

    pub fn read_payload(&self, position: Position, frame: &FrameHeader) -> Result<Bytes> {
        let mut payload = vec![0; frame.length as usize];
        self.read_exact_at(position + FRAME_HEADER_LEN as u64, &mut payload)?;
        if !frame.matches(&payload) {
            return Err(JournalError::Corrupted {
                index: frame.index,
                position,
                reason: "checksum mismatch".to_owned(),
            });
        }
        Ok(Bytes::from(payload))
    }

    /// Cuts the segment so that the frame at `position`, which holds `index`, and everything after
    /// it are removed.
    pub fn truncate_at(&mut self, position: Position, index: u64) -> Result<()> {
        let len = position - self.header.base_position;
        self.file.set_len(SEGMENT_HEADER_LEN + len)?;
        self.file.sync_all()?;
        self.len = len;
        self.next_index = index;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    pub fn delete(self) -> Result<()> {
        debug!(path = %self.path.display(), "Deleting journal segment");
        drop(self.file);
        std::fs::remove_file(&self.path)?;
        Ok(())
    }

    fn read_exact_at(&self, position: Position, buf: &mut [u8]) -> Result<()> {
        let offset = SEGMENT_HEADER_LEN + (position - self.header.base_position);
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }
}
