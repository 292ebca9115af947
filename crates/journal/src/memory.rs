// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::VecDeque;

use bytes::Bytes;

use tokenflow_types::identifiers::Position;

use crate::error::{JournalError, Result};
use crate::frame::frame_len;
use crate::{Journal, LogRecord, FIRST_INDEX};

/// Journal keeping all entries in memory.
///
/// Positions are assigned as if the entries were framed like in a [`crate::SegmentedJournal`], so
/// both journals hand out identical positions for identical payloads.
#[derive(Debug)]
pub struct MemoryJournal {
    first_index: u64,
    next_position: Position,
    entries: VecDeque<LogRecord>,
    flushed_index: Option<u64>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self {
            first_index: FIRST_INDEX,
            next_position: 0,
            entries: VecDeque::new(),
            flushed_index: None,
        }
    }

    /// Index of the last entry which was flushed.
    pub fn flushed_index(&self) -> Option<u64> {
        self.flushed_index
    }

    fn slot(&self, index: u64) -> Option<usize> {
        index
            .checked_sub(self.first_index)
            .map(|slot| slot as usize)
            .filter(|slot| *slot < self.entries.len())
    }
}

impl Default for MemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl Journal for MemoryJournal {
    fn append(&mut self, payload: Bytes) -> Result<LogRecord> {
        if u32::try_from(payload.len()).is_err() {
            return Err(JournalError::EntryTooLarge {
                size: payload.len(),
                limit: u32::MAX as usize,
            });
        }
        let record = LogRecord {
            index: self.next_index(),
            position: self.next_position,
            payload,
        };
        self.next_position += frame_len(&record.payload);
        self.entries.push_back(record.clone());
        Ok(record)
    }

    fn read(&self, index: u64) -> Result<Option<LogRecord>> {
        Ok(self.slot(index).map(|slot| self.entries[slot].clone()))
    }

    fn first_index(&self) -> u64 {
        self.first_index
    }

    fn next_index(&self) -> u64 {
        self.first_index + self.entries.len() as u64
    }

    fn truncate(&mut self, index: u64) -> Result<()> {
        let next_index = self.next_index();
        if index.saturating_add(1) >= next_index {
            return Ok(());
        }
        if index + 1 < self.first_index {
            return Err(JournalError::IndexOutOfRange {
                index,
                first_index: self.first_index,
                next_index,
            });
        }

        let keep = (index + 1 - self.first_index) as usize;
        if let Some(first_removed) = self.entries.get(keep) {
            self.next_position = first_removed.position;
        }
        self.entries.truncate(keep);
        self.flushed_index = self.flushed_index.map(|flushed| flushed.min(index));
        Ok(())
    }

    fn compact(&mut self, index: u64) -> Result<()> {
        let index = index.min(self.next_index());
        while self.first_index < index {
            self.entries.pop_front();
            self.first_index += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushed_index = self.last_index();
        Ok(())
    }
}
