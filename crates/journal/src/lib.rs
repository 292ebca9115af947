// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Append-only, indexed journal which is the durable source of truth of a partition.

mod error;
mod frame;
mod index;
mod memory;
mod record;
mod segment;
mod segmented;

#[cfg(test)]
mod journal_tests;

use bytes::Bytes;

pub use error::{JournalError, Result};
pub use index::SparseJournalIndex;
pub use memory::MemoryJournal;
pub use record::LogRecord;
pub use segmented::SegmentedJournal;

/// Index of the first entry of a new journal.
pub const FIRST_INDEX: u64 = 1;

/// An append-only sequence of entries with gapless, monotonically increasing indexes.
///
/// A journal is exclusively owned by the partition it belongs to, all operations are therefore
/// synchronous and take the journal by reference.
pub trait Journal: Send + 'static {
    /// Appends a new entry and returns it with its assigned index and position.
    fn append(&mut self, payload: Bytes) -> Result<LogRecord>;

    /// Reads the entry with the given index, `None` if the journal does not hold it (anymore).
    fn read(&self, index: u64) -> Result<Option<LogRecord>>;

    /// Index of the first entry still held by the journal.
    fn first_index(&self) -> u64;

    /// Index the next appended entry will get.
    fn next_index(&self) -> u64;

    fn last_index(&self) -> Option<u64> {
        let next_index = self.next_index();
        (next_index > self.first_index()).then(|| next_index - 1)
    }

    fn is_empty(&self) -> bool {
        self.last_index().is_none()
    }

    /// Removes every entry with an index greater than `index`.
    fn truncate(&mut self, index: u64) -> Result<()>;

    /// Releases entries below `index`. Implementations may retain some of them, e.g. when they
    /// share a segment with `index`.
    fn compact(&mut self, index: u64) -> Result<()>;

    /// Makes every appended entry durable.
    fn flush(&mut self) -> Result<()>;

    /// Iterates over the entries starting at `from_index`, in index order.
    fn reader(&self, from_index: u64) -> JournalReader<'_, Self>
    where
        Self: Sized,
    {
        JournalReader {
            journal: self,
            next_index: from_index,
        }
    }
}

pub struct JournalReader<'a, J> {
    journal: &'a J,
    next_index: u64,
}

impl<J: Journal> Iterator for JournalReader<'_, J> {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.journal.read(self.next_index) {
            Ok(Some(record)) => {
                self.next_index += 1;
                Some(Ok(record))
            }
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
