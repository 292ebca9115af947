// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info};

use tokenflow_types::config::JournalOptions;
use tokenflow_types::identifiers::Position;

use crate::error::{JournalError, Result};
use crate::frame::FrameHeader;
use crate::index::SparseJournalIndex;
use crate::segment::{Recovered, Segment};
use crate::{Journal, LogRecord, FIRST_INDEX};

/// A journal stored in a directory of segment files.
///
/// Positions are byte offsets over the frames of all segments, segment headers excluded. The
/// sparse index is rebuilt from the segment files when the journal is opened.
#[derive(Debug)]
pub struct SegmentedJournal {
    directory: PathBuf,
    max_segment_size: u64,
    flush_on_append: bool,
    /// Index of the last entry which was synced to disk.
    flushed_index: Option<u64>,
    /// Ordered by first index, never empty.
    segments: Vec<Segment>,
    index: SparseJournalIndex,
}

impl SegmentedJournal {
    /// Opens the journal in `directory`, creating it if it does not exist yet.
    pub fn open(directory: impl Into<PathBuf>, options: &JournalOptions) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;

        let mut index = SparseJournalIndex::new(options.index_density);
        let files = Self::list_segment_files(&directory)?;
        let mut segments: Vec<Segment> = Vec::with_capacity(files.len().max(1));

        let num_files = files.len();
        for (n, path) in files.into_iter().enumerate() {
            let is_last = n + 1 == num_files;
            match Segment::recover(path.clone(), is_last, |i, position| {
                index.index(i, position)
            })? {
                Recovered::Segment(segment) => {
                    if let Some(previous) = segments.last() {
                        if segment.first_index() != previous.next_index()
                            || segment.base_position() != previous.end_position()
                        {
                            return Err(JournalError::CorruptedSegment {
                                path,
                                reason: format!(
                                    "segment starts at index {} / position {}, expected {} / {}",
                                    segment.first_index(),
                                    segment.base_position(),
                                    previous.next_index(),
                                    previous.end_position()
                                ),
                            });
                        }
                    }
                    segments.push(segment);
                }
                Recovered::TornHeader => {
                    info!(path = %path.display(), "Removing journal segment with torn header");
                    std::fs::remove_file(&path)?;
                }
            }
        }

        if segments.is_empty() {
            segments.push(Segment::create(&directory, FIRST_INDEX, 0)?);
        }

        let mut journal = Self {
            directory,
            max_segment_size: options.max_segment_size,
            flush_on_append: options.flush_on_append,
            flushed_index: None,
            segments,
            index,
        };
        info!(
            directory = %journal.directory.display(),
            segments = journal.segments.len(),
            first_index = journal.first_index(),
            next_index = journal.next_index(),
            "Opened journal"
        );
        // recovered entries were read back from disk
        journal.flushed_index = journal.last_index();
        Ok(journal)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Index of the last entry which was synced to disk.
    pub fn flushed_index(&self) -> Option<u64> {
        self.flushed_index
    }

    fn list_segment_files(directory: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(directory)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(first_index) = name.to_str().and_then(Segment::parse_file_name) {
                files.push((first_index, entry.path()));
            }
        }
        files.sort_by_key(|(first_index, _)| *first_index);
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    fn active(&self) -> &Segment {
        self.segments
            .last()
            .expect("a journal always holds at least one segment")
    }

    fn active_mut(&mut self) -> &mut Segment {
        self.segments
            .last_mut()
            .expect("a journal always holds at least one segment")
    }

    /// Slot of the segment which holds (or would hold) `index`.
    fn segment_for_index(&self, index: u64) -> usize {
        self.segments
            .partition_point(|segment| segment.first_index() <= index)
            .saturating_sub(1)
    }

    /// Finds the frame of `index` by scanning forward from the closest indexed position.
    fn locate(&self, index: u64) -> Result<Option<(usize, Position, FrameHeader)>> {
        if index < self.first_index() || index >= self.next_index() {
            return Ok(None);
        }

        let slot = self.segment_for_index(index);
        let segment = &self.segments[slot];
        // the floor entry may live in an earlier, already compacted segment
        let mut position = self
            .index
            .lookup(index)
            .filter(|position| *position >= segment.base_position())
            .unwrap_or(segment.base_position());

        loop {
            let Some(frame) = segment.read_frame_header(position)? else {
                return Err(JournalError::Corrupted {
                    index,
                    position,
                    reason: "reached the end of the segment before finding the entry".to_owned(),
                });
            };
            if frame.index == index {
                return Ok(Some((slot, position, frame)));
            }
            if frame.index > index {
                return Err(JournalError::Corrupted {
                    index,
                    position,
                    reason: format!("found index {} while scanning", frame.index),
                });
            }
            position += frame.frame_len();
        }
    }

    fn roll_segment(&mut self) -> Result<()> {
        let (first_index, base_position) = {
            let active = self.active_mut();
            active.flush()?;
            (active.next_index(), active.end_position())
        };
        let segment = Segment::create(&self.directory, first_index, base_position)?;
        self.segments.push(segment);
        Ok(())
    }
}

impl Journal for SegmentedJournal {
    fn append(&mut self, payload: Bytes) -> Result<LogRecord> {
        let active = self.active();
        if !active.is_empty() && active.exceeds(&payload, self.max_segment_size) {
            self.roll_segment()?;
        }

        let active = self.active_mut();
        let index = active.next_index();
        let position = active.append(&payload)?;
        self.index.index(index, position);

        if self.flush_on_append {
            self.flush()?;
        }

        Ok(LogRecord {
            index,
            position,
            payload,
        })
    }

    fn read(&self, index: u64) -> Result<Option<LogRecord>> {
        let Some((slot, position, frame)) = self.locate(index)? else {
            return Ok(None);
        };
        let payload = self.segments[slot].read_payload(position, &frame)?;
        Ok(Some(LogRecord {
            index,
            position,
            payload,
        }))
    }

    fn first_index(&self) -> u64 {
        self.segments[0].first_index()
    }

    fn next_index(&self) -> u64 {
        self.active().next_index()
    }

    fn truncate(&mut self, index: u64) -> Result<()> {
        let next_index = self.next_index();
        if index.saturating_add(1) >= next_index {
            return Ok(());
        }
        let first_index = self.first_index();
        if index + 1 < first_index {
            return Err(JournalError::IndexOutOfRange {
                index,
                first_index,
                next_index,
            });
        }

        while self.segments.len() > 1 && self.active().first_index() > index {
            if let Some(segment) = self.segments.pop() {
                segment.delete()?;
            }
        }

        if let Some((_, position, _)) = self.locate(index + 1)? {
            self.active_mut().truncate_at(position, index + 1)?;
        }
        self.index.truncate(index);
        self.flushed_index = self.flushed_index.map(|flushed| flushed.min(index));

        debug!(index, "Truncated journal");
        Ok(())
    }

    fn compact(&mut self, index: u64) -> Result<()> {
        let slot = self.segment_for_index(index);
        if slot > 0 {
            for segment in self.segments.drain(..slot) {
                segment.delete()?;
            }
            debug!(
                index,
                first_index = self.first_index(),
                "Compacted journal"
            );
        }
        self.index.compact(index);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.active_mut().flush()?;
        self.flushed_index = self.last_index();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::num::NonZeroU64;

    use googletest::prelude::*;
    use test_log::test;

    use super::*;
    use crate::segment::SEGMENT_HEADER_LEN;

    fn options(density: u64, max_segment_size: u64) -> JournalOptions {
        JournalOptions {
            index_density: NonZeroU64::new(density).unwrap(),
            max_segment_size,
            flush_on_append: false,
        }
    }

    fn payload(i: u64) -> Bytes {
        Bytes::from(format!("entry-{i:04}"))
    }

    fn fill(journal: &mut SegmentedJournal, count: u64) {
        for _ in 0..count {
            let index = journal.next_index();
            journal.append(payload(index)).unwrap();
        }
        journal.flush().unwrap();
    }

    #[test]
    fn reopen_recovers_entries_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let positions = {
            let mut journal = SegmentedJournal::open(dir.path(), &options(3, 256)).unwrap();
            fill(&mut journal, 20);
            assert_that!(journal.num_segments(), gt(1));
            journal
                .reader(FIRST_INDEX)
                .map(|r| r.unwrap().position)
                .collect::<Vec<_>>()
        };

        let journal = SegmentedJournal::open(dir.path(), &options(3, 256)).unwrap();
        assert_that!(journal.first_index(), eq(1));
        assert_that!(journal.last_index(), some(eq(20)));
        assert_that!(
            journal
                .reader(FIRST_INDEX)
                .map(|r| r.unwrap().position)
                .collect::<Vec<_>>(),
            eq(&positions)
        );
        assert_that!(
            journal.read(7).unwrap().map(|r| r.payload),
            some(eq(&payload(7)))
        );
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let segment_path = {
            let mut journal = SegmentedJournal::open(dir.path(), &options(2, 1 << 20)).unwrap();
            fill(&mut journal, 5);
            journal.active().path().to_path_buf()
        };

        // simulate a crash in the middle of writing the sixth frame
        let mut file = OpenOptions::new().append(true).open(&segment_path).unwrap();
        file.write_all(&[0, 0, 0, 42, 0, 0]).unwrap();
        drop(file);

        let mut journal = SegmentedJournal::open(dir.path(), &options(2, 1 << 20)).unwrap();
        assert_that!(journal.last_index(), some(eq(5)));

        let record = journal.append(payload(6)).unwrap();
        assert_that!(record.index, eq(6));
        assert_that!(journal.read(6).unwrap().map(|r| r.payload), some(eq(&payload(6))));
    }

    #[test]
    fn corrupted_payload_of_last_entry_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let segment_path = {
            let mut journal = SegmentedJournal::open(dir.path(), &options(2, 1 << 20)).unwrap();
            fill(&mut journal, 3);
            journal.active().path().to_path_buf()
        };

        // flip the last payload byte
        let mut content = std::fs::read(&segment_path).unwrap();
        let last = content.len() - 1;
        content[last] ^= 0xff;
        std::fs::write(&segment_path, content).unwrap();

        let journal = SegmentedJournal::open(dir.path(), &options(2, 1 << 20)).unwrap();
        assert_that!(journal.last_index(), some(eq(2)));
    }

    #[test]
    fn corruption_in_sealed_segment_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let first_segment = {
            let mut journal = SegmentedJournal::open(dir.path(), &options(2, 128)).unwrap();
            fill(&mut journal, 20);
            journal.segments[0].path().to_path_buf()
        };

        let mut content = std::fs::read(&first_segment).unwrap();
        let last = content.len() - 1;
        content[last] ^= 0xff;
        std::fs::write(&first_segment, content).unwrap();

        assert_that!(
            SegmentedJournal::open(dir.path(), &options(2, 128)),
            err(anything())
        );
    }

    #[test]
    fn rolls_segments_with_contiguous_positions() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = SegmentedJournal::open(dir.path(), &options(1, 128)).unwrap();
        fill(&mut journal, 30);

        assert_that!(journal.num_segments(), gt(2));
        for pair in journal.segments.windows(2) {
            assert_that!(pair[1].first_index(), eq(pair[0].next_index()));
            assert_that!(pair[1].base_position(), eq(pair[0].end_position()));
            assert_that!(pair[0].len() + SEGMENT_HEADER_LEN, le(128));
        }
    }

    #[test]
    fn compaction_deletes_whole_segments() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = SegmentedJournal::open(dir.path(), &options(4, 128)).unwrap();
        fill(&mut journal, 30);
        let segments_before = journal.num_segments();

        journal.compact(20).unwrap();

        assert_that!(journal.num_segments(), lt(segments_before));
        assert_that!(journal.first_index(), le(20));
        assert_that!(journal.read(journal.first_index() - 1).unwrap(), none());
        for i in journal.first_index()..=30 {
            assert_that!(journal.read(i).unwrap().map(|r| r.payload), some(eq(&payload(i))));
        }

        // compaction survives a restart
        let first_index = journal.first_index();
        drop(journal);
        let journal = SegmentedJournal::open(dir.path(), &options(4, 128)).unwrap();
        assert_that!(journal.first_index(), eq(first_index));
        assert_that!(journal.read(30).unwrap().map(|r| r.payload), some(eq(&payload(30))));
    }

    #[test]
    fn truncation_across_segments_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = SegmentedJournal::open(dir.path(), &options(4, 128)).unwrap();
        fill(&mut journal, 30);

        journal.truncate(9).unwrap();
        assert_that!(journal.last_index(), some(eq(9)));
        let record = journal.append(Bytes::from_static(b"rewritten")).unwrap();
        assert_that!(record.index, eq(10));
        journal.flush().unwrap();
        drop(journal);

        let journal = SegmentedJournal::open(dir.path(), &options(4, 128)).unwrap();
        assert_that!(journal.last_index(), some(eq(10)));
        assert_that!(
            journal.read(10).unwrap().map(|r| r.payload),
            some(eq(&Bytes::from_static(b"rewritten")))
        );
        assert_that!(journal.read(9).unwrap().map(|r| r.payload), some(eq(&payload(9))));
    }

    #[test]
    fn flush_on_append_syncs_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let options = JournalOptions {
            flush_on_append: true,
            ..options(2, 1 << 20)
        };
        let mut journal = SegmentedJournal::open(dir.path(), &options).unwrap();

        for i in FIRST_INDEX..=3 {
            journal.append(payload(i)).unwrap();
            assert_that!(journal.flushed_index(), some(eq(i)));
        }
    }

    #[test]
    fn appends_wait_for_explicit_flush() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = SegmentedJournal::open(dir.path(), &options(2, 1 << 20)).unwrap();

        journal.append(payload(1)).unwrap();
        journal.append(payload(2)).unwrap();
        assert_that!(journal.flushed_index(), none());

        journal.flush().unwrap();
        assert_that!(journal.flushed_index(), some(eq(2)));

        journal.truncate(1).unwrap();
        assert_that!(journal.flushed_index(), some(eq(1)));
    }
}
