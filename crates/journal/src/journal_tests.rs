// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Behaviour every [`Journal`] implementation has to provide.

use std::num::NonZeroU64;

use bytes::Bytes;
use googletest::prelude::*;
use test_log::test;

use tokenflow_types::config::JournalOptions;

use crate::{Journal, MemoryJournal, SegmentedJournal, FIRST_INDEX};

fn payload(i: u64) -> Bytes {
    Bytes::from(format!("record-{i}"))
}

fn append_n(journal: &mut impl Journal, n: u64) {
    for _ in 0..n {
        let index = journal.next_index();
        journal.append(payload(index)).unwrap();
    }
}

fn append_and_read(journal: &mut impl Journal) {
    assert!(journal.is_empty());
    assert_that!(journal.first_index(), eq(FIRST_INDEX));
    assert_that!(journal.read(FIRST_INDEX).unwrap(), none());

    let mut previous_position = None;
    for i in FIRST_INDEX..FIRST_INDEX + 25 {
        let record = journal.append(payload(i)).unwrap();
        assert_that!(record.index, eq(i));
        if let Some(previous) = previous_position {
            assert_that!(record.position, gt(previous));
        }
        previous_position = Some(record.position);
    }
    journal.flush().unwrap();

    assert_that!(journal.last_index(), some(eq(25)));
    for i in FIRST_INDEX..=25 {
        let record = journal.read(i).unwrap().unwrap();
        assert_that!(record.index, eq(i));
        assert_that!(record.payload, eq(&payload(i)));
    }
    assert_that!(journal.read(26).unwrap(), none());
    assert_that!(journal.read(0).unwrap(), none());
}

fn reader_iterates_in_order(journal: &mut impl Journal) {
    append_n(journal, 10);

    let indexes = journal
        .reader(4)
        .map(|record| record.unwrap().index)
        .collect::<Vec<_>>();
    assert_that!(indexes, eq(&(4..=10).collect::<Vec<_>>()));
    assert_that!(journal.reader(11).count(), eq(0));
}

fn truncate_drops_tail(journal: &mut impl Journal) {
    append_n(journal, 12);
    let position_of_eight = journal.read(8).unwrap().unwrap().position;

    journal.truncate(7).unwrap();
    assert_that!(journal.last_index(), some(eq(7)));
    assert_that!(journal.read(8).unwrap(), none());

    // truncating beyond the end is a no-op
    journal.truncate(100).unwrap();
    assert_that!(journal.last_index(), some(eq(7)));

    // appended entries continue where the truncated tail started
    let record = journal.append(Bytes::from_static(b"new")).unwrap();
    assert_that!(record.index, eq(8));
    assert_that!(record.position, eq(position_of_eight));

    journal.truncate(FIRST_INDEX - 1).unwrap();
    assert!(journal.is_empty());
    assert_that!(journal.next_index(), eq(FIRST_INDEX));
}

fn compact_releases_head(journal: &mut impl Journal) {
    append_n(journal, 40);

    journal.compact(30).unwrap();
    assert_that!(journal.first_index(), le(30));
    for i in 30..=40 {
        assert_that!(journal.read(i).unwrap().map(|r| r.payload), some(eq(&payload(i))));
    }

    // compacted journals cannot be truncated below their head
    let first_index = journal.first_index();
    assert!(journal.truncate(first_index - 5).is_err());
}

fn memory_journal() -> MemoryJournal {
    MemoryJournal::new()
}

fn segmented_journal(dir: &tempfile::TempDir) -> SegmentedJournal {
    let options = JournalOptions {
        index_density: NonZeroU64::new(4).unwrap(),
        max_segment_size: 160,
        flush_on_append: true,
    };
    SegmentedJournal::open(dir.path(), &options).unwrap()
}

#[test]
fn memory_append_and_read() {
    append_and_read(&mut memory_journal());
}

#[test]
fn memory_reader_iterates_in_order() {
    reader_iterates_in_order(&mut memory_journal());
}

#[test]
fn memory_truncate_drops_tail() {
    truncate_drops_tail(&mut memory_journal());
}

#[test]
fn memory_compact_releases_head() {
    compact_releases_head(&mut memory_journal());
}

#[test]
fn segmented_append_and_read() {
    let dir = tempfile::tempdir().unwrap();
    append_and_read(&mut segmented_journal(&dir));
}

#[test]
fn segmented_reader_iterates_in_order() {
    let dir = tempfile::tempdir().unwrap();
    reader_iterates_in_order(&mut segmented_journal(&dir));
}

#[test]
fn segmented_truncate_drops_tail() {
    let dir = tempfile::tempdir().unwrap();
    truncate_drops_tail(&mut segmented_journal(&dir));
}

#[test]
fn segmented_compact_releases_head() {
    let dir = tempfile::tempdir().unwrap();
    compact_releases_head(&mut segmented_journal(&dir));
}

#[test]
fn identical_payloads_get_identical_positions() {
    let dir = tempfile::tempdir().unwrap();
    let mut segmented = segmented_journal(&dir);
    let mut memory = memory_journal();

    for i in 0..20 {
        let a = segmented.append(payload(i)).unwrap();
        let b = memory.append(payload(i)).unwrap();
        assert_that!(a, eq(&b));
    }
}
