// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::BTreeMap;
use std::num::NonZeroU64;

use tokenflow_types::identifiers::Position;

/// Memory bounded index from journal indexes to the positions of their entries.
///
/// Only every `density`-th index is retained. A lookup yields the position of the closest
/// retained entry at or below the requested index; readers scan forward from there to reach the
/// exact entry.
#[derive(Debug, Clone)]
pub struct SparseJournalIndex {
    density: NonZeroU64,
    positions: BTreeMap<u64, Position>,
}

impl SparseJournalIndex {
    pub fn new(density: NonZeroU64) -> Self {
        Self {
            density,
            positions: BTreeMap::new(),
        }
    }

    pub fn density(&self) -> NonZeroU64 {
        self.density
    }

    /// Records the position of an appended entry if its index is a multiple of the density.
    pub fn index(&mut self, index: u64, position: Position) {
        if index % self.density.get() == 0 {
            debug_assert!(
                self.positions
                    .last_key_value()
                    .map_or(true, |(i, p)| *i < index && *p < position),
                "sparse index entries must be monotonically increasing"
            );
            self.positions.insert(index, position);
        }
    }

    /// Position of the greatest retained index which is lower than or equal to `index`.
    pub fn lookup(&self, index: u64) -> Option<Position> {
        self.floor(index).map(|(_, position)| position)
    }

    /// Discards every retained entry with an index greater than `index`.
    pub fn truncate(&mut self, index: u64) {
        // nothing can be greater than u64::MAX
        if let Some(first_removed) = index.checked_add(1) {
            self.positions.split_off(&first_removed);
        }
    }

    /// Discards every retained entry below the floor entry of `index`. The floor entry itself is
    /// kept to resolve lookups of the indexes following it.
    pub fn compact(&mut self, index: u64) {
        if let Some((floor, _)) = self.floor(index) {
            self.positions = self.positions.split_off(&floor);
        }
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn floor(&self, index: u64) -> Option<(u64, Position)> {
        self.positions
            .range(..=index)
            .next_back()
            .map(|(index, position)| (*index, *position))
    }
}
