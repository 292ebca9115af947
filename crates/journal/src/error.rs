// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::path::PathBuf;

use tokenflow_types::identifiers::Position;

/// Result type for journal operations.
pub type Result<T, E = JournalError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupted journal entry {index} at position {position}: {reason}")]
    Corrupted {
        index: u64,
        position: Position,
        reason: String,
    },
    #[error("corrupted journal segment '{}': {reason}", path.display())]
    CorruptedSegment { path: PathBuf, reason: String },
    #[error("index {index} is out of range, the journal holds [{first_index}, {next_index})")]
    IndexOutOfRange {
        index: u64,
        first_index: u64,
        next_index: u64,
    },
    #[error("entry of {size} bytes exceeds the maximum of {limit} bytes")]
    EntryTooLarge { size: usize, limit: usize },
}
