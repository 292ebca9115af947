// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use bytes::Bytes;

use tokenflow_types::identifiers::Position;

/// One physical entry of a journal.
///
/// `index` is the logical, gapless sequence number of the entry and `position` the byte offset
/// at which the entry starts. Both grow monotonically with every append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub index: u64,
    pub position: Position,
    pub payload: Bytes,
}
