// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use serde::{Deserialize, Serialize};

use tokenflow_types::identifiers::Position;

use crate::Result;

/// The journal entry which was processed last, together with all of its state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastProcessed {
    pub index: u64,
    pub position: Position,
}

tokenflow_types::flexbuffers_storage_encode_decode!(LastProcessed);

pub trait ReadOnlyFsmTable {
    fn get_last_processed(&self) -> Result<Option<LastProcessed>>;

    /// Next local key the key generator hands out, `None` before the first key was generated.
    fn get_next_local_key(&self) -> Result<Option<u64>>;
}

pub trait FsmTable: ReadOnlyFsmTable {
    fn put_last_processed(&mut self, last_processed: LastProcessed) -> Result<()>;

    fn put_next_local_key(&mut self, next_local_key: u64) -> Result<()>;
}
