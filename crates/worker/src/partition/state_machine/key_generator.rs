// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tokenflow_types::identifiers::{Key, PartitionId};

/// Hands out the keys of new records and element instances of one partition.
///
/// The generator is restored from the fsm table before a record is applied and written back in
/// the same transaction. Re-applying a record therefore regenerates the same keys.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    partition_id: PartitionId,
    next_local_key: u64,
}

impl KeyGenerator {
    pub const FIRST_LOCAL_KEY: u64 = 1;

    pub fn new(partition_id: PartitionId, next_local_key: Option<u64>) -> Self {
        Self {
            partition_id,
            next_local_key: next_local_key.unwrap_or(Self::FIRST_LOCAL_KEY),
        }
    }

    pub fn next_key(&mut self) -> Key {
        let key = Key::encode(self.partition_id, self.next_local_key);
        self.next_local_key += 1;
        key
    }

    pub fn next_local_key(&self) -> u64 {
        self.next_local_key
    }
}
