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

use tokenflow_types::identifiers::Key;
use tokenflow_types::record::{Intent, ProcessInstanceRecord};

use crate::Result;

/// Snapshot of a record parked in its flow scope until a join condition holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub key: Key,
    pub intent: Intent,
    pub value: ProcessInstanceRecord,
}

tokenflow_types::flexbuffers_storage_encode_decode!(IndexedRecord);

impl IndexedRecord {
    pub fn new(key: Key, intent: Intent, value: ProcessInstanceRecord) -> Self {
        Self { key, intent, value }
    }
}

pub trait ReadOnlyDeferredEventTable {
    /// Deferred records of a scope, in the order they were deferred in.
    fn get_deferred_events(&self, scope_key: Key) -> Result<Vec<IndexedRecord>>;
}

pub trait DeferredEventTable: ReadOnlyDeferredEventTable {
    fn put_deferred_event(&mut self, scope_key: Key, record: &IndexedRecord) -> Result<()>;

    /// Removes the deferred record with the given key. Removing an absent record is a no-op.
    fn remove_deferred_event(&mut self, scope_key: Key, record_key: Key) -> Result<()>;

    fn remove_all_deferred_events(&mut self, scope_key: Key) -> Result<()>;
}
