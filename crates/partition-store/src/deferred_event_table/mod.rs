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

use tokenflow_storage_api::deferred_event_table::{
    DeferredEventTable, IndexedRecord, ReadOnlyDeferredEventTable,
};
use tokenflow_storage_api::Result;
use tokenflow_types::identifiers::Key;

use crate::keys::{KeyKind, TableKey};
use crate::partition_store::{StorageAccess, StorageWrite};
use crate::{PartitionStore, PartitionStoreTransaction};

// Record keys are handed out in increasing order within a partition, so ordering the entries of
// a scope by record key yields the order in which they were deferred.
#[inline]
fn deferred_event_key(scope_key: Key, record_key: Key) -> Bytes {
    TableKey::new(KeyKind::DeferredEvent)
        .key(scope_key)
        .key(record_key)
        .build()
}

#[inline]
fn scope_prefix(scope_key: Key) -> Bytes {
    TableKey::new(KeyKind::DeferredEvent).key(scope_key).build()
}

fn get_deferred_events<S: StorageAccess>(storage: &S, scope_key: Key) -> Result<Vec<IndexedRecord>> {
    Ok(storage
        .scan_prefix::<IndexedRecord>(&scope_prefix(scope_key))?
        .into_iter()
        .map(|(_, record)| record)
        .collect())
}

fn remove_all_deferred_events<S: StorageWrite>(storage: &mut S, scope_key: Key) -> Result<()> {
    for (key, _) in storage.scan_prefix_raw(&scope_prefix(scope_key))? {
        storage.delete_raw(key);
    }
    Ok(())
}

impl ReadOnlyDeferredEventTable for PartitionStore {
    fn get_deferred_events(&self, scope_key: Key) -> Result<Vec<IndexedRecord>> {
        get_deferred_events(self, scope_key)
    }
}

impl ReadOnlyDeferredEventTable for PartitionStoreTransaction<'_> {
    fn get_deferred_events(&self, scope_key: Key) -> Result<Vec<IndexedRecord>> {
        get_deferred_events(self, scope_key)
    }
}

impl DeferredEventTable for PartitionStoreTransaction<'_> {
    fn put_deferred_event(&mut self, scope_key: Key, record: &IndexedRecord) -> Result<()> {
        self.put_value(deferred_event_key(scope_key, record.key), record)
    }

    fn remove_deferred_event(&mut self, scope_key: Key, record_key: Key) -> Result<()> {
        self.delete_raw(deferred_event_key(scope_key, record_key));
        Ok(())
    }

    fn remove_all_deferred_events(&mut self, scope_key: Key) -> Result<()> {
        remove_all_deferred_events(self, scope_key)
    }
}
