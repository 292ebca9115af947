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

use tokenflow_storage_api::element_instance_table::{
    ElementInstance, ElementInstanceTable, ReadOnlyElementInstanceTable,
};
use tokenflow_storage_api::{Result, StorageError};
use tokenflow_types::identifiers::Key;

use crate::keys::{last_key_component, KeyKind, TableKey};
use crate::partition_store::{StorageAccess, StorageWrite};
use crate::{PartitionStore, PartitionStoreTransaction};

#[inline]
fn instance_key(key: Key) -> Bytes {
    TableKey::new(KeyKind::ElementInstance).key(key).build()
}

#[inline]
fn child_key(scope_key: Key, key: Key) -> Bytes {
    TableKey::new(KeyKind::ElementInstanceChild)
        .key(scope_key)
        .key(key)
        .build()
}

#[inline]
fn children_prefix(scope_key: Key) -> Bytes {
    TableKey::new(KeyKind::ElementInstanceChild)
        .key(scope_key)
        .build()
}

fn get_element_instance<S: StorageAccess>(
    storage: &S,
    key: Key,
) -> Result<Option<ElementInstance>> {
    storage.get_value(&instance_key(key))
}

fn get_children<S: StorageAccess>(storage: &S, scope_key: Key) -> Result<Vec<ElementInstance>> {
    storage
        .scan_prefix_raw(&children_prefix(scope_key))?
        .into_iter()
        .map(|(key, _)| {
            let child = last_key_component(&key)?;
            // the child index is written together with the instance
            get_element_instance(storage, child)?.ok_or(StorageError::DataIntegrityError)
        })
        .collect()
}

fn put_element_instance<S: StorageWrite>(storage: &mut S, instance: &ElementInstance) -> Result<()> {
    if let Some(scope_key) = instance.parent_key() {
        storage.put_raw(child_key(scope_key, instance.key()), Bytes::new());
    }
    storage.put_value(instance_key(instance.key()), instance)
}

fn delete_element_instance<S: StorageWrite>(storage: &mut S, key: Key) -> Result<()> {
    let Some(instance) = get_element_instance(storage, key)? else {
        return Ok(());
    };
    if let Some(scope_key) = instance.parent_key() {
        storage.delete_raw(child_key(scope_key, key));
    }
    storage.delete_raw(instance_key(key));
    Ok(())
}

impl ReadOnlyElementInstanceTable for PartitionStore {
    fn get_element_instance(&self, key: Key) -> Result<Option<ElementInstance>> {
        get_element_instance(self, key)
    }

    fn get_children(&self, scope_key: Key) -> Result<Vec<ElementInstance>> {
        get_children(self, scope_key)
    }
}

impl ReadOnlyElementInstanceTable for PartitionStoreTransaction<'_> {
    fn get_element_instance(&self, key: Key) -> Result<Option<ElementInstance>> {
        get_element_instance(self, key)
    }

    fn get_children(&self, scope_key: Key) -> Result<Vec<ElementInstance>> {
        get_children(self, scope_key)
    }
}

impl ElementInstanceTable for PartitionStoreTransaction<'_> {
    fn put_element_instance(&mut self, instance: &ElementInstance) -> Result<()> {
        put_element_instance(self, instance)
    }

    fn delete_element_instance(&mut self, key: Key) -> Result<()> {
        delete_element_instance(self, key)
    }
}
