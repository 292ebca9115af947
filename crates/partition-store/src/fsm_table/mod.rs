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
use serde::{Deserialize, Serialize};

use tokenflow_storage_api::fsm_table::{FsmTable, LastProcessed, ReadOnlyFsmTable};
use tokenflow_storage_api::Result;

use crate::keys::{KeyKind, TableKey};
use crate::partition_store::{StorageAccess, StorageWrite};
use crate::{PartitionStore, PartitionStoreTransaction};

mod fsm_variable {
    pub(crate) const LAST_PROCESSED: u64 = 1;
    pub(crate) const NEXT_LOCAL_KEY: u64 = 2;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, derive_more::From, derive_more::Into)]
struct SequenceNumber(u64);

tokenflow_types::flexbuffers_storage_encode_decode!(SequenceNumber);

#[inline]
fn fsm_key(state_id: u64) -> Bytes {
    TableKey::new(KeyKind::Fsm).id(state_id).build()
}

fn get_last_processed<S: StorageAccess>(storage: &S) -> Result<Option<LastProcessed>> {
    storage.get_value(&fsm_key(fsm_variable::LAST_PROCESSED))
}

fn get_next_local_key<S: StorageAccess>(storage: &S) -> Result<Option<u64>> {
    Ok(storage
        .get_value::<SequenceNumber>(&fsm_key(fsm_variable::NEXT_LOCAL_KEY))?
        .map(u64::from))
}

impl ReadOnlyFsmTable for PartitionStore {
    fn get_last_processed(&self) -> Result<Option<LastProcessed>> {
        get_last_processed(self)
    }

    fn get_next_local_key(&self) -> Result<Option<u64>> {
        get_next_local_key(self)
    }
}

impl ReadOnlyFsmTable for PartitionStoreTransaction<'_> {
    fn get_last_processed(&self) -> Result<Option<LastProcessed>> {
        get_last_processed(self)
    }

    fn get_next_local_key(&self) -> Result<Option<u64>> {
        get_next_local_key(self)
    }
}

impl FsmTable for PartitionStoreTransaction<'_> {
    fn put_last_processed(&mut self, last_processed: LastProcessed) -> Result<()> {
        self.put_value(fsm_key(fsm_variable::LAST_PROCESSED), last_processed)
    }

    fn put_next_local_key(&mut self, next_local_key: u64) -> Result<()> {
        self.put_value(
            fsm_key(fsm_variable::NEXT_LOCAL_KEY),
            SequenceNumber::from(next_local_key),
        )
    }
}
