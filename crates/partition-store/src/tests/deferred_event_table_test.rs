// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use googletest::prelude::*;

use tokenflow_storage_api::deferred_event_table::{
    DeferredEventTable, IndexedRecord, ReadOnlyDeferredEventTable,
};
use tokenflow_storage_api::{Storage, Transaction};
use tokenflow_types::identifiers::Key;
use tokenflow_types::record::{Intent, ProcessInstanceRecord};

use super::key;
use crate::PartitionStore;

const SCOPE: u64 = 100;
const OTHER_SCOPE: u64 = 200;

fn mock_deferred(record_key: Key, element_id: &str) -> IndexedRecord {
    IndexedRecord::new(
        record_key,
        Intent::SequenceFlowTaken,
        ProcessInstanceRecord {
            element_id: element_id.to_owned(),
            flow_scope_key: Some(key(SCOPE)),
            ..Default::default()
        },
    )
}

async fn populate_data(store: &mut PartitionStore) {
    let mut txn = store.transaction();
    txn.put_deferred_event(key(SCOPE), &mock_deferred(key(103), "f3"))
        .unwrap();
    txn.put_deferred_event(key(SCOPE), &mock_deferred(key(101), "f1"))
        .unwrap();
    txn.put_deferred_event(key(OTHER_SCOPE), &mock_deferred(key(102), "f2"))
        .unwrap();
    txn.commit().await.unwrap();
}

async fn verify_order(store: &mut PartitionStore) {
    let deferred = store.get_deferred_events(key(SCOPE)).unwrap();
    assert_that!(
        deferred.iter().map(|r| r.key).collect::<Vec<_>>(),
        elements_are![eq(&key(101)), eq(&key(103))]
    );
    assert_that!(deferred[0].value.element_id, eq("f1"));
}

async fn verify_remove(store: &mut PartitionStore) {
    let mut txn = store.transaction();
    txn.remove_deferred_event(key(SCOPE), key(101)).unwrap();
    // removing twice is tolerated
    txn.remove_deferred_event(key(SCOPE), key(101)).unwrap();
    assert_that!(txn.get_deferred_events(key(SCOPE)).unwrap(), len(eq(1)));
    txn.commit().await.unwrap();

    let mut txn = store.transaction();
    txn.remove_all_deferred_events(key(SCOPE)).unwrap();
    txn.commit().await.unwrap();

    assert_that!(store.get_deferred_events(key(SCOPE)).unwrap(), len(eq(0)));
    assert_that!(store.get_deferred_events(key(OTHER_SCOPE)).unwrap(), len(eq(1)));
}

pub(crate) async fn run_tests(mut store: PartitionStore) {
    populate_data(&mut store).await;
    verify_order(&mut store).await;
    verify_remove(&mut store).await;
}
