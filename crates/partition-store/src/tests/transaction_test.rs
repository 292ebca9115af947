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
use test_log::test;

use tokenflow_storage_api::element_instance_table::{
    ElementInstanceTable, ReadOnlyElementInstanceTable,
};
use tokenflow_storage_api::fsm_table::{FsmTable, LastProcessed, ReadOnlyFsmTable};
use tokenflow_storage_api::{Storage, StorageError, Transaction};
use tokenflow_types::errors::MaybeRetryableError;
use tokenflow_types::identifiers::PartitionId;

use super::{key, mock_instance, storage_test_environment};
use crate::PartitionStore;

#[test(tokio::test)]
async fn transaction_reads_its_own_writes() {
    let (_dir, mut store) = storage_test_environment();

    let mut txn = store.transaction();
    txn.put_element_instance(&mock_instance(key(1), None, "order"))
        .unwrap();
    txn.put_element_instance(&mock_instance(key(2), Some(key(1)), "pay"))
        .unwrap();
    assert_that!(txn.get_element_instance(key(1)).unwrap(), some(anything()));
    assert_that!(txn.get_children(key(1)).unwrap(), len(eq(1)));

    txn.delete_element_instance(key(2)).unwrap();
    assert_that!(txn.get_children(key(1)).unwrap(), len(eq(0)));
    txn.commit().await.unwrap();

    assert_that!(store.get_element_instance(key(1)).unwrap(), some(anything()));
    assert_that!(store.get_element_instance(key(2)).unwrap(), none());
}

#[test(tokio::test)]
async fn dropped_transaction_is_rolled_back() {
    let (_dir, mut store) = storage_test_environment();

    {
        let mut txn = store.transaction();
        txn.put_next_local_key(10).unwrap();
    }

    assert_that!(store.get_next_local_key().unwrap(), none());
    assert!(store.is_empty().unwrap());
}

#[test(tokio::test)]
async fn injected_commit_failures_are_transient() {
    let (_dir, mut store) = storage_test_environment();
    store.fail_next_commits(2);

    for _ in 0..2 {
        let mut txn = store.transaction();
        txn.put_next_local_key(10).unwrap();
        let err = txn.commit().await.unwrap_err();
        assert!(matches!(err, StorageError::Transient(_)));
        assert!(err.retryable());
    }
    assert_that!(store.get_next_local_key().unwrap(), none());

    let mut txn = store.transaction();
    txn.put_next_local_key(10).unwrap();
    txn.commit().await.unwrap();
    assert_that!(store.get_next_local_key().unwrap(), some(eq(10)));
}

#[test(tokio::test)]
async fn dump_is_deterministic() {
    async fn build() -> bytes::Bytes {
        let (_dir, mut store) = storage_test_environment();
        let mut txn = store.transaction();
        // insertion order must not matter
        txn.put_element_instance(&mock_instance(key(2), Some(key(1)), "pay"))
            .unwrap();
        txn.put_element_instance(&mock_instance(key(1), None, "order"))
            .unwrap();
        txn.put_next_local_key(3).unwrap();
        txn.commit().await.unwrap();
        store.dump().unwrap()
    }

    let first = build().await;
    let second = build().await;
    assert_that!(first.is_empty(), eq(false));
    assert_that!(first, eq(&second));
}

#[test(tokio::test)]
async fn committed_state_survives_reopen() {
    let (dir, mut store) = storage_test_environment();
    let path = store.path().to_path_buf();

    let mut txn = store.transaction();
    txn.put_element_instance(&mock_instance(key(1), None, "order"))
        .unwrap();
    txn.put_element_instance(&mock_instance(key(2), Some(key(1)), "pay"))
        .unwrap();
    txn.put_last_processed(LastProcessed {
        index: 3,
        position: 96,
    })
    .unwrap();
    txn.commit().await.unwrap();

    // uncommitted writes are lost
    let mut txn = store.transaction();
    txn.put_next_local_key(10).unwrap();
    drop(txn);
    drop(store);

    let store = PartitionStore::open(&path, PartitionId::MIN).unwrap();
    assert_that!(store.get_children(key(1)).unwrap(), len(eq(1)));
    assert_that!(
        store.get_last_processed().unwrap(),
        some(eq(LastProcessed {
            index: 3,
            position: 96,
        }))
    );
    assert_that!(store.get_next_local_key().unwrap(), none());
    drop(dir);
}
