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

use tokenflow_storage_api::element_instance_table::{
    ElementInstanceState, ElementInstanceTable, ReadOnlyElementInstanceTable,
};
use tokenflow_storage_api::{Storage, Transaction};

use super::{key, mock_instance};
use crate::PartitionStore;

async fn populate_data(store: &mut PartitionStore) {
    let mut process = mock_instance(key(1), None, "order");
    process.transition_to(ElementInstanceState::Activated).unwrap();
    process.spawn_token();
    process.spawn_token();

    let mut txn = store.transaction();
    txn.put_element_instance(&process).unwrap();
    txn.put_element_instance(&mock_instance(key(3), Some(key(1)), "ship"))
        .unwrap();
    txn.put_element_instance(&mock_instance(key(2), Some(key(1)), "pay"))
        .unwrap();
    txn.put_element_instance(&mock_instance(key(10), None, "other"))
        .unwrap();
    txn.commit().await.unwrap();
}

async fn verify_data(store: &mut PartitionStore) {
    let process = store.get_element_instance(key(1)).unwrap().unwrap();
    assert_that!(process.active_tokens(), eq(2));
    assert_that!(process.state(), eq(ElementInstanceState::Activated));
    assert_that!(process.parent_key(), none());

    let children = store.get_children(key(1)).unwrap();
    assert_that!(
        children.iter().map(|c| c.element_id()).collect::<Vec<_>>(),
        elements_are![eq(&"pay"), eq(&"ship")]
    );
    assert_that!(store.get_children(key(10)).unwrap(), len(eq(0)));
}

async fn verify_delete(store: &mut PartitionStore) {
    let mut txn = store.transaction();
    txn.delete_element_instance(key(2)).unwrap();
    // deleting an absent instance is a no-op
    txn.delete_element_instance(key(99)).unwrap();
    txn.commit().await.unwrap();

    assert_that!(store.get_element_instance(key(2)).unwrap(), none());
    let children = store.get_children(key(1)).unwrap();
    assert_that!(children, len(eq(1)));
    assert_that!(children[0].key(), eq(key(3)));
}

pub(crate) async fn run_tests(mut store: PartitionStore) {
    populate_data(&mut store).await;
    verify_data(&mut store).await;
    verify_delete(&mut store).await;
}
