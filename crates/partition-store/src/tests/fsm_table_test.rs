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

use tokenflow_storage_api::fsm_table::{FsmTable, LastProcessed, ReadOnlyFsmTable};
use tokenflow_storage_api::{Storage, Transaction};

use crate::PartitionStore;

pub(crate) async fn run_tests(mut store: PartitionStore) {
    assert_that!(store.get_last_processed().unwrap(), none());
    assert_that!(store.get_next_local_key().unwrap(), none());

    let last_processed = LastProcessed {
        index: 7,
        position: 512,
    };
    let mut txn = store.transaction();
    txn.put_last_processed(last_processed).unwrap();
    txn.put_next_local_key(42).unwrap();
    txn.commit().await.unwrap();

    assert_that!(store.get_last_processed().unwrap(), some(eq(last_processed)));
    assert_that!(store.get_next_local_key().unwrap(), some(eq(42)));
}
