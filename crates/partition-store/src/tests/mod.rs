// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tempfile::TempDir;

use tokenflow_storage_api::element_instance_table::ElementInstance;
use tokenflow_types::identifiers::{Key, PartitionId};
use tokenflow_types::process::BpmnElementType;
use tokenflow_types::record::ProcessInstanceRecord;

use crate::PartitionStore;

mod deferred_event_table_test;
mod element_instance_table_test;
mod fsm_table_test;
mod transaction_test;

/// The store lives as long as the returned directory.
fn storage_test_environment() -> (TempDir, PartitionStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = PartitionStore::open(dir.path().join("state"), PartitionId::MIN).unwrap();
    (dir, store)
}

pub(crate) fn key(raw: u64) -> Key {
    Key::encode(PartitionId::MIN, raw)
}

pub(crate) fn mock_instance(key: Key, scope_key: Option<Key>, element_id: &str) -> ElementInstance {
    let element_type = if scope_key.is_some() {
        BpmnElementType::ServiceTask
    } else {
        BpmnElementType::Process
    };
    ElementInstance::new(
        key,
        ProcessInstanceRecord {
            bpmn_process_id: "order".to_owned(),
            version: 1,
            element_id: element_id.to_owned(),
            flow_scope_key: scope_key,
            bpmn_element_type: Some(element_type),
            ..Default::default()
        },
    )
}

#[test_log::test(tokio::test)]
async fn test_read_write() {
    let (_dir, store) = storage_test_environment();

    element_instance_table_test::run_tests(store.clone()).await;
    deferred_event_table_test::run_tests(store.clone()).await;
    fsm_table_test::run_tests(store.clone()).await;
}
