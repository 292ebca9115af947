// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

mod cancellation;
mod commands;

use std::collections::VecDeque;

use tempfile::TempDir;

use tokenflow_partition_store::PartitionStore;
use tokenflow_storage_api::deferred_event_table::{IndexedRecord, ReadOnlyDeferredEventTable};
use tokenflow_storage_api::element_instance_table::{
    ElementInstance, ReadOnlyElementInstanceTable,
};
use tokenflow_storage_api::{Storage, Transaction};
use tokenflow_types::identifiers::{Key, PartitionId, Position};
use tokenflow_types::process::ProcessBuilder;
use tokenflow_types::record::{Intent, ProcessInstanceRecord, Record, Variables};

use super::{ApplyResult, CommandResponse, Error, StateMachine};
use crate::process_repository::ProcessRepository;

/// Drives a [`StateMachine`] like a partition processor does: every record is applied in its
/// own transaction and follow-up records are appended to the end of the log.
pub(super) struct TestEnv {
    _dir: TempDir,
    pub store: PartitionStore,
    pub processes: ProcessRepository,
    state_machine: StateMachine,
    queue: VecDeque<Record>,
    /// Every applied record, in application order.
    pub log: Vec<Record>,
    next_position: Position,
}

impl TestEnv {
    pub fn new() -> Self {
        let processes = ProcessRepository::default();
        let (dir, store) = temp_store();
        Self {
            _dir: dir,
            store,
            state_machine: StateMachine::new(PartitionId::MIN, processes.clone()),
            processes,
            queue: VecDeque::new(),
            log: Vec::new(),
            next_position: 1,
        }
    }

    pub fn deploy(&self, builder: ProcessBuilder) {
        self.processes.deploy(builder.build().unwrap());
    }

    pub fn submit(&mut self, record: Record) {
        self.queue.push_back(record);
    }

    /// Applies `record` at the next position of the log, ahead of all queued records. Its writes
    /// are committed only if it was applied successfully.
    pub async fn apply(&mut self, mut record: Record) -> Result<ApplyResult, Error> {
        record.position = self.next_position;
        self.next_position += 1;

        let mut txn = self.store.transaction();
        let result = self.state_machine.apply(&record, &mut txn)?;
        txn.commit().await?;

        self.log.push(record);
        Ok(result)
    }

    /// Applies the next record of the log and returns it together with its response.
    pub async fn step(&mut self) -> Option<(Record, Option<CommandResponse>)> {
        let record = self.queue.pop_front()?;
        let result = self.apply(record).await.unwrap();

        self.queue.extend(result.follow_ups);
        let record = self.log.last().cloned()?;
        Some((record, result.response))
    }

    /// Applies records until the log is exhausted. Returns the responses to the applied
    /// commands in order.
    pub async fn run(&mut self) -> Vec<CommandResponse> {
        let mut responses = Vec::new();
        while let Some((_, response)) = self.step().await {
            responses.extend(response);
        }
        responses
    }

    /// Applies records up to and including the first one matching `predicate`.
    pub async fn run_until(&mut self, predicate: impl Fn(&Record) -> bool) -> Record {
        loop {
            let (record, _) = self.step().await.expect("log exhausted");
            if predicate(&record) {
                return record;
            }
        }
    }

    pub async fn execute(&mut self, command: Record) -> CommandResponse {
        self.submit(command);
        let mut responses = self.run().await;
        assert_eq!(1, responses.len(), "expected a single response");
        responses.remove(0)
    }

    pub async fn create(&mut self, bpmn_process_id: &str) -> Key {
        self.create_with_variables(bpmn_process_id, Variables::new())
            .await
    }

    pub async fn create_with_variables(
        &mut self,
        bpmn_process_id: &str,
        variables: Variables,
    ) -> Key {
        match self.execute(create(bpmn_process_id, variables)).await {
            CommandResponse::Accepted { key } => key,
            CommandResponse::Rejected(rejection) => panic!("create rejected: {rejection:?}"),
        }
    }

    pub fn instance(&self, key: Key) -> Option<ElementInstance> {
        self.store.get_element_instance(key).unwrap()
    }

    pub fn deferred(&self, scope_key: Key) -> Vec<IndexedRecord> {
        self.store.get_deferred_events(scope_key).unwrap()
    }

    /// Keys of the instances of `element_id` which are currently activated.
    pub fn active_instances(&self, element_id: &str) -> Vec<Key> {
        self.log
            .iter()
            .filter(|record| {
                record.is_event()
                    && record.intent == Intent::ElementActivated
                    && record.value.element_id == element_id
            })
            .filter_map(|record| record.key)
            .filter(|key| self.instance(*key).is_some_and(|i| i.is_active()))
            .collect()
    }

    pub fn task(&self, element_id: &str) -> Key {
        let keys = self.active_instances(element_id);
        assert_eq!(1, keys.len(), "expected one active '{element_id}'");
        keys[0]
    }

    pub fn events(&self, intent: Intent, element_id: &str) -> Vec<&Record> {
        self.log
            .iter()
            .filter(|record| {
                record.is_event() && record.intent == intent && record.value.element_id == element_id
            })
            .collect()
    }

    pub fn lifecycle_of(&self, key: Key) -> Vec<Intent> {
        self.log
            .iter()
            .filter(|record| record.is_event() && record.key == Some(key))
            .map(|record| record.intent)
            .collect()
    }
}

/// A store in a fresh directory, which is removed once the returned [`TempDir`] is dropped.
pub(super) fn temp_store() -> (TempDir, PartitionStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = PartitionStore::open(dir.path().join("state"), PartitionId::MIN).unwrap();
    (dir, store)
}

pub(super) fn create(bpmn_process_id: &str, variables: Variables) -> Record {
    Record::command(
        None,
        Intent::Create,
        ProcessInstanceRecord {
            bpmn_process_id: bpmn_process_id.to_owned(),
            variables,
            ..Default::default()
        },
    )
}

pub(super) fn complete(key: Key, variables: Variables) -> Record {
    Record::command(
        Some(key),
        Intent::CompleteElement,
        ProcessInstanceRecord {
            variables,
            ..Default::default()
        },
    )
}

pub(super) fn cancel(key: Key) -> Record {
    Record::command(Some(key), Intent::Cancel, ProcessInstanceRecord::default())
}

pub(super) fn variables(entries: &[(&str, serde_json::Value)]) -> Variables {
    entries
        .iter()
        .map(|(name, value)| ((*name).to_owned(), value.clone()))
        .collect()
}

pub(super) fn one_task() -> ProcessBuilder {
    ProcessBuilder::new("one-task")
        .start_event("start")
        .service_task("task")
        .end_event("end")
        .sequence_flow("f1", "start", "task")
        .sequence_flow("f2", "task", "end")
}
