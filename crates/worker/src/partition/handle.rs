// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tokio::sync::{mpsc, oneshot, watch};

use tokenflow_storage_api::element_instance_table::ElementInstance;
use tokenflow_storage_api::StorageError;
use tokenflow_types::identifiers::{Key, PartitionId};
use tokenflow_types::record::{Intent, ProcessInstanceRecord, Record, Variables};

use super::{CommandOutcome, PartitionProcessorRpc, PartitionStatus};

#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    #[error("partition {0} is unavailable")]
    Unavailable(PartitionId),
    #[error("partition {0} does not exist")]
    UnknownPartition(PartitionId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Client side of a partition processor.
#[derive(Debug, Clone)]
pub struct PartitionProcessorHandle {
    partition_id: PartitionId,
    tx: mpsc::Sender<PartitionProcessorRpc>,
    status: watch::Receiver<PartitionStatus>,
}

impl PartitionProcessorHandle {
    pub(super) fn new(
        partition_id: PartitionId,
        tx: mpsc::Sender<PartitionProcessorRpc>,
        status: watch::Receiver<PartitionStatus>,
    ) -> Self {
        Self {
            partition_id,
            tx,
            status,
        }
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    pub fn status(&self) -> PartitionStatus {
        *self.status.borrow()
    }

    /// Waits until the partition reports a status matching `predicate`.
    pub async fn wait_for_status(
        &self,
        predicate: impl Fn(PartitionStatus) -> bool,
    ) -> Result<PartitionStatus, PartitionError> {
        let mut status = self.status.clone();
        let result = status
            .wait_for(|current| predicate(*current))
            .await
            .map(|current| *current)
            .map_err(|_| PartitionError::Unavailable(self.partition_id));
        result
    }

    /// Appends a command to the journal of the partition and waits until it was processed.
    pub async fn submit(&self, command: Record) -> Result<CommandOutcome, PartitionError> {
        if self.status() == PartitionStatus::Faulted {
            return Err(PartitionError::Unavailable(self.partition_id));
        }

        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(PartitionProcessorRpc::Submit {
                command,
                response_tx,
            })
            .await
            .map_err(|_| PartitionError::Unavailable(self.partition_id))?;
        response_rx
            .await
            .map_err(|_| PartitionError::Unavailable(self.partition_id))
    }

    pub async fn create_process_instance(
        &self,
        bpmn_process_id: impl Into<String>,
        variables: Variables,
    ) -> Result<CommandOutcome, PartitionError> {
        self.submit(Record::command(
            None,
            Intent::Create,
            ProcessInstanceRecord {
                bpmn_process_id: bpmn_process_id.into(),
                variables,
                ..Default::default()
            },
        ))
        .await
    }

    pub async fn cancel_process_instance(&self, key: Key) -> Result<CommandOutcome, PartitionError> {
        self.submit(Record::command(
            Some(key),
            Intent::Cancel,
            ProcessInstanceRecord::default(),
        ))
        .await
    }

    pub async fn complete_element(
        &self,
        key: Key,
        variables: Variables,
    ) -> Result<CommandOutcome, PartitionError> {
        self.submit(Record::command(
            Some(key),
            Intent::CompleteElement,
            ProcessInstanceRecord {
                variables,
                ..Default::default()
            },
        ))
        .await
    }

    pub async fn get_element_instance(
        &self,
        key: Key,
    ) -> Result<Option<ElementInstance>, PartitionError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(PartitionProcessorRpc::GetElementInstance { key, response_tx })
            .await
            .map_err(|_| PartitionError::Unavailable(self.partition_id))?;
        Ok(response_rx
            .await
            .map_err(|_| PartitionError::Unavailable(self.partition_id))??)
    }
}
