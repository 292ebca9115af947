// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tokenflow_journal::SegmentedJournal;
use tokenflow_partition_store::PartitionStore;
use tokenflow_storage_api::element_instance_table::ElementInstance;
use tokenflow_types::config::Configuration;
use tokenflow_types::identifiers::{Key, PartitionId};
use tokenflow_types::record::Variables;

use crate::exporter::{Exporter, ExporterDirector, LoggingExporter};
use crate::partition::{
    CommandOutcome, PartitionError, PartitionProcessor, PartitionProcessorHandle,
    ProcessorError,
};
use crate::process_repository::ProcessRepository;

/// Runs the partition processors of this node and routes commands to them.
pub struct PartitionProcessorManager {
    handles: BTreeMap<PartitionId, PartitionProcessorHandle>,
    tasks: JoinSet<(PartitionId, Result<(), ProcessorError>)>,
    cancellation: CancellationToken,
    next_create_partition: AtomicUsize,
}

impl PartitionProcessorManager {
    /// Opens the journals of all partitions and spawns one processor task per partition. Must
    /// be called from within a tokio runtime.
    pub fn start(
        configuration: &Configuration,
        processes: ProcessRepository,
    ) -> anyhow::Result<Self> {
        let cancellation = CancellationToken::new();
        let mut handles = BTreeMap::new();
        let mut tasks = JoinSet::new();

        let mut partition_id = PartitionId::MIN;
        for _ in 0..configuration.worker.num_partitions.get() {
            let partition_dir = configuration
                .common
                .data_dir()
                .join(format!("partition-{partition_id}"));
            let journal_dir = partition_dir.join("journal");
            let journal = SegmentedJournal::open(&journal_dir, &configuration.journal)
                .with_context(|| {
                    format!("failed opening journal of partition {partition_id} in {journal_dir:?}")
                })?;

            let state_dir = partition_dir.join("state");
            let store = PartitionStore::open(&state_dir, partition_id).with_context(|| {
                format!("failed opening state of partition {partition_id} in {state_dir:?}")
            })?;

            let exporters: Vec<Box<dyn Exporter>> = vec![Box::new(LoggingExporter)];
            let (processor, handle) = PartitionProcessor::new(
                partition_id,
                journal,
                store,
                processes.clone(),
                ExporterDirector::new(partition_id, exporters),
                &configuration.worker,
                cancellation.child_token(),
            );
            tasks.spawn(async move { (partition_id, processor.run().await) });
            handles.insert(partition_id, handle);
            debug!(%partition_id, "Started partition processor");

            partition_id = partition_id.next();
        }
        info!(num_partitions = handles.len(), "Started partition processors");

        Ok(Self {
            handles,
            tasks,
            cancellation,
            next_create_partition: AtomicUsize::new(0),
        })
    }

    pub fn handles(&self) -> impl Iterator<Item = &PartitionProcessorHandle> {
        self.handles.values()
    }

    pub fn handle(&self, partition_id: PartitionId) -> Result<&PartitionProcessorHandle, PartitionError> {
        self.handles
            .get(&partition_id)
            .ok_or(PartitionError::UnknownPartition(partition_id))
    }

    /// Keys carry the partition which generated them.
    fn handle_of(&self, key: Key) -> Result<&PartitionProcessorHandle, PartitionError> {
        self.handle(key.partition_id())
    }

    /// New process instances are spread round-robin over the partitions.
    pub async fn create_process_instance(
        &self,
        bpmn_process_id: impl Into<String>,
        variables: Variables,
    ) -> Result<CommandOutcome, PartitionError> {
        let next = self.next_create_partition.fetch_add(1, Ordering::Relaxed);
        let Some(handle) = self.handles.values().nth(next % self.handles.len().max(1)) else {
            return Err(PartitionError::UnknownPartition(PartitionId::MIN));
        };
        handle
            .create_process_instance(bpmn_process_id, variables)
            .await
    }

    pub async fn cancel_process_instance(&self, key: Key) -> Result<CommandOutcome, PartitionError> {
        self.handle_of(key)?.cancel_process_instance(key).await
    }

    pub async fn complete_element(
        &self,
        key: Key,
        variables: Variables,
    ) -> Result<CommandOutcome, PartitionError> {
        self.handle_of(key)?.complete_element(key, variables).await
    }

    pub async fn get_element_instance(
        &self,
        key: Key,
    ) -> Result<Option<ElementInstance>, PartitionError> {
        self.handle_of(key)?.get_element_instance(key).await
    }

    /// Waits until a processor stops on its own, e.g. because it faulted.
    pub async fn next_stopped(&mut self) -> Option<(PartitionId, Result<(), ProcessorError>)> {
        loop {
            match self.tasks.join_next().await? {
                Ok(stopped) => return Some(stopped),
                Err(err) => warn!(%err, "Partition processor task panicked"),
            }
        }
    }

    /// Stops all processors and waits for them to finish.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.cancellation.cancel();

        let mut failed = Vec::new();
        while let Some((partition_id, result)) = self.next_stopped().await {
            if let Err(err) = result {
                failed.push(partition_id);
                warn!(%partition_id, %err, "Partition processor stopped with an error");
            }
        }
        info!("All partition processors stopped");

        if !failed.is_empty() {
            anyhow::bail!("partition processors {failed:?} failed");
        }
        Ok(())
    }
}
