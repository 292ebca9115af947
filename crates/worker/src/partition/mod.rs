// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The partition processor: a single task owning the journal and the state of one partition.
//!
//! Records are processed strictly in journal order. Every record is applied in its own store
//! transaction, its follow-up records are appended to the journal and flushed before that
//! transaction commits. A crash between the two is repaired on start: records whose follow-ups
//! are already in the journal are applied once more without appending them again.

mod handle;
pub mod state_machine;

use std::collections::HashMap;
use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use tokenflow_journal::{Journal, JournalError, FIRST_INDEX};
use tokenflow_partition_store::PartitionStore;
use tokenflow_storage_api::element_instance_table::{
    ElementInstance, ReadOnlyElementInstanceTable,
};
use tokenflow_storage_api::fsm_table::{FsmTable, LastProcessed, ReadOnlyFsmTable};
use tokenflow_storage_api::{Storage, StorageError, Transaction};
use tokenflow_types::config::WorkerOptions;
use tokenflow_types::errors::MaybeRetryableError;
use tokenflow_types::identifiers::{Key, PartitionId, Position};
use tokenflow_types::record::{Record, Rejection};
use tokenflow_types::retries::RetryPolicy;
use tokenflow_types::storage::{StorageCodec, StorageEncodeError};

use crate::exporter::ExporterDirector;
use crate::process_repository::ProcessRepository;

use self::state_machine::{CommandResponse, ProcessingFault, StateMachine};

pub use self::handle::{PartitionError, PartitionProcessorHandle};

const EXPORT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
pub enum PartitionStatus {
    Starting,
    /// Re-applying records whose follow-ups were written before the last shutdown.
    Replaying,
    Active,
    /// Processing stopped on an error. Commands are refused until the partition is restarted.
    Faulted,
    Stopped,
}

/// Outcome of a client command once it was processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command was accepted. `position` is the journal position of the command.
    Accepted { key: Key, position: Position },
    Rejected(Rejection),
}

pub enum PartitionProcessorRpc {
    Submit {
        command: Record,
        response_tx: oneshot::Sender<CommandOutcome>,
    },
    GetElementInstance {
        key: Key,
        response_tx: oneshot::Sender<Result<Option<ElementInstance>, StorageError>>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Apply(#[from] state_machine::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error("failed encoding record: {0}")]
    Encode(#[from] StorageEncodeError),
    #[error("journal entry {0} is not available")]
    MissingEntry(u64),
    #[error("partition state resumes at journal index {next_index} but the journal starts at index {first_index}")]
    StateBehindJournal { next_index: u64, first_index: u64 },
    #[error("giving up on journal entry {index} after {attempts} attempts: {source}")]
    RetriesExhausted {
        index: u64,
        attempts: usize,
        source: Box<ProcessorError>,
    },
}

impl MaybeRetryableError for ProcessorError {
    fn retryable(&self) -> bool {
        match self {
            ProcessorError::Apply(err) => err.retryable(),
            ProcessorError::Storage(err) => err.retryable(),
            _ => false,
        }
    }
}

pub struct PartitionProcessor<J> {
    partition_id: PartitionId,
    journal: J,
    store: PartitionStore,
    state_machine: StateMachine,
    exporters: ExporterDirector,
    commit_retry_policy: RetryPolicy,

    rpc_rx: mpsc::Receiver<PartitionProcessorRpc>,
    status_tx: watch::Sender<PartitionStatus>,
    cancellation: CancellationToken,

    /// Journal index of the next record to process.
    next_index: u64,
    /// Commands from this index on were submitted to this processor instance. Only those are
    /// answered, older commands are replayed or were submitted before a restart.
    respond_from_index: u64,
    /// Number of follow-up records already in the journal, by the position of their source.
    written_follow_ups: HashMap<Position, usize>,
    replay_until: Option<Position>,

    pending_requests: HashMap<u64, oneshot::Sender<CommandOutcome>>,
    next_request_id: u64,
    encode_buf: BytesMut,
}

impl<J: Journal> PartitionProcessor<J> {
    pub fn new(
        partition_id: PartitionId,
        journal: J,
        store: PartitionStore,
        processes: ProcessRepository,
        exporters: ExporterDirector,
        options: &WorkerOptions,
        cancellation: CancellationToken,
    ) -> (Self, PartitionProcessorHandle) {
        let (rpc_tx, rpc_rx) = mpsc::channel(options.internal_queue_length);
        let (status_tx, status_rx) = watch::channel(PartitionStatus::Starting);

        let processor = Self {
            partition_id,
            journal,
            store,
            state_machine: StateMachine::new(partition_id, processes),
            exporters,
            commit_retry_policy: options.commit_retry_policy.clone(),
            rpc_rx,
            status_tx,
            cancellation,
            next_index: 0,
            respond_from_index: 0,
            written_follow_ups: HashMap::new(),
            replay_until: None,
            pending_requests: HashMap::new(),
            next_request_id: 0,
            encode_buf: BytesMut::new(),
        };
        let handle = PartitionProcessorHandle::new(partition_id, rpc_tx, status_rx);
        (processor, handle)
    }

    #[instrument(level = "info", skip_all, fields(partition_id = %self.partition_id))]
    pub async fn run(mut self) -> Result<(), ProcessorError> {
        let result = self.run_inner().await;

        // pending clients learn about the shutdown through their dropped response channel
        self.pending_requests.clear();
        match &result {
            Ok(()) => {
                debug!("Shutting partition processor down.");
                self.set_status(PartitionStatus::Stopped);
            }
            Err(err) => {
                error!(%err, next_index = self.next_index, "Partition processor failed");
                self.set_status(PartitionStatus::Faulted);
            }
        }
        result
    }

    async fn run_inner(&mut self) -> Result<(), ProcessorError> {
        self.recover()?;
        self.exporters.export(&self.journal);

        let cancellation = self.cancellation.clone();
        let mut export_retry = tokio::time::interval(EXPORT_RETRY_INTERVAL);

        loop {
            if cancellation.is_cancelled() {
                return Ok(());
            }

            while let Ok(rpc) = self.rpc_rx.try_recv() {
                self.on_rpc(rpc)?;
            }

            if self.next_index < self.journal.next_index() {
                self.process_next().await?;
                // give other partitions a chance to run
                tokio::task::yield_now().await;
                continue;
            }

            let exporters_lagging = self.exporters.is_lagging(&self.journal);
            tokio::select! {
                _ = cancellation.cancelled() => return Ok(()),
                rpc = self.rpc_rx.recv() => match rpc {
                    Some(rpc) => self.on_rpc(rpc)?,
                    None => return Ok(()),
                },
                _ = export_retry.tick(), if exporters_lagging => {
                    self.exporters.export(&self.journal);
                }
            }
        }
    }

    /// Determines where processing continues and which records are replayed.
    fn recover(&mut self) -> Result<(), ProcessorError> {
        let last_processed = self.store.get_last_processed()?;
        self.next_index = last_processed.map_or(FIRST_INDEX, |last| last.index + 1);
        self.respond_from_index = self.journal.next_index();

        // records between the persisted state and the journal head are lost for good
        let first_index = self.journal.first_index();
        if self.next_index < first_index {
            return Err(ProcessorError::StateBehindJournal {
                next_index: self.next_index,
                first_index,
            });
        }

        let mut first_position = None;
        for entry in self.journal.reader(self.next_index) {
            let entry = entry?;
            let first_position = *first_position.get_or_insert(entry.position);
            let record = decode(entry.index, entry.position, &entry.payload)?;

            // follow-ups of already processed records are of no interest
            if let Some(source) = record.source_position.filter(|s| *s >= first_position) {
                *self.written_follow_ups.entry(source).or_default() += 1;
                self.replay_until = self.replay_until.max(Some(source));
            }
        }

        info!(
            next_index = self.next_index,
            last_index = ?self.journal.last_index(),
            replay_until = ?self.replay_until,
            "Recovered partition"
        );
        if self.replay_until.is_some() {
            self.set_status(PartitionStatus::Replaying);
        } else {
            self.set_status(PartitionStatus::Active);
        }
        Ok(())
    }

    fn on_rpc(&mut self, rpc: PartitionProcessorRpc) -> Result<(), ProcessorError> {
        match rpc {
            PartitionProcessorRpc::Submit {
                command,
                response_tx,
            } => {
                let request_id = self.next_request_id;
                self.next_request_id += 1;

                let command = command.with_request_id(request_id);
                let payload = StorageCodec::encode_and_split(&command, &mut self.encode_buf)?;
                let entry = self.journal.append(payload)?;
                self.journal.flush()?;
                debug!(
                    request_id,
                    index = entry.index,
                    intent = %command.intent,
                    "Appended client command"
                );
                self.pending_requests.insert(request_id, response_tx);
            }
            PartitionProcessorRpc::GetElementInstance { key, response_tx } => {
                let _ = response_tx.send(self.store.get_element_instance(key));
            }
        }
        Ok(())
    }

    async fn process_next(&mut self) -> Result<(), ProcessorError> {
        let index = self.next_index;
        let entry = self
            .journal
            .read(index)?
            .ok_or(ProcessorError::MissingEntry(index))?;
        let record = decode(index, entry.position, &entry.payload)?;

        let written = self
            .written_follow_ups
            .remove(&record.position)
            .unwrap_or_default();
        let response = self.process_with_retries(&record, index, written).await?;
        self.next_index += 1;

        if self
            .replay_until
            .is_some_and(|replay_until| record.position >= replay_until)
        {
            self.replay_until = None;
            info!(position = record.position, "Replay finished");
            self.set_status(PartitionStatus::Active);
        }

        if let Some(response) = response {
            if index >= self.respond_from_index {
                self.respond(&record, response);
            }
        }
        self.exporters.export(&self.journal);
        Ok(())
    }

    async fn process_with_retries(
        &mut self,
        record: &Record,
        index: u64,
        mut written_follow_ups: usize,
    ) -> Result<Option<CommandResponse>, ProcessorError> {
        let mut retries = self.commit_retry_policy.clone().into_iter();
        loop {
            match self
                .try_process(record, index, &mut written_follow_ups)
                .await
            {
                Ok(response) => return Ok(response),
                Err(err) if err.retryable() => match retries.next() {
                    Some(delay) => {
                        warn!(
                            %err,
                            index,
                            attempt = retries.attempts(),
                            "Processing record failed with a transient error, retrying in {delay:?}"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(ProcessorError::RetriesExhausted {
                            index,
                            attempts: retries.attempts(),
                            source: Box::new(err),
                        })
                    }
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// Applies the record in a fresh transaction. Follow-ups are only appended once, a retry
    /// skips those which made it into the journal.
    async fn try_process(
        &mut self,
        record: &Record,
        index: u64,
        written_follow_ups: &mut usize,
    ) -> Result<Option<CommandResponse>, ProcessorError> {
        let mut txn = self.store.transaction();
        let result = self.state_machine.apply(record, &mut txn)?;
        txn.put_last_processed(LastProcessed {
            index,
            position: record.position,
        })?;

        if *written_follow_ups < result.follow_ups.len() {
            for follow_up in &result.follow_ups[*written_follow_ups..] {
                let payload = StorageCodec::encode_and_split(follow_up, &mut self.encode_buf)?;
                self.journal.append(payload)?;
                *written_follow_ups += 1;
            }
            self.journal.flush()?;
        }

        txn.commit().await?;
        Ok(result.response)
    }

    fn respond(&mut self, command: &Record, response: CommandResponse) {
        let Some(response_tx) = command
            .request_id
            .and_then(|request_id| self.pending_requests.remove(&request_id))
        else {
            return;
        };

        let outcome = match response {
            CommandResponse::Accepted { key } => CommandOutcome::Accepted {
                key,
                position: command.position,
            },
            CommandResponse::Rejected(rejection) => CommandOutcome::Rejected(rejection),
        };
        // the client may have given up waiting
        let _ = response_tx.send(outcome);
    }

    fn set_status(&self, status: PartitionStatus) {
        self.status_tx.send_replace(status);
    }
}

fn decode(index: u64, position: Position, payload: &bytes::Bytes) -> Result<Record, ProcessorError> {
    let mut record: Record = StorageCodec::decode(&mut payload.clone())
        .map_err(|source| state_machine::Error::from(ProcessingFault::Codec { index, source }))?;
    record.position = position;
    Ok(record)
}
