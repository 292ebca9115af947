// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The BPMN step processor.
//!
//! The state machine receives one record at a time, in journal order, and turns it into state
//! changes plus follow-up records. Commands are validated by a [`CommandHandler`] and either
//! rejected or turned into their first event. Events are dispatched to the [`BpmnStepHandler`]
//! registered for the element type and intent of the record.
//!
//! Applying a record only reads and writes the given storage, and all keys are taken from the key
//! generator persisted in the same storage. Re-applying the same records on the same state
//! therefore always yields the same state and the same follow-up records.

mod commands;
mod context;
mod event_output;
mod handlers;
mod key_generator;
mod registry;

#[cfg(test)]
mod tests;

use tracing::{instrument, trace};

use tokenflow_storage_api::deferred_event_table::DeferredEventTable;
use tokenflow_storage_api::element_instance_table::{
    ElementInstanceTable, IllegalTransition, TokenUnderflow,
};
use tokenflow_storage_api::fsm_table::FsmTable;
use tokenflow_storage_api::StorageError;
use tokenflow_types::errors::MaybeRetryableError;
use tokenflow_types::identifiers::{Key, PartitionId, Position, ProcessDefinitionKey};
use tokenflow_types::process::BpmnElementType;
use tokenflow_types::record::{Intent, Record, RecordType};
use tokenflow_types::storage::StorageDecodeError;

use crate::process_repository::ProcessRepository;

use self::commands::CommandContext;
use self::context::BpmnStepContext;
use self::registry::StepHandlerRegistry;

pub use self::event_output::{CommandResponse, EventOutput};
pub use self::key_generator::KeyGenerator;

/// State a step may touch.
pub trait StepStorage: ElementInstanceTable + DeferredEventTable + FsmTable {}

impl<T: ElementInstanceTable + DeferredEventTable + FsmTable> StepStorage for T {}

/// Unexpected conditions which indicate that the journal and the deployed processes diverged, or
/// that an invariant of the state machine broke. Every replica reaches the same fault when
/// applying the same journal, so processing must halt instead of skipping the record.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingFault {
    #[error("{intent} record at position {position} references no process definition")]
    MissingProcessDefinitionKey { intent: Intent, position: Position },
    #[error("unknown process definition {0}")]
    UnknownProcessDefinition(ProcessDefinitionKey),
    #[error("element '{element_id}' is not part of process '{bpmn_process_id}'")]
    UnknownElement {
        bpmn_process_id: String,
        element_id: String,
    },
    #[error("{intent} record has no key")]
    MissingRecordKey { intent: Intent },
    #[error("flow scope of element '{element_id}' does not exist (scope key: {scope_key:?})")]
    MissingFlowScope {
        element_id: String,
        scope_key: Option<Key>,
    },
    #[error("element instance {0} does not exist")]
    MissingElementInstance(Key),
    #[error("container '{0}' has no start event")]
    MissingStartEvent(String),
    #[error(transparent)]
    TokenUnderflow(#[from] TokenUnderflow),
    #[error("no handler for {intent} of a {element_type}")]
    MissingHandler {
        element_type: BpmnElementType,
        intent: Intent,
    },
    #[error("sequence flows cannot target '{element_id}' of type {element_type}")]
    UnsupportedFlowTarget {
        element_id: String,
        element_type: BpmnElementType,
    },
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
    #[error("failed decoding record at journal index {index}: {source}")]
    Codec {
        index: u64,
        source: StorageDecodeError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("processing fault: {0}")]
    Fault(#[from] ProcessingFault),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<TokenUnderflow> for Error {
    fn from(value: TokenUnderflow) -> Self {
        Error::Fault(value.into())
    }
}

impl From<IllegalTransition> for Error {
    fn from(value: IllegalTransition) -> Self {
        Error::Fault(value.into())
    }
}

impl MaybeRetryableError for Error {
    fn retryable(&self) -> bool {
        match self {
            Error::Fault(_) => false,
            Error::Storage(err) => err.retryable(),
        }
    }
}

/// Outcome of applying one record.
#[derive(Debug, Default)]
pub struct ApplyResult {
    /// Records to append to the journal, in order.
    pub follow_ups: Vec<Record>,
    /// Answer for the client which submitted the applied command.
    pub response: Option<CommandResponse>,
}

pub struct StateMachine {
    partition_id: PartitionId,
    processes: ProcessRepository,
    registry: StepHandlerRegistry,
}

impl StateMachine {
    pub fn new(partition_id: PartitionId, processes: ProcessRepository) -> Self {
        Self {
            partition_id,
            processes,
            registry: StepHandlerRegistry::default(),
        }
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    #[instrument(
        level = "debug",
        skip_all,
        fields(
            partition_id = %self.partition_id,
            position = record.position,
            intent = %record.intent,
            key = ?record.key,
        )
    )]
    pub fn apply<S: StepStorage>(
        &self,
        record: &Record,
        storage: &mut S,
    ) -> Result<ApplyResult, Error> {
        let next_local_key = storage.get_next_local_key()?;
        let mut output = EventOutput::new(
            record.position,
            KeyGenerator::new(self.partition_id, next_local_key),
        );

        match record.record_type {
            RecordType::Command => {
                let mut ctx = CommandContext {
                    record,
                    processes: &self.processes,
                    storage: &mut *storage,
                    output: &mut output,
                };
                commands::apply(&mut ctx)?;
            }
            RecordType::Event => self.on_event(record, storage, &mut output)?,
            RecordType::CommandRejection => {
                trace!("Nothing to apply for command rejection");
            }
        }

        let (key_generator, follow_ups, response) = output.into_parts();
        if key_generator.next_local_key()
            != next_local_key.unwrap_or(KeyGenerator::FIRST_LOCAL_KEY)
        {
            storage.put_next_local_key(key_generator.next_local_key())?;
        }

        Ok(ApplyResult {
            follow_ups,
            response,
        })
    }

    fn on_event(
        &self,
        record: &Record,
        storage: &mut dyn StepStorage,
        output: &mut EventOutput,
    ) -> Result<(), Error> {
        let value = &record.value;
        let definition_key =
            value
                .process_definition_key
                .ok_or(ProcessingFault::MissingProcessDefinitionKey {
                    intent: record.intent,
                    position: record.position,
                })?;
        let deployed = self
            .processes
            .get_by_key(definition_key)
            .ok_or(ProcessingFault::UnknownProcessDefinition(definition_key))?;
        let element =
            deployed
                .process
                .element(&value.element_id)
                .ok_or_else(|| ProcessingFault::UnknownElement {
                    bpmn_process_id: deployed.bpmn_process_id().to_owned(),
                    element_id: value.element_id.clone(),
                })?;

        let mut ctx = BpmnStepContext {
            record,
            process: &deployed.process,
            element,
            storage,
            output,
        };

        if record.intent.carries_token() && ctx.drop_if_flow_scope_terminates()? {
            return Ok(());
        }

        let element_type = element.element_type();
        let handler = self.registry.get(element_type, record.intent).ok_or(
            ProcessingFault::MissingHandler {
                element_type,
                intent: record.intent,
            },
        )?;
        handler.handle(&mut ctx)
    }
}
