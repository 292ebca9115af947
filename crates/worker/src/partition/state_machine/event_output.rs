// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tokenflow_storage_api::deferred_event_table::{DeferredEventTable, IndexedRecord};
use tokenflow_types::identifiers::{Key, Position};
use tokenflow_types::record::{
    Intent, ProcessInstanceRecord, Record, RecordType, Rejection, RejectionType,
};

use super::key_generator::KeyGenerator;
use super::{Error, ProcessingFault};

/// Answer to the client which submitted a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResponse {
    Accepted { key: Key },
    Rejected(Rejection),
}

/// Sink for everything a step produces besides state changes: follow-up records for the
/// journal, the response to a client command, and deferred records.
#[derive(Debug)]
pub struct EventOutput {
    source_position: Position,
    key_generator: KeyGenerator,
    records: Vec<Record>,
    response: Option<CommandResponse>,
}

impl EventOutput {
    pub(super) fn new(source_position: Position, key_generator: KeyGenerator) -> Self {
        Self {
            source_position,
            key_generator,
            records: Vec::new(),
            response: None,
        }
    }

    pub fn next_key(&mut self) -> Key {
        self.key_generator.next_key()
    }

    /// Appends an event about a new entity and returns its freshly generated key.
    pub fn append_new_event(&mut self, intent: Intent, value: ProcessInstanceRecord) -> Key {
        let key = self.next_key();
        self.append_follow_up_event(key, intent, value);
        key
    }

    /// Appends an event about the existing entity `key`.
    pub fn append_follow_up_event(&mut self, key: Key, intent: Intent, value: ProcessInstanceRecord) {
        self.push(Record::event(key, intent, value));
    }

    /// Appends a command for a new entity and returns its freshly generated key.
    pub fn append_new_command(&mut self, intent: Intent, value: ProcessInstanceRecord) -> Key {
        let key = self.next_key();
        self.push(Record::command(Some(key), intent, value));
        key
    }

    pub fn append_rejection(
        &mut self,
        command: &Record,
        rejection_type: RejectionType,
        reason: impl Into<String>,
    ) {
        let rejection = Rejection::new(rejection_type, reason);
        self.push(Record {
            record_type: RecordType::CommandRejection,
            rejection: Some(rejection.clone()),
            ..command.clone()
        });
        self.response = Some(CommandResponse::Rejected(rejection));
    }

    pub fn accept(&mut self, key: Key) {
        self.response = Some(CommandResponse::Accepted { key });
    }

    /// Parks a clone of `record` in the deferred records of its flow scope.
    pub fn defer_event<S: DeferredEventTable + ?Sized>(
        &mut self,
        storage: &mut S,
        scope_key: Key,
        record: &Record,
    ) -> Result<(), Error> {
        let key = record.key.ok_or(ProcessingFault::MissingRecordKey {
            intent: record.intent,
        })?;
        storage.put_deferred_event(
            scope_key,
            &IndexedRecord::new(key, record.intent, record.value.clone()),
        )?;
        Ok(())
    }

    /// Removes a deferred record of the scope. Removing an absent record is a no-op.
    pub fn remove_deferred_event<S: DeferredEventTable + ?Sized>(
        &mut self,
        storage: &mut S,
        scope_key: Key,
        record_key: Key,
    ) -> Result<(), Error> {
        storage.remove_deferred_event(scope_key, record_key)?;
        Ok(())
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub(super) fn into_parts(self) -> (KeyGenerator, Vec<Record>, Option<CommandResponse>) {
        (self.key_generator, self.records, self.response)
    }

    fn push(&mut self, mut record: Record) {
        record.source_position = Some(self.source_position);
        self.records.push(record);
    }
}
