// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Records are the unit of work which is appended to and consumed from a partition journal.
//!
//! A record is immutable once appended. Processing a record never edits it; it can only produce
//! new follow-up records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::identifiers::{Key, Position, ProcessDefinitionKey};
use crate::process::BpmnElementType;

/// Variables of a process instance, as an ordered document.
pub type Variables = BTreeMap<String, serde_json::Value>;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::IntoStaticStr,
    strum::Display,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    Command,
    Event,
    CommandRejection,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::IntoStaticStr,
    strum::Display,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    ProcessInstance,
}

/// Intents of process instance records.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::IntoStaticStr,
    strum::Display,
    strum::EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    // -- commands
    Create,
    Cancel,
    CompleteElement,

    // -- events
    ElementActivating,
    ElementActivated,
    ElementCompleting,
    ElementCompleted,
    ElementTerminating,
    ElementTerminated,
    StartEventOccurred,
    EndEventOccurred,
    SequenceFlowTaken,
    GatewayActivated,
}

impl Intent {
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            Intent::Create | Intent::Cancel | Intent::CompleteElement
        )
    }

    /// Records with these intents represent one active execution path of their flow scope. If
    /// such a record cannot continue, the token it carries has to be given back to the scope.
    pub fn carries_token(&self) -> bool {
        matches!(
            self,
            Intent::ElementActivating
                | Intent::StartEventOccurred
                | Intent::EndEventOccurred
                | Intent::SequenceFlowTaken
                | Intent::GatewayActivated
        )
    }
}

/// Reason why a command was declined.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::IntoStaticStr,
    strum::Display,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionType {
    NotFound,
    InvalidArgument,
    InvalidState,
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub rejection_type: RejectionType,
    pub reason: String,
}

impl Rejection {
    pub fn new(rejection_type: RejectionType, reason: impl Into<String>) -> Self {
        Self {
            rejection_type,
            reason: reason.into(),
        }
    }
}

/// Value of records with [`ValueType::ProcessInstance`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstanceRecord {
    pub bpmn_process_id: String,
    pub version: u32,
    pub process_definition_key: Option<ProcessDefinitionKey>,
    pub process_instance_key: Option<Key>,
    pub element_id: String,
    pub flow_scope_key: Option<Key>,
    pub bpmn_element_type: Option<BpmnElementType>,
    pub variables: Variables,
}

impl ProcessInstanceRecord {
    /// A copy of this value describing another element of the same process instance.
    pub fn for_element(
        &self,
        element_id: impl Into<String>,
        element_type: BpmnElementType,
        flow_scope_key: Option<Key>,
    ) -> Self {
        Self {
            element_id: element_id.into(),
            bpmn_element_type: Some(element_type),
            flow_scope_key,
            ..self.clone()
        }
    }

    /// Merges the given variables into this document. Existing entries are overwritten.
    pub fn merge_variables(&mut self, variables: &Variables) {
        for (name, value) in variables {
            self.variables.insert(name.clone(), value.clone());
        }
    }
}

/// A record as it is appended to a partition journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: Option<Key>,
    /// Assigned once the record is appended. It is not part of the encoded payload.
    #[serde(skip)]
    pub position: Position,
    /// Position of the record whose processing produced this record. Client commands have none.
    pub source_position: Option<Position>,
    pub record_type: RecordType,
    pub value_type: ValueType,
    pub intent: Intent,
    pub rejection: Option<Rejection>,
    /// Correlates a client command (and its rejection) with the pending client request.
    pub request_id: Option<u64>,
    pub value: ProcessInstanceRecord,
}

impl Record {
    pub fn command(key: Option<Key>, intent: Intent, value: ProcessInstanceRecord) -> Self {
        Self {
            key,
            position: 0,
            source_position: None,
            record_type: RecordType::Command,
            value_type: ValueType::ProcessInstance,
            intent,
            rejection: None,
            request_id: None,
            value,
        }
    }

    pub fn event(key: Key, intent: Intent, value: ProcessInstanceRecord) -> Self {
        Self {
            key: Some(key),
            position: 0,
            source_position: None,
            record_type: RecordType::Event,
            value_type: ValueType::ProcessInstance,
            intent,
            rejection: None,
            request_id: None,
            value,
        }
    }

    pub fn with_request_id(mut self, request_id: u64) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn is_command(&self) -> bool {
        self.record_type == RecordType::Command
    }

    pub fn is_event(&self) -> bool {
        self.record_type == RecordType::Event
    }

    pub fn is_rejection(&self) -> bool {
        self.record_type == RecordType::CommandRejection
    }

    pub fn element_type(&self) -> Option<BpmnElementType> {
        self.value.bpmn_element_type
    }
}

crate::flexbuffers_storage_encode_decode!(Record);

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use googletest::prelude::*;

    use super::*;
    use crate::storage::StorageCodec;

    #[test]
    fn position_is_not_encoded() {
        let mut record = Record::event(
            Key::from_raw(1),
            Intent::ElementActivated,
            ProcessInstanceRecord {
                bpmn_process_id: "order".to_owned(),
                element_id: "order".to_owned(),
                ..Default::default()
            },
        );
        record.position = 4711;
        record.source_position = Some(12);
        record
            .value
            .variables
            .insert("amount".to_owned(), serde_json::json!(42));

        let mut buf = BytesMut::new();
        StorageCodec::encode(&record, &mut buf).unwrap();
        let decoded: Record = StorageCodec::decode(&mut buf.freeze()).unwrap();

        assert_that!(decoded.position, eq(0));
        assert_that!(decoded.source_position, some(eq(12)));
        assert_that!(decoded.value, eq(&record.value));
        assert_that!(decoded.intent, eq(Intent::ElementActivated));
    }

    #[test]
    fn merge_variables_overwrites() {
        let mut value = ProcessInstanceRecord::default();
        value.variables.insert("a".to_owned(), serde_json::json!(1));
        value.variables.insert("b".to_owned(), serde_json::json!(1));

        let mut other = Variables::new();
        other.insert("b".to_owned(), serde_json::json!(2));
        other.insert("c".to_owned(), serde_json::json!("x"));
        value.merge_variables(&other);

        assert_that!(
            value.variables.into_iter().collect::<Vec<_>>(),
            elements_are![
                eq(&("a".to_owned(), serde_json::json!(1))),
                eq(&("b".to_owned(), serde_json::json!(2))),
                eq(&("c".to_owned(), serde_json::json!("x")))
            ]
        );
    }

    #[test]
    fn token_carrying_intents() {
        assert!(Intent::SequenceFlowTaken.carries_token());
        assert!(!Intent::ElementCompleted.carries_token());
        assert!(Intent::Cancel.is_command());
    }
}
