// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Runtime state of activated elements.
//!
//! An [`ElementInstance`] exists for every activated process, sub-process and service task. A
//! container instance additionally counts the tokens of its flow scope, i.e. the execution paths
//! that are currently active inside it.

use serde::{Deserialize, Serialize};

use tokenflow_types::identifiers::Key;
use tokenflow_types::record::ProcessInstanceRecord;

use crate::Result;

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
    strum::EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementInstanceState {
    Activating,
    Activated,
    Completing,
    Completed,
    Terminating,
    Terminated,
}

impl ElementInstanceState {
    /// Whether an element instance may move from `from` to `to`.
    ///
    /// `ACTIVATING -> ACTIVATED -> COMPLETING -> COMPLETED`, plus `TERMINATING -> TERMINATED`
    /// which can be entered from any non-final state.
    pub fn can_transition(from: Self, to: Self) -> bool {
        use ElementInstanceState::*;
        match (from, to) {
            (Activating, Activated) | (Activated, Completing) | (Completing, Completed) => true,
            (Activating | Activated | Completing, Terminating) => true,
            (Terminating, Terminated) => true,
            _ => false,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self,
            ElementInstanceState::Completed | ElementInstanceState::Terminated
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("consuming a token of element instance {key} which has no active tokens")]
pub struct TokenUnderflow {
    pub key: Key,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("element instance {key} cannot transition from {from} to {to}")]
pub struct IllegalTransition {
    pub key: Key,
    pub from: ElementInstanceState,
    pub to: ElementInstanceState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementInstance {
    key: Key,
    /// Key of the flow scope instance, `None` for process instances.
    parent_key: Option<Key>,
    state: ElementInstanceState,
    active_tokens: u32,
    /// The record value the element was activated with, including its variables.
    value: ProcessInstanceRecord,
}

tokenflow_types::flexbuffers_storage_encode_decode!(ElementInstance);

impl ElementInstance {
    pub fn new(key: Key, value: ProcessInstanceRecord) -> Self {
        Self {
            key,
            parent_key: value.flow_scope_key,
            state: ElementInstanceState::Activating,
            active_tokens: 0,
            value,
        }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn parent_key(&self) -> Option<Key> {
        self.parent_key
    }

    pub fn element_id(&self) -> &str {
        &self.value.element_id
    }

    pub fn state(&self) -> ElementInstanceState {
        self.state
    }

    pub fn value(&self) -> &ProcessInstanceRecord {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut ProcessInstanceRecord {
        &mut self.value
    }

    pub fn active_tokens(&self) -> u32 {
        self.active_tokens
    }

    /// Starts a new concurrent execution path inside this scope.
    pub fn spawn_token(&mut self) {
        self.active_tokens += 1;
    }

    /// Ends an execution path inside this scope. It is a broken invariant to end more paths than
    /// were started, the count is never clamped.
    pub fn consume_token(&mut self) -> std::result::Result<(), TokenUnderflow> {
        self.active_tokens = self
            .active_tokens
            .checked_sub(1)
            .ok_or(TokenUnderflow { key: self.key })?;
        Ok(())
    }

    /// No execution path of this scope is active anymore. Deferred records of the scope must be
    /// resolved as well before the scope may complete.
    pub fn can_complete(&self) -> bool {
        self.active_tokens == 0
    }

    pub fn is_active(&self) -> bool {
        self.state == ElementInstanceState::Activated
    }

    pub fn is_terminating(&self) -> bool {
        self.state == ElementInstanceState::Terminating
    }

    pub fn transition_to(
        &mut self,
        to: ElementInstanceState,
    ) -> std::result::Result<(), IllegalTransition> {
        if !ElementInstanceState::can_transition(self.state, to) {
            return Err(IllegalTransition {
                key: self.key,
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

pub trait ReadOnlyElementInstanceTable {
    fn get_element_instance(&self, key: Key) -> Result<Option<ElementInstance>>;

    /// Instances whose flow scope is `scope_key`, ordered by key.
    fn get_children(&self, scope_key: Key) -> Result<Vec<ElementInstance>>;
}

pub trait ElementInstanceTable: ReadOnlyElementInstanceTable {
    fn put_element_instance(&mut self, instance: &ElementInstance) -> Result<()>;

    fn delete_element_instance(&mut self, key: Key) -> Result<()>;
}
